//! Console reporting
//!
//! The HUD line shown every tick, replies from the ECU, and commands sent to
//! it. Diagnostics go through `tracing`; this is the operator-facing output.

use std::io::Write;

use crate::codec::Calibration;
use crate::engine::{EngineState, Phase};
use crate::telemetry::TelemetryFrame;

/// Everything the HUD shows for one tick
#[derive(Debug, Clone, Copy)]
pub struct Status {
    /// Engine state after the tick
    pub state: EngineState,
    /// Readings as they would be transmitted for that state
    pub frame: TelemetryFrame,
    /// Window used to show the readings as the ECU's percentages
    pub calibration: Calibration,
}

impl Status {
    /// One-line HUD, e.g.
    /// `[  5.20s] RUN  Gear:2 | RPM:3589 | Throttle:0.45/0.60 | TPS:1.462V (45%) | MAP:3.120V (33%) | normal`
    pub fn hud_line(&self) -> String {
        let s = &self.state;
        let phase = match s.phase {
            Phase::Idle => "IDLE",
            Phase::Running => "RUN ",
        };
        let rebound = if s.rebound { " rebound" } else { "" };
        format!(
            "[{:6.2}s] {} Gear:{} | RPM:{:.0} | Throttle:{:.2}/{:.2} | TPS:{:.3}V ({:.0}%) | MAP:{:.3}V ({:.0}%) | {}{}",
            s.elapsed,
            phase,
            s.gear + 1,
            s.rpm,
            s.throttle,
            s.throttle_target,
            self.frame.tps_volts,
            self.calibration.tps.percent(self.frame.tps_raw),
            self.frame.map_volts,
            self.calibration.map.percent(self.frame.map_raw),
            s.send_mode.label(),
            rebound,
        )
    }
}

/// Sink for operator-facing output. Called from the simulation thread and
/// the receive worker.
pub trait Reporter: Send + Sync {
    /// Status for the tick that just ran
    fn status(&self, status: &Status);

    /// A non-empty line received from the ECU
    fn device_line(&self, line: &str);

    /// A command was written to the ECU
    fn command_sent(&self, command: &str);
}

/// Writes to stdout
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    /// Redraw the HUD in place instead of scrolling
    in_place: bool,
}

impl ConsoleReporter {
    /// Create a reporter; `in_place` redraws the HUD on one line
    pub fn new(in_place: bool) -> Self {
        Self { in_place }
    }

    fn line_start(&self) -> &'static str {
        if self.in_place {
            "\r\x1b[2K"
        } else {
            ""
        }
    }
}

impl Reporter for ConsoleReporter {
    fn status(&self, status: &Status) {
        let mut out = std::io::stdout().lock();
        let _ = if self.in_place {
            write!(out, "\r\x1b[2K{}", status.hud_line())
        } else {
            writeln!(out, "{}", status.hud_line())
        };
        let _ = out.flush();
    }

    fn device_line(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}[ECU] {}", self.line_start(), line);
    }

    fn command_sent(&self, command: &str) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{}[SIM] sent: {}", self.line_start(), command);
    }
}
