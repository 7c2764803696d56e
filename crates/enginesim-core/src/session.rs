//! Simulation session
//!
//! Owns the run: sends the start-up commands, starts the telemetry bridge,
//! then ticks the engine at the configured timestep, feeding it operator (and
//! optionally automatic) intents until the run ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::codec::Calibration;
use crate::config::{DriverMode, SimConfig};
use crate::engine::{EngineModel, EngineState, Phase, SharedEngine};
use crate::error::Result;
use crate::input::{map_key, Intent, KeyPoll, KeySource};
use crate::link::SerialLink;
use crate::report::{Reporter, Status};
use crate::telemetry::{pace, BridgeStats, CommandDispatcher, TelemetryBridge, TelemetryFrame};

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The top gear was reached
    TopGear,
    /// The key source closed (operator quit)
    InputClosed,
    /// `max_duration` elapsed
    DurationElapsed,
    /// The cancel handle was set
    Cancelled,
}

/// Outcome of a finished run
#[derive(Debug, Clone, Copy)]
pub struct SessionSummary {
    /// Why the run ended
    pub reason: StopReason,
    /// Engine state after the last tick
    pub final_state: EngineState,
    /// Link counters at shutdown
    pub stats: BridgeStats,
}

/// A configured simulation run
pub struct Session {
    config: SimConfig,
    cancel: Arc<AtomicBool>,
}

impl Session {
    /// Validate `config` and prepare a session
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that ends the run at the next tick when set
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Configuration the session runs with
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Run until the session ends. The link is released only after both
    /// telemetry workers have been joined.
    pub fn run(
        &self,
        link: Box<dyn SerialLink>,
        keys: &mut dyn KeySource,
        reporter: Arc<dyn Reporter>,
    ) -> Result<SessionSummary> {
        let config = &self.config;
        let engine = SharedEngine::new(EngineModel::new(&config.engine, &config.sensors)?);
        let calibration = Calibration::from_voltages(&config.sensors);
        info!(
            tps_min = calibration.tps.min,
            tps_max = calibration.tps.max,
            map_min = calibration.map.min,
            map_max = calibration.map.max,
            "expected ECU calibration"
        );

        let mut bridge = TelemetryBridge::new(
            link,
            engine.clone(),
            config.sensors.clone(),
            config.link.clone(),
            reporter.clone(),
        )?;
        let dispatcher = bridge.dispatcher();

        if !config.link.boot_delay().is_zero() {
            debug!(delay_ms = config.link.boot_delay_ms, "waiting for ECU boot");
            thread::sleep(config.link.boot_delay());
        }
        for command in &config.link.startup_commands {
            if let Err(e) = dispatcher.send_command(command) {
                warn!(command = %command, "start-up command failed: {e}");
            }
        }

        bridge.start()?;
        let outcome = self.tick_loop(&engine, &dispatcher, keys, reporter.as_ref(), calibration);
        bridge.stop();

        let reason = outcome?;
        let summary = SessionSummary {
            reason,
            final_state: engine.snapshot()?,
            stats: bridge.stats(),
        };
        info!(
            reason = ?summary.reason,
            gear = summary.final_state.gear + 1,
            elapsed = summary.final_state.elapsed,
            "simulation finished"
        );
        Ok(summary)
    }

    fn tick_loop(
        &self,
        engine: &SharedEngine,
        dispatcher: &CommandDispatcher,
        keys: &mut dyn KeySource,
        reporter: &dyn Reporter,
        calibration: Calibration,
    ) -> Result<StopReason> {
        let config = &self.config;
        let period = config.engine.tick_period();
        let mut keys_open = true;
        let mut next_tick = Instant::now();

        info!(driver = ?config.driver, "simulation started");
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(StopReason::Cancelled);
            }

            while keys_open {
                match keys.poll() {
                    KeyPoll::Key(token) => {
                        let intent = map_key(&token);
                        debug!(?token, ?intent, "key");
                        handle_intent(engine, dispatcher, intent)?;
                    }
                    KeyPoll::Empty => break,
                    KeyPoll::Closed => {
                        if config.driver == DriverMode::Manual {
                            return Ok(StopReason::InputClosed);
                        }
                        info!("operator input closed, automatic driver continues");
                        keys_open = false;
                    }
                }
            }

            if config.driver == DriverMode::Auto {
                for intent in engine.update(|m| auto_intents(m))? {
                    handle_intent(engine, dispatcher, intent)?;
                }
            }

            let (state, at_top) = engine.update(|m| {
                m.tick();
                (m.state(), m.at_top_gear())
            })?;

            reporter.status(&Status {
                state,
                frame: TelemetryFrame::sample(&state, &config.sensors),
                calibration,
            });

            if config.stop_at_top_gear && at_top {
                return Ok(StopReason::TopGear);
            }
            if let Some(limit) = config.max_duration {
                if state.elapsed >= limit {
                    return Ok(StopReason::DurationElapsed);
                }
            }

            // an overrun (e.g. a command settle delay) is not caught up
            next_tick = pace(next_tick, period);
        }
    }
}

/// Apply one intent. Raw commands go to the ECU outside the state lock; a
/// failed command is logged and the run continues.
fn handle_intent(
    engine: &SharedEngine,
    dispatcher: &CommandDispatcher,
    intent: Intent,
) -> Result<()> {
    match intent {
        Intent::None => {}
        Intent::RawCommand(command) => {
            if let Err(e) = dispatcher.send_command(&command) {
                warn!(command = %command, "command failed: {e}");
            }
        }
        intent => {
            engine.update(|m| m.apply(&intent))?;
        }
    }
    Ok(())
}

/// Intents of the automatic driver: hold the throttle wide open and upshift
/// at the shift threshold
fn auto_intents(model: &EngineModel) -> Vec<Intent> {
    let state = model.state();
    if state.phase == Phase::Idle {
        return Vec::new();
    }

    let mut intents = Vec::new();
    if state.throttle_target < 1.0 {
        intents.push(Intent::Accelerate);
    }
    if state.rpm >= model.params().shift_rpm && model.gears().can_shift_up(state.gear) {
        intents.push(Intent::ShiftUp);
    }
    intents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineParams, SensorVoltages};

    fn engine_at(rpm: f64, throttle_target: f64, gear: usize) -> EngineModel {
        let params = EngineParams::default();
        let mut state = EngineModel::new(&params, &SensorVoltages::default())
            .unwrap()
            .state();
        state.phase = Phase::Running;
        state.rpm = rpm;
        state.throttle_target = throttle_target;
        state.gear = gear;
        EngineModel::from_state(&params, &SensorVoltages::default(), state).unwrap()
    }

    #[test]
    fn test_auto_driver_accelerates() {
        assert_eq!(auto_intents(&engine_at(2000.0, 0.5, 0)), vec![Intent::Accelerate]);
    }

    #[test]
    fn test_auto_driver_shifts_at_threshold() {
        assert_eq!(auto_intents(&engine_at(6000.0, 1.0, 1)), vec![Intent::ShiftUp]);
        assert!(auto_intents(&engine_at(6500.0, 1.0, 4)).is_empty());
    }

    #[test]
    fn test_auto_driver_waits_out_idle() {
        let model = EngineModel::new(&EngineParams::default(), &SensorVoltages::default()).unwrap();
        assert!(auto_intents(&model).is_empty());
    }

    #[test]
    fn test_session_rejects_invalid_config() {
        let mut config = SimConfig::default();
        config.engine.dt = 0.0;
        assert!(Session::new(config).is_err());
    }
}
