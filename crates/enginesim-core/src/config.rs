//! Simulation configuration
//!
//! All constants are fixed when the session starts. They can be loaded from a
//! JSON file; any field left out keeps its default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, SimError};

/// Default baud rate for the ECU link
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Default serial port name
#[cfg(target_os = "windows")]
pub const DEFAULT_PORT: &str = "COM1";
/// Default serial port name
#[cfg(not(target_os = "windows"))]
pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Engine model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    /// RPM held during the idle window
    pub idle_rpm: f64,
    /// RPM at full throttle
    pub max_rpm: f64,
    /// Upshift trigger used by the automatic driver only
    pub shift_rpm: f64,
    /// Simulation timestep in seconds
    pub dt: f64,
    /// Throttle target change per accelerate/brake intent
    pub throttle_step: f64,
    /// Maximum realized throttle change per tick
    pub throttle_rate: f64,
    /// Factor applied to the throttle target on a gear change
    pub throttle_drop: f64,
    /// Fraction of the RPM error closed per tick
    pub rpm_rise_coef: f64,
    /// Fraction of the MAP error closed per tick
    pub map_rise_coef: f64,
    /// Fraction of the rebound MAP error closed per tick
    pub map_rebound_coef: f64,
    /// Warm-up window in seconds during which the engine is pinned at idle
    pub idle_duration: f64,
    /// Gearbox ratios, first gear first
    pub gear_ratios: Vec<f64>,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            idle_rpm: 800.0,
            max_rpm: 7000.0,
            shift_rpm: 6000.0,
            dt: 0.1,
            throttle_step: 0.09,
            throttle_rate: 0.03,
            throttle_drop: 0.6,
            rpm_rise_coef: 0.1,
            map_rise_coef: 0.05,
            map_rebound_coef: 0.2,
            idle_duration: 5.0,
            gear_ratios: vec![3.8, 2.2, 1.5, 1.0, 0.8],
        }
    }
}

impl EngineParams {
    /// Timestep as a `Duration`
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.dt)
    }
}

/// Sensor voltages in volts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorVoltages {
    /// TPS output with the pedal released
    pub tps_open: f64,
    /// TPS output with the pedal fully pressed
    pub tps_closed: f64,
    /// MAP output at idle vacuum
    pub map_idle: f64,
    /// MAP output at atmospheric pressure
    pub map_max: f64,
    /// MAP target during post-shift pressure recovery
    pub map_rebound: f64,
}

impl Default for SensorVoltages {
    fn default() -> Self {
        Self {
            tps_open: 2.25,
            tps_closed: 0.5,
            map_idle: 3.05,
            map_max: 3.26,
            map_rebound: 3.12,
        }
    }
}

impl SensorVoltages {
    /// TPS voltage for a realized throttle position
    pub fn tps_for_throttle(&self, throttle: f64) -> f64 {
        self.tps_open + (self.tps_closed - self.tps_open) * throttle
    }

    /// Lower of the two TPS end voltages
    pub fn tps_min(&self) -> f64 {
        self.tps_open.min(self.tps_closed)
    }

    /// Higher of the two TPS end voltages
    pub fn tps_max(&self) -> f64 {
        self.tps_open.max(self.tps_closed)
    }
}

/// Serial link and timing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial port name, or `tcp://host:port` for a virtual ECU
    pub port: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Bounded read timeout on the channel
    pub read_timeout_ms: u64,
    /// Period of the telemetry transmit loop
    pub transmit_period_ms: u64,
    /// Poll interval of the receive loop
    pub receive_poll_ms: u64,
    /// Delay between sending a command and draining its reply
    pub command_settle_ms: u64,
    /// Wait after opening the port, for ECUs that reset on open
    pub boot_delay_ms: u64,
    /// Commands sent once before telemetry streaming starts
    pub startup_commands: Vec<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 100,
            transmit_period_ms: 100,
            receive_poll_ms: 10,
            command_settle_ms: 500,
            boot_delay_ms: 1000,
            startup_commands: Vec::new(),
        }
    }
}

impl LinkConfig {
    /// Read timeout as a [`Duration`]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Transmit period as a [`Duration`]
    pub fn transmit_period(&self) -> Duration {
        Duration::from_millis(self.transmit_period_ms)
    }

    /// Receive poll interval as a [`Duration`]
    pub fn receive_poll(&self) -> Duration {
        Duration::from_millis(self.receive_poll_ms)
    }

    /// Command settle delay as a [`Duration`]
    pub fn command_settle(&self) -> Duration {
        Duration::from_millis(self.command_settle_ms)
    }

    /// Boot delay as a [`Duration`]
    pub fn boot_delay(&self) -> Duration {
        Duration::from_millis(self.boot_delay_ms)
    }
}

/// Who drives the throttle and gearbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverMode {
    /// Operator key presses only
    #[default]
    Manual,
    /// Full throttle with upshifts at `shift_rpm`; operator keys still apply
    Auto,
}

/// Complete simulator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Engine model parameters
    pub engine: EngineParams,
    /// Sensor voltages
    pub sensors: SensorVoltages,
    /// ECU link settings
    pub link: LinkConfig,
    /// Who drives
    pub driver: DriverMode,
    /// End the run once the top gear is reached
    pub stop_at_top_gear: bool,
    /// Optional hard limit on the run length, in seconds
    pub max_duration: Option<f64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            engine: EngineParams::default(),
            sensors: SensorVoltages::default(),
            link: LinkConfig::default(),
            driver: DriverMode::default(),
            stop_at_top_gear: true,
            max_duration: None,
        }
    }
}

impl SimConfig {
    /// Load a configuration from a JSON file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Parse a configuration from JSON text and validate it
    pub fn from_json(text: &str) -> Result<Self> {
        let config: SimConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and relationships between parameters
    pub fn validate(&self) -> Result<()> {
        let e = &self.engine;

        if !(e.dt > 0.0) {
            return Err(invalid(format!("dt must be positive, got {}", e.dt)));
        }
        if !(e.idle_rpm >= 0.0 && e.idle_rpm < e.max_rpm) {
            return Err(invalid(format!(
                "idle_rpm ({}) must be non-negative and below max_rpm ({})",
                e.idle_rpm, e.max_rpm
            )));
        }
        for (name, value) in [
            ("rpm_rise_coef", e.rpm_rise_coef),
            ("map_rise_coef", e.map_rise_coef),
            ("map_rebound_coef", e.map_rebound_coef),
            ("throttle_step", e.throttle_step),
            ("throttle_rate", e.throttle_rate),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(invalid(format!("{name} must be in (0, 1], got {value}")));
            }
        }
        if !(0.0..=1.0).contains(&e.throttle_drop) {
            return Err(invalid(format!(
                "throttle_drop must be in [0, 1], got {}",
                e.throttle_drop
            )));
        }
        if !(e.idle_duration >= 0.0) {
            return Err(invalid("idle_duration must not be negative".to_string()));
        }
        crate::engine::GearTable::new(e.gear_ratios.clone())?;

        for (name, value) in [
            ("transmit_period_ms", self.link.transmit_period_ms),
            ("receive_poll_ms", self.link.receive_poll_ms),
            ("read_timeout_ms", self.link.read_timeout_ms),
        ] {
            if value == 0 {
                return Err(invalid(format!("{name} must be positive")));
            }
        }
        if self.link.baud_rate == 0 {
            return Err(invalid("baud_rate must be positive".to_string()));
        }
        if let Some(limit) = self.max_duration {
            if !(limit > 0.0) {
                return Err(invalid(format!("max_duration must be positive, got {limit}")));
            }
        }

        Ok(())
    }
}

fn invalid(msg: String) -> SimError {
    SimError::InvalidConfig(msg)
}
