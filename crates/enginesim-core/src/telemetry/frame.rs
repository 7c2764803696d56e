//! Outbound telemetry frame

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::config::SensorVoltages;
use crate::engine::{EngineState, SendMode};

/// One transmitted sample: sensor voltages and their raw ADC readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// TPS voltage sent
    pub tps_volts: f64,
    /// MAP voltage sent
    pub map_volts: f64,
    /// TPS ADC reading
    pub tps_raw: i32,
    /// MAP ADC reading
    pub map_raw: i32,
}

impl TelemetryFrame {
    /// Build the frame for `state`, applying its send mode override.
    ///
    /// Overrides replace the transmitted voltage only; the engine state is
    /// untouched.
    pub fn sample(state: &EngineState, sensors: &SensorVoltages) -> Self {
        let mut tps_volts = sensors.tps_for_throttle(state.throttle);
        let mut map_volts = state.map_voltage;

        match state.send_mode {
            SendMode::Normal => {}
            SendMode::ForceTpsMin => tps_volts = sensors.tps_min(),
            SendMode::ForceTpsMax => tps_volts = sensors.tps_max(),
            SendMode::ForceMapMin => map_volts = sensors.map_idle,
            SendMode::ForceMapMax => map_volts = sensors.map_max,
        }

        Self {
            tps_volts,
            map_volts,
            tps_raw: codec::encode(tps_volts),
            map_raw: codec::encode(map_volts),
        }
    }

    /// Wire form: `tps_raw:<int>,map_raw:<int>\n`
    pub fn to_line(&self) -> String {
        format!("tps_raw:{},map_raw:{}\n", self.tps_raw, self.map_raw)
    }
}
