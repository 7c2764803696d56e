//! Voltage / ADC conversion
//!
//! Converts between simulated sensor voltages and the 12-bit raw readings the
//! ECU's ADC would produce for them.

use serde::{Deserialize, Serialize};

use crate::config::SensorVoltages;

/// ADC reference voltage
pub const REFERENCE_VOLTAGE: f64 = 3.3;

/// Full-scale reading of a 12-bit ADC
pub const FULL_SCALE: i32 = 4095;

/// Encode a voltage as a raw ADC reading.
///
/// Values outside `0.0..=REFERENCE_VOLTAGE` are not clamped and produce
/// readings outside the 12-bit range.
pub fn encode(volts: f64) -> i32 {
    (volts / REFERENCE_VOLTAGE * FULL_SCALE as f64).round() as i32
}

/// Convert a raw ADC reading back to volts
pub fn decode(raw: i32) -> f64 {
    raw as f64 * REFERENCE_VOLTAGE / FULL_SCALE as f64
}

/// Raw calibration window of one sensor, as stored by the ECU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorWindow {
    /// Raw reading at the low end
    pub min: i32,
    /// Raw reading at the high end
    pub max: i32,
}

impl SensorWindow {
    /// Build a window from two boundary voltages, in either order
    pub fn from_volts(a: f64, b: f64) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self {
            min: encode(lo),
            max: encode(hi),
        }
    }

    /// Position of `raw` inside the window, clamped to `0.0..=1.0`.
    ///
    /// Returns 0 for a degenerate window, like the ECU does for a corrupt
    /// calibration.
    pub fn normalize(&self, raw: i32) -> f64 {
        if self.max <= self.min {
            return 0.0;
        }
        ((raw - self.min) as f64 / (self.max - self.min) as f64).clamp(0.0, 1.0)
    }

    /// Normalized position as a percentage
    pub fn percent(&self, raw: i32) -> f64 {
        self.normalize(raw) * 100.0
    }
}

/// Expected ECU calibration for the simulated TPS and MAP sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calibration {
    /// Throttle position sensor
    pub tps: SensorWindow,
    /// Manifold pressure sensor
    pub map: SensorWindow,
}

impl Calibration {
    /// Windows the ECU should learn for the configured sensor voltages
    pub fn from_voltages(v: &SensorVoltages) -> Self {
        Self {
            tps: SensorWindow::from_volts(v.tps_open, v.tps_closed),
            map: SensorWindow::from_volts(v.map_idle, v.map_max),
        }
    }
}
