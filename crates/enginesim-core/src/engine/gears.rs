//! Gear ratio table

use crate::error::{Result, SimError};

/// Fixed, strictly decreasing list of gearbox ratios
#[derive(Debug, Clone, PartialEq)]
pub struct GearTable {
    ratios: Vec<f64>,
}

impl GearTable {
    /// Build a table, rejecting fewer than two gears or a non-decreasing
    /// sequence
    pub fn new(ratios: Vec<f64>) -> Result<Self> {
        if ratios.len() < 2 {
            return Err(SimError::InvalidConfig(format!(
                "gear table needs at least 2 ratios, got {}",
                ratios.len()
            )));
        }
        if let Some(r) = ratios.iter().find(|r| !(**r > 0.0) || !r.is_finite()) {
            return Err(SimError::InvalidConfig(format!(
                "gear ratio {r} must be positive and finite"
            )));
        }
        if let Some(pair) = ratios.windows(2).find(|w| w[1] >= w[0]) {
            return Err(SimError::InvalidConfig(format!(
                "gear ratios must strictly decrease ({} then {})",
                pair[0], pair[1]
            )));
        }
        Ok(Self { ratios })
    }

    /// Number of gears
    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    /// Always false, a table holds at least two gears
    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }

    /// Index of the highest gear
    pub fn top_gear(&self) -> usize {
        self.ratios.len() - 1
    }

    /// Ratio of `gear`, or [`SimError::GearIndex`] outside the table
    pub fn ratio(&self, gear: usize) -> Result<f64> {
        self.ratios
            .get(gear)
            .copied()
            .ok_or(SimError::GearIndex {
                index: gear,
                len: self.ratios.len(),
            })
    }

    /// True unless `gear` is the top gear
    pub fn can_shift_up(&self, gear: usize) -> bool {
        gear < self.top_gear()
    }

    /// True unless `gear` is first gear
    pub fn can_shift_down(&self, gear: usize) -> bool {
        gear > 0 && gear < self.ratios.len()
    }

    /// RPM multiplier when moving from gear `from` to gear `to`
    pub fn shift_factor(&self, from: usize, to: usize) -> Result<f64> {
        Ok(self.ratio(to)? / self.ratio(from)?)
    }

    /// All ratios, first gear first
    pub fn ratios(&self) -> &[f64] {
        &self.ratios
    }
}
