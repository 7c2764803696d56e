//! Engine model
//!
//! A coarse first-order engine: throttle slews toward the operator's target at
//! a bounded rate, RPM and MAP voltage approach throttle-dependent targets
//! exponentially, and a gear change rescales RPM and cuts throttle.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::GearTable;
use crate::config::{EngineParams, SensorVoltages};
use crate::error::{Result, SimError};
use crate::input::Intent;

/// MAP voltage distance at which the post-shift rebound is considered done
pub const REBOUND_EPSILON: f64 = 0.005;

/// Engine run phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Warm-up window, state pinned at idle
    Idle,
    /// Normal integration
    Running,
}

/// Override applied to the transmitted readings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SendMode {
    /// Transmit the simulated readings
    #[default]
    Normal,
    /// Pin TPS to its lowest voltage
    ForceTpsMin,
    /// Pin TPS to its highest voltage
    ForceTpsMax,
    /// Pin MAP to the idle voltage
    ForceMapMin,
    /// Pin MAP to the atmospheric voltage
    ForceMapMax,
}

impl SendMode {
    /// Short name for logs and the HUD
    pub fn label(&self) -> &'static str {
        match self {
            SendMode::Normal => "normal",
            SendMode::ForceTpsMin => "tps-min",
            SendMode::ForceTpsMax => "tps-max",
            SendMode::ForceMapMin => "map-min",
            SendMode::ForceMapMax => "map-max",
        }
    }
}

/// Observable engine state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    /// Realized throttle, 0..=1
    pub throttle: f64,
    /// Throttle the operator asked for, 0..=1
    pub throttle_target: f64,
    /// Engine speed
    pub rpm: f64,
    /// MAP sensor output in volts
    pub map_voltage: f64,
    /// Zero-based gear index
    pub gear: usize,
    /// Idle window or running
    pub phase: Phase,
    /// Set after a shift until MAP settles at the rebound voltage
    pub rebound: bool,
    /// Override applied to transmitted readings
    pub send_mode: SendMode,
    /// Simulated seconds since start
    pub elapsed: f64,
}

/// Engine simulator, advanced one fixed timestep per [`tick`](Self::tick)
#[derive(Debug, Clone)]
pub struct EngineModel {
    params: EngineParams,
    sensors: SensorVoltages,
    gears: GearTable,
    state: EngineState,
    ticks: u64,
}

impl EngineModel {
    /// Create an engine at idle in first gear
    pub fn new(params: &EngineParams, sensors: &SensorVoltages) -> Result<Self> {
        let state = EngineState {
            throttle: 0.0,
            throttle_target: 0.0,
            rpm: params.idle_rpm,
            map_voltage: sensors.map_idle,
            gear: 0,
            phase: Phase::Idle,
            rebound: false,
            send_mode: SendMode::Normal,
            elapsed: 0.0,
        };
        Self::from_state(params, sensors, state)
    }

    /// Create an engine from an explicit state.
    ///
    /// Throttle values are clamped; a gear outside the table is rejected.
    pub fn from_state(
        params: &EngineParams,
        sensors: &SensorVoltages,
        mut state: EngineState,
    ) -> Result<Self> {
        let gears = GearTable::new(params.gear_ratios.clone())?;
        if state.gear >= gears.len() {
            return Err(SimError::GearIndex {
                index: state.gear,
                len: gears.len(),
            });
        }
        state.throttle = state.throttle.clamp(0.0, 1.0);
        state.throttle_target = state.throttle_target.clamp(0.0, 1.0);
        state.rpm = state.rpm.max(0.0);
        let ticks = (state.elapsed / params.dt).round().max(0.0) as u64;

        Ok(Self {
            params: params.clone(),
            sensors: sensors.clone(),
            gears,
            state,
            ticks,
        })
    }

    /// Copy of the current state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Parameters the model was built with
    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// Gear table in use
    pub fn gears(&self) -> &GearTable {
        &self.gears
    }

    /// True during the idle window
    pub fn is_idle(&self) -> bool {
        self.state.phase == Phase::Idle
    }

    /// True in the highest gear
    pub fn at_top_gear(&self) -> bool {
        self.state.gear == self.gears.top_gear()
    }

    /// Apply an operator intent.
    ///
    /// Returns true if the state changed. Throttle and gear intents are
    /// dropped during the idle window; raw commands are not engine intents.
    pub fn apply(&mut self, intent: &Intent) -> bool {
        match intent {
            Intent::ForceMode(mode) => self.set_send_mode(*mode),
            Intent::RawCommand(_) | Intent::None => false,
            _ if self.is_idle() => {
                debug!(?intent, "ignored during idle warm-up");
                false
            }
            Intent::Accelerate => self.nudge_throttle(self.params.throttle_step),
            Intent::Brake => self.nudge_throttle(-self.params.throttle_step),
            Intent::ShiftUp => self.shift_up(),
            Intent::ShiftDown => self.shift_down(),
        }
    }

    fn nudge_throttle(&mut self, delta: f64) -> bool {
        let before = self.state.throttle_target;
        self.state.throttle_target = (before + delta).clamp(0.0, 1.0);
        self.state.throttle_target != before
    }

    /// Change the transmit override. Returns true if it changed.
    pub fn set_send_mode(&mut self, mode: SendMode) -> bool {
        let changed = self.state.send_mode != mode;
        if changed {
            info!(mode = mode.label(), "send mode changed");
        }
        self.state.send_mode = mode;
        changed
    }

    /// Shift to the next higher gear; no-op at the top gear
    pub fn shift_up(&mut self) -> bool {
        if !self.gears.can_shift_up(self.state.gear) {
            return false;
        }
        self.shift_to(self.state.gear + 1)
    }

    /// Shift to the next lower gear; no-op in first gear
    pub fn shift_down(&mut self) -> bool {
        if !self.gears.can_shift_down(self.state.gear) {
            return false;
        }
        self.shift_to(self.state.gear - 1)
    }

    fn shift_to(&mut self, gear: usize) -> bool {
        let factor = match self.gears.shift_factor(self.state.gear, gear) {
            Ok(f) => f,
            Err(e) => {
                warn!("shift rejected: {e}");
                return false;
            }
        };

        let from = self.state.gear;
        self.state.rpm *= factor;
        self.state.throttle_target =
            (self.state.throttle_target * self.params.throttle_drop).clamp(0.0, 1.0);
        self.state.rebound = true;
        self.state.gear = gear;

        info!(
            from = from + 1,
            to = gear + 1,
            rpm = self.state.rpm.round(),
            "gear change"
        );
        true
    }

    /// Advance the simulation by one timestep
    pub fn tick(&mut self) {
        self.ticks += 1;
        self.state.elapsed = self.ticks as f64 * self.params.dt;

        if self.state.phase == Phase::Idle {
            if self.state.elapsed > self.params.idle_duration {
                self.state.phase = Phase::Running;
                info!(elapsed = self.state.elapsed, "idle warm-up complete");
            } else {
                self.pin_idle();
                return;
            }
        }

        self.slew_throttle();

        let p = &self.params;
        let target_rpm = p.idle_rpm + self.state.throttle * (p.max_rpm - p.idle_rpm);
        self.state.rpm = approach(self.state.rpm, target_rpm, p.rpm_rise_coef).max(0.0);

        let s = &self.sensors;
        if self.state.rebound {
            self.state.map_voltage =
                approach(self.state.map_voltage, s.map_rebound, p.map_rebound_coef);
            if (self.state.map_voltage - s.map_rebound).abs() < REBOUND_EPSILON {
                self.state.rebound = false;
                debug!("MAP rebound settled");
            }
        } else {
            let target_map = s.map_idle + self.state.throttle * (s.map_max - s.map_idle);
            self.state.map_voltage = approach(self.state.map_voltage, target_map, p.map_rise_coef);
        }
    }

    fn pin_idle(&mut self) {
        self.state.rpm = self.params.idle_rpm;
        self.state.map_voltage = self.sensors.map_idle;
        self.state.throttle = 0.0;
        self.state.throttle_target = 0.0;
    }

    fn slew_throttle(&mut self) {
        let rate = self.params.throttle_rate;
        let diff = self.state.throttle_target - self.state.throttle;
        let next = if diff.abs() <= rate {
            self.state.throttle_target
        } else {
            self.state.throttle + rate.copysign(diff)
        };
        self.state.throttle = next.clamp(0.0, 1.0);
    }
}

/// One step of exponential approach toward `target`
fn approach(value: f64, target: f64, coef: f64) -> f64 {
    value + (target - value) * coef
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_engine() -> EngineModel {
        let params = EngineParams {
            idle_duration: 0.0,
            ..EngineParams::default()
        };
        let mut engine = EngineModel::new(&params, &SensorVoltages::default()).unwrap();
        engine.tick();
        engine
    }

    #[test]
    fn test_initial_state() {
        let engine = EngineModel::new(&EngineParams::default(), &SensorVoltages::default()).unwrap();
        let s = engine.state();
        assert_eq!(s.gear, 0);
        assert_eq!(s.rpm, 800.0);
        assert_eq!(s.map_voltage, 3.05);
        assert_eq!(s.phase, Phase::Idle);
        assert_eq!(s.send_mode, SendMode::Normal);
    }

    #[test]
    fn test_leaves_idle_after_warmup() {
        let mut engine = EngineModel::new(&EngineParams::default(), &SensorVoltages::default()).unwrap();
        for _ in 0..50 {
            engine.tick();
            assert!(engine.is_idle());
        }
        engine.tick();
        assert!(!engine.is_idle());
    }

    #[test]
    fn test_throttle_slew_snaps_to_target() {
        let mut engine = running_engine();
        engine.apply(&Intent::Accelerate);
        engine.tick();
        assert!((engine.state().throttle - 0.03).abs() < 1e-12);
        for _ in 0..4 {
            engine.tick();
        }
        assert_eq!(engine.state().throttle, engine.state().throttle_target);
    }

    #[test]
    fn test_brake_clamps_at_zero() {
        let mut engine = running_engine();
        assert!(!engine.apply(&Intent::Brake));
        assert_eq!(engine.state().throttle_target, 0.0);
    }

    #[test]
    fn test_force_mode_accepted_during_idle() {
        let mut engine = EngineModel::new(&EngineParams::default(), &SensorVoltages::default()).unwrap();
        assert!(engine.apply(&Intent::ForceMode(SendMode::ForceMapMax)));
        assert!(!engine.apply(&Intent::ShiftUp));
        assert_eq!(engine.state().send_mode, SendMode::ForceMapMax);
        assert_eq!(engine.state().gear, 0);
    }

    #[test]
    fn test_from_state_rejects_bad_gear() {
        let mut state = running_engine().state();
        state.gear = 9;
        let res = EngineModel::from_state(&EngineParams::default(), &SensorVoltages::default(), state);
        assert!(matches!(res, Err(SimError::GearIndex { index: 9, .. })));
    }
}
