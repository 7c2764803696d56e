use enginesim_core::codec::encode;
use enginesim_core::config::{EngineParams, SensorVoltages};
use enginesim_core::engine::{EngineModel, EngineState, Phase, SendMode, REBOUND_EPSILON};
use enginesim_core::input::Intent;
use enginesim_core::telemetry::TelemetryFrame;

const TPS_V_OPEN: f64 = 2.25;
const TPS_V_CLOSED: f64 = 0.5;

fn running_state(rpm: f64, throttle: f64, throttle_target: f64, gear: usize) -> EngineState {
    EngineState {
        throttle,
        throttle_target,
        rpm,
        map_voltage: 3.05,
        gear,
        phase: Phase::Running,
        rebound: false,
        send_mode: SendMode::Normal,
        elapsed: 10.0,
    }
}

fn engine(state: EngineState) -> EngineModel {
    EngineModel::from_state(&EngineParams::default(), &SensorVoltages::default(), state).unwrap()
}

#[test]
fn test_throttle_converges_without_overshoot() {
    let rate = EngineParams::default().throttle_rate;
    for start in [0.0, 1.0] {
        for i in 0..=10 {
            let target = i as f64 / 10.0;
            let mut e = engine(running_state(800.0, start, target, 0));
            let mut prev = start;
            for _ in 0..100 {
                e.tick();
                let t = e.state().throttle;
                assert!((t - prev).abs() <= rate + 1e-12, "step too large");
                if start <= target {
                    assert!(t <= target && t >= prev, "overshoot {t} past {target}");
                } else {
                    assert!(t >= target && t <= prev, "overshoot {t} past {target}");
                }
                prev = t;
            }
            assert!((e.state().throttle - target).abs() <= rate);
        }
    }
}

#[test]
fn test_shift_rescales_rpm_by_ratio_quotient() {
    let ratios = EngineParams::default().gear_ratios;
    for gear in 0..ratios.len() {
        if gear + 1 < ratios.len() {
            let mut e = engine(running_state(5000.0, 0.5, 0.5, gear));
            assert!(e.apply(&Intent::ShiftUp));
            let s = e.state();
            assert_eq!(s.gear, gear + 1);
            assert!((s.rpm / 5000.0 - ratios[gear + 1] / ratios[gear]).abs() < 1e-9);
        }
        if gear > 0 {
            let mut e = engine(running_state(3000.0, 0.5, 0.5, gear));
            assert!(e.apply(&Intent::ShiftDown));
            let s = e.state();
            assert_eq!(s.gear, gear - 1);
            assert!((s.rpm / 3000.0 - ratios[gear - 1] / ratios[gear]).abs() < 1e-9);
        }
    }
}

#[test]
fn test_shift_beyond_table_is_noop() {
    let top = EngineParams::default().gear_ratios.len() - 1;

    let mut e = engine(running_state(6500.0, 0.8, 0.8, top));
    let before = e.state();
    assert!(!e.apply(&Intent::ShiftUp));
    assert_eq!(e.state(), before);

    let mut e = engine(running_state(900.0, 0.1, 0.1, 0));
    let before = e.state();
    assert!(!e.apply(&Intent::ShiftDown));
    assert_eq!(e.state(), before);
}

#[test]
fn test_idle_window_pins_state() {
    let params = EngineParams::default();
    let sensors = SensorVoltages::default();
    let mut e = EngineModel::new(&params, &sensors).unwrap();

    let idle_ticks = (params.idle_duration / params.dt).round() as usize;
    for _ in 0..idle_ticks {
        e.apply(&Intent::Accelerate);
        e.apply(&Intent::ShiftUp);
        e.tick();
        let s = e.state();
        assert_eq!(s.phase, Phase::Idle);
        assert_eq!(s.rpm, params.idle_rpm);
        assert_eq!(s.throttle, 0.0);
        assert_eq!(s.throttle_target, 0.0);
        assert_eq!(s.map_voltage, sensors.map_idle);
        assert_eq!(s.gear, 0);
    }

    e.tick();
    assert_eq!(e.state().phase, Phase::Running);

    // one-way
    for _ in 0..10 {
        e.tick();
        assert_eq!(e.state().phase, Phase::Running);
    }
}

#[test]
fn test_rebound_clears_only_within_epsilon() {
    let rebound_target = SensorVoltages::default().map_rebound;
    let mut e = engine(running_state(6200.0, 0.9, 0.9, 0));
    assert!(e.apply(&Intent::ShiftUp));
    assert!(e.state().rebound);

    let mut cleared_at = None;
    for i in 0..200 {
        e.tick();
        let s = e.state();
        let distance = (s.map_voltage - rebound_target).abs();
        if s.rebound {
            assert!(distance >= REBOUND_EPSILON, "still rebounding at {distance}");
        } else {
            assert!(distance < REBOUND_EPSILON, "cleared early at {distance}");
            cleared_at = Some(i);
            break;
        }
    }
    assert!(cleared_at.is_some(), "rebound never settled");

    // after the rebound, MAP follows throttle again
    e.tick();
    assert!(!e.state().rebound);
}

#[test]
fn test_accelerate_one_tick_scenario() {
    let sensors = SensorVoltages::default();
    let mut e = engine(running_state(800.0, 0.0, 0.0, 0));

    assert!(e.apply(&Intent::Accelerate));
    e.tick();
    let s = e.state();

    assert!((s.throttle_target - 0.09).abs() < 1e-12);
    assert!(s.throttle > 0.0 && s.throttle < 0.09);
    assert!(s.rpm > 800.0 && s.rpm < 1358.0);
    assert!(s.map_voltage > 3.05);

    let frame = TelemetryFrame::sample(&s, &sensors);
    let expected = format!(
        "tps_raw:{},map_raw:{}\n",
        encode(TPS_V_OPEN + (TPS_V_CLOSED - TPS_V_OPEN) * s.throttle),
        encode(s.map_voltage)
    );
    assert_eq!(frame.to_line(), expected);
}

#[test]
fn test_shift_up_scenario() {
    let mut e = engine(running_state(6200.0, 0.8, 0.8, 0));
    assert!(e.apply(&Intent::ShiftUp));
    let s = e.state();

    assert_eq!(s.gear, 1);
    assert!((s.rpm - 6200.0 * 2.2 / 3.8).abs() < 1e-9);
    assert_eq!(s.rpm.round(), 3589.0);
    assert!(s.rebound);
    assert!((s.throttle_target - 0.8 * EngineParams::default().throttle_drop).abs() < 1e-12);
    // realized throttle is left to slew down
    assert_eq!(s.throttle, 0.8);
}

#[test]
fn test_send_mode_does_not_touch_physics() {
    let mut e = engine(running_state(3000.0, 0.4, 0.4, 2));
    let before = e.state();
    assert!(e.apply(&Intent::ForceMode(SendMode::ForceTpsMax)));
    let after = e.state();
    assert_eq!(after.send_mode, SendMode::ForceTpsMax);
    assert_eq!(after.rpm, before.rpm);
    assert_eq!(after.throttle, before.throttle);
    assert_eq!(after.map_voltage, before.map_voltage);
}

#[test]
fn test_raw_command_is_not_an_engine_intent() {
    let mut e = engine(running_state(3000.0, 0.4, 0.4, 2));
    let before = e.state();
    assert!(!e.apply(&Intent::RawCommand("d".to_string())));
    assert!(!e.apply(&Intent::None));
    assert_eq!(e.state(), before);
}
