//! Tests for verification oracles.

use linkage_harness::helpers::linspace;
use linkage_harness::oracle::*;
use linkage_harness::scenarios;
use linkage_solver::{DriveInput, Order};

// ── Closure Oracle Tests ────────────────────────────────────────────────

#[test]
fn loop_closure_passes_for_solved_slider_crank() {
    let s = scenarios::slider_crank(1.0, 3.0, 40).unwrap();
    let t = s.run().unwrap();
    for order in Order::ALL {
        let v = check_loop_closure(&s.mechanism, &t, &s.drive, order, 1e-7);
        assert!(v.passed, "{} should pass: {}", v.oracle_name, v.detail);
        assert!(v.value.unwrap() <= 1e-7);
    }
}

#[test]
fn loop_closure_fails_against_other_mechanism() {
    let s = scenarios::slider_crank(1.0, 3.0, 40).unwrap();
    let t = s.run().unwrap();
    let longer_rod = scenarios::slider_crank(1.0, 3.5, 40).unwrap();
    let v = check_loop_closure(&longer_rod.mechanism, &t, &s.drive, Order::Position, 1e-7);
    assert!(!v.passed, "residual should reveal the wrong rod: {}", v.detail);
    assert!(v.value.unwrap() > 0.1);
}

#[test]
fn converged_oracle_reports_iterations() {
    let s = scenarios::four_bar(30).unwrap();
    let t = s.run().unwrap();
    let v = check_converged(&t, 1e-10);
    assert!(v.passed, "{}", v.detail);
    assert_eq!(v.value, Some(t.total_iterations() as f64));
    assert!(!check_converged(&t, -1.0).passed);
}

// ── Differencing Oracle Tests ───────────────────────────────────────────

#[test]
fn rate_consistency_passes_for_rotating_link() {
    let s = scenarios::rotating_link(0.0, 1.0, 200).unwrap();
    let t = s.run().unwrap();
    let v = check_rate_consistency(&t, Order::Velocity, 1e-3);
    assert!(v.passed, "{}", v.detail);
    let a = check_rate_consistency(&t, Order::Acceleration, 1e-3);
    assert!(a.passed, "{}", a.detail);
}

#[test]
fn rate_consistency_detects_wrong_time_base() {
    // Same angles, but stamped as if they took twice as long.
    let s = scenarios::rotating_link(0.0, 1.0, 100).unwrap();
    let times = linspace(0.0, 4.0 * std::f64::consts::PI, 100);
    let drive = DriveInput::new(
        s.drive.series(Order::Position).to_vec(),
        s.drive.series(Order::Velocity).to_vec(),
        s.drive.series(Order::Acceleration).to_vec(),
    )
    .unwrap()
    .with_times(times)
    .unwrap();
    let s = s.with_drive(drive);
    let t = s.run().unwrap();
    let v = check_rate_consistency(&t, Order::Velocity, 1e-2);
    assert!(!v.passed, "{}", v.detail);
}

#[test]
fn rate_consistency_needs_time_stamps() {
    let s = scenarios::rotating_link(0.0, 1.0, 10).unwrap();
    let untimed = DriveInput::new(
        s.drive.series(Order::Position).to_vec(),
        s.drive.series(Order::Velocity).to_vec(),
        s.drive.series(Order::Acceleration).to_vec(),
    )
    .unwrap();
    let s = s.with_drive(untimed);
    let t = s.run().unwrap();
    assert!(t.times().is_none());
    assert!(!check_rate_consistency(&t, Order::Velocity, 1.0).passed);
    assert!(!check_rate_consistency(&t, Order::Position, 1.0).passed);
    // Without time stamps only the closure checks run.
    assert_eq!(
        run_trajectory_checks(&s.mechanism, &t, &s.drive, Tolerances::default()).len(),
        4
    );
}

// ── Reproducibility Tests ───────────────────────────────────────────────

#[test]
fn determinism_passes_for_repeated_runs() {
    let s = scenarios::whitworth(60).unwrap();
    let first = s.run().unwrap();
    let second = s.run().unwrap();
    let v = check_determinism(&first, &second);
    assert!(v.passed, "{}", v.detail);
}

#[test]
fn determinism_fails_for_different_drives() {
    let fast = scenarios::slider_crank(1.0, 3.0, 20).unwrap();
    let first = fast.run().unwrap();
    let drive = DriveInput::constant_speed(0.1, 1.0, &linspace(0.0, 1.0, 20));
    let slow = scenarios::slider_crank(1.0, 3.0, 20).unwrap().with_drive(drive);
    let second = slow.run().unwrap();
    let v = check_determinism(&first, &second);
    assert!(!v.passed);
    assert!(v.detail.contains("sample 0"), "{}", v.detail);
}
