//! Verification oracles: pure functions returning pass/fail verdicts.
//!
//! Each oracle returns an `OracleVerdict` with diagnostic detail, not panics,
//! so every failure of a trajectory can be collected in one pass.

use linkage_solver::{DriveInput, ElementStates, Mechanism, Order, Trajectory};
use serde::Serialize;

use crate::helpers::{central_difference, peak_norm};

/// The result of a single oracle check.
#[derive(Debug, Clone, Serialize)]
pub struct OracleVerdict {
    pub oracle_name: String,
    pub passed: bool,
    pub detail: String,
    pub value: Option<f64>,
}

impl OracleVerdict {
    fn pass(name: &str, detail: String) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: true,
            detail,
            value: None,
        }
    }

    fn pass_val(name: &str, detail: String, value: f64) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: true,
            detail,
            value: Some(value),
        }
    }

    fn fail(name: &str, detail: String) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: false,
            detail,
            value: None,
        }
    }

    fn fail_val(name: &str, detail: String, value: f64) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: false,
            detail,
            value: Some(value),
        }
    }

    fn judge(name: &str, worst: f64, tolerance: f64, detail: String) -> Self {
        if worst <= tolerance {
            Self::pass_val(name, detail, worst)
        } else {
            Self::fail_val(name, detail, worst)
        }
    }
}

/// Thresholds used by [`run_trajectory_checks`].
#[derive(Debug, Clone, Copy)]
pub struct Tolerances {
    /// Position loop residual norm.
    pub closure: f64,
    /// Velocity and acceleration loop residual norm.
    pub rate_closure: f64,
    /// Differencing error relative to a joint's peak rate.
    pub differencing: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            closure: 1e-10,
            rate_closure: 1e-7,
            differencing: 2e-2,
        }
    }
}

// ── Closure Oracles ─────────────────────────────────────────────────────────

/// Recompute the loop residual at every sample from the stored solution.
pub fn check_loop_closure(
    mechanism: &Mechanism,
    trajectory: &Trajectory,
    drive: &DriveInput,
    order: Order,
    tolerance: f64,
) -> OracleVerdict {
    let name = format!("{order}_closure");
    let mut worst = 0.0_f64;
    let mut worst_sample = 0;

    for (i, solution) in trajectory.solutions().iter().enumerate() {
        let states = trajectory
            .element_states(i)
            .unwrap_or_else(ElementStates::new);
        let drive_value = drive.series(order).get(i).copied().unwrap_or_default();
        match mechanism.residual(order, &states, solution.get(order), drive_value) {
            Ok(r) => {
                let norm = r.norm();
                if norm > worst || norm.is_nan() {
                    worst = norm;
                    worst_sample = i;
                }
            }
            Err(e) => {
                return OracleVerdict::fail(&name, format!("sample {i}: {e}"));
            }
        }
    }

    OracleVerdict::judge(
        &name,
        worst,
        tolerance,
        format!(
            "max residual {:.3e} at sample {} (tolerance {:.1e}, {} samples)",
            worst,
            worst_sample,
            tolerance,
            trajectory.len()
        ),
    )
}

/// Every sample's position solve finished at or below `tolerance`.
pub fn check_converged(trajectory: &Trajectory, tolerance: f64) -> OracleVerdict {
    match trajectory.reports().iter().find(|r| !(r.residual <= tolerance)) {
        None => OracleVerdict::pass_val(
            "converged",
            format!(
                "{} samples, {} Newton iterations",
                trajectory.len(),
                trajectory.total_iterations()
            ),
            trajectory.total_iterations() as f64,
        ),
        Some(r) => OracleVerdict::fail_val(
            "converged",
            format!(
                "sample {} finished with residual {:.3e} after {} iterations",
                r.sample, r.residual, r.iterations
            ),
            r.residual,
        ),
    }
}

// ── Differencing Oracles ────────────────────────────────────────────────────

/// Compare the solved `order` of every visible joint against a central
/// difference of the order below it.
///
/// Needs sample time stamps; `order` must be velocity or acceleration.
pub fn check_rate_consistency(
    trajectory: &Trajectory,
    order: Order,
    tolerance: f64,
) -> OracleVerdict {
    let name = format!("{order}_consistency");
    let lower = match order {
        Order::Position => {
            return OracleVerdict::fail(&name, "position has no lower order".to_string());
        }
        Order::Velocity => Order::Position,
        Order::Acceleration => Order::Velocity,
    };
    let Some(times) = trajectory.times() else {
        return OracleVerdict::fail(&name, "trajectory has no time stamps".to_string());
    };
    if trajectory.len() < 3 {
        return OracleVerdict::pass(&name, "fewer than three samples".to_string());
    }

    let mut worst = 0.0_f64;
    let mut worst_joint = String::new();
    for joint in trajectory.visible_joints() {
        let solved = joint.series(order);
        let differenced = central_difference(joint.series(lower), times);
        let scale = peak_norm(solved).max(1.0);
        for (k, d) in differenced.iter().enumerate() {
            let err = (d - solved[k + 1]).norm() / scale;
            if err > worst {
                worst = err;
                worst_joint = joint.name.clone();
            }
        }
    }

    OracleVerdict::judge(
        &name,
        worst,
        tolerance,
        format!("max relative error {worst:.3e} (joint {worst_joint:?}, tolerance {tolerance:.1e})"),
    )
}

// ── Reproducibility ─────────────────────────────────────────────────────────

/// Two solves of the same input must agree exactly.
pub fn check_determinism(first: &Trajectory, second: &Trajectory) -> OracleVerdict {
    if first == second {
        return OracleVerdict::pass("determinism", format!("{} samples identical", first.len()));
    }
    let diverged = first
        .solutions()
        .iter()
        .zip(second.solutions())
        .position(|(a, b)| a != b);
    match diverged {
        Some(i) => OracleVerdict::fail("determinism", format!("solutions differ at sample {i}")),
        None => OracleVerdict::fail(
            "determinism",
            format!(
                "trajectories differ ({} vs {} samples)",
                first.len(),
                second.len()
            ),
        ),
    }
}

// ── Batch ───────────────────────────────────────────────────────────────────

/// Run every single-trajectory oracle.
///
/// Closure tolerances are in length units and scale with
/// [`Mechanism::length_scale`].
pub fn run_trajectory_checks(
    mechanism: &Mechanism,
    trajectory: &Trajectory,
    drive: &DriveInput,
    tolerances: Tolerances,
) -> Vec<OracleVerdict> {
    let scale = mechanism.length_scale();
    let closure = tolerances.closure * scale;
    let rate_closure = tolerances.rate_closure * scale;
    let mut verdicts = vec![
        check_converged(trajectory, closure),
        check_loop_closure(mechanism, trajectory, drive, Order::Position, closure),
        check_loop_closure(mechanism, trajectory, drive, Order::Velocity, rate_closure),
        check_loop_closure(mechanism, trajectory, drive, Order::Acceleration, rate_closure),
    ];
    if trajectory.times().is_some() {
        verdicts.push(check_rate_consistency(trajectory, Order::Velocity, tolerances.differencing));
        verdicts.push(check_rate_consistency(
            trajectory,
            Order::Acceleration,
            tolerances.differencing,
        ));
    }
    verdicts
}
