//! Assertion helpers with diagnostic output.
//!
//! Every failure names the joint, sample and order involved together with
//! expected and actual values.

use linkage_solver::{Order, Trajectory};
use nalgebra::Vector2;

use crate::helpers::HarnessError;
use crate::oracle::OracleVerdict;

/// Assert a joint's value at one sample and order within `tol`.
pub fn assert_joint_near(
    trajectory: &Trajectory,
    joint: &str,
    order: Order,
    sample: usize,
    expected: Vector2<f64>,
    tol: f64,
) -> Result<(), HarnessError> {
    let track = trajectory
        .joint(joint)
        .ok_or_else(|| HarnessError::JointNotFound {
            name: joint.to_string(),
        })?;
    let series = track.series(order);
    let actual = *series.get(sample).ok_or(HarnessError::SampleOutOfRange {
        sample,
        len: series.len(),
    })?;

    if (actual - expected).norm() <= tol {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!(
                "[{joint} {order} @ {sample}] expected ({:.6}, {:.6}), got ({:.6}, {:.6})",
                expected.x, expected.y, actual.x, actual.y,
            ),
        })
    }
}

/// Assert that every verdict passed, reporting the first failure.
pub fn assert_all_pass(verdicts: &[OracleVerdict]) -> Result<(), HarnessError> {
    match verdicts.iter().find(|v| !v.passed) {
        None => Ok(()),
        Some(v) => Err(HarnessError::OracleFailure {
            oracle: v.oracle_name.clone(),
            detail: v.detail.clone(),
        }),
    }
}
