//! Helper functions: error type, sampling, finite differences of series.

use linkage_solver::{DefinitionError, KinematicsError};
use nalgebra::Vector2;

// ── Error Type ──────────────────────────────────────────────────────────────

/// Unified error type for the test harness.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Kinematics(#[from] KinematicsError),

    #[error("joint not found: {name}")]
    JointNotFound { name: String },

    #[error("sample {sample} out of range ({len} samples)")]
    SampleOutOfRange { sample: usize, len: usize },

    #[error("assertion failed: {detail}")]
    AssertionFailed { detail: String },

    #[error("oracle failure ({oracle}): {detail}")]
    OracleFailure { oracle: String, detail: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ── Sampling ────────────────────────────────────────────────────────────────

/// `n` evenly spaced values from `start` to `end` inclusive.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => (0..n)
            .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

// ── Differencing ────────────────────────────────────────────────────────────

/// Central-difference time derivative at the interior samples of `series`.
///
/// Entry `k` of the result belongs to sample `k + 1`. Empty when fewer than
/// three samples are given.
pub fn central_difference(series: &[Vector2<f64>], times: &[f64]) -> Vec<Vector2<f64>> {
    let n = series.len().min(times.len());
    if n < 3 {
        return Vec::new();
    }
    (1..n - 1)
        .map(|i| (series[i + 1] - series[i - 1]) / (times[i + 1] - times[i - 1]))
        .collect()
}

/// Largest Euclidean norm in `series`, or 0 for an empty series.
pub fn peak_norm(series: &[Vector2<f64>]) -> f64 {
    series.iter().map(|v| v.norm()).fold(0.0, f64::max)
}
