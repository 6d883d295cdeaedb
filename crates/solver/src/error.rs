use thiserror::Error;

use crate::vector::Order;

/// A malformed mechanism or malformed solve inputs, detected before solving.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    #[error("no origin joint was designated")]
    MissingOrigin,

    #[error("joint name `{0}` is declared more than once")]
    DuplicateJoint(String),

    #[error("vector name `{0}` is declared more than once")]
    DuplicateVector(String),

    #[error("vector `{vector}` references a joint that is not part of this mechanism")]
    UnknownJoint { vector: String },

    #[error("vector `{vector}` starts and ends at the same joint")]
    DegenerateVector { vector: String },

    #[error("vector `{vector}` has non-positive fixed magnitude {value}")]
    NonPositiveMagnitude { vector: String, value: f64 },

    #[error("vector `{vector}` has a non-finite fixed parameter")]
    NonFiniteParameter { vector: String },

    #[error("ground vector `{vector}` must have a fixed angle")]
    GroundWithoutAngle { vector: String },

    #[error("joint `{joint}` cannot be reached from the origin through joint-deriving vectors")]
    UnreachableJoint { joint: String },

    #[error("drive input has no samples")]
    EmptyDrive,

    #[error("drive {order} series has {got} samples, expected {expected}")]
    DriveLengthMismatch {
        order: Order,
        expected: usize,
        got: usize,
    },

    #[error("{order} guess has {got} unknowns, expected {expected}")]
    GuessLengthMismatch {
        order: Order,
        expected: usize,
        got: usize,
    },

    #[error("loop equations produce {residuals} residuals for {unknowns} unknowns")]
    ResidualCountMismatch { residuals: usize, unknowns: usize },

    #[error("vector `{vector}` was evaluated with {got} overrides, expected {expected}")]
    OverrideArity {
        vector: String,
        expected: usize,
        got: usize,
    },

    #[error("loop equations evaluated a vector that is not part of this mechanism")]
    UnknownVector,

    #[error("vector `{vector}` has free parameters but is never evaluated by the loop equations")]
    UnresolvedVector { vector: String },
}

/// Errors raised by the numeric routines for a single solve.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("Solver did not converge after {max_iterations} iterations (residual: {residual})")]
    DidNotConverge { max_iterations: usize, residual: f64 },

    #[error("Solver stalled after {iterations} iterations (residual: {residual})")]
    Stalled { iterations: usize, residual: f64 },

    #[error("Jacobian is singular (reciprocal condition: {reciprocal_condition:e})")]
    Singular { reciprocal_condition: f64 },

    #[error("Jacobian is {rows}x{cols}, expected a square system")]
    NotSquare { rows: usize, cols: usize },

    #[error("loop equations produced a non-finite residual")]
    NonFinite,

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

/// Errors surfaced to callers of the mechanism engine.
///
/// Runtime failures carry the sample index and the kinematic order (stage)
/// at which solving stopped. None of them are recoverable within a
/// trajectory: a sample that cannot be solved invalidates every later warm
/// start.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KinematicsError {
    #[error("invalid mechanism definition: {0}")]
    Definition(#[from] DefinitionError),

    #[error(
        "position solve did not converge at sample {sample} after {iterations} iterations (residual norm: {residual})"
    )]
    Convergence {
        sample: usize,
        iterations: usize,
        residual: f64,
    },

    #[error(
        "singular {order} jacobian at sample {sample} (reciprocal condition: {reciprocal_condition:e})"
    )]
    SingularJacobian {
        sample: usize,
        order: Order,
        reciprocal_condition: f64,
    },

    #[error("loop equations produced a non-finite {order} residual at sample {sample}")]
    NonFinite { sample: usize, order: Order },
}

impl KinematicsError {
    /// Attach the sample index and stage to a numeric failure.
    pub fn at(sample: usize, order: Order, err: SolverError) -> Self {
        match err {
            SolverError::DidNotConverge {
                max_iterations,
                residual,
            } => Self::Convergence {
                sample,
                iterations: max_iterations,
                residual,
            },
            SolverError::Stalled {
                iterations,
                residual,
            } => Self::Convergence {
                sample,
                iterations,
                residual,
            },
            SolverError::Singular {
                reciprocal_condition,
            } => Self::SingularJacobian {
                sample,
                order,
                reciprocal_condition,
            },
            SolverError::NotSquare { rows, cols } => {
                Self::Definition(DefinitionError::ResidualCountMismatch {
                    residuals: rows,
                    unknowns: cols,
                })
            }
            SolverError::NonFinite => Self::NonFinite { sample, order },
            SolverError::Definition(e) => Self::Definition(e),
        }
    }

    /// The sample at which solving failed, if the failure happened while solving.
    pub fn sample(&self) -> Option<usize> {
        match self {
            Self::Definition(_) => None,
            Self::Convergence { sample, .. }
            | Self::SingularJacobian { sample, .. }
            | Self::NonFinite { sample, .. } => Some(*sample),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stalled_and_cap_both_surface_as_convergence() {
        let stalled = KinematicsError::at(
            4,
            Order::Position,
            SolverError::Stalled {
                iterations: 7,
                residual: 0.5,
            },
        );
        assert!(matches!(
            stalled,
            KinematicsError::Convergence {
                sample: 4,
                iterations: 7,
                ..
            }
        ));

        let capped = KinematicsError::at(
            2,
            Order::Position,
            SolverError::DidNotConverge {
                max_iterations: 50,
                residual: 1.0,
            },
        );
        assert_eq!(capped.sample(), Some(2));
    }

    #[test]
    fn test_singular_keeps_stage() {
        let err = KinematicsError::at(
            9,
            Order::Acceleration,
            SolverError::Singular {
                reciprocal_condition: 1e-17,
            },
        );
        assert!(matches!(
            err,
            KinematicsError::SingularJacobian {
                sample: 9,
                order: Order::Acceleration,
                ..
            }
        ));
        assert!(err.to_string().contains("acceleration"));
    }

    #[test]
    fn test_definition_errors_have_no_sample() {
        let err: KinematicsError = DefinitionError::MissingOrigin.into();
        assert_eq!(err.sample(), None);
    }
}
