//! Jacobian providers.
//!
//! Solvers ask a [`JacobianProvider`] for `∂F/∂u` at a point. The default
//! [`FiniteDifference`] provider perturbs one unknown at a time; any other
//! strategy (analytic, automatic differentiation) plugs in behind the same
//! trait.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::SolverError;

/// A residual function over an unknown vector.
pub type ResidualFn<'a> = dyn FnMut(&[f64]) -> Result<DVector<f64>, SolverError> + 'a;

pub trait JacobianProvider {
    /// Jacobian of `f` at `at`, where `base = f(at)` is already known.
    fn jacobian(
        &self,
        f: &mut ResidualFn<'_>,
        at: &[f64],
        base: &DVector<f64>,
    ) -> Result<DMatrix<f64>, SolverError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DifferenceScheme {
    Forward,
    #[default]
    Central,
}

/// Finite-difference Jacobian with a per-unknown step
/// `h = max(relative_step · |u|, min_step)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiniteDifference {
    pub scheme: DifferenceScheme,
    pub relative_step: f64,
    pub min_step: f64,
}

impl Default for FiniteDifference {
    fn default() -> Self {
        Self {
            scheme: DifferenceScheme::Central,
            relative_step: 1e-6,
            min_step: 1e-7,
        }
    }
}

impl FiniteDifference {
    /// Forward differences with a unit step. Exact (up to rounding) for
    /// residuals that are linear in the unknowns, such as the velocity and
    /// acceleration loop equations.
    pub fn unit() -> Self {
        Self {
            scheme: DifferenceScheme::Forward,
            relative_step: 0.0,
            min_step: 1.0,
        }
    }

    /// Step used for an unknown whose current value is `value`.
    pub fn step(&self, value: f64) -> f64 {
        (self.relative_step * value.abs()).max(self.min_step)
    }
}

impl JacobianProvider for FiniteDifference {
    fn jacobian(
        &self,
        f: &mut ResidualFn<'_>,
        at: &[f64],
        base: &DVector<f64>,
    ) -> Result<DMatrix<f64>, SolverError> {
        let mut jac = DMatrix::zeros(base.len(), at.len());
        let mut shifted = at.to_vec();

        for (j, &x) in at.iter().enumerate() {
            let h = self.step(x);
            // Difference over the representable span, not the nominal step.
            let column = match self.scheme {
                DifferenceScheme::Forward => {
                    shifted[j] = x + h;
                    let span = shifted[j] - x;
                    let plus = f(&shifted)?;
                    (plus - base) / span
                }
                DifferenceScheme::Central => {
                    shifted[j] = x + h;
                    let plus = f(&shifted)?;
                    shifted[j] = x - h;
                    let minus = f(&shifted)?;
                    let span = (x + h) - (x - h);
                    (plus - minus) / span
                }
            };
            shifted[j] = x;

            if column.len() != base.len() {
                return Err(SolverError::NotSquare {
                    rows: column.len(),
                    cols: at.len(),
                });
            }
            jac.set_column(j, &column);
        }
        Ok(jac)
    }
}
