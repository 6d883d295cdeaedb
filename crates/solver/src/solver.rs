use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use crate::error::SolverError;
use crate::jacobian::{FiniteDifference, JacobianProvider};
use crate::linalg;

/// Result of a converged position solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverResult {
    pub iterations: usize,
    pub final_residual: f64,
    pub params: Vec<f64>,
}

/// Numeric settings for the position and rate solves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub max_iterations: usize,
    /// Residual 2-norm at or below which the position solve has converged.
    pub tolerance: f64,
    /// Relative step norm below which Newton is considered stalled.
    pub step_tolerance: f64,
    /// Halvings of the Newton step tried once the damped retry has failed.
    pub line_search_steps: usize,
    /// Reciprocal condition below which a Jacobian counts as singular.
    pub singularity_tolerance: f64,
    /// Damping for the fallback step taken when the Newton Jacobian is
    /// singular or a Newton step is rejected.
    pub lambda_initial: f64,
    pub lambda_factor: f64,
    /// Floor the damping relaxes to after accepted steps.
    pub lambda_min: f64,
    /// Damping past which a rejected step gives up as stalled.
    pub lambda_max: f64,
    pub difference: FiniteDifference,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-10,
            step_tolerance: 1e-14,
            line_search_steps: 12,
            singularity_tolerance: 1e-12,
            lambda_initial: 1e-3,
            lambda_factor: 10.0,
            lambda_min: 1e-15,
            lambda_max: 1e12,
            difference: FiniteDifference::default(),
        }
    }
}

impl SolverConfig {
    /// Tighter residual tolerance and a larger iteration budget.
    pub fn strict() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-12,
            ..Self::default()
        }
    }

    /// For poorly scaled mechanisms where a 1e-10 residual is out of reach.
    pub fn relaxed() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-8,
            singularity_tolerance: 1e-14,
            ..Self::default()
        }
    }
}

/// Newton-Raphson solve of `residual(u) = 0` starting from `guess`.
///
/// Each iteration solves `J · Δu = −F(u)` and takes the full step if it
/// lowers the residual norm. A singular `J` or a rejected step falls back to
/// damped (Levenberg-Marquardt) steps with growing λ, then to halving the
/// Newton step. Fails when the iteration cap is hit or nothing lowers the
/// residual once λ passes `lambda_max`.
pub fn solve_position<F>(
    residual: F,
    guess: &[f64],
    config: &SolverConfig,
    jacobian: &dyn JacobianProvider,
) -> Result<SolverResult, SolverError>
where
    F: FnMut(&[f64]) -> Result<DVector<f64>, SolverError>,
{
    solve_position_scaled(residual, guess, config, jacobian, 1.0)
}

/// [`solve_position`] for residuals measured in lengths of order
/// `length_scale`.
///
/// A residual at or below `tolerance` always converges. Once the step norm
/// falls below `step_tolerance`, or no step lowers the residual any more, a
/// residual within `tolerance · max(1, length_scale)` also counts as
/// converged; anything larger is a least-squares minimum and stalls.
#[instrument(skip_all, fields(unknowns = guess.len(), length_scale = length_scale))]
pub fn solve_position_scaled<F>(
    mut residual: F,
    guess: &[f64],
    config: &SolverConfig,
    jacobian: &dyn JacobianProvider,
    length_scale: f64,
) -> Result<SolverResult, SolverError>
where
    F: FnMut(&[f64]) -> Result<DVector<f64>, SolverError>,
{
    let floor = config.tolerance * length_scale.max(1.0);
    let mut params = DVector::from_column_slice(guess);
    let mut r = residual(params.as_slice())?;
    let mut lambda = config.lambda_initial;

    for iteration in 0..config.max_iterations {
        let norm = r.norm();
        if norm <= config.tolerance {
            debug!(iterations = iteration, residual = norm, "position solve converged");
            return Ok(converged(iteration, norm, &params));
        }

        let jac = jacobian.jacobian(&mut residual, params.as_slice(), &r)?;
        let stalled = SolverError::Stalled {
            iterations: iteration,
            residual: norm,
        };
        let step = match linalg::solve_square(&jac, &-&r, config.singularity_tolerance) {
            Ok(step) => {
                lambda = (lambda / config.lambda_factor).max(config.lambda_min);
                step
            }
            Err(SolverError::Singular {
                reciprocal_condition,
            }) => {
                warn!(
                    iteration,
                    reciprocal_condition, lambda, "singular newton jacobian, taking damped step"
                );
                let step = linalg::damped_step(&jac, &r, lambda).ok_or(stalled.clone())?;
                lambda *= config.lambda_factor;
                step
            }
            Err(e) => return Err(e),
        };

        let accepted = if step.norm() <= config.step_tolerance * (1.0 + params.norm()) {
            None
        } else if let Some(found) = line_search(&mut residual, &params, &step, norm, 1.0, 0)? {
            Some(found)
        } else {
            debug!(iteration, residual = norm, lambda, "newton step rejected, retrying damped");
            match damped_search(&mut residual, &params, &jac, &r, &mut lambda, config)? {
                Some(found) => Some(found),
                None if config.line_search_steps > 0 => line_search(
                    &mut residual,
                    &params,
                    &step,
                    norm,
                    0.5,
                    config.line_search_steps - 1,
                )?,
                None => None,
            }
        };

        let Some((next, next_r)) = accepted else {
            if norm <= floor {
                debug!(
                    iterations = iteration,
                    residual = norm,
                    length_scale,
                    "residual at floating-point floor, position solve converged"
                );
                return Ok(converged(iteration, norm, &params));
            }
            return Err(stalled);
        };

        trace!(iteration, residual = next_r.norm(), "newton step");
        params = next;
        r = next_r;
    }

    let final_residual = r.norm();
    if final_residual <= floor {
        Ok(converged(config.max_iterations, final_residual, &params))
    } else {
        Err(SolverError::DidNotConverge {
            max_iterations: config.max_iterations,
            residual: final_residual,
        })
    }
}

fn converged(iterations: usize, final_residual: f64, params: &DVector<f64>) -> SolverResult {
    SolverResult {
        iterations,
        final_residual,
        params: params.as_slice().to_vec(),
    }
}

/// Retry a rejected step as damped steps, multiplying `lambda` by
/// `lambda_factor` until one lowers the residual or `lambda` passes
/// `lambda_max`. An accepted step relaxes `lambda` again.
fn damped_search<F>(
    residual: &mut F,
    params: &DVector<f64>,
    jac: &DMatrix<f64>,
    r: &DVector<f64>,
    lambda: &mut f64,
    config: &SolverConfig,
) -> Result<Option<(DVector<f64>, DVector<f64>)>, SolverError>
where
    F: FnMut(&[f64]) -> Result<DVector<f64>, SolverError>,
{
    let current = r.norm();
    *lambda = lambda.max(config.lambda_min);
    while *lambda <= config.lambda_max {
        if let Some(step) = linalg::damped_step(jac, r, *lambda) {
            let trial = params + &step;
            match residual(trial.as_slice()) {
                Ok(next) if next.norm() < current => {
                    trace!(lambda = *lambda, residual = next.norm(), "damped step accepted");
                    *lambda = (*lambda / config.lambda_factor).max(config.lambda_min);
                    return Ok(Some((trial, next)));
                }
                Ok(_) | Err(SolverError::NonFinite) => {}
                Err(e) => return Err(e),
            }
        }
        let grown = *lambda * config.lambda_factor;
        if !(grown > *lambda) {
            break;
        }
        *lambda = grown;
    }
    Ok(None)
}

/// Try `step · scale`, halving `scale` up to `halvings` times, until the
/// residual norm drops below `current`.
fn line_search<F>(
    residual: &mut F,
    params: &DVector<f64>,
    step: &DVector<f64>,
    current: f64,
    mut scale: f64,
    halvings: usize,
) -> Result<Option<(DVector<f64>, DVector<f64>)>, SolverError>
where
    F: FnMut(&[f64]) -> Result<DVector<f64>, SolverError>,
{
    for _ in 0..=halvings {
        let trial = params + step * scale;
        match residual(trial.as_slice()) {
            Ok(r) if r.norm() < current => return Ok(Some((trial, r))),
            Ok(_) | Err(SolverError::NonFinite) => scale *= 0.5,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// The linear system `J · v = b` of one rate order (velocity or
/// acceleration) at a solved position.
///
/// The rate loop equations are exactly linear in their unknowns, so
/// `b = −F(0)` and `J` is the Jacobian of `F` at any point.
#[derive(Debug, Clone, PartialEq)]
pub struct RateSystem {
    pub jacobian: DMatrix<f64>,
    pub rhs: DVector<f64>,
}

impl RateSystem {
    pub fn assemble<F>(
        mut residual: F,
        unknowns: usize,
        jacobian: &dyn JacobianProvider,
    ) -> Result<Self, SolverError>
    where
        F: FnMut(&[f64]) -> Result<DVector<f64>, SolverError>,
    {
        let zero = vec![0.0; unknowns];
        let base = residual(&zero)?;
        let jacobian = jacobian.jacobian(&mut residual, &zero, &base)?;
        Ok(Self {
            jacobian,
            rhs: -base,
        })
    }

    pub fn solve(&self, config: &SolverConfig) -> Result<Vec<f64>, SolverError> {
        linalg::solve_square(&self.jacobian, &self.rhs, config.singularity_tolerance)
            .map(|x| x.as_slice().to_vec())
    }

    pub fn reciprocal_condition(&self) -> f64 {
        linalg::reciprocal_condition(&self.jacobian)
    }
}

/// Solve one rate order directly: assemble `J · v = b` and solve it.
pub fn solve_rates<F>(
    residual: F,
    unknowns: usize,
    config: &SolverConfig,
    jacobian: &dyn JacobianProvider,
) -> Result<Vec<f64>, SolverError>
where
    F: FnMut(&[f64]) -> Result<DVector<f64>, SolverError>,
{
    RateSystem::assemble(residual, unknowns, jacobian)?.solve(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn circle_line(x: &[f64]) -> Result<DVector<f64>, SolverError> {
        Ok(DVector::from_vec(vec![
            x[0] * x[0] + x[1] * x[1] - 25.0,
            x[1] - x[0] + 1.0,
        ]))
    }

    #[test]
    fn test_solve_circle_line_intersection() {
        let config = SolverConfig::default();
        let result =
            solve_position(circle_line, &[5.0, 5.0], &config, &config.difference).unwrap();
        assert!(result.final_residual <= config.tolerance);
        let (x, y) = (result.params[0], result.params[1]);
        assert_relative_eq!(x, 4.0, epsilon = 1e-9);
        assert_relative_eq!(y, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_solve_already_satisfied() {
        let config = SolverConfig::default();
        let result =
            solve_position(circle_line, &[4.0, 3.0], &config, &config.difference).unwrap();
        assert_eq!(result.iterations, 0);
        assert_eq!(result.params, vec![4.0, 3.0]);
    }

    #[test]
    fn test_closer_guess_needs_fewer_iterations() {
        let config = SolverConfig::default();
        let near =
            solve_position(circle_line, &[4.01, 3.01], &config, &config.difference).unwrap();
        let far =
            solve_position(circle_line, &[10.0, -2.0], &config, &config.difference).unwrap();
        assert!(
            near.iterations < far.iterations,
            "near {} vs far {}",
            near.iterations,
            far.iterations
        );
    }

    #[test]
    fn test_no_real_root_fails() {
        let config = SolverConfig::default();
        let no_root = |x: &[f64]| -> Result<DVector<f64>, SolverError> {
            Ok(DVector::from_vec(vec![x[0] * x[0] + 1.0]))
        };
        let err = solve_position(no_root, &[1.0], &config, &config.difference).unwrap_err();
        assert!(
            matches!(
                err,
                SolverError::Stalled { .. } | SolverError::DidNotConverge { .. }
            ),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_quarter_turn_gap_converges() {
        // A unit vector warm-started a quarter turn away: the first Newton
        // step lands near r = 0 and the next one overshoots.
        let quarter_turn = |x: &[f64]| -> Result<DVector<f64>, SolverError> {
            let (s, c) = FRAC_PI_2.sin_cos();
            Ok(DVector::from_vec(vec![c - x[0] * x[1].cos(), s - x[0] * x[1].sin()]))
        };
        let config = SolverConfig::default();
        let result =
            solve_position(quarter_turn, &[1.0, 0.0], &config, &config.difference).unwrap();
        assert!(result.final_residual <= config.tolerance);
        let (r, theta) = (result.params[0], result.params[1]);
        assert_relative_eq!(r * theta.cos(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(r * theta.sin(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_damped_retry_is_bounded_by_lambda_max() {
        let config = SolverConfig {
            lambda_max: 1.0,
            ..SolverConfig::default()
        };
        let no_root = |x: &[f64]| -> Result<DVector<f64>, SolverError> {
            Ok(DVector::from_vec(vec![x[0] * x[0] + 1.0]))
        };
        let err = solve_position(no_root, &[1.0], &config, &config.difference).unwrap_err();
        assert!(
            matches!(
                err,
                SolverError::Stalled { .. } | SolverError::DidNotConverge { .. }
            ),
            "unexpected error: {err:?}"
        );
    }

    /// `|x − 2|` clamped below at `floor`, as if rounding kept the residual
    /// from ever reaching zero.
    fn clamped(floor: f64) -> impl Fn(&[f64]) -> Result<DVector<f64>, SolverError> {
        move |x: &[f64]| Ok(DVector::from_vec(vec![(x[0] - 2.0).abs().max(floor)]))
    }

    #[test]
    fn test_small_step_converges_within_scaled_tolerance() {
        let config = SolverConfig::default();
        let err =
            solve_position(clamped(5e-10), &[3.0], &config, &config.difference).unwrap_err();
        assert!(matches!(err, SolverError::Stalled { .. }), "{err:?}");

        let result =
            solve_position_scaled(clamped(5e-10), &[3.0], &config, &config.difference, 10.0)
                .unwrap();
        assert_relative_eq!(result.params[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(result.final_residual, 5e-10);
    }

    #[test]
    fn test_scaled_tolerance_still_stalls_at_a_real_minimum() {
        let config = SolverConfig::default();
        let err = solve_position_scaled(clamped(1e-3), &[3.0], &config, &config.difference, 1e3)
            .unwrap_err();
        assert!(
            matches!(err, SolverError::Stalled { residual, .. } if residual >= 1e-3),
            "{err:?}"
        );
    }

    #[test]
    fn test_iteration_cap() {
        let config = SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        };
        let err = solve_position(circle_line, &[10.0, -2.0], &config, &config.difference)
            .unwrap_err();
        assert!(matches!(
            err,
            SolverError::DidNotConverge {
                max_iterations: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_non_finite_guess_reported() {
        let config = SolverConfig::default();
        let blows_up = |x: &[f64]| -> Result<DVector<f64>, SolverError> {
            if x[0].is_finite() {
                Ok(DVector::from_vec(vec![x[0]]))
            } else {
                Err(SolverError::NonFinite)
            }
        };
        let err = solve_position(blows_up, &[f64::NAN], &config, &config.difference).unwrap_err();
        assert_eq!(err, SolverError::NonFinite);
    }

    #[test]
    fn test_rate_system_round_trip() {
        let affine = |v: &[f64]| -> Result<DVector<f64>, SolverError> {
            Ok(DVector::from_vec(vec![
                2.0 * v[0] - v[1] + 0.5,
                v[0] + 3.0 * v[1] - 4.0,
            ]))
        };
        let config = SolverConfig::default();
        let system = RateSystem::assemble(affine, 2, &FiniteDifference::unit()).unwrap();
        assert_eq!(system.rhs, DVector::from_vec(vec![-0.5, 4.0]));

        let v = system.solve(&config).unwrap();
        let jv = &system.jacobian * DVector::from_column_slice(&v);
        assert_relative_eq!(jv, system.rhs, epsilon = 1e-12);
        assert!(affine(&v).unwrap().norm() < 1e-12);
        assert!(system.reciprocal_condition() > 0.1);
    }

    #[test]
    fn test_singular_rate_system() {
        let degenerate = |v: &[f64]| -> Result<DVector<f64>, SolverError> {
            Ok(DVector::from_vec(vec![v[0] + v[1] - 1.0, 2.0 * v[0] + 2.0 * v[1]]))
        };
        let err = solve_rates(degenerate, 2, &SolverConfig::default(), &FiniteDifference::unit())
            .unwrap_err();
        assert!(matches!(err, SolverError::Singular { .. }));
    }

    #[test]
    fn test_presets() {
        let config = SolverConfig::default();
        assert_eq!(config.lambda_min, 1e-15);
        assert!(config.lambda_max > config.lambda_initial);
        assert!(SolverConfig::strict().tolerance < SolverConfig::default().tolerance);
        assert!(SolverConfig::relaxed().max_iterations > SolverConfig::default().max_iterations);
        let json = serde_json::to_string(&SolverConfig::default()).unwrap();
        let back: SolverConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SolverConfig::default());
    }
}
