//! Dense linear solves for the small square systems produced by loop
//! equations.

use nalgebra::{DMatrix, DVector, SVD};

use crate::error::SolverError;

/// Ratio of smallest to largest singular value; `0.0` for a zero or
/// non-finite matrix, `1.0` for an empty one.
pub fn reciprocal_condition(matrix: &DMatrix<f64>) -> f64 {
    if matrix.is_empty() {
        return 1.0;
    }
    let svd = SVD::new(matrix.clone(), false, false);
    let sv = &svd.singular_values;
    let max = sv.max();
    let min = sv.min();
    if max > 0.0 && max.is_finite() {
        min / max
    } else {
        0.0
    }
}

/// Solve `a · x = b` for square `a`, refusing systems whose reciprocal
/// condition falls below `singularity_tolerance`.
pub fn solve_square(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    singularity_tolerance: f64,
) -> Result<DVector<f64>, SolverError> {
    if !a.is_square() || a.nrows() != b.len() {
        return Err(SolverError::NotSquare {
            rows: a.nrows(),
            cols: a.ncols(),
        });
    }
    if a.is_empty() {
        return Ok(DVector::zeros(0));
    }

    let rcond = reciprocal_condition(a);
    // Negated so that NaN is treated as singular.
    if !(rcond >= singularity_tolerance) {
        return Err(SolverError::Singular {
            reciprocal_condition: rcond,
        });
    }
    a.clone().lu().solve(b).ok_or(SolverError::Singular {
        reciprocal_condition: rcond,
    })
}

/// Levenberg-Marquardt step: solve `(JᵀJ + λI) · dx = −Jᵀr`.
pub fn damped_step(jacobian: &DMatrix<f64>, residual: &DVector<f64>, lambda: f64) -> Option<DVector<f64>> {
    let jt = jacobian.transpose();
    let mut normal = &jt * jacobian;
    for i in 0..normal.nrows() {
        normal[(i, i)] += lambda;
    }
    let gradient = &jt * residual;
    normal.cholesky().map(|c| c.solve(&-gradient))
}
