//! Unconstrained least squares.
//!
//! Two consumers:
//! - the NNLS solver, as a fallback when the reduced normal matrix of a passive
//!   set is too ill-conditioned for Cholesky;
//! - the grid fitter, to fit `χ² = a x² + b x + c` through three grid points.
//!
//! nalgebra's `QR::solve` only handles square systems, so we go through SVD
//! and accept progressively looser singular-value cutoffs.

use nalgebra::{DMatrix, DVector};

/// Solve `min ‖X β − y‖₂` using SVD.
///
/// Returns `None` if no tolerance yields a finite solution.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    if x.nrows() == 0 || x.ncols() == 0 || x.nrows() != y.len() {
        return None;
    }
    let svd = x.clone().svd(true, true);

    for &tol in &[1e-12, 1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Quadratic `y = a x² + b x + c` through (or, for more than three points,
/// closest to) the given samples. Returns `[a, b, c]`.
pub fn fit_quadratic(xs: &[f64], ys: &[f64]) -> Option<[f64; 3]> {
    if xs.len() < 3 || xs.len() != ys.len() {
        return None;
    }
    // Centre the abscissae so the Vandermonde matrix stays well conditioned
    // for grids like vdisp = 100..350 km/s.
    let x0 = xs.iter().sum::<f64>() / xs.len() as f64;
    let design = DMatrix::from_fn(xs.len(), 3, |r, c| (xs[r] - x0).powi(2 - c as i32));
    let target = DVector::from_row_slice(ys);
    let beta = solve_least_squares(&design, &target)?;

    // Undo the shift: a(x−x0)² + b(x−x0) + c.
    let (a, b, c) = (beta[0], beta[1], beta[2]);
    Some([a, b - 2.0 * a * x0, a * x0 * x0 - b * x0 + c])
}
