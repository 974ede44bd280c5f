//! Non-negative least squares.
//!
//! Active-set solver of the Lawson–Hanson family, run on the normal equations
//! (`AᵀA`, `Aᵀb`) so the cost per iteration depends on the number of templates
//! rather than the number of pixels:
//!
//! ```text
//! minimize ‖A x − b‖₂  subject to  x ≥ 0
//! ```
//!
//! - The passive set P holds the coordinates allowed to be non-zero.
//! - Each outer iteration moves the active coordinate with the largest gradient
//!   `w = Aᵀb − AᵀA x` into P (first index wins ties).
//! - The reduced system `AᵀA[P,P] s = Aᵀb[P]` is solved with a Cholesky
//!   factorisation, falling back to SVD least squares when the subset is
//!   singular.
//! - If any `s_i` drops to the tolerance or below, the solver blends from the
//!   previous feasible `x` towards `s` until the first coordinate hits zero and
//!   moves the zeroed coordinates back to the active set.
//!
//! Hitting the iteration cap is not an error: the caller gets the current
//! feasible iterate with `converged = false`.

use nalgebra::{DMatrix, DVector};

use crate::math::ols::solve_least_squares;

/// Tunables of the active-set iteration.
#[derive(Debug, Clone, Copy)]
pub struct NnlsOptions {
    /// Gradient-termination and zero-crossing tolerance.
    pub tolerance: f64,
    /// Iteration cap as a multiple of the number of unknowns.
    pub max_iter_factor: usize,
}

impl Default for NnlsOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-7,
            max_iter_factor: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NnlsSolution {
    pub x: DVector<f64>,
    /// Residual norm `‖A x − b‖₂`.
    pub rnorm: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Solve `min ‖A x − b‖₂, x ≥ 0` for a dense design matrix.
pub fn nnls(a: &DMatrix<f64>, b: &DVector<f64>, opts: &NnlsOptions) -> NnlsSolution {
    let ata = a.tr_mul(a);
    let atb = a.tr_mul(b);
    let mut sol = nnls_normal(&ata, &atb, b.norm_squared(), opts);
    // Recompute the residual directly; the normal-equation form loses digits
    // when ‖b‖ dominates.
    sol.rnorm = (a * &sol.x - b).norm();
    sol
}

/// Solve the NNLS problem given the precomputed normal equations.
///
/// `btb` is `‖b‖²`, used only to report the residual norm.
pub fn nnls_normal(
    ata: &DMatrix<f64>,
    atb: &DVector<f64>,
    btb: f64,
    opts: &NnlsOptions,
) -> NnlsSolution {
    let n = atb.len();
    let tol = opts.tolerance;
    let max_iter = opts.max_iter_factor * n;

    let mut x = DVector::<f64>::zeros(n);
    let mut passive = vec![false; n];
    let mut iterations = 0usize;
    let mut converged = true;

    let mut w = atb - ata * &x;

    'outer: loop {
        let Some(entering) = best_active(&w, &passive, tol) else {
            break;
        };
        if iterations >= max_iter {
            converged = false;
            break;
        }
        iterations += 1;
        passive[entering] = true;

        let Some(mut s) = solve_passive(ata, atb, &passive) else {
            // Singular beyond the SVD fallback; keep the last feasible iterate.
            passive[entering] = false;
            converged = false;
            break;
        };

        while passive_min(&s, &passive) <= tol {
            if iterations >= max_iter {
                converged = false;
                break 'outer;
            }
            iterations += 1;

            let mut alpha = f64::INFINITY;
            for i in 0..n {
                if passive[i] && s[i] <= tol {
                    let denom = x[i] - s[i];
                    let step = if denom > 0.0 { x[i] / denom } else { 0.0 };
                    alpha = alpha.min(step);
                }
            }
            if !alpha.is_finite() {
                alpha = 0.0;
            }

            for i in 0..n {
                x[i] += alpha * (s[i] - x[i]);
                if passive[i] && x[i] <= tol {
                    passive[i] = false;
                    x[i] = 0.0;
                }
            }

            if !passive.iter().any(|&p| p) {
                s = DVector::zeros(n);
                break;
            }
            match solve_passive(ata, atb, &passive) {
                Some(next) => s = next,
                None => {
                    converged = false;
                    break 'outer;
                }
            }
        }

        x = s;
        w = atb - ata * &x;
    }

    // Clamp round-off below zero; the iterate is feasible by construction.
    x.iter_mut().for_each(|v| *v = v.max(0.0));

    let quad = x.dot(&(ata * &x));
    let rnorm = (btb - 2.0 * x.dot(atb) + quad).max(0.0).sqrt();

    NnlsSolution {
        x,
        rnorm,
        iterations,
        converged,
    }
}

fn best_active(w: &DVector<f64>, passive: &[bool], tol: f64) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &wi) in w.iter().enumerate() {
        if passive[i] || wi <= tol {
            continue;
        }
        match best {
            Some(j) if w[j] >= wi => {}
            _ => best = Some(i),
        }
    }
    best
}

fn passive_min(s: &DVector<f64>, passive: &[bool]) -> f64 {
    s.iter()
        .zip(passive)
        .filter(|(_, p)| **p)
        .map(|(v, _)| *v)
        .fold(f64::INFINITY, f64::min)
}

/// Solve the reduced normal equations on the passive set and scatter the
/// result back into a full-length vector (zeros on the active set).
fn solve_passive(
    ata: &DMatrix<f64>,
    atb: &DVector<f64>,
    passive: &[bool],
) -> Option<DVector<f64>> {
    let idx: Vec<usize> = passive
        .iter()
        .enumerate()
        .filter_map(|(i, &p)| p.then_some(i))
        .collect();
    let k = idx.len();
    let sub = DMatrix::from_fn(k, k, |r, c| ata[(idx[r], idx[c])]);
    let rhs = DVector::from_fn(k, |r, _| atb[idx[r]]);

    let reduced = match sub.clone().cholesky() {
        Some(chol) => {
            let s = chol.solve(&rhs);
            if s.iter().all(|v| v.is_finite()) {
                s
            } else {
                solve_least_squares(&sub, &rhs)?
            }
        }
        None => solve_least_squares(&sub, &rhs)?,
    };

    let mut full = DVector::zeros(atb.len());
    for (r, &i) in idx.iter().enumerate() {
        full[i] = reduced[r];
    }
    Some(full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_orthogonal_combination() {
        // v1 and v2 have disjoint support.
        let a = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 2.0, 0.0, 0.0, 1.0, 0.0, 3.0]);
        let b = DVector::from_row_slice(&[2.0, 4.0, 3.0, 9.0]);

        let sol = nnls(&a, &b, &NnlsOptions::default());
        assert!(sol.converged);
        assert!((sol.x[0] - 2.0).abs() < 1e-6);
        assert!((sol.x[1] - 3.0).abs() < 1e-6);
        assert!(sol.rnorm < 1e-9);
    }

    #[test]
    fn matches_ols_when_unconstrained_optimum_is_positive() {
        let a = DMatrix::from_row_slice(
            5,
            3,
            &[
                1.0, 0.2, 0.1, //
                0.9, 0.5, 0.3, //
                0.7, 0.8, 0.2, //
                0.4, 1.0, 0.6, //
                0.2, 0.6, 1.0,
            ],
        );
        let truth = DVector::from_row_slice(&[1.5, 0.7, 2.2]);
        let mut b = &a * &truth;
        b[0] += 0.01;
        b[3] -= 0.02;

        let ols = solve_least_squares(&a, &b).unwrap();
        assert!(ols.iter().all(|v| *v > 0.0));

        let sol = nnls(&a, &b, &NnlsOptions::default());
        for i in 0..3 {
            assert!((sol.x[i] - ols[i]).abs() < 1e-6, "coef {i}: {} vs {}", sol.x[i], ols[i]);
        }
    }

    #[test]
    fn clamps_negative_directions_to_zero() {
        // The unconstrained fit wants a negative weight on the second column.
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 1.0, 0.0, 1.0, -1.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0, 3.0]);

        let sol = nnls(&a, &b, &NnlsOptions::default());
        assert!(sol.x.iter().all(|v| *v >= 0.0));
        assert_eq!(sol.x[1], 0.0);
        assert!((sol.x[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn all_negative_target_gives_zero_solution() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.5, 0.5, 1.0, 0.2, 0.2]);
        let b = DVector::from_row_slice(&[-1.0, -2.0, -0.5]);

        let sol = nnls(&a, &b, &NnlsOptions::default());
        assert!(sol.converged);
        assert_eq!(sol.iterations, 0);
        assert!(sol.x.iter().all(|v| *v == 0.0));
        assert!((sol.rnorm - b.norm()).abs() < 1e-12);
    }

    #[test]
    fn survives_duplicate_columns() {
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 1.0, 0.0, 2.0, 2.0, 1.0, 0.0, 0.0, 1.0]);
        let b = DVector::from_row_slice(&[1.0, 3.0, 1.0]);

        let sol = nnls(&a, &b, &NnlsOptions::default());
        assert!(sol.x.iter().all(|v| v.is_finite() && *v >= 0.0));
        let fitted = &a * &sol.x;
        assert!((fitted - &b).norm() < 1e-6);
    }

    #[test]
    fn iteration_cap_reports_non_convergence() {
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0, 3.0]);

        let exact = nnls(&a, &b, &NnlsOptions { tolerance: 1e-7, max_iter_factor: 1 });
        assert!(exact.converged);
        assert_eq!(exact.iterations, 3);
        assert!((exact.x[2] - 3.0).abs() < 1e-9);

        let starved = nnls(&a, &b, &NnlsOptions { tolerance: 1e-7, max_iter_factor: 0 });
        assert!(!starved.converged);
        assert!(starved.x.iter().all(|v| *v == 0.0));
    }
}
