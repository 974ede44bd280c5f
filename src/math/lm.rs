//! Levenberg–Marquardt fit of a centred Gaussian on a constant pedestal.
//!
//! Model: `f(x) = amp · exp(−x² / 2σ²) + c`, parameters `[amp, σ, c]`, with
//! per-sample inverse-variance weights. Used to measure emission-line widths
//! from spectra stacked in velocity space.

use nalgebra::{Matrix3, Vector3};

#[derive(Debug, Clone)]
pub struct LmConfig {
    pub max_iterations: usize,
    /// Stop once the largest relative parameter change drops below this.
    pub convergence_threshold: f64,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            convergence_threshold: 1e-8,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GaussianFit {
    pub amplitude: f64,
    pub sigma: f64,
    pub constant: f64,
    pub chi2: f64,
    pub converged: bool,
    pub iterations: usize,
}

fn evaluate(x: f64, p: &Vector3<f64>) -> f64 {
    p[0] * (-0.5 * x * x / (p[1] * p[1])).exp() + p[2]
}

fn jacobian_row(x: f64, p: &Vector3<f64>) -> Vector3<f64> {
    let s2 = p[1] * p[1];
    let g = (-0.5 * x * x / s2).exp();
    Vector3::new(g, p[0] * g * x * x / (s2 * p[1]), 1.0)
}

fn chi2(x: &[f64], y: &[f64], w: &[f64], p: &Vector3<f64>) -> f64 {
    x.iter()
        .zip(y)
        .zip(w)
        .map(|((xi, yi), wi)| wi * (yi - evaluate(*xi, p)).powi(2))
        .sum()
}

/// Fit `[amp, σ, c]` starting from `initial`. Returns `None` when there are
/// fewer samples than parameters or the start is not finite.
pub fn fit_gaussian(
    x: &[f64],
    y: &[f64],
    ivar: &[f64],
    initial: [f64; 3],
    config: &LmConfig,
) -> Option<GaussianFit> {
    if x.len() < 3 || x.len() != y.len() || x.len() != ivar.len() {
        return None;
    }
    if initial.iter().any(|v| !v.is_finite()) || initial[1] == 0.0 {
        return None;
    }

    let mut params = Vector3::from(initial);
    let mut lambda = config.initial_lambda;
    let mut prev_chi2 = chi2(x, y, ivar, &params);
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..config.max_iterations {
        iterations = iter + 1;

        let mut hessian = Matrix3::<f64>::zeros();
        let mut gradient = Vector3::<f64>::zeros();
        for ((xi, yi), wi) in x.iter().zip(y).zip(ivar) {
            let j = jacobian_row(*xi, &params);
            let r = yi - evaluate(*xi, &params);
            hessian += *wi * j * j.transpose();
            gradient += *wi * r * j;
        }

        let mut damped = hessian;
        for i in 0..3 {
            damped[(i, i)] *= 1.0 + lambda;
        }
        let Some(delta) = damped.lu().solve(&gradient) else {
            break;
        };

        let trial = params + delta;
        let trial_chi2 = chi2(x, y, ivar, &trial);
        if trial_chi2.is_finite() && trial_chi2 < prev_chi2 && trial[1] != 0.0 {
            params = trial;
            lambda *= config.lambda_down;
            let rel = delta
                .iter()
                .zip(params.iter())
                .map(|(d, p)| d.abs() / p.abs().max(1e-12))
                .fold(0.0, f64::max);
            let improvement = prev_chi2 - trial_chi2;
            prev_chi2 = trial_chi2;
            if rel < config.convergence_threshold || improvement <= 1e-12 * prev_chi2.max(1e-300) {
                converged = true;
                break;
            }
        } else {
            lambda *= config.lambda_up;
            if lambda > 1e10 {
                // No downhill step left: we are at a minimum to working precision.
                converged = true;
                break;
            }
        }
    }

    Some(GaussianFit {
        amplitude: params[0],
        sigma: params[1].abs(),
        constant: params[2],
        chi2: prev_chi2,
        converged,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_noiseless_profile() {
        let x: Vec<f64> = (-40..=40).map(|i| i as f64 * 25.0).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|v| 3.0 * (-0.5 * v * v / (180.0_f64 * 180.0)).exp() + 0.4)
            .collect();
        let ivar = vec![1.0; x.len()];

        let fit = fit_gaussian(&x, &y, &ivar, [1.0, 250.0, 0.0], &LmConfig::default()).unwrap();
        assert!(fit.converged);
        assert!((fit.amplitude - 3.0).abs() < 1e-4);
        assert!((fit.sigma - 180.0).abs() < 1e-2);
        assert!((fit.constant - 0.4).abs() < 1e-4);
    }

    #[test]
    fn rejects_too_few_points() {
        assert!(fit_gaussian(&[0.0, 1.0], &[1.0, 1.0], &[1.0, 1.0], [1.0, 1.0, 0.0], &LmConfig::default()).is_none());
    }
}
