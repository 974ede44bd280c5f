//! Chi-square grid scan over one nuisance parameter.
//!
//! For each parameter value `p_k` with model slice `M_k`:
//!
//! 1. weight rows by `√ivar`
//! 2. solve the non-negative least-squares problem for the template
//!    coefficients
//! 3. reduced chi-square `Σ ivar (f − M_k c)² / N`, `N = #(ivar > 0)`
//!
//! Values are evaluated in parallel and collected by index, so the grid comes
//! back in parameter order regardless of scheduling. The minimum is then
//! refined single-threaded with a three-point parabola.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::domain::{FitStatus, ModelCube, ParamFit, ParamKind};
use crate::error::AppError;
use crate::math::{NnlsOptions, fit_quadratic, nnls};

/// Coefficients and goodness of fit for one model matrix.
#[derive(Debug, Clone)]
pub struct CoefficientSolve {
    pub coeff: Vec<f64>,
    pub chi2: f64,
    pub converged: bool,
}

#[derive(Debug, Clone)]
pub struct ChiSquareGrid {
    pub kind: ParamKind,
    pub values: Vec<f64>,
    pub chi2: Vec<f64>,
    pub coeffs: Vec<Vec<f64>>,
    /// Parameter values at which NNLS hit its iteration cap.
    pub unconverged: Vec<f64>,
}

/// Solve the non-negative coefficients of `models` (`npix × ntemplate`)
/// against `flux` with inverse variance `ivar`.
pub fn solve_coefficients(
    models: &DMatrix<f64>,
    flux: &[f64],
    ivar: &[f64],
    opts: &NnlsOptions,
) -> Result<CoefficientSolve, AppError> {
    let npix = models.nrows();
    if flux.len() != npix || ivar.len() != npix {
        return Err(AppError::invalid(format!(
            "models have {npix} pixels but flux/ivar have {}/{}",
            flux.len(),
            ivar.len()
        )));
    }
    if ivar.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(AppError::invalid("inverse variance must be finite and non-negative"));
    }
    let nvalid = ivar.iter().filter(|v| **v > 0.0).count();
    if nvalid == 0 {
        return Err(AppError::insufficient("every pixel has zero inverse variance"));
    }

    let weights: Vec<f64> = ivar.iter().map(|v| v.sqrt()).collect();
    let design = DMatrix::from_fn(npix, models.ncols(), |r, c| models[(r, c)] * weights[r]);
    let target = DVector::from_iterator(npix, flux.iter().zip(&weights).map(|(f, w)| f * w));
    let sol = nnls(&design, &target, opts);

    let model = models * &sol.x;
    let chi2 = (0..npix)
        .map(|i| ivar[i] * (flux[i] - model[i]).powi(2))
        .sum::<f64>()
        / nvalid as f64;

    Ok(CoefficientSolve {
        coeff: sol.x.iter().copied().collect(),
        chi2,
        converged: sol.converged,
    })
}

/// Evaluate every slice of `cube` against the data.
pub fn scan_grid(
    cube: &ModelCube,
    flux: &[f64],
    ivar: &[f64],
    opts: &NnlsOptions,
) -> Result<ChiSquareGrid, AppError> {
    let solves = cube
        .slices()
        .par_iter()
        .map(|slice| solve_coefficients(slice, flux, ivar, opts))
        .collect::<Result<Vec<_>, _>>()?;

    let values = cube.values().to_vec();
    let unconverged = values
        .iter()
        .zip(&solves)
        .filter_map(|(v, s)| (!s.converged).then_some(*v))
        .collect();
    let (chi2, coeffs) = solves.into_iter().map(|s| (s.chi2, s.coeff)).unzip();

    Ok(ChiSquareGrid {
        kind: cube.kind(),
        values,
        chi2,
        coeffs,
        unconverged,
    })
}

impl ChiSquareGrid {
    pub fn refine(&self, nominal: f64) -> ParamFit {
        refine_minimum(self.kind, &self.values, &self.chi2, nominal)
    }

    /// Comma-separated list of the values NNLS did not converge at.
    pub fn unconverged_list(&self) -> String {
        self.unconverged
            .iter()
            .map(|v| format!("{v:.2}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Parabolic refinement of a chi-square grid.
///
/// Takes the first grid minimum, fits `χ² = a x² + b x + c` exactly through
/// the three points centred on it (or the three nearest the boundary when the
/// minimum sits on an edge) and accepts the vertex only when `a > 0` and it
/// lies strictly inside the window. The inverse variance is then `a`, i.e.
/// `σ = 1/√a` for a Δχ² = 1 interval, and the interpolated minimum is clamped
/// at zero. Otherwise the nominal value is returned with zero inverse
/// variance and the chi-square of the nominal grid point.
pub fn refine_minimum(kind: ParamKind, values: &[f64], chi2: &[f64], nominal: f64) -> ParamFit {
    let n = values.len().min(chi2.len());
    let fallback = |status: FitStatus| ParamFit {
        kind,
        value: nominal,
        ivar: 0.0,
        chi2_min: values
            .iter()
            .position(|v| *v == nominal)
            .and_then(|i| chi2.get(i).copied())
            .unwrap_or(f64::NAN),
        status,
    };

    let Some(imin) = first_minimum(&chi2[..n]) else {
        return fallback(FitStatus::Degenerate);
    };
    if n < 3 {
        return fallback(FitStatus::Degenerate);
    }
    let at_edge = imin == 0 || imin == n - 1;
    let failed = if at_edge { FitStatus::EdgeMinimum } else { FitStatus::Degenerate };

    let lo = imin.saturating_sub(1).min(n - 3);
    let xs = &values[lo..lo + 3];
    let ys = &chi2[lo..lo + 3];
    if ys.iter().any(|y| !y.is_finite()) {
        return fallback(failed);
    }
    let Some([a, b, c]) = fit_quadratic(xs, ys) else {
        return fallback(failed);
    };
    if !(a > 0.0) {
        return fallback(failed);
    }
    let x0 = -b / (2.0 * a);
    let y0 = c - b * b / (4.0 * a);
    if !(x0 > xs[0] && x0 < xs[2]) {
        return fallback(failed);
    }

    ParamFit {
        kind,
        value: x0,
        ivar: a,
        chi2_min: y0.max(0.0),
        status: FitStatus::Refined,
    }
}

/// Index of the first smallest finite value.
fn first_minimum(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, v) in values.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some(b) if values[b] <= *v => {}
            _ => best = Some(i),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn av_values() -> Vec<f64> {
        (0..16).map(|i| i as f64 * 0.1).collect()
    }

    #[test]
    fn parabola_minimum_is_recovered() {
        let values = av_values();
        let chi2: Vec<f64> = values.iter().map(|x| 2.0 * (x - 0.37).powi(2) + 1.3).collect();
        let fit = refine_minimum(ParamKind::Av, &values, &chi2, 0.0);
        assert_eq!(fit.status, FitStatus::Refined);
        assert!((fit.value - 0.37).abs() < 1e-9);
        assert!((fit.ivar - 2.0).abs() < 1e-9);
        assert!((fit.chi2_min - 1.3).abs() < 1e-9);
        assert!((fit.sigma().unwrap() - 1.0 / 2f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn monotone_grid_falls_back_to_nominal() {
        let values = av_values();
        let chi2: Vec<f64> = values.iter().map(|x| 1.0 + x).collect();
        let fit = refine_minimum(ParamKind::Av, &values, &chi2, 0.0);
        assert_eq!(fit.value, 0.0);
        assert_eq!(fit.ivar, 0.0);
        assert_eq!(fit.status, FitStatus::EdgeMinimum);
        assert_eq!(fit.chi2_min, 1.0);
    }

    #[test]
    fn minimum_near_lower_edge_can_still_refine() {
        let values = av_values();
        let chi2: Vec<f64> = values.iter().map(|x| 5.0 * (x - 0.03).powi(2) + 0.9).collect();
        let fit = refine_minimum(ParamKind::Av, &values, &chi2, 0.0);
        assert_eq!(fit.status, FitStatus::Refined);
        assert!((fit.value - 0.03).abs() < 1e-9);
    }

    #[test]
    fn ties_resolve_to_first_minimum() {
        assert_eq!(first_minimum(&[3.0, 1.0, 2.0, 1.0]), Some(1));
        assert_eq!(first_minimum(&[f64::NAN, 2.0]), Some(1));
        assert_eq!(first_minimum(&[f64::NAN]), None);
    }

    #[test]
    fn flat_grid_is_degenerate() {
        let values = vec![100.0, 150.0, 200.0, 250.0];
        let fit = refine_minimum(ParamKind::Vdisp, &values, &[2.0; 4], 150.0);
        assert_eq!(fit.value, 150.0);
        assert_eq!(fit.ivar, 0.0);
        assert_eq!(fit.chi2_min, 2.0);
    }

    #[test]
    fn scan_finds_the_generating_slice() {
        // Three candidate slices; data built from the middle one.
        let x: Vec<f64> = (0..40).map(|i| i as f64 / 40.0).collect();
        let slices: Vec<DMatrix<f64>> = [0.5, 1.0, 1.5]
            .iter()
            .map(|s| DMatrix::from_fn(40, 2, |r, c| if c == 0 { 1.0 } else { (x[r] * s).exp() }))
            .collect();
        let cube = ModelCube::new(ParamKind::Av, vec![0.0, 0.5, 1.0], slices.clone()).unwrap();
        let truth = &slices[1] * DVector::from_vec(vec![0.4, 2.0]);
        let flux: Vec<f64> = truth.iter().copied().collect();
        let ivar = vec![4.0; 40];

        let grid = scan_grid(&cube, &flux, &ivar, &NnlsOptions::default()).unwrap();
        assert_eq!(grid.values, vec![0.0, 0.5, 1.0]);
        assert!(grid.chi2[1] < 1e-12);
        assert!(grid.chi2[0] > grid.chi2[1] && grid.chi2[2] > grid.chi2[1]);
        assert!((grid.coeffs[1][0] - 0.4).abs() < 1e-6);
        assert!(grid.unconverged.is_empty());
    }

    #[test]
    fn all_masked_pixels_is_insufficient_data() {
        let models = DMatrix::from_element(3, 1, 1.0);
        let err = solve_coefficients(&models, &[1.0; 3], &[0.0; 3], &NnlsOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn negative_ivar_is_rejected() {
        let models = DMatrix::from_element(2, 1, 1.0);
        let err = solve_coefficients(&models, &[1.0; 2], &[1.0, -1.0], &NnlsOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
