//! Broadband filter curves and synthetic AB photometry.
//!
//! AB maggies of a spectrum `f_λ` through response `R(λ)`:
//!
//! ```text
//! maggies = ∫ f_λ R λ dλ  /  ∫ (c / λ²) f_ν,AB R λ dλ,   f_ν,AB = 3631 Jy
//! ```
//!
//! Both the spectrum and the response are interpolated linearly onto the
//! union of their grids; the spectrum is taken as zero outside its coverage,
//! so partially covered bands stay defined.
//! Because the integral is linear in the flux, each filter reduces to one row
//! of a `nband × npix` synthesis matrix for a given model grid.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::PhotSystem;
use crate::error::AppError;
use crate::math::interp_one;

/// Speed of light in Å/s.
pub const C_LIGHT_ANGSTROM: f64 = 2.997_924_58e18;

/// AB zero point `f_ν` in erg/s/cm²/Hz (3631 Jy).
pub const AB_FNU: f64 = 3.631e-20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCurve {
    pub name: String,
    pub wave: Vec<f64>,
    pub response: Vec<f64>,
}

impl FilterCurve {
    pub fn new(name: impl Into<String>, wave: Vec<f64>, response: Vec<f64>) -> Result<Self, AppError> {
        let curve = Self {
            name: name.into(),
            wave,
            response,
        };
        curve.validate()?;
        Ok(curve)
    }

    /// Flat response between `lo` and `hi` (Å) sampled at `n` points, with
    /// zero-response end points.
    pub fn top_hat(name: impl Into<String>, lo: f64, hi: f64, n: usize) -> Result<Self, AppError> {
        let n = n.max(3);
        let step = (hi - lo) / (n - 1) as f64;
        let mut wave: Vec<f64> = (0..n).map(|i| lo + step * i as f64).collect();
        let mut response = vec![1.0; n];
        wave.insert(0, lo - 0.5 * step);
        response.insert(0, 0.0);
        wave.push(hi + 0.5 * step);
        response.push(0.0);
        Self::new(name, wave, response)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.wave.len() < 2 || self.wave.len() != self.response.len() {
            return Err(AppError::invalid(format!(
                "filter {}: needs matching wave/response arrays of length >= 2",
                self.name
            )));
        }
        if self.wave.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(AppError::invalid(format!(
                "filter {}: wavelength grid is not strictly increasing",
                self.name
            )));
        }
        if self.response.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(AppError::invalid(format!("filter {}: negative response", self.name)));
        }
        if self.ab_normalisation() <= 0.0 {
            return Err(AppError::invalid(format!("filter {}: response is identically zero", self.name)));
        }
        Ok(())
    }

    /// Photon-weighted mean wavelength `∫ R λ² dλ / ∫ R λ dλ`.
    pub fn effective_wavelength(&self) -> f64 {
        let num = trapz(&self.wave, |i| self.response[i] * self.wave[i].powi(2));
        let den = trapz(&self.wave, |i| self.response[i] * self.wave[i]);
        num / den
    }

    fn ab_normalisation(&self) -> f64 {
        trapz(&self.wave, |i| {
            C_LIGHT_ANGSTROM / self.wave[i].powi(2) * AB_FNU * self.response[i] * self.wave[i]
        })
    }

    /// Weights `w` on `model_wave` such that `maggies = Σ_i w_i f_i`.
    ///
    /// The integral runs over the union of both grids inside their overlap,
    /// so every model pixel contributes even when the filter is sampled more
    /// coarsely than the model.
    fn synthesis_weights(&self, model_wave: &[f64]) -> Vec<f64> {
        let n = model_wave.len();
        let mut weights = vec![0.0; n];
        let (Some(&f_lo), Some(&f_hi)) = (self.wave.first(), self.wave.last()) else {
            return weights;
        };
        if n < 2 {
            return weights;
        }
        let lo = f_lo.max(model_wave[0]);
        let hi = f_hi.min(model_wave[n - 1]);
        if !(hi > lo) {
            return weights;
        }

        let mut grid: Vec<f64> = self
            .wave
            .iter()
            .chain(model_wave)
            .copied()
            .filter(|w| *w > lo && *w < hi)
            .chain([lo, hi])
            .collect();
        grid.sort_by(f64::total_cmp);
        grid.dedup();

        let norm = self.ab_normalisation();
        let m = grid.len();
        for k in 0..m {
            // trapezoid weight of sample k on the union grid
            let dl = if k == 0 {
                0.5 * (grid[1] - grid[0])
            } else if k == m - 1 {
                0.5 * (grid[m - 1] - grid[m - 2])
            } else {
                0.5 * (grid[k + 1] - grid[k - 1])
            };
            let lam = grid[k];
            let c = interp_one(lam, &self.wave, &self.response) * lam * dl / norm;
            if c == 0.0 {
                continue;
            }
            let hi = model_wave.partition_point(|w| *w < lam).clamp(1, n - 1);
            let lo = hi - 1;
            let t = (lam - model_wave[lo]) / (model_wave[hi] - model_wave[lo]);
            weights[lo] += c * (1.0 - t);
            weights[hi] += c * t;
        }
        weights
    }
}

fn trapz<F: Fn(usize) -> f64>(x: &[f64], f: F) -> f64 {
    (1..x.len())
        .map(|i| 0.5 * (f(i - 1) + f(i)) * (x[i] - x[i - 1]))
        .sum()
}

/// Ordered set of bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    pub filters: Vec<FilterCurve>,
}

impl FilterSet {
    pub fn new(filters: Vec<FilterCurve>) -> Result<Self, AppError> {
        if filters.is_empty() {
            return Err(AppError::invalid("filter set is empty"));
        }
        for f in &filters {
            f.validate()?;
        }
        Ok(Self { filters })
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.name.clone()).collect()
    }

    pub fn effective_wavelengths(&self) -> Vec<f64> {
        self.filters.iter().map(FilterCurve::effective_wavelength).collect()
    }

    /// `nband × npix` matrix mapping a spectrum on `wave` to AB maggies.
    pub fn synthesis_matrix(&self, wave: &[f64]) -> DMatrix<f64> {
        let rows: Vec<Vec<f64>> = self.filters.iter().map(|f| f.synthesis_weights(wave)).collect();
        DMatrix::from_fn(self.len(), wave.len(), |r, c| rows[r][c])
    }

    /// AB maggies for every column of a `npix × nmodel` flux matrix
    /// (erg/s/cm²/Å); returns `nband × nmodel`.
    pub fn ab_maggies(&self, wave: &[f64], flux: &DMatrix<f64>) -> Result<DMatrix<f64>, AppError> {
        if flux.nrows() != wave.len() {
            return Err(AppError::invalid(format!(
                "synthetic photometry: flux has {} rows for {} wavelengths",
                flux.nrows(),
                wave.len()
            )));
        }
        Ok(self.synthesis_matrix(wave) * flux)
    }

    /// AB maggies of a single spectrum.
    pub fn ab_maggies_one(&self, wave: &[f64], flux: &[f64]) -> Result<Vec<f64>, AppError> {
        let column = DMatrix::from_column_slice(flux.len(), 1, flux);
        Ok(self.ab_maggies(wave, &column)?.iter().copied().collect())
    }
}

/// Conversion factor from maggies to `f_λ` (erg/s/cm²/Å) at `lambda_eff`.
pub fn maggies_to_flam(lambda_eff: f64) -> f64 {
    AB_FNU * C_LIGHT_ANGSTROM / (lambda_eff * lambda_eff)
}

/// Filter sets used by the fitter: broadband photometry per photometric
/// system and the rest-frame bands for absolute magnitudes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotometricFilters {
    pub south: FilterSet,
    pub north: FilterSet,
    pub absmag: FilterSet,
}

impl PhotometricFilters {
    pub fn validate(&self) -> Result<(), AppError> {
        for set in [&self.south, &self.north, &self.absmag] {
            if set.is_empty() {
                return Err(AppError::invalid("filter set is empty"));
            }
            for f in &set.filters {
                f.validate()?;
            }
        }
        if self.south.len() != self.north.len() {
            return Err(AppError::invalid(format!(
                "south and north filter sets differ in size ({} vs {})",
                self.south.len(),
                self.north.len()
            )));
        }
        Ok(())
    }

    pub fn for_system(&self, photsys: PhotSystem) -> &FilterSet {
        match photsys {
            PhotSystem::South => &self.south,
            PhotSystem::North => &self.north,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_fnu_source_has_expected_maggies() {
        // A source with f_ν = 3631 Jy · 10^(-0.4 m) has exactly 10^(-0.4 m) maggies.
        let band = FilterCurve::top_hat("r", 5500.0, 6800.0, 200).unwrap();
        let set = FilterSet::new(vec![band]).unwrap();
        let wave: Vec<f64> = (0..5000).map(|i| 4000.0 + i as f64).collect();
        let m = 20.0;
        let flam: Vec<f64> = wave
            .iter()
            .map(|w| AB_FNU * 10f64.powf(-0.4 * m) * C_LIGHT_ANGSTROM / (w * w))
            .collect();
        let maggies = set.ab_maggies_one(&wave, &flam).unwrap();
        assert!((maggies[0] / 10f64.powf(-0.4 * m) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn effective_wavelength_of_top_hat_is_near_centre() {
        let band = FilterCurve::top_hat("g", 4000.0, 5000.0, 101).unwrap();
        let lam = band.effective_wavelength();
        assert!(lam > 4500.0 && lam < 4550.0);
    }

    #[test]
    fn narrow_feature_between_filter_samples_is_integrated() {
        // Filter knots every 250 Å; a 20 Å notch sits between two of them.
        let set = FilterSet::new(vec![FilterCurve::top_hat("g", 4000.0, 5000.0, 5).unwrap()]).unwrap();
        let wave: Vec<f64> = (0..2000).map(|i| 3500.0 + i as f64).collect();
        let flat = vec![1.0; wave.len()];
        let notched: Vec<f64> = wave
            .iter()
            .map(|w| if (4100.0..4120.0).contains(w) { 0.0 } else { 1.0 })
            .collect();
        let full = set.ab_maggies_one(&wave, &flat).unwrap()[0];
        let dipped = set.ab_maggies_one(&wave, &notched).unwrap()[0];
        let ratio = dipped / full;
        // about 20 Å out of ~1125 Å equivalent width, λ-weighted
        assert!(ratio > 0.975 && ratio < 0.995, "ratio = {ratio}");
    }

    #[test]
    fn uncovered_band_gives_zero() {
        let set = FilterSet::new(vec![FilterCurve::top_hat("W4", 200_000.0, 240_000.0, 20).unwrap()]).unwrap();
        let wave = vec![3000.0, 4000.0, 5000.0];
        let maggies = set.ab_maggies_one(&wave, &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(maggies, vec![0.0]);
    }
}
