//! Stellar-population template library.
//!
//! A library is `nsed` rest-frame spectra on one shared wavelength grid plus
//! per-template physical metadata. It is immutable once built; every
//! operation that changes it (`select`, `younger_than`, `broadened`) returns a
//! new library.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::broaden::broaden_columns;

/// Physical properties of one template.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemplateInfo {
    /// Age in years.
    pub age: f64,
    /// Surviving stellar mass in units of the normalisation mass.
    pub mstar: f64,
    /// Star-formation rate (M☉/yr) for the normalisation mass.
    #[serde(default)]
    pub sfr: f64,
    /// Metallicity relative to solar.
    #[serde(default = "solar")]
    pub zzsun: f64,
}

fn solar() -> f64 {
    1.0
}

#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    wave: Vec<f64>,
    flux: DMatrix<f64>,
    info: Vec<TemplateInfo>,
    pixkms: f64,
    wave_split: f64,
}

impl TemplateLibrary {
    /// Build a library, validating its shape.
    ///
    /// - `wave` strictly increasing, finite, positive (Å)
    /// - `flux` is `npix × nsed`, finite
    /// - one `TemplateInfo` per column
    /// - `pixkms` (native pixel size in km/s) positive
    pub fn new(
        wave: Vec<f64>,
        flux: DMatrix<f64>,
        info: Vec<TemplateInfo>,
        pixkms: f64,
        wave_split: f64,
    ) -> Result<Self, AppError> {
        if wave.len() < 2 {
            return Err(AppError::invalid("template wavelength grid needs at least two pixels"));
        }
        if wave.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err(AppError::invalid("template wavelengths must be finite and positive"));
        }
        if wave.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::invalid("template wavelength grid is not strictly increasing"));
        }
        if flux.nrows() != wave.len() {
            return Err(AppError::invalid(format!(
                "template flux has {} rows but the wavelength grid has {} pixels",
                flux.nrows(),
                wave.len()
            )));
        }
        if flux.ncols() == 0 {
            return Err(AppError::invalid("template library is empty"));
        }
        if flux.ncols() != info.len() {
            return Err(AppError::invalid(format!(
                "template flux has {} columns but {} metadata rows",
                flux.ncols(),
                info.len()
            )));
        }
        if flux.iter().any(|v| !v.is_finite()) {
            return Err(AppError::invalid("template flux contains non-finite values"));
        }
        if !(pixkms.is_finite() && pixkms > 0.0) {
            return Err(AppError::invalid(format!("template pixel size must be > 0 km/s, got {pixkms}")));
        }
        if !wave_split.is_finite() {
            return Err(AppError::invalid("template wave_split must be finite"));
        }

        Ok(Self {
            wave,
            flux,
            info,
            pixkms,
            wave_split,
        })
    }

    pub fn wave(&self) -> &[f64] {
        &self.wave
    }

    pub fn flux(&self) -> &DMatrix<f64> {
        &self.flux
    }

    pub fn info(&self) -> &[TemplateInfo] {
        &self.info
    }

    pub fn pixkms(&self) -> f64 {
        self.pixkms
    }

    pub fn wave_split(&self) -> f64 {
        self.wave_split
    }

    pub fn npix(&self) -> usize {
        self.wave.len()
    }

    pub fn nsed(&self) -> usize {
        self.info.len()
    }

    /// Number of leading pixels blueward of `wave_split`, where the pixel
    /// size is constant in velocity.
    pub fn n_split(&self) -> usize {
        self.wave.partition_point(|w| *w < self.wave_split)
    }

    /// Same grid and metadata, new flux. Used by stages that transform
    /// every template column.
    pub(crate) fn with_flux(&self, flux: DMatrix<f64>) -> Result<Self, AppError> {
        Self::new(self.wave.clone(), flux, self.info.clone(), self.pixkms, self.wave_split)
    }

    /// Sub-library holding the given template columns, in order.
    pub fn select(&self, indices: &[usize]) -> Result<Self, AppError> {
        if let Some(bad) = indices.iter().find(|&&i| i >= self.nsed()) {
            return Err(AppError::invalid(format!(
                "template index {bad} out of range for a library of {}",
                self.nsed()
            )));
        }
        let flux = self.flux.select_columns(indices);
        let info = indices.iter().map(|&i| self.info[i]).collect();
        Self::new(self.wave.clone(), flux, info, self.pixkms, self.wave_split)
    }

    /// Indices of templates no older than `age_yr`.
    pub fn younger_than_indices(&self, age_yr: f64) -> Vec<usize> {
        self.info
            .iter()
            .enumerate()
            .filter_map(|(i, t)| (t.age <= age_yr).then_some(i))
            .collect()
    }

    /// Restrict to templates younger than the universe at the object's
    /// redshift; returns the sub-library and the kept indices.
    pub fn younger_than(&self, age_yr: f64) -> Result<(Self, Vec<usize>), AppError> {
        let keep = self.younger_than_indices(age_yr);
        if keep.is_empty() {
            return Err(AppError::insufficient(format!(
                "no templates younger than {:.3} Gyr",
                age_yr / 1e9
            )));
        }
        Ok((self.select(&keep)?, keep))
    }

    /// Copy broadened to velocity dispersion `vdisp` (km/s) blueward of
    /// `wave_split`. This is the nominal-dispersion library the A(V) scans
    /// run on.
    pub fn broadened(&self, vdisp: f64) -> Result<Self, AppError> {
        let flux = broaden_columns(&self.flux, vdisp, self.pixkms, self.n_split());
        self.with_flux(flux)
    }
}
