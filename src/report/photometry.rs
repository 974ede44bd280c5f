//! Broadband photometry: nanomaggies to flux densities and AB magnitudes.

use serde::Serialize;

use crate::domain::{FLUXNORM, Photometry};
use crate::error::AppError;
use crate::models::filters::maggies_to_flam;

/// 0.4·ln(10): d(mag)/d(ln flux).
pub const MAG_PER_LN: f64 = 0.921_034_037_197_618_2;

/// Per-band conversions of one object's photometry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandPhotometry {
    pub band: String,
    pub lambda_eff: f64,
    pub nanomaggies: f64,
    pub nanomaggies_ivar: f64,
    /// Flux density in model units (1e-17 erg/s/cm²/Å).
    pub flam: f64,
    pub flam_ivar: f64,
    /// AB magnitude; zero for non-positive fluxes.
    pub abmag: f64,
    /// Inverse variance of `abmag`, approximating the error as symmetric in
    /// magnitude. Zero unless the band is a detection.
    pub abmag_ivar: f64,
    /// Magnitude error towards brighter (flux + σ) and fainter (flux − σ)
    /// values.
    pub abmag_brighterr: f64,
    pub abmag_fainterr: f64,
    /// n-σ upper limit for measured non-detections, else zero.
    pub abmag_limit: f64,
}

impl BandPhotometry {
    pub fn is_detection(&self) -> bool {
        self.abmag_ivar > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhotometryOptions {
    /// Signal-to-noise at or below which a band becomes an upper limit.
    pub nsigma: f64,
    /// Magnitude error added in quadrature to every detection (0 disables it).
    pub min_mag_err: f64,
}

impl Default for PhotometryOptions {
    fn default() -> Self {
        Self {
            nsigma: 1.0,
            min_mag_err: 0.0,
        }
    }
}

pub fn parse_photometry(
    phot: &Photometry,
    lambda_eff: &[f64],
    opts: &PhotometryOptions,
) -> Result<Vec<BandPhotometry>, AppError> {
    phot.validate()?;
    if lambda_eff.len() != phot.bands.len() {
        return Err(AppError::invalid(format!(
            "photometry has {} bands but the filter set has {}",
            phot.bands.len(),
            lambda_eff.len()
        )));
    }

    let rows = phot
        .bands
        .iter()
        .zip(&phot.nanomaggies)
        .zip(&phot.ivar)
        .zip(lambda_eff)
        .map(|(((band, &nmgy), &ivar), &lambda)| {
            let ivar = with_mag_floor(nmgy, ivar, opts.min_mag_err);
            parse_band(band, lambda, nmgy, ivar, opts.nsigma)
        })
        .collect();
    Ok(rows)
}

fn with_mag_floor(nmgy: f64, ivar: f64, min_mag_err: f64) -> f64 {
    if min_mag_err <= 0.0 || nmgy <= 0.0 || ivar <= 0.0 {
        return ivar;
    }
    let floor = MAG_PER_LN * min_mag_err * nmgy;
    1.0 / (1.0 / ivar + floor * floor)
}

fn parse_band(band: &str, lambda_eff: f64, nmgy: f64, ivar: f64, nsigma: f64) -> BandPhotometry {
    // nanomaggies -> model-unit flam
    let factor = 1e-9 * maggies_to_flam(lambda_eff) * FLUXNORM;
    let mut row = BandPhotometry {
        band: band.to_string(),
        lambda_eff,
        nanomaggies: nmgy,
        nanomaggies_ivar: ivar,
        flam: nmgy * factor,
        flam_ivar: ivar / (factor * factor),
        abmag: 0.0,
        abmag_ivar: 0.0,
        abmag_brighterr: 0.0,
        abmag_fainterr: 0.0,
        abmag_limit: 0.0,
    };
    if nmgy > 0.0 {
        row.abmag = -2.5 * (1e-9 * nmgy).log10();
    }

    let snr = nmgy * ivar.sqrt();
    if snr > nsigma {
        let err = 1.0 / ivar.sqrt();
        row.abmag_brighterr = err / (MAG_PER_LN * (nmgy + err));
        row.abmag_fainterr = err / (MAG_PER_LN * (nmgy - err));
        row.abmag_ivar = ivar * (nmgy * MAG_PER_LN).powi(2);
    } else if ivar > 0.0 {
        // Flux limit nsigma/sqrt(ivar) nanomaggies.
        row.abmag_limit = 2.5 * (ivar.sqrt() / nsigma).log10() + 22.5;
    }
    row
}

/// Flux densities and inverse variances in band order.
pub fn flam_arrays(rows: &[BandPhotometry]) -> (Vec<f64>, Vec<f64>) {
    rows.iter().map(|r| (r.flam, r.flam_ivar)).unzip()
}
