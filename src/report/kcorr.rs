//! K-corrections and absolute magnitudes.
//!
//! For each output band Q the observed band R whose de-redshifted effective
//! wavelength lies closest to Q (among measured bands) is used:
//!
//! ```text
//! K_QR = 2.5 log10( Q_synth,rest / R_synth,obs )
//! M_Q  = m_R − DM(z) − K_QR
//! ```
//!
//! Without a usable measurement the absolute magnitude falls back to the
//! synthesised rest-frame magnitude and carries zero inverse variance.

use crate::domain::{BandMagnitude, FLUXNORM, Photometry};
use crate::error::AppError;
use crate::models::{Cosmology, FilterCurve, FilterSet};
use crate::report::photometry::MAG_PER_LN;

/// Penalty (Å) that keeps unmeasured bands from being picked.
const UNMEASURED_PENALTY: f64 = 1e6;

/// `set` with every curve shifted blueward by `1 + band_shift`.
pub fn shift_bands(set: &FilterSet, band_shift: f64) -> Result<FilterSet, AppError> {
    if band_shift == 0.0 {
        return Ok(set.clone());
    }
    let curves = set
        .filters
        .iter()
        .map(|f| {
            let wave = f.wave.iter().map(|w| w / (1.0 + band_shift)).collect();
            FilterCurve::new(f.name.clone(), wave, f.response.clone())
        })
        .collect::<Result<Vec<_>, _>>()?;
    FilterSet::new(curves)
}

/// Inputs shared by every band of one object.
pub struct KcorrInput<'a> {
    pub redshift: f64,
    /// Rest-frame template wavelengths.
    pub rest_wave: &'a [f64],
    /// Best-fit continuum on `rest_wave·(1+z)`, model units.
    pub continuum: &'a [f64],
    /// Observed bands of the object's photometric system.
    pub filters_in: &'a FilterSet,
    /// Rest-frame output bands.
    pub filters_out: &'a FilterSet,
    /// Measured photometry in `filters_in` order, if any.
    pub photometry: Option<&'a Photometry>,
    pub band_shift: f64,
}

pub fn kcorr_and_absmag(input: &KcorrInput<'_>, cosmology: &dyn Cosmology) -> Result<Vec<BandMagnitude>, AppError> {
    let z = input.redshift;
    if input.continuum.len() != input.rest_wave.len() {
        return Err(AppError::invalid(format!(
            "K-correction: continuum has {} pixels for {} wavelengths",
            input.continuum.len(),
            input.rest_wave.len()
        )));
    }
    if let Some(phot) = input.photometry {
        if phot.nanomaggies.len() != input.filters_in.len() {
            return Err(AppError::invalid(format!(
                "K-correction: {} photometric bands for {} filters",
                phot.nanomaggies.len(),
                input.filters_in.len()
            )));
        }
    }

    let zwave: Vec<f64> = input.rest_wave.iter().map(|w| w * (1.0 + z)).collect();
    let observed: Vec<f64> = input.continuum.iter().map(|f| f / FLUXNORM).collect();
    let rest: Vec<f64> = observed.iter().map(|f| f * (1.0 + z)).collect();

    let filters_out = shift_bands(input.filters_out, input.band_shift)?;
    let best_maggies = input.filters_in.ab_maggies_one(&zwave, &observed)?;
    let synth_rest = filters_out.ab_maggies_one(input.rest_wave, &rest)?;
    let dmod = if z > 0.0 { cosmology.distance_modulus(z) } else { 0.0 };

    let lambda_in: Vec<f64> = input
        .filters_in
        .effective_wavelengths()
        .iter()
        .map(|l| l / (1.0 + z))
        .collect();
    let (nmgy, ivar): (Vec<f64>, Vec<f64>) = match input.photometry {
        Some(p) => (p.nanomaggies.clone(), p.ivar.clone()),
        None => (vec![0.0; lambda_in.len()], vec![0.0; lambda_in.len()]),
    };

    let out = filters_out
        .filters
        .iter()
        .zip(filters_out.effective_wavelengths())
        .zip(&synth_rest)
        .map(|((band, lambda_out), &rest_maggies)| {
            let oband = nearest_band(&lambda_in, &ivar, lambda_out);
            let kcorr = match oband {
                Some(o) if rest_maggies > 0.0 && best_maggies[o] > 0.0 => {
                    2.5 * (rest_maggies / best_maggies[o]).log10()
                }
                _ => 0.0,
            };
            let (absmag, absmag_ivar) = match oband {
                Some(o) if nmgy[o] > 0.0 && ivar[o] > 0.0 => (
                    -2.5 * (1e-9 * nmgy[o]).log10() - dmod - kcorr,
                    (nmgy[o] * MAG_PER_LN).powi(2) * ivar[o],
                ),
                _ if rest_maggies > 0.0 => (-2.5 * rest_maggies.log10() - dmod, 0.0),
                _ => (0.0, 0.0),
            };
            BandMagnitude {
                band: band.name.clone(),
                kcorr,
                absmag,
                absmag_ivar,
            }
        })
        .collect();
    Ok(out)
}

/// Index of the measured input band closest to `lambda_out`.
fn nearest_band(lambda_in: &[f64], ivar: &[f64], lambda_out: f64) -> Option<usize> {
    lambda_in
        .iter()
        .zip(ivar)
        .map(|(l, iv)| (l - lambda_out).abs() + if *iv > 0.0 { 0.0 } else { UNMEASURED_PENALTY })
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}
