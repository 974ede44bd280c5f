//! Power-law dust attenuation applied to rest-frame templates.
//!
//! `T(λ) = 10^(−0.4 · A_V · (λ / 5500 Å)^(−slope))`

use nalgebra::DMatrix;

pub const DUST_REFERENCE_WAVE: f64 = 5500.0;

/// Attenuation factor per wavelength. `av == 0` gives exactly 1.
pub fn attenuation(wave: &[f64], av: f64, slope: f64) -> Vec<f64> {
    if av == 0.0 {
        return vec![1.0; wave.len()];
    }
    wave.iter()
        .map(|w| 10f64.powf(-0.4 * av * (w / DUST_REFERENCE_WAVE).powf(-slope)))
        .collect()
}

/// Attenuated copy of a `npix × nmodel` flux matrix.
pub fn attenuate_columns(flux: &DMatrix<f64>, wave: &[f64], av: f64, slope: f64) -> DMatrix<f64> {
    let atten = attenuation(wave, av, slope);
    DMatrix::from_fn(flux.nrows(), flux.ncols(), |r, c| flux[(r, c)] * atten[r])
}
