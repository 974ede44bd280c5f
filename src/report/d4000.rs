//! 4000 Å break strength.
//!
//! Ratio of the mean `f_ν` in a red and a blue rest-frame window, each sum
//! weighted by the pixel width and normalised by the window width.

use crate::domain::BreakMeasurement;
use crate::math::stats::gradient;
use crate::models::filters::C_LIGHT_ANGSTROM;

/// Minimum good pixels in each window.
const MIN_PIXELS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakIndex {
    /// Broad definition, 3750–3950 / 4050–4250 Å.
    D4000,
    /// Narrow definition, 3850–3950 / 4000–4100 Å.
    Dn4000,
}

impl BreakIndex {
    /// `(blue, red)` rest-frame windows, Å.
    pub fn windows(&self) -> ([f64; 2], [f64; 2]) {
        match self {
            BreakIndex::D4000 => ([3750.0, 3950.0], [4050.0, 4250.0]),
            BreakIndex::Dn4000 => ([3850.0, 3950.0], [4000.0, 4100.0]),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BreakIndex::D4000 => "D(4000)",
            BreakIndex::Dn4000 => "Dn(4000)",
        }
    }
}

/// Break index of `flam` sampled on `wave`.
///
/// `wave` is observed-frame at `redshift`; pass zero for a rest-frame
/// spectrum. Without `ivar` every pixel is good and the returned inverse
/// variance is zero. Too little coverage, or a vanishing blue window, yields
/// `(0, 0)`.
pub fn break_index(
    kind: BreakIndex,
    wave: &[f64],
    flam: &[f64],
    ivar: Option<&[f64]>,
    redshift: f64,
) -> BreakMeasurement {
    let zero = BreakMeasurement::default();
    if wave.len() != flam.len() || ivar.is_some_and(|iv| iv.len() != wave.len()) {
        log::warn!("{}: wave/flux/ivar lengths differ", kind.name());
        return zero;
    }

    let rest: Vec<f64> = wave.iter().map(|w| w / (1.0 + redshift)).collect();
    let flam2fnu: Vec<f64> = rest
        .iter()
        .map(|w| (1.0 + redshift) * w * w / C_LIGHT_ANGSTROM)
        .collect();
    let good = |i: usize| ivar.is_none_or(|iv| iv[i] > 0.0);

    let ([blo, bhi], [rlo, rhi]) = kind.windows();
    let blue: Vec<usize> = (0..rest.len()).filter(|&i| rest[i] >= blo && rest[i] <= bhi && good(i)).collect();
    let red: Vec<usize> = (0..rest.len()).filter(|&i| rest[i] >= rlo && rest[i] <= rhi && good(i)).collect();
    if blue.len() < MIN_PIXELS || red.len() < MIN_PIXELS {
        log::warn!(
            "{}: too few good pixels ({} blue, {} red)",
            kind.name(),
            blue.len(),
            red.len()
        );
        return zero;
    }

    let (blue_width, red_width) = (bhi - blo, rhi - rlo);
    let dwave = gradient(&rest);
    let fnu: Vec<f64> = flam.iter().zip(&flam2fnu).map(|(f, k)| f * k).collect();

    let numer = blue_width * red.iter().map(|&i| dwave[i] * fnu[i]).sum::<f64>();
    let denom = red_width * blue.iter().map(|&i| dwave[i] * fnu[i]).sum::<f64>();
    if denom == 0.0 {
        log::warn!("{} is ill-defined", kind.name());
        return zero;
    }
    let value = numer / denom;

    let Some(ivar) = ivar else {
        return BreakMeasurement { value, ivar: 0.0 };
    };
    let fnu_var: Vec<f64> = ivar
        .iter()
        .zip(&flam2fnu)
        .map(|(iv, k)| if *iv > 0.0 { k * k / iv } else { 0.0 })
        .collect();
    let numer_var = blue_width.powi(2) * red.iter().map(|&i| dwave[i] * fnu_var[i]).sum::<f64>();
    let denom_var = red_width.powi(2) * blue.iter().map(|&i| dwave[i] * fnu_var[i]).sum::<f64>();
    let var = (numer_var + numer * numer * denom_var) / (denom * denom);
    if var > 0.0 {
        BreakMeasurement { value, ivar: 1.0 / var }
    } else {
        log::warn!("{} variance is ill-defined", kind.name());
        BreakMeasurement { value, ivar: 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `f_ν` constant below 4000 Å (rest), `jump` times brighter above.
    fn step_spectrum(wave: &[f64], redshift: f64, jump: f64) -> Vec<f64> {
        wave.iter()
            .map(|w| {
                let rest = w / (1.0 + redshift);
                let fnu = if rest < 4000.0 { 1.0 } else { jump };
                fnu / (w * w)
            })
            .collect()
    }

    #[test]
    fn flat_fnu_has_unit_break() {
        let wave: Vec<f64> = (0..1000).map(|i| 3500.0 + i as f64).collect();
        let flam = step_spectrum(&wave, 0.0, 1.0);
        for kind in [BreakIndex::D4000, BreakIndex::Dn4000] {
            let d = break_index(kind, &wave, &flam, None, 0.0);
            assert!((d.value - 1.0).abs() < 1e-6, "{}: {}", kind.name(), d.value);
            assert_eq!(d.ivar, 0.0);
        }
    }

    #[test]
    fn break_is_redshift_invariant() {
        let z = 0.5;
        let rest_wave: Vec<f64> = (0..1000).map(|i| 3500.0 + i as f64).collect();
        let obs_wave: Vec<f64> = (0..1500).map(|i| 3500.0 * (1.0 + z) + i as f64).collect();
        let rest = break_index(BreakIndex::Dn4000, &rest_wave, &step_spectrum(&rest_wave, 0.0, 1.6), None, 0.0);
        let obs = break_index(BreakIndex::Dn4000, &obs_wave, &step_spectrum(&obs_wave, z, 1.6), None, z);
        assert!((rest.value - 1.6).abs() < 1e-6);
        assert!((obs.value - rest.value).abs() < 0.02, "{} vs {}", obs.value, rest.value);
    }

    #[test]
    fn noise_gives_positive_inverse_variance() {
        let wave: Vec<f64> = (0..1000).map(|i| 3500.0 + i as f64).collect();
        let flam = step_spectrum(&wave, 0.0, 1.3);
        let ivar: Vec<f64> = flam.iter().map(|f| 1.0 / (0.1 * f).powi(2)).collect();
        let d = break_index(BreakIndex::D4000, &wave, &flam, Some(&ivar), 0.0);
        assert!(d.ivar > 0.0 && d.ivar.is_finite());
    }

    #[test]
    fn missing_coverage_is_zero() {
        let wave: Vec<f64> = (0..500).map(|i| 4500.0 + i as f64).collect();
        let flam = vec![1.0; wave.len()];
        let d = break_index(BreakIndex::Dn4000, &wave, &flam, None, 0.0);
        assert_eq!(d, BreakMeasurement::default());

        // Masked blue window.
        let wave: Vec<f64> = (0..1000).map(|i| 3500.0 + i as f64).collect();
        let flam = vec![1.0; wave.len()];
        let ivar: Vec<f64> = wave.iter().map(|w| if *w < 4000.0 { 0.0 } else { 1.0 }).collect();
        let d = break_index(BreakIndex::Dn4000, &wave, &flam, Some(&ivar), 0.0);
        assert_eq!(d.value, 0.0);
    }
}
