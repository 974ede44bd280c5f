//! Emission-line masks and the smooth continuum.
//!
//! Two passes over an object's coadded spectrum:
//!
//! 1. a wide-masked, sliding-window smooth continuum and noise ([`smooth`])
//! 2. line widths per class from velocity-space stacks ([`width`])
//!
//! The widths then set the final masks:
//!
//! - **possible**: ±`possible_nsigma`·σ around every catalog line inside the
//!   spectrum
//! - **strong**: the same windows, only for lines whose observed-minus-smooth
//!   S/N exceeds `strong_snr` within ±`strong_nsigma`·σ on at least
//!   `strong_min_pixels` pixels (or on every pixel of a narrower window);
//!   Lyman-α is always strong

pub mod catalog;
pub mod smooth;
pub mod width;

use crate::domain::{C_LIGHT_KMS, LineMaskConfig, LineWidths, Spectrum};
use crate::error::AppError;
use crate::math::interp;

pub use catalog::{CatalogLine, LYMAN_ALPHA, LineCatalog, LineClass};
pub use smooth::{SmoothContinuum, smooth_continuum};
pub use width::{WidthEstimate, estimate_line_widths};

use smooth::flag_window;

#[derive(Debug, Clone)]
pub struct LineMask {
    /// Grid the masks were built on (the coadd).
    pub wave: Vec<f64>,
    /// `true` where a pixel may be affected by emission.
    pub possible: Vec<bool>,
    /// `true` within the windows of significantly detected lines.
    pub strong: Vec<bool>,
    pub smooth: SmoothContinuum,
    pub widths: LineWidths,
    /// Names of the lines judged strong.
    pub strong_lines: Vec<String>,
}

impl LineMask {
    /// The possible-line mask mapped onto another grid.
    pub fn project(&self, channel_wave: &[f64]) -> Vec<bool> {
        project_mask(&self.wave, &self.possible, channel_wave)
    }

    pub fn project_strong(&self, channel_wave: &[f64]) -> Vec<bool> {
        project_mask(&self.wave, &self.strong, channel_wave)
    }

    pub fn n_possible(&self) -> usize {
        self.possible.iter().filter(|m| **m).count()
    }

    pub fn n_strong(&self) -> usize {
        self.strong.iter().filter(|m| **m).count()
    }
}

/// Linear interpolation of a boolean mask onto `to_wave`; any non-zero
/// interpolated value is masked. Pixels outside `from_wave` are unmasked.
pub fn project_mask(from_wave: &[f64], mask: &[bool], to_wave: &[f64]) -> Vec<bool> {
    let (Some(&lo), Some(&hi)) = (from_wave.first(), from_wave.last()) else {
        return vec![false; to_wave.len()];
    };
    let values: Vec<f64> = mask.iter().map(|m| if *m { 1.0 } else { 0.0 }).collect();
    to_wave
        .iter()
        .zip(interp(to_wave, from_wave, &values))
        .map(|(w, v)| *w >= lo && *w <= hi && v > 0.0)
        .collect()
}

/// Build the line masks for one coadded spectrum.
pub fn build_linemask(
    spectrum: &Spectrum,
    redshift: f64,
    catalog: &LineCatalog,
    cfg: &LineMaskConfig,
) -> Result<LineMask, AppError> {
    spectrum.validate("coadd")?;
    let (wave, flux, ivar) = (&spectrum.wave, &spectrum.flux, &spectrum.ivar);
    let (Some(&lo), Some(&hi)) = (wave.first(), wave.last()) else {
        return Err(AppError::insufficient("line mask: empty spectrum"));
    };

    let smooth = smooth_continuum(wave, flux, ivar, redshift, catalog, cfg)?;
    let widths = estimate_line_widths(wave, flux, ivar, &smooth, redshift, cfg);

    let mut possible = vec![false; wave.len()];
    let mut strong = vec![false; wave.len()];
    let mut strong_lines = Vec::new();

    for line in catalog.in_range(redshift, lo, hi) {
        let center = line.restwave * (1.0 + redshift);
        let sigma = center * widths.for_class(line.class) / C_LIGHT_KMS;
        let half = cfg.possible_nsigma * sigma;
        flag_window(wave, center - half, center + half, &mut possible);

        let is_strong = line.name == LYMAN_ALPHA
            || is_significant(wave, flux, ivar, &smooth, center, cfg.strong_nsigma * sigma, cfg);
        if is_strong {
            flag_window(wave, center - half, center + half, &mut strong);
            strong_lines.push(line.name.clone());
        }
    }

    if !strong_lines.is_empty() {
        log::debug!("strong lines: {}", strong_lines.join(","));
    }
    Ok(LineMask {
        wave: wave.clone(),
        possible,
        strong,
        smooth,
        widths,
        strong_lines,
    })
}

/// Peak-window significance test for one line.
fn is_significant(
    wave: &[f64],
    flux: &[f64],
    ivar: &[f64],
    smooth: &SmoothContinuum,
    center: f64,
    half: f64,
    cfg: &LineMaskConfig,
) -> bool {
    let start = wave.partition_point(|w| *w < center - half);
    let end = wave.partition_point(|w| *w <= center + half);
    let window: Vec<usize> = (start..end).filter(|&i| ivar[i] > 0.0).collect();
    if window.is_empty() {
        return false;
    }
    let qualifying = window
        .iter()
        .filter(|&&i| smooth.noise[i] > 0.0 && (flux[i] - smooth.continuum[i]) / smooth.noise[i] > cfg.strong_snr)
        .count();
    if window.len() >= cfg.strong_min_pixels {
        qualifying >= cfg.strong_min_pixels
    } else {
        qualifying == window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::noisy_power_law;

    fn coadd(lines: &[(f64, f64, f64)], z: f64) -> Spectrum {
        let wave: Vec<f64> = (0..6000).map(|i| 3600.0 + i as f64).collect();
        let (mut flux, ivar) = noisy_power_law(&wave, 8.0, -1.5, 0.3, 21);
        for &(rest, sigma_kms, amp) in lines {
            let center = rest * (1.0 + z);
            let sigma = center * sigma_kms / C_LIGHT_KMS;
            for (f, w) in flux.iter_mut().zip(&wave) {
                *f += amp * (-0.5 * ((w - center) / sigma).powi(2)).exp();
            }
        }
        Spectrum { wave, flux, ivar }
    }

    #[test]
    fn power_law_has_no_strong_lines() {
        let spec = coadd(&[], 0.1);
        let mask = build_linemask(&spec, 0.1, &LineCatalog::default(), &LineMaskConfig::default()).unwrap();
        assert!(mask.strong_lines.is_empty(), "strong: {:?}", mask.strong_lines);
        assert_eq!(mask.n_strong(), 0);
        assert!(mask.n_possible() > 0);

        // Away from the grid ends the smooth continuum follows the noiseless
        // power law to well within the 0.3 per-pixel noise.
        let n = spec.wave.len();
        for i in (100..n - 100).filter(|&i| !mask.possible[i]) {
            let truth = 8.0 * (spec.wave[i] / 5000.0).powf(-1.5);
            let diff = (mask.smooth.continuum[i] - truth).abs();
            assert!(diff < 0.15, "continuum off by {diff} at {} Å", spec.wave[i]);
        }
    }

    #[test]
    fn injected_halpha_is_flagged_in_both_masks() {
        let z = 0.1;
        let spec = coadd(&[(6564.613, 150.0, 6.0)], z);
        let mask = build_linemask(&spec, z, &LineCatalog::default(), &LineMaskConfig::default()).unwrap();
        let center = 6564.613 * (1.0 + z);
        let i = spec.wave.partition_point(|w| *w < center);
        assert!(mask.possible[i] && mask.strong[i]);
        assert!(mask.strong_lines.iter().any(|n| n == "halpha"));

        // Beyond ±7σ of every line nothing is flagged.
        let far = spec.wave.partition_point(|w| *w < 8000.0);
        assert!(!mask.possible[far]);
    }

    #[test]
    fn lyman_alpha_is_always_strong() {
        let z = 2.5;
        let spec = coadd(&[], z);
        let mask = build_linemask(&spec, z, &LineCatalog::default(), &LineMaskConfig::default()).unwrap();
        assert!(mask.strong_lines.iter().any(|n| n == LYMAN_ALPHA));
    }

    #[test]
    fn projection_flags_overlapping_pixels() {
        let from = vec![1.0, 2.0, 3.0, 4.0];
        let mask = vec![false, true, false, false];
        let out = project_mask(&from, &mask, &[0.5, 1.5, 2.0, 2.9, 3.5, 5.0]);
        assert_eq!(out, vec![false, true, true, true, false, false]);
    }
}
