//! Pass 1: wide-masked smooth continuum and noise.
//!
//! - mask ±`mask_nsigma`·σ around every catalog line with amplitude at or
//!   above `min_amplitude`, σ from the class's pass-1 width
//! - slide a fixed-width window (fixed step) over the spectrum and take the
//!   sigma-clipped median of the unmasked pixels as the continuum and their
//!   interquartile σ as the noise
//! - interpolate both back onto the full grid and median-filter them

use crate::domain::{C_LIGHT_KMS, LineMaskConfig};
use crate::error::AppError;
use crate::linemask::catalog::LineCatalog;
use crate::math::interp;
use crate::math::stats::{iqr_sigma, median, median_filter, sigma_clipped_stats};

/// Clipping rounds per window.
const CLIP_ITERS: usize = 5;

#[derive(Debug, Clone)]
pub struct SmoothContinuum {
    pub continuum: Vec<f64>,
    pub noise: Vec<f64>,
}

/// Pixels excluded from the smooth continuum: wide windows around the
/// brighter lines plus every zero-weight pixel.
pub fn pass1_mask(
    wave: &[f64],
    ivar: &[f64],
    redshift: f64,
    catalog: &LineCatalog,
    cfg: &LineMaskConfig,
) -> Vec<bool> {
    let mut mask: Vec<bool> = ivar.iter().map(|v| *v <= 0.0).collect();
    let (Some(&lo), Some(&hi)) = (wave.first(), wave.last()) else {
        return mask;
    };
    for line in catalog.in_range(redshift, lo, hi) {
        if line.amplitude < cfg.min_amplitude {
            continue;
        }
        let center = line.restwave * (1.0 + redshift);
        let half = cfg.mask_nsigma * center * line.class.pass1_sigma(cfg) / C_LIGHT_KMS;
        flag_window(wave, center - half, center + half, &mut mask);
    }
    mask
}

/// Set `mask` for every pixel with `lo <= wave <= hi`.
pub(crate) fn flag_window(wave: &[f64], lo: f64, hi: f64, mask: &mut [bool]) {
    let start = wave.partition_point(|w| *w < lo);
    let end = wave.partition_point(|w| *w <= hi);
    for m in &mut mask[start..end] {
        *m = true;
    }
}

pub fn smooth_continuum(
    wave: &[f64],
    flux: &[f64],
    ivar: &[f64],
    redshift: f64,
    catalog: &LineCatalog,
    cfg: &LineMaskConfig,
) -> Result<SmoothContinuum, AppError> {
    let n = wave.len();
    if flux.len() != n || ivar.len() != n {
        return Err(AppError::invalid("smooth continuum: wave/flux/ivar lengths differ"));
    }
    let mask = pass1_mask(wave, ivar, redshift, catalog, cfg);

    let window = cfg.smooth_window.max(1);
    let step = cfg.smooth_step.max(1);
    let mut centers = Vec::new();
    let mut medians = Vec::new();
    let mut sigmas = Vec::new();
    let mut skipped = 0usize;

    let mut start = 0;
    while start < n {
        let end = (start + window).min(n);
        let (w, f): (Vec<f64>, Vec<f64>) = (start..end)
            .filter(|&i| !mask[i])
            .map(|i| (wave[i], flux[i]))
            .unzip();
        if f.len() < cfg.min_window_pixels {
            skipped += 1;
        } else if let (Some(stats), Some(sigma)) =
            (sigma_clipped_stats(&f, cfg.clip_sigma, CLIP_ITERS), iqr_sigma(&f))
        {
            centers.push(w.iter().sum::<f64>() / w.len() as f64);
            medians.push(stats.median);
            sigmas.push(sigma);
        }
        if end == n {
            break;
        }
        start += step;
    }
    if skipped > 0 {
        log::debug!("smooth continuum: skipped {skipped} window(s) with too few unmasked pixels");
    }

    if centers.is_empty() {
        // Too few unmasked pixels for any window: fall back to global values.
        let good: Vec<f64> = (0..n).filter(|&i| !mask[i]).map(|i| flux[i]).collect();
        let level = median(&good).ok_or_else(|| {
            AppError::insufficient("smooth continuum: every pixel is masked")
        })?;
        let noise = iqr_sigma(&good).unwrap_or(0.0);
        log::warn!("smooth continuum: no usable window, adopting a constant continuum");
        return Ok(SmoothContinuum {
            continuum: vec![level; n],
            noise: vec![noise; n],
        });
    }

    let continuum = median_filter(&interp(wave, &centers, &medians), odd(cfg.median_filter));
    let noise = median_filter(&interp(wave, &centers, &sigmas), odd(cfg.median_filter));
    Ok(SmoothContinuum { continuum, noise })
}

fn odd(size: usize) -> usize {
    if size % 2 == 0 { size + 1 } else { size }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::noisy_power_law;

    fn grid() -> Vec<f64> {
        (0..4000).map(|i| 5000.0 + i as f64).collect()
    }

    #[test]
    fn recovers_power_law_within_noise() {
        let wave = grid();
        let (flux, ivar) = noisy_power_law(&wave, 10.0, -1.2, 0.5, 11);
        let smooth = smooth_continuum(&wave, &flux, &ivar, 0.1, &LineCatalog::default(), &LineMaskConfig::default())
            .unwrap();
        for (i, w) in wave.iter().enumerate().step_by(50) {
            let truth = 10.0 * (w / 5000.0f64).powf(-1.2);
            assert!((smooth.continuum[i] - truth).abs() < 2.0 * 0.5, "pixel {i}");
        }
        let mid = smooth.noise[2000];
        assert!((mid - 0.5).abs() < 0.15, "noise {mid}");
    }

    #[test]
    fn bright_lines_are_masked_in_pass_one() {
        let wave = grid();
        let ivar = vec![1.0; wave.len()];
        let cfg = LineMaskConfig::default();
        let mask = pass1_mask(&wave, &ivar, 0.1, &LineCatalog::default(), &cfg);
        let halpha = wave.partition_point(|w| *w < 6564.613 * 1.1);
        assert!(mask[halpha]);
        assert!(!mask[0]);
    }

    #[test]
    fn fully_masked_spectrum_is_insufficient() {
        let wave = grid();
        let err = smooth_continuum(
            &wave,
            &vec![1.0; wave.len()],
            &vec![0.0; wave.len()],
            0.0,
            &LineCatalog::default(),
            &LineMaskConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
