//! Run configuration.
//!
//! Every field has a default, so a configuration file only needs to name what
//! it changes:
//!
//! ```json
//! { "solve_vdisp": true, "dust_slope": 0.8 }
//! ```

use serde::{Deserialize, Serialize};

/// Range of a linear parameter grid plus the value used when the fit fails.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub nominal: f64,
}

impl GridSpec {
    pub fn av() -> Self {
        Self {
            min: 0.0,
            max: 1.5,
            step: 0.1,
            nominal: 0.0,
        }
    }

    pub fn vdisp() -> Self {
        Self {
            min: 100.0,
            max: 350.0,
            step: 20.0,
            nominal: 150.0,
        }
    }
}

/// Tunables of the line-mask / smooth-continuum estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineMaskConfig {
    /// Half-widths (km/s) of the pass-1 masks, per line class.
    pub mask_kms_narrow: f64,
    pub mask_kms_balmer: f64,
    pub mask_kms_broad: f64,
    /// Pass-1 masks span ±`mask_nsigma`·σ.
    pub mask_nsigma: f64,
    /// Lines with a catalog amplitude below this are not masked in pass 1.
    pub min_amplitude: f64,

    /// Sliding window width and step, pixels.
    pub smooth_window: usize,
    pub smooth_step: usize,
    /// Windows with fewer unmasked pixels are skipped.
    pub min_window_pixels: usize,
    pub clip_sigma: f64,
    /// Width (pixels) of the final median filter.
    pub median_filter: usize,

    /// Nominal line widths (km/s) per class, used as the stacking window and
    /// as the fallback width.
    pub sigma_narrow: f64,
    pub sigma_balmer: f64,
    pub sigma_broad: f64,
    /// Accepted width ranges (km/s) per class.
    pub bounds_narrow: [f64; 2],
    pub bounds_balmer: [f64; 2],
    pub bounds_broad: [f64; 2],
    /// Minimum amplitude / robust-noise ratio for a width estimate.
    pub min_width_snr: f64,

    pub possible_nsigma: f64,
    pub strong_nsigma: f64,
    pub strong_snr: f64,
    pub strong_min_pixels: usize,
}

impl Default for LineMaskConfig {
    fn default() -> Self {
        Self {
            mask_kms_narrow: 250.0,
            mask_kms_balmer: 2500.0,
            mask_kms_broad: 2500.0,
            mask_nsigma: 3.0,
            min_amplitude: 1.0,
            smooth_window: 75,
            smooth_step: 35,
            min_window_pixels: 10,
            clip_sigma: 2.0,
            median_filter: 175,
            sigma_narrow: 200.0,
            sigma_balmer: 1000.0,
            sigma_broad: 2000.0,
            bounds_narrow: [50.0, 500.0],
            bounds_balmer: [50.0, 2000.0],
            bounds_broad: [300.0, 5000.0],
            min_width_snr: 1.5,
            possible_nsigma: 7.0,
            strong_nsigma: 1.0,
            strong_snr: 3.0,
            strong_min_pixels: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub av: GridSpec,
    pub vdisp: GridSpec,
    /// Power-law slope of the attenuation curve.
    pub dust_slope: f64,
    pub nnls_tolerance: f64,
    pub nnls_max_iter_factor: usize,
    /// Scan velocity dispersion after A(V).
    pub solve_vdisp: bool,
    /// Skip the spectroscopic fit; photometry only.
    pub fastphot: bool,
    /// R_V of the Milky-Way extinction curve.
    pub mw_rv: f64,
    /// Signal-to-noise below which a band is reported as an upper limit.
    pub phot_nsigma: f64,
    /// Magnitude-error floor added in quadrature (0 disables it).
    pub phot_min_mag_err: f64,
    /// Shift of the absolute-magnitude bandpasses, `1 + band_shift`.
    pub band_shift: f64,
    pub linemask: LineMaskConfig,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            av: GridSpec::av(),
            vdisp: GridSpec::vdisp(),
            dust_slope: 0.7,
            nnls_tolerance: 1e-7,
            nnls_max_iter_factor: 3,
            solve_vdisp: false,
            fastphot: false,
            mw_rv: 3.1,
            phot_nsigma: 1.0,
            phot_min_mag_err: 0.0,
            band_shift: 0.0,
            linemask: LineMaskConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: FitConfig =
            serde_json::from_str(r#"{ "solve_vdisp": true, "linemask": { "strong_snr": 4.0 } }"#).unwrap();
        assert!(cfg.solve_vdisp);
        assert_eq!(cfg.linemask.strong_snr, 4.0);
        assert_eq!(cfg.linemask.smooth_window, 75);
        assert_eq!(cfg.av, GridSpec::av());
    }
}
