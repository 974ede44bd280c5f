//! Pass 2: emission-line widths from velocity-space stacks.
//!
//! For each line class, pixels around a few strong, isolated lines are
//! continuum-subtracted, converted to velocity relative to each line's
//! redshifted centre and stacked. A Gaussian plus constant is fitted to the
//! stack; the width is kept when amplitude and σ are positive, the amplitude
//! over the robust σ of the stack's outer pixels reaches `min_width_snr`,
//! and σ lies inside the class bounds. Otherwise the nominal width is used.
//! A width larger than nominal triggers one refit with the stacking window
//! widened to match it.

use crate::domain::{C_LIGHT_KMS, LineMaskConfig, LineWidths};
use crate::linemask::catalog::LineClass;
use crate::linemask::smooth::SmoothContinuum;
use crate::math::lm::{LmConfig, fit_gaussian};
use crate::math::stats::iqr_sigma;

/// Stacking half-window, in units of the trial σ.
const WINDOW_NSIGMA: f64 = 5.0;
/// Pixels beyond this many trial σ form the noise sample.
const NOISE_NSIGMA: f64 = 3.0;
const MIN_STACK_PIXELS: usize = 10;
const MIN_NOISE_PIXELS: usize = 5;

/// Rest wavelengths of the lines stacked for each class.
pub fn stack_lines(class: LineClass) -> &'static [f64] {
    match class {
        LineClass::Narrow => &[3728.483, 4960.295, 5008.239],
        LineClass::Balmer => &[4862.683, 6564.613],
        LineClass::Broad => &[1215.670, 1398.2625, 1549.4795, 2797.77],
    }
}

/// Accepted width for one class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidthEstimate {
    pub sigma: f64,
    pub snr: f64,
}

/// Continuum-subtracted pixels in velocity space.
struct Stack {
    velocity: Vec<f64>,
    residual: Vec<f64>,
    ivar: Vec<f64>,
}

fn build_stack(
    wave: &[f64],
    flux: &[f64],
    ivar: &[f64],
    smooth: &SmoothContinuum,
    redshift: f64,
    restwaves: &[f64],
    half_kms: f64,
) -> Stack {
    let mut stack = Stack {
        velocity: Vec::new(),
        residual: Vec::new(),
        ivar: Vec::new(),
    };
    for &rest in restwaves {
        let center = rest * (1.0 + redshift);
        let lo = center * (1.0 - half_kms / C_LIGHT_KMS);
        let hi = center * (1.0 + half_kms / C_LIGHT_KMS);
        let start = wave.partition_point(|w| *w < lo);
        let end = wave.partition_point(|w| *w <= hi);
        for i in start..end {
            if ivar[i] <= 0.0 {
                continue;
            }
            stack.velocity.push(C_LIGHT_KMS * (wave[i] / center - 1.0));
            stack.residual.push(flux[i] - smooth.continuum[i]);
            stack.ivar.push(ivar[i]);
        }
    }
    stack
}

/// One stack-and-fit attempt with trial width `sigma0` (km/s).
fn fit_stack(
    wave: &[f64],
    flux: &[f64],
    ivar: &[f64],
    smooth: &SmoothContinuum,
    redshift: f64,
    class: LineClass,
    sigma0: f64,
    cfg: &LineMaskConfig,
) -> Option<WidthEstimate> {
    let stack = build_stack(
        wave,
        flux,
        ivar,
        smooth,
        redshift,
        stack_lines(class),
        WINDOW_NSIGMA * sigma0,
    );
    if stack.velocity.len() < MIN_STACK_PIXELS {
        log::debug!(
            "{} lines: only {} pixels in the stack, keeping the nominal width",
            class.as_str(),
            stack.velocity.len()
        );
        return None;
    }

    let outer: Vec<f64> = stack
        .velocity
        .iter()
        .zip(&stack.residual)
        .filter_map(|(v, r)| (v.abs() > NOISE_NSIGMA * sigma0).then_some(*r))
        .collect();
    if outer.len() < MIN_NOISE_PIXELS {
        return None;
    }
    let noise = iqr_sigma(&outer)?;
    if !(noise > 0.0) {
        return None;
    }

    let peak = stack
        .velocity
        .iter()
        .zip(&stack.residual)
        .filter_map(|(v, r)| (v.abs() <= sigma0).then_some(*r))
        .fold(f64::NEG_INFINITY, f64::max);
    if !(peak > 0.0) {
        return None;
    }

    let fit = fit_gaussian(
        &stack.velocity,
        &stack.residual,
        &stack.ivar,
        [peak, sigma0, 0.0],
        &LmConfig::default(),
    )?;
    let sigma = fit.sigma.abs();
    let snr = fit.amplitude / noise;
    let [lo, hi] = class.bounds(cfg);
    if fit.amplitude > 0.0 && sigma > 0.0 && snr >= cfg.min_width_snr && sigma >= lo && sigma <= hi {
        Some(WidthEstimate { sigma, snr })
    } else {
        log::debug!(
            "{} lines: rejected width {sigma:.1} km/s (amplitude {:.3}, S/N {snr:.2})",
            class.as_str(),
            fit.amplitude
        );
        None
    }
}

/// Width of one class, refit once with a wider stack when the first
/// estimate exceeds the nominal width.
pub fn estimate_class_width(
    wave: &[f64],
    flux: &[f64],
    ivar: &[f64],
    smooth: &SmoothContinuum,
    redshift: f64,
    class: LineClass,
    cfg: &LineMaskConfig,
) -> Option<WidthEstimate> {
    let nominal = class.nominal_sigma(cfg);
    let first = fit_stack(wave, flux, ivar, smooth, redshift, class, nominal, cfg)?;
    if first.sigma <= nominal {
        return Some(first);
    }
    Some(fit_stack(wave, flux, ivar, smooth, redshift, class, first.sigma, cfg).unwrap_or(first))
}

/// Widths of every class, nominal where no estimate was accepted (S/N is
/// then reported as zero).
pub fn estimate_line_widths(
    wave: &[f64],
    flux: &[f64],
    ivar: &[f64],
    smooth: &SmoothContinuum,
    redshift: f64,
    cfg: &LineMaskConfig,
) -> LineWidths {
    let get = |class: LineClass| {
        estimate_class_width(wave, flux, ivar, smooth, redshift, class, cfg)
            .map_or((class.nominal_sigma(cfg), 0.0), |e| (e.sigma, e.snr))
    };
    let (narrow, narrow_snr) = get(LineClass::Narrow);
    let (balmer, balmer_snr) = get(LineClass::Balmer);
    let (broad, broad_snr) = get(LineClass::Broad);
    LineWidths {
        narrow,
        narrow_snr,
        balmer,
        balmer_snr,
        broad,
        broad_snr,
    }
}

impl LineWidths {
    pub fn for_class(&self, class: LineClass) -> f64 {
        match class {
            LineClass::Narrow => self.narrow,
            LineClass::Balmer => self.balmer,
            LineClass::Broad => self.broad,
        }
    }
}
