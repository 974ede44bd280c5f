//! Velocity-dispersion broadening.
//!
//! Templates are sampled at constant velocity (`pixkms` km/s per pixel) up to
//! the library's break wavelength, so a Gaussian of σ = vdisp km/s is a
//! Gaussian of `vdisp / pixkms` pixels there. Redward of the break the
//! sampling changes and the flux is passed through unbroadened.

use nalgebra::DMatrix;

/// Normalised Gaussian weights over `[-radius, radius]`, radius `⌊4σ + 0.5⌋`.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma + 0.5).floor() as i64;
    let mut weights: Vec<f64> = (-radius..=radius)
        .map(|k| (-0.5 * (k as f64 / sigma).powi(2)).exp())
        .collect();
    let norm: f64 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= norm);
    weights
}

/// Map an out-of-range index by mirror reflection about the array edges
/// (`d c b a | a b c d | d c b a`).
fn reflect_index(i: i64, n: usize) -> usize {
    let n = n as i64;
    let period = 2 * n;
    let mut k = i.rem_euclid(period);
    if k >= n {
        k = period - 1 - k;
    }
    k as usize
}

/// 1-D Gaussian filter with reflecting boundaries; `sigma` in pixels.
pub fn gaussian_filter(values: &[f64], sigma: f64) -> Vec<f64> {
    let n = values.len();
    if n == 0 || !(sigma > 0.0) {
        return values.to_vec();
    }
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as i64;
    (0..n as i64)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * values[reflect_index(i + k as i64 - radius, n)])
                .sum()
        })
        .collect()
}

/// Broaden one spectrum to `vdisp` km/s over its first `n_split` pixels.
/// `vdisp <= 0` returns the input unchanged.
pub fn broaden(flux: &[f64], vdisp: f64, pixkms: f64, n_split: usize) -> Vec<f64> {
    if !(vdisp > 0.0) || !(pixkms > 0.0) {
        return flux.to_vec();
    }
    let n_split = n_split.min(flux.len());
    let mut out = gaussian_filter(&flux[..n_split], vdisp / pixkms);
    out.extend_from_slice(&flux[n_split..]);
    out
}

/// Column-wise [`broaden`] of a `npix × nmodel` matrix.
pub fn broaden_columns(flux: &DMatrix<f64>, vdisp: f64, pixkms: f64, n_split: usize) -> DMatrix<f64> {
    if !(vdisp > 0.0) {
        return flux.clone();
    }
    let mut out = flux.clone();
    for (c, mut column) in out.column_iter_mut().enumerate() {
        let src: Vec<f64> = flux.column(c).iter().copied().collect();
        let smoothed = broaden(&src, vdisp, pixkms, n_split);
        column.iter_mut().zip(smoothed).for_each(|(dst, v)| *dst = v);
    }
    out
}
