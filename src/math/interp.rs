//! Interpolation and flux-conserving resampling on monotonic grids.

use crate::error::AppError;

/// Piecewise-linear interpolation of `(xp, fp)` at `x`.
///
/// Outside `[xp[0], xp[n-1]]` the end values are repeated. `xp` must be
/// increasing.
pub fn interp(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    x.iter().map(|&xi| interp_one(xi, xp, fp)).collect()
}

pub fn interp_one(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return 0.0;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    let hi = xp[..n].partition_point(|v| *v <= x);
    let lo = hi - 1;
    let span = xp[hi] - xp[lo];
    if span <= 0.0 {
        return fp[lo];
    }
    fp[lo] + (fp[hi] - fp[lo]) * (x - xp[lo]) / span
}

/// Bin edges for a grid of bin centres: midpoints between neighbours, with
/// the outer edges extrapolated by half a bin.
pub fn centers_to_edges(centers: &[f64]) -> Vec<f64> {
    let n = centers.len();
    match n {
        0 => Vec::new(),
        1 => vec![centers[0] - 0.5, centers[0] + 0.5],
        _ => {
            let mut edges = Vec::with_capacity(n + 1);
            edges.push(centers[0] - 0.5 * (centers[1] - centers[0]));
            for w in centers.windows(2) {
                edges.push(0.5 * (w[0] + w[1]));
            }
            edges.push(centers[n - 1] + 0.5 * (centers[n - 1] - centers[n - 2]));
            edges
        }
    }
}

/// Resample `(x, y)` onto bins centred on `centers`, conserving the integral.
///
/// Each output value is the mean of the piecewise-linear input over its bin.
/// Every bin edge must lie inside `[x[0], x[n-1]]`.
pub fn trapz_rebin(x: &[f64], y: &[f64], centers: &[f64]) -> Result<Vec<f64>, AppError> {
    if x.len() != y.len() {
        return Err(AppError::invalid(format!(
            "rebin input has {} wavelengths but {} fluxes",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(AppError::invalid("rebin input needs at least two samples"));
    }
    let edges = centers_to_edges(centers);
    if edges.is_empty() {
        return Ok(Vec::new());
    }
    let (xmin, xmax) = (x[0], x[x.len() - 1]);
    if edges[0] < xmin || edges[edges.len() - 1] > xmax {
        return Err(AppError::invalid(format!(
            "rebin edges [{:.3}, {:.3}] extend beyond input range [{:.3}, {:.3}]",
            edges[0],
            edges[edges.len() - 1],
            xmin,
            xmax
        )));
    }

    let mut out = Vec::with_capacity(centers.len());
    let mut j = x.partition_point(|v| *v <= edges[0]);
    for bin in edges.windows(2) {
        let (lo, hi) = (bin[0], bin[1]);
        let width = hi - lo;
        if width <= 0.0 {
            return Err(AppError::invalid("rebin centres must be strictly increasing"));
        }

        let mut xa = lo;
        let mut ya = interp_one(lo, x, y);
        let mut area = 0.0;
        while j < x.len() && x[j] < hi {
            if x[j] > xa {
                area += 0.5 * (ya + y[j]) * (x[j] - xa);
                xa = x[j];
                ya = y[j];
            }
            j += 1;
        }
        let yb = interp_one(hi, x, y);
        area += 0.5 * (ya + yb) * (hi - xa);
        out.push(area / width);
    }
    Ok(out)
}
