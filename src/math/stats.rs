//! Robust statistics on plain slices.
//!
//! Callers filter masked pixels before handing values in. Empty inputs give
//! `None`.

/// Median (mean of the two central values for even lengths).
pub fn median(values: &[f64]) -> Option<f64> {
    let mut work: Vec<f64> = values.to_vec();
    median_mut(&mut work)
}

/// Median computed in place; reorders `values`.
pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    let (lower, upper_mid, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let upper = *upper_mid;
    if n % 2 == 1 {
        return Some(upper);
    }
    let lower_max = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(0.5 * (lower_max + upper))
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (ddof = 0).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mu = mean(values)?;
    let var = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Linear-interpolated percentile, `q` in `[0, 100]`.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

/// Robust sigma from the interquartile range (`IQR / 1.349`).
pub fn iqr_sigma(values: &[f64]) -> Option<f64> {
    let q25 = percentile(values, 25.0)?;
    let q75 = percentile(values, 75.0)?;
    Some((q75 - q25) / 1.349)
}

/// Statistics of the values surviving iterative sigma clipping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippedStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub kept: usize,
}

/// Iterative sigma clipping about the median.
///
/// Each round rejects values more than `nsigma` standard deviations from the
/// median of the current survivors; stops when nothing changes or after
/// `max_iters` rounds.
pub fn sigma_clipped_stats(values: &[f64], nsigma: f64, max_iters: usize) -> Option<ClippedStats> {
    let mut kept: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if kept.is_empty() {
        return None;
    }

    for _ in 0..max_iters {
        let med = median(&kept)?;
        let sd = std_dev(&kept)?;
        let before = kept.len();
        let survivors: Vec<f64> = kept
            .iter()
            .copied()
            .filter(|v| (v - med).abs() <= nsigma * sd)
            .collect();
        if survivors.is_empty() || survivors.len() == before {
            break;
        }
        kept = survivors;
    }

    Some(ClippedStats {
        mean: mean(&kept)?,
        median: median(&kept)?,
        std: std_dev(&kept)?,
        kept: kept.len(),
    })
}

/// Running median of odd width `size`; edges repeat the nearest sample.
pub fn median_filter(values: &[f64], size: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 || size <= 1 {
        return values.to_vec();
    }
    let half = size / 2;
    let mut window = vec![0.0; 2 * half + 1];
    (0..n)
        .map(|i| {
            for (k, slot) in window.iter_mut().enumerate() {
                let j = (i + k).saturating_sub(half).min(n - 1);
                *slot = values[j];
            }
            median_mut(&mut window).unwrap_or(values[i])
        })
        .collect()
}

/// Centred finite differences with one-sided ends (`numpy.gradient` on unit
/// spacing).
pub fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..n)
            .map(|i| {
                if i == 0 {
                    values[1] - values[0]
                } else if i == n - 1 {
                    values[n - 1] - values[n - 2]
                } else {
                    0.5 * (values[i + 1] - values[i - 1])
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_handles_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&v, 50.0), Some(3.0));
        assert_eq!(percentile(&v, 25.0), Some(2.0));
        assert!((percentile(&v, 10.0).unwrap() - 1.4).abs() < 1e-12);
    }

    #[test]
    fn sigma_clip_rejects_outlier() {
        let mut v = vec![1.0; 20];
        for (i, x) in v.iter_mut().enumerate() {
            *x += 0.01 * (i % 5) as f64;
        }
        v.push(50.0);
        let stats = sigma_clipped_stats(&v, 2.0, 5).unwrap();
        assert_eq!(stats.kept, 20);
        assert!((stats.median - 1.02).abs() < 1e-12);
        assert!(stats.std < 0.02);
    }

    #[test]
    fn median_filter_removes_spike_and_keeps_edges() {
        let v = [1.0, 1.0, 9.0, 1.0, 1.0, 2.0];
        let out = median_filter(&v, 3);
        assert_eq!(out, vec![1.0, 1.0, 1.0, 1.0, 1.0, 2.0]);
    }

    #[test]
    fn gradient_matches_numpy() {
        assert_eq!(gradient(&[1.0, 2.0, 4.0, 7.0]), vec![1.0, 1.5, 2.5, 3.0]);
    }
}
