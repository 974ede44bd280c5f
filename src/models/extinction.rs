//! Milky-Way extinction: Cardelli, Clayton & Mathis (1989) with the
//! O'Donnell (1994) optical/near-IR coefficients.

/// `A(λ)/A(V)` for inverse wavelength `x` in μm⁻¹, clamped to `[0.3, 10]`.
fn ccm_a_over_av(x: f64, rv: f64) -> f64 {
    let x = x.clamp(0.3, 10.0);
    let (a, b) = if x < 1.1 {
        let xp = x.powf(1.61);
        (0.574 * xp, -0.527 * xp)
    } else if x < 3.3 {
        let y = x - 1.82;
        let a = poly(
            y,
            &[1.0, 0.104, -0.609, 0.701, 1.137, -1.718, -0.827, 1.647, -0.505],
        );
        let b = poly(
            y,
            &[0.0, 1.952, 2.908, -3.989, -7.985, 11.102, 5.491, -10.805, 3.347],
        );
        (a, b)
    } else if x < 8.0 {
        let (fa, fb) = if x >= 5.9 {
            let d = x - 5.9;
            (-0.04473 * d * d - 0.009779 * d * d * d, 0.2130 * d * d + 0.1207 * d * d * d)
        } else {
            (0.0, 0.0)
        };
        let a = 1.752 - 0.316 * x - 0.104 / ((x - 4.67).powi(2) + 0.341) + fa;
        let b = -3.090 + 1.825 * x + 1.206 / ((x - 4.62).powi(2) + 0.263) + fb;
        (a, b)
    } else {
        let d = x - 8.0;
        (
            poly(d, &[-1.073, -0.628, 0.137, -0.070]),
            poly(d, &[13.670, 4.257, -0.420, 0.374]),
        )
    };
    a + b / rv
}

fn poly(x: f64, coeffs: &[f64]) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Extinction in magnitudes at each wavelength (Å) for the given E(B−V).
pub fn mw_extinction_mag(wave: &[f64], ebv: f64, rv: f64) -> Vec<f64> {
    let av = rv * ebv;
    wave.iter()
        .map(|w| av * ccm_a_over_av(1e4 / w, rv))
        .collect()
}

/// Fraction of light transmitted through the Milky Way.
pub fn mw_transmission(wave: &[f64], ebv: f64, rv: f64) -> Vec<f64> {
    if ebv == 0.0 {
        return vec![1.0; wave.len()];
    }
    mw_extinction_mag(wave, ebv, rv)
        .into_iter()
        .map(|a| 10f64.powf(-0.4 * a))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v_band_extinction_equals_av() {
        // x = 1.82 μm⁻¹ is the V-band reference: A(λ)/A(V) = 1.
        let wave = 1e4 / 1.82;
        let a = mw_extinction_mag(&[wave], 0.1, 3.1);
        assert!((a[0] - 0.31).abs() < 1e-10);
    }

    #[test]
    fn blue_is_more_extincted() {
        let t = mw_transmission(&[3500.0, 5000.0, 9000.0], 0.05, 3.1);
        assert!(t[0] < t[1] && t[1] < t[2] && t[2] < 1.0);
    }

    #[test]
    fn zero_ebv_is_transparent() {
        assert_eq!(mw_transmission(&[4000.0, 6000.0], 0.0, 3.1), vec![1.0, 1.0]);
    }
}
