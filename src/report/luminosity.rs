//! Rest-frame continuum luminosities and line-continuum flux densities.

use crate::domain::{FLUXNORM, Luminosities};
use crate::math::interp_one;
use crate::models::Cosmology;

const MPC_CM: f64 = 3.085_677_581_491_367e24;

/// Rest wavelengths of the continuum flux densities: [OII] 3727, Hβ,
/// [OIII] 5007, Hα.
pub const CFLUX_LINES: [f64; 4] = [3728.483, 4862.683, 5008.239, 6564.613];

/// Luminosities of the best-fit continuum.
///
/// `continuum` is the observed-frame model on `rest_wave·(1+z)` in model
/// units. At zero redshift the luminosities are left at zero.
pub fn continuum_luminosities(
    rest_wave: &[f64],
    continuum: &[f64],
    redshift: f64,
    cosmology: &dyn Cosmology,
) -> Luminosities {
    let at = |lambda: f64| interp_one(lambda, rest_wave, continuum);
    let [c3727, c4861, c5007, c6563] = CFLUX_LINES.map(at);
    let mut out = Luminosities {
        cflux_3727: c3727,
        cflux_4861: c4861,
        cflux_5007: c5007,
        cflux_6563: c6563,
        ..Luminosities::default()
    };
    if redshift <= 0.0 {
        log::debug!("no luminosities at z = {redshift}");
        return out;
    }

    let dl = cosmology.luminosity_distance(redshift) * MPC_CM;
    // λ L_λ (rest) in erg/s.
    let lambda_l = |lambda: f64| {
        let flam = at(lambda) / FLUXNORM;
        log10_or_zero(4.0 * std::f64::consts::PI * dl * dl * (1.0 + redshift) * lambda * flam)
    };
    out.log_lnu_1500 = lambda_l(1500.0);
    out.log_lnu_2800 = lambda_l(2800.0);
    out.log_l_5100 = lambda_l(5100.0);
    out
}

fn log10_or_zero(x: f64) -> f64 {
    if x > 0.0 { x.log10() } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FlatLambdaCdm;

    #[test]
    fn flat_continuum_scales_with_wavelength() {
        let wave: Vec<f64> = (0..9000).map(|i| 1000.0 + i as f64).collect();
        let continuum = vec![2.0; wave.len()];
        let lum = continuum_luminosities(&wave, &continuum, 0.1, &FlatLambdaCdm::default());
        assert!((lum.log_l_5100 - lum.log_lnu_1500 - (5100.0f64 / 1500.0).log10()).abs() < 1e-9);
        assert!(lum.log_lnu_2800 > 40.0 && lum.log_lnu_2800 < 50.0);
        assert_eq!(lum.cflux_6563, 2.0);
    }

    #[test]
    fn rest_frame_input_has_no_luminosity() {
        let wave: Vec<f64> = (0..9000).map(|i| 1000.0 + i as f64).collect();
        let lum = continuum_luminosities(&wave, &vec![1.0; wave.len()], 0.0, &FlatLambdaCdm::default());
        assert_eq!(lum.log_l_5100, 0.0);
        assert_eq!(lum.cflux_3727, 1.0);
    }
}
