//! Distances and ages in a flat ΛCDM universe.

use crate::domain::C_LIGHT_KMS;

/// Hubble time for H0 = 1 km/s/Mpc, in Gyr.
const HUBBLE_TIME_GYR_UNIT_H0: f64 = 977.792_221_5;

/// Distance/age lookup consumed by the generator and the derived quantities.
pub trait Cosmology: Send + Sync {
    /// Luminosity distance in Mpc.
    fn luminosity_distance(&self, z: f64) -> f64;

    /// Age of the universe at redshift `z`, in Gyr.
    fn age(&self, z: f64) -> f64;

    /// Distance modulus `5 log10(D_L / 10 pc)`.
    fn distance_modulus(&self, z: f64) -> f64 {
        5.0 * (self.luminosity_distance(z) * 1e6 / 10.0).log10()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatLambdaCdm {
    pub h0: f64,
    pub om0: f64,
}

impl Default for FlatLambdaCdm {
    fn default() -> Self {
        Self { h0: 70.0, om0: 0.3 }
    }
}

impl FlatLambdaCdm {
    fn ode0(&self) -> f64 {
        1.0 - self.om0
    }

    fn inv_efunc(&self, z: f64) -> f64 {
        1.0 / (self.om0 * (1.0 + z).powi(3) + self.ode0()).sqrt()
    }

    /// Line-of-sight comoving distance, Mpc.
    pub fn comoving_distance(&self, z: f64) -> f64 {
        if z <= 0.0 {
            return 0.0;
        }
        C_LIGHT_KMS / self.h0 * simpson(|zp| self.inv_efunc(zp), 0.0, z, 2000)
    }

    pub fn hubble_time(&self) -> f64 {
        HUBBLE_TIME_GYR_UNIT_H0 / self.h0
    }
}

impl Cosmology for FlatLambdaCdm {
    fn luminosity_distance(&self, z: f64) -> f64 {
        (1.0 + z) * self.comoving_distance(z)
    }

    fn age(&self, z: f64) -> f64 {
        // t = (1/H0) ∫_0^a √a' / √(Ωm + ΩΛ a'³) da'
        let a = 1.0 / (1.0 + z.max(0.0));
        let integral = simpson(
            |ap: f64| ap.sqrt() / (self.om0 + self.ode0() * ap.powi(3)).sqrt(),
            0.0,
            a,
            2000,
        );
        self.hubble_time() * integral
    }
}

/// Composite Simpson rule with `n` (rounded up to even) intervals.
fn simpson<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, n: usize) -> f64 {
    let n = if n % 2 == 0 { n.max(2) } else { n + 1 };
    let h = (b - a) / n as f64;
    let mut sum = f(a) + f(b);
    for i in 1..n {
        let x = a + i as f64 * h;
        sum += if i % 2 == 1 { 4.0 * f(x) } else { 2.0 * f(x) };
    }
    sum * h / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luminosity_distance_at_z_0_1() {
        let cosmo = FlatLambdaCdm::default();
        let dl = cosmo.luminosity_distance(0.1);
        assert!((dl - 460.0).abs() < 1.0, "D_L = {dl}");
    }

    #[test]
    fn age_matches_closed_form() {
        let cosmo = FlatLambdaCdm::default();
        let ol = 0.7_f64;
        for z in [0.0, 0.5, 2.0] {
            let analytic = 2.0 / (3.0 * ol.sqrt()) * ((ol / 0.3).sqrt() * (1.0_f64 + z).powf(-1.5)).asinh()
                * cosmo.hubble_time();
            assert!((cosmo.age(z) - analytic).abs() < 1e-3, "z={z}");
        }
        assert!((cosmo.age(0.0) - 13.47).abs() < 0.01);
    }

    #[test]
    fn distance_modulus_is_consistent() {
        let cosmo = FlatLambdaCdm::default();
        let dm = cosmo.distance_modulus(0.1);
        assert!((dm - 38.31).abs() < 0.01);
    }
}
