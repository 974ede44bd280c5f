//! Stellar-population summaries from the fitted coefficients.

use crate::domain::{MASSNORM, StellarSummary, TemplateInfo};

/// Light-weighted (coefficient-weighted) mean age in Gyr, or −1 when no
/// coefficient is positive.
pub fn mean_age(coeff: &[f64], info: &[TemplateInfo]) -> f64 {
    let total: f64 = coeff.iter().filter(|c| **c > 0.0).sum();
    if total <= 0.0 {
        log::warn!("coefficients are all zero");
        return -1.0;
    }
    coeff
        .iter()
        .zip(info)
        .filter(|(c, _)| **c > 0.0)
        .map(|(c, t)| c * t.age)
        .sum::<f64>()
        / total
        / 1e9
}

pub fn stellar_summary(coeff: &[f64], info: &[TemplateInfo]) -> StellarSummary {
    let mass: f64 = coeff.iter().zip(info).map(|(c, t)| c * t.mstar).sum::<f64>() * MASSNORM;
    let sfr: f64 = coeff.iter().zip(info).map(|(c, t)| c * t.sfr).sum::<f64>() * MASSNORM;
    let zzsun = if mass > 0.0 {
        coeff.iter().zip(info).map(|(c, t)| c * t.mstar * t.zzsun).sum::<f64>() * MASSNORM / mass
    } else {
        0.0
    };
    StellarSummary {
        age_gyr: mean_age(coeff, info),
        log_mstar: if mass > 0.0 { mass.log10() } else { 0.0 },
        sfr,
        zzsun,
    }
}
