//! One-line summaries for the logs.
//!
//! Formatting lives here so the fitting code only logs what these return.

use crate::domain::{ContinuumFit, ParamFit, PhotDerived, PhotometricFit, SpecDerived};

/// `A(V)=0.512±0.030 mag`, or the adopted value and status when the grid
/// was not refined.
pub fn format_param(fit: &ParamFit) -> String {
    let label = fit.kind.label();
    let unit = fit.kind.unit();
    match fit.sigma() {
        Some(sigma) => format!("{label}={:.3}±{sigma:.3} {unit}", fit.value),
        None => format!("{label}={:.3} {unit} ({})", fit.value, fit.status.as_str()),
    }
}

pub fn format_continuum(id: &str, fit: &ContinuumFit, derived: &SpecDerived) -> String {
    format!(
        "{id}: spectrum chi2={:.3} {} {} Dn(4000)={:.3} age={:.2} Gyr logM*={:.2} snr={}",
        fit.chi2,
        format_param(&fit.av),
        format_param(&fit.vdisp),
        derived.dn4000.value,
        derived.stellar.age_gyr,
        derived.stellar.log_mstar,
        fmt_vec(&fit.snr, 1),
    )
}

pub fn format_photometric(id: &str, fit: &PhotometricFit, derived: &PhotDerived) -> String {
    let mut out = format!(
        "{id}: photometry chi2={:.3} {} Dn(4000)={:.3} age={:.2} Gyr logM*={:.2}",
        fit.chi2,
        format_param(&fit.av),
        derived.dn4000_model,
        derived.stellar.age_gyr,
        derived.stellar.log_mstar,
    );
    for m in &derived.magnitudes {
        out.push_str(&format!(" M_{}={:.2}", m.band, m.absmag));
    }
    out
}

pub fn format_batch_summary(n_ok: usize, n_failed: usize, seconds: f64) -> String {
    format!(
        "fitted {} object(s): {n_ok} ok, {n_failed} failed in {seconds:.1} s",
        n_ok + n_failed
    )
}

fn fmt_vec(v: &[f64], precision: usize) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.precision$}")).collect();
    format!("[{}]", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitStatus, ParamKind};

    #[test]
    fn refined_parameter_shows_error() {
        let fit = ParamFit {
            kind: ParamKind::Av,
            value: 0.5123,
            ivar: 400.0,
            chi2_min: 1.0,
            status: FitStatus::Refined,
        };
        assert_eq!(format_param(&fit), "A(V)=0.512±0.050 mag");
    }

    #[test]
    fn fallback_parameter_shows_status() {
        let fit = ParamFit::not_fitted(ParamKind::Vdisp, 150.0);
        assert_eq!(format_param(&fit), "vdisp=150.000 km/s (not_fitted)");
    }

    #[test]
    fn vectors_use_requested_precision() {
        assert_eq!(fmt_vec(&[1.24, 3.0], 1), "[1.2,3.0]");
        assert_eq!(format_batch_summary(3, 1, 2.04), "fitted 4 object(s): 3 ok, 1 failed in 2.0 s");
    }
}
