//! Fit results and derived quantities.
//!
//! Lightweight, serialisable records: created once per object, never mutated
//! after the pipeline hands them to the result writer.

use serde::Serialize;

use crate::domain::{FitStatus, ParamKind, PhotSystem};

/// Best value of one nuisance parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParamFit {
    pub kind: ParamKind,
    pub value: f64,
    /// Inverse variance of `value`; zero when the refinement failed.
    pub ivar: f64,
    /// Interpolated minimum reduced chi-square.
    pub chi2_min: f64,
    pub status: FitStatus,
}

impl ParamFit {
    /// Parameter held at `nominal` without being scanned.
    pub fn not_fitted(kind: ParamKind, nominal: f64) -> Self {
        Self {
            kind,
            value: nominal,
            ivar: 0.0,
            chi2_min: 0.0,
            status: FitStatus::NotFitted,
        }
    }

    pub fn is_refined(&self) -> bool {
        self.status == FitStatus::Refined && self.ivar > 0.0
    }

    pub fn sigma(&self) -> Option<f64> {
        (self.ivar > 0.0).then(|| 1.0 / self.ivar.sqrt())
    }
}

/// Spectroscopic continuum fit.
#[derive(Debug, Clone, Serialize)]
pub struct ContinuumFit {
    /// One coefficient per template of the full library (zero for templates
    /// older than the universe at the object's redshift).
    pub coeff: Vec<f64>,
    /// Reduced chi-square of the final solve.
    pub chi2: f64,
    pub av: ParamFit,
    pub vdisp: ParamFit,
    /// Median S/N per channel.
    pub snr: Vec<f64>,
    /// Best-fit continuum per channel, on the channel grids.
    #[serde(skip)]
    pub models: Vec<Vec<f64>>,
    /// Best-fit continuum on the observed-frame template grid.
    #[serde(skip)]
    pub native_model: Vec<f64>,
}

/// Broadband photometric continuum fit.
#[derive(Debug, Clone, Serialize)]
pub struct PhotometricFit {
    pub coeff: Vec<f64>,
    pub chi2: f64,
    pub av: ParamFit,
    /// Synthesised photometry of the best model, nanomaggies.
    pub model_nanomaggies: Vec<f64>,
    /// Best-fit continuum on the observed-frame template grid.
    #[serde(skip)]
    pub native_model: Vec<f64>,
}

/// D(4000)-style break strength.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BreakMeasurement {
    pub value: f64,
    pub ivar: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandMagnitude {
    pub band: String,
    pub kcorr: f64,
    pub absmag: f64,
    pub absmag_ivar: f64,
}

/// Rest-frame continuum luminosities and fluxes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Luminosities {
    /// log10 νLν at 1500 Å, erg/s.
    pub log_lnu_1500: f64,
    /// log10 νLν at 2800 Å, erg/s.
    pub log_lnu_2800: f64,
    /// log10 λLλ at 5100 Å, erg/s.
    pub log_l_5100: f64,
    /// Observed-frame continuum flux density near the strong lines,
    /// 1e-17 erg/s/cm²/Å.
    pub cflux_3727: f64,
    pub cflux_4861: f64,
    pub cflux_5007: f64,
    pub cflux_6563: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StellarSummary {
    /// Light-weighted age, Gyr (−1 when every coefficient vanished).
    pub age_gyr: f64,
    pub log_mstar: f64,
    pub sfr: f64,
    pub zzsun: f64,
}

/// Emission-line widths measured by the line-mask estimator, km/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineWidths {
    pub narrow: f64,
    pub narrow_snr: f64,
    pub balmer: f64,
    pub balmer_snr: f64,
    pub broad: f64,
    pub broad_snr: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpecDerived {
    pub stellar: StellarSummary,
    pub d4000: BreakMeasurement,
    pub dn4000: BreakMeasurement,
    pub d4000_model: f64,
    pub dn4000_model: f64,
    pub luminosities: Luminosities,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotDerived {
    pub stellar: StellarSummary,
    pub d4000_model: f64,
    pub dn4000_model: f64,
    pub magnitudes: Vec<BandMagnitude>,
    pub luminosities: Luminosities,
}

/// An object whose fit raised an error; the rest of the batch carries on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedObject {
    pub id: String,
    pub error: String,
    pub exit_code: u8,
}

/// Everything written out for one object.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectResult {
    pub id: String,
    pub redshift: f64,
    pub photsys: PhotSystem,
    pub line_widths: Option<LineWidths>,
    pub spec: Option<ContinuumFit>,
    pub spec_derived: Option<SpecDerived>,
    pub phot: Option<PhotometricFit>,
    pub phot_derived: Option<PhotDerived>,
    /// Observed broadband and fibre fluxes, echoed for convenience.
    pub flux_nanomaggies: Vec<(String, f64, f64)>,
    pub fiber_nanomaggies: Vec<(String, f64)>,
}
