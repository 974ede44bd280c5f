//! Small shared enums and constants.

use serde::{Deserialize, Serialize};

/// Speed of light in km/s.
pub const C_LIGHT_KMS: f64 = 299_792.458;

/// Model fluxes are carried in units of 1e-17 erg/s/cm²/Å.
pub const FLUXNORM: f64 = 1e17;

/// Template spectra are normalised to this stellar mass (M☉), so fitted
/// coefficients are masses in units of `MASSNORM`.
pub const MASSNORM: f64 = 1e10;

/// Photometric system of the imaging; selects the broadband filter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotSystem {
    /// DECam grz + WISE W1–W4.
    South,
    /// BASS g / MzLS z + WISE W1–W4.
    North,
}

impl PhotSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotSystem::South => "S",
            PhotSystem::North => "N",
        }
    }
}

/// Which nuisance parameter a grid scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    /// Dust attenuation A(V), magnitudes.
    Av,
    /// Stellar velocity dispersion, km/s.
    Vdisp,
}

impl ParamKind {
    pub fn label(&self) -> &'static str {
        match self {
            ParamKind::Av => "A(V)",
            ParamKind::Vdisp => "vdisp",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            ParamKind::Av => "mag",
            ParamKind::Vdisp => "km/s",
        }
    }
}

/// Outcome of the parabolic refinement of a chi-square grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    /// Interior minimum refined by a parabola with positive curvature.
    Refined,
    /// Minimum sits on the grid boundary; nominal value adopted.
    EdgeMinimum,
    /// Parabola with non-positive curvature or vertex outside the window.
    Degenerate,
    /// Parameter was not scanned (e.g. vdisp when not solving for it).
    NotFitted,
}

impl FitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitStatus::Refined => "refined",
            FitStatus::EdgeMinimum => "edge",
            FitStatus::Degenerate => "degenerate",
            FitStatus::NotFitted => "not_fitted",
        }
    }
}
