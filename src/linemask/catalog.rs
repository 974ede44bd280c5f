//! Built-in emission-line catalog.
//!
//! Rest-frame vacuum wavelengths (Å). The amplitude is a rough strength
//! relative to the brightest line of the same kind in a typical star-forming
//! galaxy; weak lines are still masked in the final pass but are ignored when
//! building the pass-1 smooth continuum.

use serde::{Deserialize, Serialize};

use crate::domain::LineMaskConfig;

/// Kinematic class of a line. Lines of one class share a width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineClass {
    /// Forbidden and other narrow nebular lines.
    Narrow,
    /// Balmer and Paschen recombination lines.
    Balmer,
    /// UV and other permitted lines that can be broad.
    Broad,
}

impl LineClass {
    pub const ALL: [LineClass; 3] = [LineClass::Narrow, LineClass::Balmer, LineClass::Broad];

    pub fn as_str(&self) -> &'static str {
        match self {
            LineClass::Narrow => "narrow",
            LineClass::Balmer => "balmer",
            LineClass::Broad => "broad",
        }
    }

    /// Nominal Gaussian σ, km/s.
    pub fn nominal_sigma(&self, cfg: &LineMaskConfig) -> f64 {
        match self {
            LineClass::Narrow => cfg.sigma_narrow,
            LineClass::Balmer => cfg.sigma_balmer,
            LineClass::Broad => cfg.sigma_broad,
        }
    }

    /// Accepted `[min, max]` σ, km/s.
    pub fn bounds(&self, cfg: &LineMaskConfig) -> [f64; 2] {
        match self {
            LineClass::Narrow => cfg.bounds_narrow,
            LineClass::Balmer => cfg.bounds_balmer,
            LineClass::Broad => cfg.bounds_broad,
        }
    }

    /// σ (km/s) of the wide pass-1 mask.
    pub fn pass1_sigma(&self, cfg: &LineMaskConfig) -> f64 {
        match self {
            LineClass::Narrow => cfg.mask_kms_narrow,
            LineClass::Balmer => cfg.mask_kms_balmer,
            LineClass::Broad => cfg.mask_kms_broad,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogLine {
    pub name: String,
    pub restwave: f64,
    pub class: LineClass,
    pub amplitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineCatalog {
    lines: Vec<CatalogLine>,
}

/// Name of Lyman-α in the default catalog; always treated as strong.
pub const LYMAN_ALPHA: &str = "lya";

const DEFAULT_LINES: [(&str, f64, LineClass, f64); 33] = [
    (LYMAN_ALPHA, 1215.670, LineClass::Broad, 1.0),
    ("nv_1240", 1240.810, LineClass::Broad, 0.3),
    ("siiv_1398", 1398.2625, LineClass::Broad, 0.3),
    ("civ_1549", 1549.4795, LineClass::Broad, 1.0),
    ("heii_1640", 1640.420, LineClass::Broad, 0.3),
    ("ciii_1908", 1908.734, LineClass::Broad, 1.0),
    ("mgii_2796", 2796.352, LineClass::Broad, 1.0),
    ("mgii_2803", 2803.530, LineClass::Broad, 1.0),
    ("nev_3426", 3426.850, LineClass::Narrow, 0.3),
    ("oii_3726", 3727.092, LineClass::Narrow, 1.0),
    ("oii_3729", 3729.874, LineClass::Narrow, 1.0),
    ("neiii_3869", 3869.860, LineClass::Narrow, 0.5),
    ("h8", 3890.166, LineClass::Balmer, 0.3),
    ("hepsilon", 3971.198, LineClass::Balmer, 0.3),
    ("hdelta", 4102.892, LineClass::Balmer, 0.5),
    ("hgamma", 4341.692, LineClass::Balmer, 0.5),
    ("oiii_4363", 4364.436, LineClass::Narrow, 0.1),
    ("heii_4686", 4687.020, LineClass::Narrow, 0.3),
    ("hbeta", 4862.683, LineClass::Balmer, 1.0),
    ("oiii_4959", 4960.295, LineClass::Narrow, 1.0),
    ("oiii_5007", 5008.239, LineClass::Narrow, 1.0),
    ("nii_5755", 5756.191, LineClass::Narrow, 0.1),
    ("hei_5876", 5877.249, LineClass::Narrow, 0.3),
    ("oi_6300", 6302.046, LineClass::Narrow, 0.3),
    ("nii_6548", 6549.861, LineClass::Narrow, 1.0),
    ("halpha", 6564.613, LineClass::Balmer, 1.0),
    ("nii_6584", 6585.273, LineClass::Narrow, 1.0),
    ("sii_6716", 6718.294, LineClass::Narrow, 1.0),
    ("sii_6731", 6732.673, LineClass::Narrow, 1.0),
    ("siii_9069", 9071.100, LineClass::Narrow, 0.5),
    ("siii_9532", 9533.200, LineClass::Narrow, 0.5),
    ("paepsilon", 9548.590, LineClass::Balmer, 0.3),
    ("padelta", 10052.130, LineClass::Balmer, 0.3),
];

impl Default for LineCatalog {
    fn default() -> Self {
        Self {
            lines: DEFAULT_LINES
                .iter()
                .map(|(name, restwave, class, amplitude)| CatalogLine {
                    name: name.to_string(),
                    restwave: *restwave,
                    class: *class,
                    amplitude: *amplitude,
                })
                .collect(),
        }
    }
}

impl LineCatalog {
    pub fn new(mut lines: Vec<CatalogLine>) -> Self {
        lines.sort_by(|a, b| a.restwave.total_cmp(&b.restwave));
        Self { lines }
    }

    pub fn lines(&self) -> &[CatalogLine] {
        &self.lines
    }

    /// Lines whose observed wavelength falls in `[wave_min, wave_max]`.
    pub fn in_range(&self, redshift: f64, wave_min: f64, wave_max: f64) -> impl Iterator<Item = &CatalogLine> {
        self.lines.iter().filter(move |l| {
            let obs = l.restwave * (1.0 + redshift);
            obs >= wave_min && obs <= wave_max
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_is_sorted_and_has_lya() {
        let cat = LineCatalog::default();
        assert!(cat.lines().windows(2).all(|w| w[0].restwave < w[1].restwave));
        assert_eq!(cat.lines()[0].name, LYMAN_ALPHA);
    }

    #[test]
    fn range_filter_uses_observed_frame() {
        let cat = LineCatalog::default();
        let names: Vec<&str> = cat.in_range(0.1, 7100.0, 7300.0).map(|l| l.name.as_str()).collect();
        assert!(names.contains(&"halpha"));
        assert!(!names.contains(&"hbeta"));
    }
}
