//! Photometry parsing and quantities derived from the continuum fits.

pub mod d4000;
pub mod format;
pub mod kcorr;
pub mod luminosity;
pub mod photometry;
pub mod stellar;

use crate::domain::{ContinuumFit, PhotDerived, PhotometricFit, Photometry, SpecDerived, Spectrum, TemplateLibrary};
use crate::error::AppError;
use crate::models::{Cosmology, FilterSet};

pub use d4000::{BreakIndex, break_index};
pub use kcorr::{KcorrInput, kcorr_and_absmag};
pub use luminosity::continuum_luminosities;
pub use photometry::{BandPhotometry, PhotometryOptions, flam_arrays, parse_photometry};
pub use stellar::{mean_age, stellar_summary};

/// Derived quantities of a spectroscopic fit. Measured break indices come
/// from the (Milky-Way corrected) coadd, model ones from the best continuum.
pub fn derive_spectroscopic(
    templates: &TemplateLibrary,
    fit: &ContinuumFit,
    coadd: Option<&Spectrum>,
    redshift: f64,
    cosmology: &dyn Cosmology,
) -> SpecDerived {
    let (d4000, dn4000) = match coadd {
        Some(s) => (
            break_index(BreakIndex::D4000, &s.wave, &s.flux, Some(&s.ivar), redshift),
            break_index(BreakIndex::Dn4000, &s.wave, &s.flux, Some(&s.ivar), redshift),
        ),
        None => Default::default(),
    };
    SpecDerived {
        stellar: stellar_summary(&fit.coeff, templates.info()),
        d4000,
        dn4000,
        d4000_model: break_index(BreakIndex::D4000, templates.wave(), &fit.native_model, None, 0.0).value,
        dn4000_model: break_index(BreakIndex::Dn4000, templates.wave(), &fit.native_model, None, 0.0).value,
        luminosities: continuum_luminosities(templates.wave(), &fit.native_model, redshift, cosmology),
    }
}

pub struct PhotometricContext<'a> {
    pub filters_in: &'a FilterSet,
    pub filters_out: &'a FilterSet,
    pub photometry: Option<&'a Photometry>,
    pub band_shift: f64,
}

pub fn derive_photometric(
    templates: &TemplateLibrary,
    fit: &PhotometricFit,
    redshift: f64,
    ctx: &PhotometricContext<'_>,
    cosmology: &dyn Cosmology,
) -> Result<PhotDerived, AppError> {
    let magnitudes = kcorr_and_absmag(
        &KcorrInput {
            redshift,
            rest_wave: templates.wave(),
            continuum: &fit.native_model,
            filters_in: ctx.filters_in,
            filters_out: ctx.filters_out,
            photometry: ctx.photometry,
            band_shift: ctx.band_shift,
        },
        cosmology,
    )?;
    Ok(PhotDerived {
        stellar: stellar_summary(&fit.coeff, templates.info()),
        d4000_model: break_index(BreakIndex::D4000, templates.wave(), &fit.native_model, None, 0.0).value,
        dn4000_model: break_index(BreakIndex::Dn4000, templates.wave(), &fit.native_model, None, 0.0).value,
        magnitudes,
        luminosities: continuum_luminosities(templates.wave(), &fit.native_model, redshift, cosmology),
    })
}
