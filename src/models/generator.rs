//! Model grid generator.
//!
//! Turns rest-frame templates into models comparable with one object's data.
//! Stages run in a fixed order, each one returning new arrays:
//!
//! 1. dust attenuation on the rest-frame grid
//! 2. redshift: `λ(1+z)`, Lyman-series IGM absorption, dilution by
//!    `FLUXNORM · MASSNORM · (10 pc / D_L)² / (1+z)`
//! 3. synthetic photometry of the redshifted, unbroadened models
//! 4. velocity-dispersion broadening in template pixel space
//! 5. per channel: trim to the channel range ±10 Å, flux-conserving rebin,
//!    instrumental resolution
//! 6. optional collapse with a coefficient vector
//!
//! Fitting over a nuisance parameter goes through [`ModelGenerator::generate_grid`],
//! which evaluates every parameter value in parallel and keeps the results in
//! grid order; [`ModelCube`](crate::domain::ModelCube) then holds the
//! `[pixel, template, value]` axes explicitly.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::domain::{FLUXNORM, MASSNORM, ModelCube, ParamKind, TemplateLibrary};
use crate::error::AppError;
use crate::math::trapz_rebin;
use crate::models::broaden::broaden_columns;
use crate::models::cosmology::Cosmology;
use crate::models::dust::attenuate_columns;
use crate::models::filters::{FilterSet, maggies_to_flam};
use crate::models::igm::lyman_transmission;
use crate::models::resolution::ResolutionMatrix;

/// Half-width (Å) of the margin kept around a channel before rebinning.
const TRIM_MARGIN: f64 = 10.0;

/// Observed-frame sampling of one detector channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelGrid<'a> {
    pub wave: &'a [f64],
    pub resolution: Option<&'a ResolutionMatrix>,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub redshift: f64,
    pub av: Option<f64>,
    pub vdisp: Option<f64>,
    /// Empty: models stay on the (observed-frame) template grid.
    pub channels: &'a [ChannelGrid<'a>],
    pub synthphot: bool,
    pub coeff: Option<&'a [f64]>,
}

impl<'a> ModelRequest<'a> {
    pub fn at_redshift(redshift: f64) -> Self {
        Self {
            redshift,
            av: None,
            vdisp: None,
            channels: &[],
            synthphot: false,
            coeff: None,
        }
    }

    fn with_param(mut self, kind: ParamKind, value: f64) -> Self {
        match kind {
            ParamKind::Av => self.av = Some(value),
            ParamKind::Vdisp => self.vdisp = Some(value),
        }
        self
    }
}

/// Models for one request. Matrices have one column per template, or a
/// single column when a coefficient vector was supplied.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// Observed-frame template wavelengths.
    pub wave: Vec<f64>,
    /// Redshifted (and broadened) models on `wave`.
    pub native: DMatrix<f64>,
    pub channels: Vec<DMatrix<f64>>,
    /// `nband × nmodel` synthetic `f_λ` in model units.
    pub photometry: Option<DMatrix<f64>>,
}

impl ModelOutput {
    /// Channel models stacked along the pixel axis in channel order.
    pub fn stacked_channels(&self) -> DMatrix<f64> {
        let ncols = self.channels.first().map_or(self.native.ncols(), DMatrix::ncols);
        let nrows: usize = self.channels.iter().map(DMatrix::nrows).sum();
        let mut out = DMatrix::zeros(nrows, ncols);
        let mut row = 0;
        for ch in &self.channels {
            out.rows_mut(row, ch.nrows()).copy_from(ch);
            row += ch.nrows();
        }
        out
    }
}

pub struct ModelGenerator<'a> {
    templates: &'a TemplateLibrary,
    cosmology: &'a dyn Cosmology,
    filters: Option<&'a FilterSet>,
    dust_slope: f64,
}

impl<'a> ModelGenerator<'a> {
    pub fn new(templates: &'a TemplateLibrary, cosmology: &'a dyn Cosmology) -> Self {
        Self {
            templates,
            cosmology,
            filters: None,
            dust_slope: 0.7,
        }
    }

    pub fn with_filters(mut self, filters: &'a FilterSet) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_dust_slope(mut self, slope: f64) -> Self {
        self.dust_slope = slope;
        self
    }

    pub fn templates(&self) -> &TemplateLibrary {
        self.templates
    }

    pub fn generate(&self, req: &ModelRequest<'_>) -> Result<ModelOutput, AppError> {
        let lib = self.templates;

        let flux = match req.av {
            Some(av) if av != 0.0 => attenuate_columns(lib.flux(), lib.wave(), av, self.dust_slope),
            _ => lib.flux().clone(),
        };

        let (wave, flux) = self.redshift(lib.wave(), &flux, req.redshift)?;

        let photometry = if req.synthphot {
            let filters = self.filters.ok_or_else(|| {
                AppError::config("synthetic photometry requested but no filter set was supplied")
            })?;
            Some(synth_flam(filters, &wave, &flux)?)
        } else {
            None
        };

        let native = match req.vdisp {
            Some(vdisp) if vdisp > 0.0 => broaden_columns(&flux, vdisp, lib.pixkms(), lib.n_split()),
            _ => flux,
        };

        let channels = req
            .channels
            .iter()
            .map(|ch| resample(&wave, &native, ch))
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = ModelOutput {
            wave,
            native,
            channels,
            photometry,
        };
        if let Some(coeff) = req.coeff {
            out = collapse(out, coeff)?;
        }
        Ok(out)
    }

    /// One [`ModelOutput`] per parameter value, computed in parallel and
    /// returned in grid order.
    pub fn generate_grid(
        &self,
        req: &ModelRequest<'_>,
        kind: ParamKind,
        values: &[f64],
    ) -> Result<Vec<ModelOutput>, AppError> {
        values
            .par_iter()
            .map(|&v| self.generate(&req.with_param(kind, v)))
            .collect()
    }

    /// Channel-stacked model cube over a parameter grid.
    pub fn spectral_cube(
        &self,
        req: &ModelRequest<'_>,
        kind: ParamKind,
        values: &[f64],
    ) -> Result<ModelCube, AppError> {
        let outputs = self.generate_grid(req, kind, values)?;
        ModelCube::new(kind, values.to_vec(), outputs.iter().map(ModelOutput::stacked_channels).collect())
    }

    /// Synthetic-photometry model cube over a parameter grid.
    pub fn photometric_cube(
        &self,
        req: &ModelRequest<'_>,
        kind: ParamKind,
        values: &[f64],
    ) -> Result<ModelCube, AppError> {
        let req = ModelRequest {
            synthphot: true,
            channels: &[],
            ..*req
        };
        let outputs = self.generate_grid(&req, kind, values)?;
        let slices = outputs
            .into_iter()
            .map(|o| o.photometry.ok_or_else(|| AppError::config("photometry missing from model output")))
            .collect::<Result<Vec<_>, _>>()?;
        ModelCube::new(kind, values.to_vec(), slices)
    }

    fn redshift(
        &self,
        wave: &[f64],
        flux: &DMatrix<f64>,
        redshift: f64,
    ) -> Result<(Vec<f64>, DMatrix<f64>), AppError> {
        if redshift <= 0.0 {
            return Ok((wave.to_vec(), flux * (FLUXNORM * MASSNORM)));
        }
        let dl_pc = self.cosmology.luminosity_distance(redshift) * 1e6;
        if !(dl_pc.is_finite() && dl_pc > 0.0) {
            return Err(AppError::invalid(format!(
                "luminosity distance at z={redshift} is not positive"
            )));
        }
        let factor = FLUXNORM * MASSNORM * (10.0 / dl_pc).powi(2) / (1.0 + redshift);
        let zwave: Vec<f64> = wave.iter().map(|w| w * (1.0 + redshift)).collect();
        let igm = lyman_transmission(&zwave, redshift);
        let zflux = DMatrix::from_fn(flux.nrows(), flux.ncols(), |r, c| flux[(r, c)] * igm[r] * factor);
        Ok((zwave, zflux))
    }
}

/// Synthetic photometry as `f_λ` at each band's effective wavelength, in the
/// same units as `flux`.
pub fn synth_flam(filters: &FilterSet, wave: &[f64], flux: &DMatrix<f64>) -> Result<DMatrix<f64>, AppError> {
    let mut maggies = filters.ab_maggies(wave, flux)?;
    for (r, lambda) in filters.effective_wavelengths().into_iter().enumerate() {
        let f = maggies_to_flam(lambda);
        maggies.row_mut(r).iter_mut().for_each(|v| *v *= f);
    }
    Ok(maggies)
}

fn resample(wave: &[f64], flux: &DMatrix<f64>, channel: &ChannelGrid<'_>) -> Result<DMatrix<f64>, AppError> {
    let (Some(first), Some(last)) = (channel.wave.first(), channel.wave.last()) else {
        return Ok(DMatrix::zeros(0, flux.ncols()));
    };
    let lo = wave.partition_point(|w| *w <= first - TRIM_MARGIN);
    let hi = wave.partition_point(|w| *w < last + TRIM_MARGIN);
    if hi <= lo + 1 {
        return Err(AppError::invalid(format!(
            "templates do not cover the channel range [{first:.1}, {last:.1}] Å"
        )));
    }
    let sub_wave = &wave[lo..hi];

    let mut out = DMatrix::zeros(channel.wave.len(), flux.ncols());
    for c in 0..flux.ncols() {
        let column: Vec<f64> = flux.column(c).rows(lo, hi - lo).iter().copied().collect();
        let mut rebinned = trapz_rebin(sub_wave, &column, channel.wave)?;
        if let Some(res) = channel.resolution {
            rebinned = res.apply(&rebinned)?;
        }
        out.set_column(c, &DVector::from_vec(rebinned));
    }
    Ok(out)
}

fn collapse(out: ModelOutput, coeff: &[f64]) -> Result<ModelOutput, AppError> {
    if coeff.len() != out.native.ncols() {
        return Err(AppError::invalid(format!(
            "{} coefficients for {} templates",
            coeff.len(),
            out.native.ncols()
        )));
    }
    let c = DVector::from_column_slice(coeff);
    let dot = |m: &DMatrix<f64>| {
        let v = m * &c;
        DMatrix::from_column_slice(v.len(), 1, v.as_slice())
    };
    Ok(ModelOutput {
        native: dot(&out.native),
        channels: out.channels.iter().map(dot).collect(),
        photometry: out.photometry.as_ref().map(dot),
        wave: out.wave,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TemplateInfo;
    use crate::models::cosmology::FlatLambdaCdm;
    use crate::models::filters::FilterCurve;

    fn library() -> TemplateLibrary {
        let wave: Vec<f64> = (0..4000).map(|i| 3000.0 + i as f64).collect();
        let flux = DMatrix::from_fn(wave.len(), 2, |r, c| {
            let w = wave[r];
            if c == 0 { 1e-3 * (w / 5000.0).powf(-1.0) } else { 1e-3 * (w / 5000.0).powf(1.5) }
        });
        let info = vec![
            TemplateInfo { age: 1e9, mstar: 1.0, sfr: 0.0, zzsun: 1.0 },
            TemplateInfo { age: 8e9, mstar: 0.7, sfr: 0.0, zzsun: 1.0 },
        ];
        TemplateLibrary::new(wave, flux, info, 60.0, 6000.0).unwrap()
    }

    #[test]
    fn rest_frame_output_is_normalised_templates() {
        let lib = library();
        let cosmo = FlatLambdaCdm::default();
        let generator = ModelGenerator::new(&lib, &cosmo);
        let out = generator.generate(&ModelRequest::at_redshift(0.0)).unwrap();
        assert_eq!(out.wave, lib.wave());
        assert!((out.native[(10, 1)] - lib.flux()[(10, 1)] * FLUXNORM * MASSNORM).abs() < 1e-6);
    }

    #[test]
    fn zero_av_equals_no_dust() {
        let lib = library();
        let cosmo = FlatLambdaCdm::default();
        let generator = ModelGenerator::new(&lib, &cosmo);
        let plain = generator.generate(&ModelRequest::at_redshift(0.1)).unwrap();
        let dusty = generator
            .generate(&ModelRequest { av: Some(0.0), ..ModelRequest::at_redshift(0.1) })
            .unwrap();
        assert_eq!(plain.native, dusty.native);
    }

    #[test]
    fn coefficients_collapse_every_output() {
        let lib = library();
        let cosmo = FlatLambdaCdm::default();
        let set = FilterSet::new(vec![FilterCurve::top_hat("r", 5600.0, 6900.0, 100).unwrap()]).unwrap();
        let generator = ModelGenerator::new(&lib, &cosmo).with_filters(&set);

        let grid: Vec<f64> = (0..500).map(|i| 4000.0 + 2.0 * i as f64).collect();
        let res = ResolutionMatrix::gaussian(grid.len(), 1.0, 7).unwrap();
        let channels = [ChannelGrid { wave: &grid, resolution: Some(&res) }];
        let base = ModelRequest {
            av: Some(0.4),
            channels: &channels,
            synthphot: true,
            ..ModelRequest::at_redshift(0.1)
        };
        let full = generator.generate(&base).unwrap();
        let coeff = [0.3, 1.2];
        let collapsed = generator.generate(&ModelRequest { coeff: Some(&coeff), ..base }).unwrap();

        assert_eq!(full.channels[0].shape(), (500, 2));
        assert_eq!(collapsed.channels[0].shape(), (500, 1));
        let expect = full.channels[0][(250, 0)] * 0.3 + full.channels[0][(250, 1)] * 1.2;
        assert!((collapsed.channels[0][(250, 0)] - expect).abs() < 1e-9 * expect.abs());

        let phot = full.photometry.unwrap();
        let phot_c = collapsed.photometry.unwrap();
        let expect = phot[(0, 0)] * 0.3 + phot[(0, 1)] * 1.2;
        assert!((phot_c[(0, 0)] - expect).abs() < 1e-9 * expect.abs());
    }

    #[test]
    fn grid_keeps_parameter_order() {
        let lib = library();
        let cosmo = FlatLambdaCdm::default();
        let generator = ModelGenerator::new(&lib, &cosmo);
        let grid: Vec<f64> = (0..300).map(|i| 4000.0 + 3.0 * i as f64).collect();
        let channels = [ChannelGrid { wave: &grid, resolution: None }];
        let req = ModelRequest { channels: &channels, ..ModelRequest::at_redshift(0.1) };

        let cube = generator.spectral_cube(&req, ParamKind::Av, &[0.0, 0.5, 1.0]).unwrap();
        assert_eq!(cube.nparam(), 3);
        assert_eq!(cube.ntemplate(), 2);
        // more dust, less flux
        let px = (100, 0);
        assert!(cube.slice(0)[px] > cube.slice(1)[px]);
        assert!(cube.slice(1)[px] > cube.slice(2)[px]);
    }

    #[test]
    fn channel_outside_templates_is_an_error() {
        let lib = library();
        let cosmo = FlatLambdaCdm::default();
        let generator = ModelGenerator::new(&lib, &cosmo);
        let grid = vec![20_000.0, 20_001.0, 20_002.0];
        let channels = [ChannelGrid { wave: &grid, resolution: None }];
        let req = ModelRequest { channels: &channels, ..ModelRequest::at_redshift(0.0) };
        assert!(generator.generate(&req).is_err());
    }
}
