//! Per-object fitting pipeline and batch driver.
//!
//! One object:
//! Milky-Way correction -> channel cleanup -> line mask on the coadd ->
//! masked spectroscopic fit -> photometric fit -> derived quantities.
//!
//! A batch maps that over every object in parallel. A failing object is
//! logged and reported; it never stops the others.

use rayon::prelude::*;

use crate::domain::{
    Channel, FailedObject, FitConfig, ObjectResult, Observation, Photometry, Spectrum, TemplateLibrary,
    merge_channels,
};
use crate::error::AppError;
use crate::fit::{ContinuumFitter, PhotometricInput, SpectralInput};
use crate::linemask::{LineCatalog, LineMask, build_linemask};
use crate::math::stats::median;
use crate::models::extinction::mw_transmission;
use crate::models::{ChannelGrid, Cosmology, PhotometricFilters};
use crate::report::format::{format_continuum, format_photometric};
use crate::report::{
    PhotometricContext, PhotometryOptions, derive_photometric, derive_spectroscopic, flam_arrays,
    parse_photometry,
};

/// Batch-wide, read-only state shared by every object fit.
pub struct FitContext<'a> {
    pub templates: &'a TemplateLibrary,
    pub filters: &'a PhotometricFilters,
    pub cosmology: &'a dyn Cosmology,
    pub config: &'a FitConfig,
    pub catalog: LineCatalog,
    fitter: ContinuumFitter<'a>,
}

impl<'a> FitContext<'a> {
    pub fn new(
        templates: &'a TemplateLibrary,
        filters: &'a PhotometricFilters,
        cosmology: &'a dyn Cosmology,
        config: &'a FitConfig,
    ) -> Result<Self, AppError> {
        filters.validate()?;
        let fitter = ContinuumFitter::new(templates, cosmology, config)?;
        log::info!(
            "A(V) grid: {} values, vdisp grid: {} values (solve_vdisp={}, fastphot={})",
            fitter.av_grid().len(),
            fitter.vdisp_grid().len(),
            config.solve_vdisp,
            config.fastphot
        );
        Ok(Self {
            templates,
            filters,
            cosmology,
            config,
            catalog: LineCatalog::default(),
            fitter,
        })
    }

    pub fn fitter(&self) -> &ContinuumFitter<'a> {
        &self.fitter
    }
}

/// Milky-Way corrected channel with its edge pixels masked.
fn prepare_channel(channel: &Channel, ebv: f64, rv: f64) -> Channel {
    let trans = mw_transmission(&channel.wave, ebv, rv);
    let mut ivar: Vec<f64> = channel
        .effective_ivar()
        .iter()
        .zip(&trans)
        .map(|(iv, t)| iv * t * t)
        .collect();
    // The first and last pixels of a camera are unreliable.
    if let Some(first) = ivar.first_mut() {
        *first = 0.0;
    }
    if let Some(last) = ivar.last_mut() {
        *last = 0.0;
    }
    Channel {
        name: channel.name.clone(),
        wave: channel.wave.clone(),
        flux: channel.flux.iter().zip(&trans).map(|(f, t)| f / t).collect(),
        ivar,
        mask: None,
        resolution: channel.resolution.clone(),
    }
}

fn deredden_spectrum(spec: &Spectrum, ebv: f64, rv: f64) -> Spectrum {
    let trans = mw_transmission(&spec.wave, ebv, rv);
    Spectrum {
        wave: spec.wave.clone(),
        flux: spec.flux.iter().zip(&trans).map(|(f, t)| f / t).collect(),
        ivar: spec.ivar.iter().zip(&trans).map(|(iv, t)| iv * t * t).collect(),
    }
}

fn deredden_photometry(phot: &Photometry, lambda_eff: &[f64], ebv: f64, rv: f64) -> Photometry {
    let trans = mw_transmission(lambda_eff, ebv, rv);
    Photometry {
        bands: phot.bands.clone(),
        nanomaggies: phot.nanomaggies.iter().zip(&trans).map(|(f, t)| f / t).collect(),
        ivar: phot.ivar.iter().zip(&trans).map(|(iv, t)| iv * t * t).collect(),
    }
}

/// Median per-pixel S/N over the unmasked pixels.
fn median_snr(channel: &Channel) -> f64 {
    let snr: Vec<f64> = channel
        .flux
        .iter()
        .zip(&channel.ivar)
        .filter(|(_, iv)| **iv > 0.0)
        .map(|(f, iv)| f * iv.sqrt())
        .collect();
    median(&snr).unwrap_or(0.0)
}

pub fn fit_object(ctx: &FitContext<'_>, obs: &Observation) -> Result<ObjectResult, AppError> {
    obs.validate()?;
    let cfg = ctx.config;
    let z = obs.redshift;

    let channels: Vec<Channel> = obs
        .channels
        .iter()
        .map(|c| prepare_channel(c, obs.ebv, cfg.mw_rv))
        .filter(|c| {
            let usable = c.ivar.iter().any(|iv| *iv > 0.0);
            if !usable {
                log::warn!("{}: channel {} is fully masked; dropping it", obs.id, c.name);
            }
            usable
        })
        .collect();

    let mut result = ObjectResult {
        id: obs.id.clone(),
        redshift: z,
        photsys: obs.photsys,
        line_widths: None,
        spec: None,
        spec_derived: None,
        phot: None,
        phot_derived: None,
        flux_nanomaggies: obs
            .photometry
            .iter()
            .flat_map(|p| p.bands.iter().zip(&p.nanomaggies).zip(&p.ivar))
            .map(|((b, f), iv)| (b.clone(), *f, *iv))
            .collect(),
        fiber_nanomaggies: obs
            .fiber_photometry
            .iter()
            .flat_map(|p| p.bands.iter().zip(&p.nanomaggies))
            .map(|(b, f)| (b.clone(), *f))
            .collect(),
    };

    if !cfg.fastphot {
        if channels.is_empty() {
            log::warn!("{}: no usable spectrum; skipping the spectroscopic fit", obs.id);
        } else {
            fit_spectrum(ctx, obs, &channels, &mut result)?;
        }
    }

    if let Some(phot) = &obs.photometry {
        fit_photometry(ctx, obs, phot, &mut result)?;
    }

    if result.spec.is_none() && result.phot.is_none() {
        return Err(AppError::insufficient(format!(
            "{}: neither a usable spectrum nor photometry",
            obs.id
        )));
    }
    Ok(result)
}

fn fit_spectrum(
    ctx: &FitContext<'_>,
    obs: &Observation,
    channels: &[Channel],
    result: &mut ObjectResult,
) -> Result<(), AppError> {
    let cfg = ctx.config;
    let z = obs.redshift;

    let coadd = match &obs.coadd {
        Some(coadd) => deredden_spectrum(coadd, obs.ebv, cfg.mw_rv),
        None => merge_channels(channels)
            .ok_or_else(|| AppError::insufficient(format!("{}: no spectrum to mask", obs.id)))?,
    };
    let linemask: LineMask = build_linemask(&coadd, z, &ctx.catalog, &cfg.linemask)?;
    log::debug!(
        "{}: {} possible / {} strong line pixels; sigma narrow={:.0} balmer={:.0} broad={:.0} km/s",
        obs.id,
        linemask.n_possible(),
        linemask.n_strong(),
        linemask.widths.narrow,
        linemask.widths.balmer,
        linemask.widths.broad
    );

    let mut flux = Vec::new();
    let mut ivar = Vec::new();
    for c in channels {
        let masked = linemask.project(&c.wave);
        flux.extend_from_slice(&c.flux);
        ivar.extend(c.ivar.iter().zip(&masked).map(|(iv, m)| if *m { 0.0 } else { *iv }));
    }
    if ivar.iter().all(|iv| *iv <= 0.0) {
        return Err(AppError::insufficient(format!(
            "{}: every pixel is masked after line masking",
            obs.id
        )));
    }

    let snr: Vec<f64> = channels.iter().map(median_snr).collect();
    let grids: Vec<ChannelGrid<'_>> = channels
        .iter()
        .map(|c| ChannelGrid {
            wave: &c.wave,
            resolution: c.resolution.as_ref(),
        })
        .collect();

    let fit = ctx.fitter.fit_spectrum(&SpectralInput {
        id: &obs.id,
        redshift: z,
        channels: &grids,
        flux: &flux,
        ivar: &ivar,
        snr: &snr,
    })?;
    let derived = derive_spectroscopic(ctx.templates, &fit, Some(&coadd), z, ctx.cosmology);
    log::info!("{}", format_continuum(&obs.id, &fit, &derived));

    result.line_widths = Some(linemask.widths);
    result.spec = Some(fit);
    result.spec_derived = Some(derived);
    Ok(())
}

fn fit_photometry(
    ctx: &FitContext<'_>,
    obs: &Observation,
    phot: &Photometry,
    result: &mut ObjectResult,
) -> Result<(), AppError> {
    let cfg = ctx.config;
    let filters_in = ctx.filters.for_system(obs.photsys);
    let lambda_eff = filters_in.effective_wavelengths();
    let phot = deredden_photometry(phot, &lambda_eff, obs.ebv, cfg.mw_rv);

    let rows = parse_photometry(
        &phot,
        &lambda_eff,
        &PhotometryOptions {
            nsigma: cfg.phot_nsigma,
            min_mag_err: cfg.phot_min_mag_err,
        },
    )?;
    let (flam, flam_ivar) = flam_arrays(&rows);
    if flam_ivar.iter().all(|iv| *iv <= 0.0) {
        log::warn!("{}: no measured photometric band; skipping the photometric fit", obs.id);
        return Ok(());
    }

    let fit = ctx.fitter.fit_photometry(&PhotometricInput {
        id: &obs.id,
        redshift: obs.redshift,
        filters: filters_in,
        flam: &flam,
        flam_ivar: &flam_ivar,
    })?;
    let derived = derive_photometric(
        ctx.templates,
        &fit,
        obs.redshift,
        &PhotometricContext {
            filters_in,
            filters_out: &ctx.filters.absmag,
            photometry: Some(&phot),
            band_shift: cfg.band_shift,
        },
        ctx.cosmology,
    )?;
    log::info!("{}", format_photometric(&obs.id, &fit, &derived));

    result.phot = Some(fit);
    result.phot_derived = Some(derived);
    Ok(())
}

/// Fit every object; results keep input order.
pub fn fit_batch(
    ctx: &FitContext<'_>,
    objects: &[Observation],
    threads: Option<usize>,
) -> Result<(Vec<ObjectResult>, Vec<FailedObject>), AppError> {
    let run = || -> Vec<Result<ObjectResult, FailedObject>> {
        objects
            .par_iter()
            .map(|obs| {
                fit_object(ctx, obs).map_err(|err| {
                    log::warn!("{}: fit failed: {err}", obs.id);
                    FailedObject {
                        id: obs.id.clone(),
                        error: err.to_string(),
                        exit_code: err.exit_code(),
                    }
                })
            })
            .collect()
    };

    let outcomes = match threads {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| AppError::config(format!("failed to build a {n}-thread pool: {e}")))?
            .install(run),
        None => run(),
    };

    let mut results = Vec::new();
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(r) => results.push(r),
            Err(f) => failures.push(f),
        }
    }
    Ok((results, failures))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{
        EmissionLine, MockObject, SyntheticConfig, mock_observation, toy_photometric_filters, toy_templates,
    };
    use crate::domain::FitStatus;
    use crate::models::FlatLambdaCdm;

    struct Fixture {
        templates: TemplateLibrary,
        filters: PhotometricFilters,
        cosmo: FlatLambdaCdm,
        config: FitConfig,
    }

    fn fixture() -> Fixture {
        Fixture {
            templates: toy_templates(&SyntheticConfig::default()).unwrap(),
            filters: toy_photometric_filters().unwrap(),
            cosmo: FlatLambdaCdm::default(),
            config: FitConfig::default(),
        }
    }

    fn mock(id: &str) -> MockObject {
        let mut m = MockObject::new(id, 0.1, vec![0.0, 0.6, 0.4, 0.0]);
        m.lines = vec![EmissionLine {
            wave: 6564.613,
            amplitude: 3.0,
            sigma_kms: 100.0,
        }];
        m
    }

    #[test]
    fn mock_object_is_fitted_end_to_end() {
        let fx = fixture();
        let ctx = FitContext::new(&fx.templates, &fx.filters, &fx.cosmo, &fx.config).unwrap();
        let obs = mock_observation(&fx.templates, &fx.cosmo, &fx.filters, &mock("m1")).unwrap();

        let result = fit_object(&ctx, &obs).unwrap();
        let spec = result.spec.as_ref().unwrap();
        assert_eq!(spec.coeff.len(), fx.templates.nsed());
        assert_eq!(spec.models.len(), 3);
        assert_eq!(spec.snr.len(), 3);
        assert!(spec.coeff.iter().all(|c| *c >= 0.0));
        assert!((spec.av.value - 0.3).abs() < 0.15, "A(V) = {}", spec.av.value);
        assert_eq!(spec.vdisp.status, FitStatus::NotFitted);

        let phot = result.phot.as_ref().unwrap();
        assert_eq!(phot.model_nanomaggies.len(), 4);
        let derived = result.phot_derived.as_ref().unwrap();
        assert_eq!(derived.magnitudes.len(), fx.filters.absmag.len());
        assert!(result.spec_derived.as_ref().unwrap().stellar.log_mstar > 9.0);
    }

    #[test]
    fn edge_pixels_are_masked_and_dust_removed() {
        let channel = Channel {
            name: "b".into(),
            wave: vec![4000.0, 4001.0, 4002.0],
            flux: vec![1.0; 3],
            ivar: vec![1.0; 3],
            mask: None,
            resolution: None,
        };
        let clean = prepare_channel(&channel, 0.1, 3.1);
        assert_eq!(clean.ivar[0], 0.0);
        assert_eq!(clean.ivar[2], 0.0);
        assert!(clean.flux[1] > 1.0);
        assert!(clean.ivar[1] < 1.0);
    }

    #[test]
    fn failures_are_isolated_per_object() {
        let fx = fixture();
        let config = FitConfig {
            fastphot: true,
            ..FitConfig::default()
        };
        let ctx = FitContext::new(&fx.templates, &fx.filters, &fx.cosmo, &config).unwrap();
        let good = mock_observation(&fx.templates, &fx.cosmo, &fx.filters, &mock("good")).unwrap();
        let mut bad = good.clone();
        bad.id = "bad".into();
        bad.photometry = None;
        let mut negative = good.clone();
        negative.id = "negative".into();
        negative.redshift = -1.0;

        let (results, failures) = fit_batch(&ctx, &[bad, good, negative], Some(2)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "good");
        assert!(results[0].spec.is_none());
        let ids: Vec<&str> = failures.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["bad", "negative"]);
        assert_eq!(failures[0].exit_code, 4);
        assert_eq!(failures[1].exit_code, 3);
    }
}
