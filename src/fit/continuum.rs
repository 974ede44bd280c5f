//! Stellar-continuum fitters.
//!
//! Spectroscopy:
//!
//! 1. drop templates older than the universe at the object's redshift
//! 2. scan A(V) with models broadened to the nominal velocity dispersion
//! 3. optionally scan vdisp at the best A(V) with the unbroadened library
//! 4. final NNLS solve at the best (A(V), vdisp)
//!
//! Photometry scans A(V) only, on synthetic photometry of the nominal-vdisp
//! library. Both return coefficients over the full library, zero for the
//! templates removed by the age cut.

use nalgebra::{DMatrix, DVector};

use crate::domain::{
    ContinuumFit, FLUXNORM, FitConfig, ParamFit, ParamKind, PhotometricFit, TemplateLibrary,
};
use crate::error::AppError;
use crate::fit::param_grid::ParamGrid;
use crate::fit::scan::{ChiSquareGrid, scan_grid, solve_coefficients};
use crate::math::NnlsOptions;
use crate::models::filters::maggies_to_flam;
use crate::models::{ChannelGrid, Cosmology, FilterSet, ModelGenerator, ModelRequest};

/// Stacked spectrum of one object, ready for fitting.
#[derive(Debug, Clone, Copy)]
pub struct SpectralInput<'a> {
    pub id: &'a str,
    pub redshift: f64,
    pub channels: &'a [ChannelGrid<'a>],
    /// Flux and (line-masked) inverse variance, channels concatenated in
    /// order.
    pub flux: &'a [f64],
    pub ivar: &'a [f64],
    pub snr: &'a [f64],
}

/// Broadband photometry of one object in model units (1e-17 erg/s/cm²/Å).
#[derive(Debug, Clone, Copy)]
pub struct PhotometricInput<'a> {
    pub id: &'a str,
    pub redshift: f64,
    pub filters: &'a FilterSet,
    pub flam: &'a [f64],
    pub flam_ivar: &'a [f64],
}

pub struct ContinuumFitter<'a> {
    templates: &'a TemplateLibrary,
    /// Library broadened to the nominal velocity dispersion.
    nominal: TemplateLibrary,
    cosmology: &'a dyn Cosmology,
    av: ParamGrid,
    vdisp: ParamGrid,
    dust_slope: f64,
    solve_vdisp: bool,
    nnls: NnlsOptions,
}

impl<'a> ContinuumFitter<'a> {
    pub fn new(
        templates: &'a TemplateLibrary,
        cosmology: &'a dyn Cosmology,
        config: &FitConfig,
    ) -> Result<Self, AppError> {
        let av = ParamGrid::from_spec(ParamKind::Av, &config.av)?;
        let vdisp = ParamGrid::from_spec(ParamKind::Vdisp, &config.vdisp)?;
        let nominal = templates.broadened(vdisp.nominal())?;
        Ok(Self {
            templates,
            nominal,
            cosmology,
            av,
            vdisp,
            dust_slope: config.dust_slope,
            solve_vdisp: config.solve_vdisp,
            nnls: NnlsOptions {
                tolerance: config.nnls_tolerance,
                max_iter_factor: config.nnls_max_iter_factor,
            },
        })
    }

    pub fn with_solve_vdisp(mut self, solve_vdisp: bool) -> Self {
        self.solve_vdisp = solve_vdisp;
        self
    }

    /// Replace the A(V) grid with explicit values.
    pub fn with_av_grid(mut self, grid: ParamGrid) -> Self {
        self.av = grid;
        self
    }

    pub fn av_grid(&self) -> &ParamGrid {
        &self.av
    }

    pub fn vdisp_grid(&self) -> &ParamGrid {
        &self.vdisp
    }

    /// Templates younger than the universe at `redshift`: the raw and the
    /// nominal-vdisp sub-libraries plus the kept indices.
    fn age_cut(&self, redshift: f64) -> Result<(TemplateLibrary, TemplateLibrary, Vec<usize>), AppError> {
        let age_yr = self.cosmology.age(redshift) * 1e9;
        let (young, keep) = self.templates.younger_than(age_yr)?;
        let young_nominal = self.nominal.select(&keep)?;
        Ok((young, young_nominal, keep))
    }

    fn generator<'g>(&'g self, lib: &'g TemplateLibrary) -> ModelGenerator<'g> {
        ModelGenerator::new(lib, self.cosmology).with_dust_slope(self.dust_slope)
    }

    pub fn fit_spectrum(&self, input: &SpectralInput<'_>) -> Result<ContinuumFit, AppError> {
        let (young, young_nominal, keep) = self.age_cut(input.redshift)?;
        let base = ModelRequest {
            channels: input.channels,
            ..ModelRequest::at_redshift(input.redshift)
        };

        let cube = self
            .generator(&young_nominal)
            .spectral_cube(&base, ParamKind::Av, self.av.values())?;
        let grid = scan_grid(&cube, input.flux, input.ivar, &self.nnls)?;
        let av = self.refine(input.id, "spectroscopic", &grid, self.av.nominal());

        let generator = self.generator(&young);
        let vdisp = if self.solve_vdisp {
            self.scan_vdisp(input, &generator, &base, av.value)?
        } else {
            ParamFit::not_fitted(ParamKind::Vdisp, self.vdisp.nominal())
        };

        let best = generator.generate(&ModelRequest {
            av: Some(av.value),
            vdisp: Some(vdisp.value),
            ..base
        })?;
        let solve = solve_coefficients(&best.stacked_channels(), input.flux, input.ivar, &self.nnls)?;
        if !solve.converged {
            log::warn!("{}: NNLS did not converge in the final continuum solve", input.id);
        }

        let c = DVector::from_column_slice(&solve.coeff);
        let models = best.channels.iter().map(|m| product(m, &c)).collect();

        Ok(ContinuumFit {
            coeff: expand(&solve.coeff, &keep, self.templates.nsed()),
            chi2: solve.chi2,
            av,
            vdisp,
            snr: input.snr.to_vec(),
            models,
            native_model: product(&best.native, &c),
        })
    }

    fn scan_vdisp(
        &self,
        input: &SpectralInput<'_>,
        generator: &ModelGenerator<'_>,
        base: &ModelRequest<'_>,
        av: f64,
    ) -> Result<ParamFit, AppError> {
        let req = ModelRequest { av: Some(av), ..*base };
        let cube = generator.spectral_cube(&req, ParamKind::Vdisp, self.vdisp.values())?;
        let grid = scan_grid(&cube, input.flux, input.ivar, &self.nnls)?;
        Ok(self.refine(input.id, "spectroscopic", &grid, self.vdisp.nominal()))
    }

    pub fn fit_photometry(&self, input: &PhotometricInput<'_>) -> Result<PhotometricFit, AppError> {
        let (_, young_nominal, keep) = self.age_cut(input.redshift)?;
        let generator = self.generator(&young_nominal).with_filters(input.filters);
        let base = ModelRequest::at_redshift(input.redshift);

        let cube = generator.photometric_cube(&base, ParamKind::Av, self.av.values())?;
        let grid = scan_grid(&cube, input.flam, input.flam_ivar, &self.nnls)?;
        let av = self.refine(input.id, "photometric", &grid, self.av.nominal());

        let best = generator.generate(&ModelRequest {
            av: Some(av.value),
            synthphot: true,
            ..base
        })?;
        let phot = best
            .photometry
            .ok_or_else(|| AppError::config("photometry missing from model output"))?;
        let solve = solve_coefficients(&phot, input.flam, input.flam_ivar, &self.nnls)?;
        if !solve.converged {
            log::warn!("{}: NNLS did not converge in the final photometric solve", input.id);
        }

        let c = DVector::from_column_slice(&solve.coeff);
        let model_flam = &phot * &c;
        let model_nanomaggies = input
            .filters
            .effective_wavelengths()
            .iter()
            .zip(model_flam.iter())
            .map(|(lambda, flam)| flam / FLUXNORM / maggies_to_flam(*lambda) * 1e9)
            .collect();

        Ok(PhotometricFit {
            coeff: expand(&solve.coeff, &keep, self.templates.nsed()),
            chi2: solve.chi2,
            av,
            model_nanomaggies,
            native_model: product(&best.native, &c),
        })
    }

    fn refine(&self, id: &str, what: &str, grid: &ChiSquareGrid, nominal: f64) -> ParamFit {
        let label = grid.kind.label();
        if !grid.unconverged.is_empty() {
            log::warn!(
                "{id}: NNLS did not converge for {label} value(s) {}",
                grid.unconverged_list()
            );
        }
        let fit = grid.refine(nominal);
        match fit.sigma() {
            Some(sigma) => log::info!(
                "{id}: best-fitting {what} {label}={:.4}±{:.4} {} with chi2={:.3}",
                fit.value,
                sigma,
                grid.kind.unit(),
                fit.chi2_min
            ),
            None => log::warn!(
                "{id}: finding {what} {label} failed ({}); adopting {label}={:.4} {}",
                fit.status.as_str(),
                fit.value,
                grid.kind.unit()
            ),
        }
        fit
    }
}

fn product(m: &DMatrix<f64>, c: &DVector<f64>) -> Vec<f64> {
    (m * c).iter().copied().collect()
}

/// Scatter `coeff` (one per kept template) back onto a library of `nsed`.
fn expand(coeff: &[f64], keep: &[usize], nsed: usize) -> Vec<f64> {
    let mut full = vec![0.0; nsed];
    for (c, &i) in coeff.iter().zip(keep) {
        full[i] = *c;
    }
    full
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    use crate::data::synthetic::{SyntheticConfig, toy_filters, toy_templates};
    use crate::domain::{FitStatus, GridSpec};
    use crate::math::fit_quadratic;
    use crate::models::FlatLambdaCdm;

    fn channel_grid() -> Vec<f64> {
        (0..1500).map(|i| 4200.0 + 2.0 * i as f64).collect()
    }

    fn config(av: GridSpec) -> FitConfig {
        FitConfig {
            av,
            ..FitConfig::default()
        }
    }

    #[test]
    fn expand_scatters_by_index() {
        assert_eq!(expand(&[1.0, 2.0], &[0, 2], 4), vec![1.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn coarse_av_grid_matches_linspace() {
        let templates = toy_templates(&SyntheticConfig::default()).unwrap();
        let cosmo = FlatLambdaCdm::default();
        let av_spec = GridSpec { min: 0.0, max: 1.0, step: 0.5, nominal: 0.0 };
        let fitter = ContinuumFitter::new(&templates, &cosmo, &config(av_spec)).unwrap();
        assert_eq!(fitter.av_grid().values(), &[0.0, 1.0]);
    }

    #[test]
    fn recovers_dust_and_coefficients() {
        let templates = toy_templates(&SyntheticConfig::default()).unwrap();
        let cosmo = FlatLambdaCdm::default();
        let fitter = ContinuumFitter::new(&templates, &cosmo, &FitConfig::default())
            .unwrap()
            .with_solve_vdisp(false);

        let wave = channel_grid();
        let channels = [ChannelGrid { wave: &wave, resolution: None }];
        let z = 0.1;

        // Truth: first template only, A(V) = 0.5, nominal vdisp.
        let mut truth_coeff = vec![0.0; templates.nsed()];
        truth_coeff[0] = 0.5;
        let truth = ModelGenerator::new(&fitter.nominal, &cosmo)
            .generate(&ModelRequest {
                av: Some(0.5),
                channels: &channels,
                coeff: Some(&truth_coeff),
                ..ModelRequest::at_redshift(z)
            })
            .unwrap();
        let flux: Vec<f64> = truth.channels[0].iter().copied().collect();
        let ivar: Vec<f64> = flux.iter().map(|f| 1.0 / (0.01 * f).powi(2)).collect();

        let fit = fitter
            .fit_spectrum(&SpectralInput {
                id: "truth",
                redshift: z,
                channels: &channels,
                flux: &flux,
                ivar: &ivar,
                snr: &[],
            })
            .unwrap();

        assert_eq!(fit.vdisp.status, FitStatus::NotFitted);
        assert_eq!(fit.vdisp.value, 150.0);
        assert_eq!(fit.av.status, FitStatus::Refined);
        assert!((fit.av.value - 0.5).abs() < 0.03, "A(V) = {}", fit.av.value);
        assert_eq!(fit.coeff.len(), templates.nsed());
        assert!(fit.coeff[0] > 0.4 && fit.coeff[0] < 0.6, "coeff = {:?}", fit.coeff);
        assert_eq!(fit.models[0].len(), wave.len());
    }

    fn two_template_fitter<'a>(templates: &'a TemplateLibrary, cosmo: &'a FlatLambdaCdm) -> ContinuumFitter<'a> {
        let grid = ParamGrid::new(ParamKind::Av, vec![0.0, 0.5, 1.0], 0.0).unwrap();
        ContinuumFitter::new(templates, cosmo, &FitConfig::default())
            .unwrap()
            .with_solve_vdisp(false)
            .with_av_grid(grid)
    }

    fn two_templates() -> TemplateLibrary {
        toy_templates(&SyntheticConfig {
            ages: vec![1e9, 5e9],
            ..SyntheticConfig::default()
        })
        .unwrap()
    }

    /// 0.5 × the first template at A(V) = 0.5, z = 0.1, on one channel.
    fn two_template_truth(fitter: &ContinuumFitter<'_>, cosmo: &FlatLambdaCdm, channels: &[ChannelGrid<'_>]) -> Vec<f64> {
        let truth = ModelGenerator::new(&fitter.nominal, cosmo)
            .generate(&ModelRequest {
                av: Some(0.5),
                channels,
                coeff: Some(&[0.5, 0.0]),
                ..ModelRequest::at_redshift(0.1)
            })
            .unwrap();
        truth.channels[0].iter().copied().collect()
    }

    #[test]
    fn two_template_library_on_a_three_point_grid() {
        let templates = two_templates();
        let cosmo = FlatLambdaCdm::default();
        let fitter = two_template_fitter(&templates, &cosmo);

        let wave = channel_grid();
        let channels = [ChannelGrid { wave: &wave, resolution: None }];
        let flux = two_template_truth(&fitter, &cosmo, &channels);
        // S/N of 10 per pixel.
        let ivar: Vec<f64> = flux.iter().map(|f| 1.0 / (0.1 * f).powi(2)).collect();

        // The generating grid point is an exact, unique solution.
        let base = ModelRequest {
            channels: &channels,
            ..ModelRequest::at_redshift(0.1)
        };
        let cube = fitter
            .generator(&fitter.nominal)
            .spectral_cube(&base, ParamKind::Av, fitter.av_grid().values())
            .unwrap();
        let grid = scan_grid(&cube, &flux, &ivar, &fitter.nnls).unwrap();
        assert!(grid.chi2[1] < 1e-6, "chi2 = {:?}", grid.chi2);
        assert!((grid.coeffs[1][0] - 0.5).abs() < 1e-3, "coeff = {:?}", grid.coeffs[1]);
        assert!(grid.coeffs[1][1].abs() < 1e-3, "coeff = {:?}", grid.coeffs[1]);
        assert!(grid.chi2[0] > 0.0 && grid.chi2[2] > 0.0);

        let fit = fitter
            .fit_spectrum(&SpectralInput {
                id: "two",
                redshift: 0.1,
                channels: &channels,
                flux: &flux,
                ivar: &ivar,
                snr: &[],
            })
            .unwrap();

        // The refined value is the vertex of the parabola through the three
        // grid points.
        let [a, b, _] = fit_quadratic(&grid.values, &grid.chi2).unwrap();
        assert_eq!(fit.av.status, FitStatus::Refined);
        assert!((fit.av.value + b / (2.0 * a)).abs() < 1e-9, "A(V) = {}", fit.av.value);
        assert!((fit.av.ivar - a).abs() < 1e-9 * a);
        assert!(fit.av.value > 0.25 && fit.av.value < 0.75, "A(V) = {}", fit.av.value);

        // Final coefficients are the NNLS solution at the refined A(V).
        let best = fitter
            .generator(&templates)
            .generate(&ModelRequest {
                av: Some(fit.av.value),
                vdisp: Some(fit.vdisp.value),
                ..base
            })
            .unwrap();
        let solve = solve_coefficients(&best.stacked_channels(), &flux, &ivar, &fitter.nnls).unwrap();
        for (got, want) in fit.coeff.iter().zip(&solve.coeff) {
            assert!((got - want).abs() <= 1e-9 * want.abs().max(1.0), "coeff = {:?}", fit.coeff);
        }
        assert!((fit.chi2 - solve.chi2).abs() <= 1e-9 * solve.chi2.max(1.0));
    }

    #[test]
    fn noisy_two_template_fit_reaches_the_noise_floor() {
        let templates = two_templates();
        let cosmo = FlatLambdaCdm::default();
        let fitter = ContinuumFitter::new(&templates, &cosmo, &FitConfig::default())
            .unwrap()
            .with_solve_vdisp(false);

        let wave = channel_grid();
        let channels = [ChannelGrid { wave: &wave, resolution: None }];
        let model = two_template_truth(&fitter, &cosmo, &channels);
        let sigma: Vec<f64> = model.iter().map(|f| 0.1 * f).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let flux: Vec<f64> = model
            .iter()
            .zip(&sigma)
            .map(|(f, s)| f + Normal::new(0.0, *s).unwrap().sample(&mut rng))
            .collect();
        let ivar: Vec<f64> = sigma.iter().map(|s| 1.0 / (s * s)).collect();

        let fit = fitter
            .fit_spectrum(&SpectralInput {
                id: "noisy",
                redshift: 0.1,
                channels: &channels,
                flux: &flux,
                ivar: &ivar,
                snr: &[],
            })
            .unwrap();
        assert!((fit.chi2 - 1.0).abs() < 0.15, "chi2 = {}", fit.chi2);
        assert_eq!(fit.av.status, FitStatus::Refined);
        assert!(fit.av.ivar.is_finite() && fit.av.ivar > 0.0);
        assert!((fit.av.value - 0.5).abs() < 0.25, "A(V) = {}", fit.av.value);
    }

    #[test]
    fn photometric_fit_reproduces_band_fluxes() {
        let templates = toy_templates(&SyntheticConfig::default()).unwrap();
        let filters = toy_filters().unwrap();
        let cosmo = FlatLambdaCdm::default();
        let fitter = ContinuumFitter::new(&templates, &cosmo, &FitConfig::default()).unwrap();

        let mut truth_coeff = vec![0.0; templates.nsed()];
        truth_coeff[1] = 2.0;
        let truth = ModelGenerator::new(&fitter.nominal, &cosmo)
            .with_filters(&filters)
            .generate(&ModelRequest {
                synthphot: true,
                coeff: Some(&truth_coeff),
                ..ModelRequest::at_redshift(0.2)
            })
            .unwrap();
        let flam: Vec<f64> = truth.photometry.unwrap().iter().copied().collect();
        let flam_ivar: Vec<f64> = flam.iter().map(|f| 1.0 / (0.05 * f).powi(2)).collect();

        let fit = fitter
            .fit_photometry(&PhotometricInput {
                id: "phot",
                redshift: 0.2,
                filters: &filters,
                flam: &flam,
                flam_ivar: &flam_ivar,
            })
            .unwrap();
        assert_eq!(fit.model_nanomaggies.len(), filters.len());
        assert!(fit.chi2 < 0.05, "chi2 = {}", fit.chi2);
        assert!(fit.coeff.iter().all(|c| *c >= 0.0));
        for ((model, flam), lambda) in fit.model_nanomaggies.iter().zip(&flam).zip(filters.effective_wavelengths()) {
            let observed = flam / FLUXNORM / maggies_to_flam(lambda) * 1e9;
            assert!((model / observed - 1.0).abs() < 0.05);
        }
    }
}
