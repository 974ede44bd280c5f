//! Deterministic synthetic inputs.
//!
//! Toy stellar-population templates, top-hat filter sets and mock
//! observations built from them with seeded Gaussian noise. Used by the unit
//! tests and for end-to-end validation runs where the true A(V), velocity
//! dispersion and coefficients are known.

use nalgebra::DMatrix;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{
    C_LIGHT_KMS, Channel, FLUXNORM, Observation, PhotSystem, Photometry, TemplateInfo, TemplateLibrary,
};
use crate::error::AppError;
use crate::models::filters::maggies_to_flam;
use crate::models::{
    ChannelGrid, Cosmology, FilterCurve, FilterSet, ModelGenerator, ModelRequest, PhotometricFilters,
    ResolutionMatrix,
};

/// Flux density of a one-solar-mass population at 10 pc near 5500 Å,
/// erg/s/cm²/Å.
const TEMPLATE_SCALE: f64 = 3e-11;

/// Stellar absorption features imprinted on the toy templates: rest
/// wavelength (Å), Gaussian σ (Å) and fractional depth for an old population.
const ABSORPTION: [(f64, f64, f64); 6] = [
    (3934.8, 4.0, 0.45),
    (3969.6, 4.0, 0.40),
    (4305.0, 6.0, 0.15),
    (4862.7, 4.0, 0.12),
    (5176.7, 5.0, 0.18),
    (5895.6, 4.0, 0.15),
];

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub wave_min: f64,
    pub wave_max: f64,
    pub pixkms: f64,
    pub wave_split: f64,
    /// One template per age, years.
    pub ages: Vec<f64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            wave_min: 1000.0,
            wave_max: 12_000.0,
            pixkms: 60.0,
            wave_split: 9000.0,
            ages: vec![1e8, 1e9, 5e9, 1e10],
        }
    }
}

/// Wavelength grid with constant velocity spacing `pixkms`.
pub fn log_wave_grid(wave_min: f64, wave_max: f64, pixkms: f64) -> Vec<f64> {
    let dlog = (1.0 + pixkms / C_LIGHT_KMS).ln();
    let n = ((wave_max / wave_min).ln() / dlog).floor() as usize + 1;
    (0..n).map(|i| wave_min * (dlog * i as f64).exp()).collect()
}

pub fn toy_templates(cfg: &SyntheticConfig) -> Result<TemplateLibrary, AppError> {
    if cfg.ages.is_empty() {
        return Err(AppError::invalid("synthetic templates need at least one age"));
    }
    let wave = log_wave_grid(cfg.wave_min, cfg.wave_max, cfg.pixkms);
    let columns: Vec<Vec<f64>> = cfg.ages.iter().map(|age| template_flux(&wave, *age)).collect();
    let flux = DMatrix::from_fn(wave.len(), columns.len(), |r, c| columns[c][r]);
    let info = cfg
        .ages
        .iter()
        .map(|&age| {
            let oldness = age_fraction(age);
            TemplateInfo {
                age,
                mstar: 1.0 - 0.4 * oldness,
                sfr: if age < 1e9 { 1.0 / age * 1e8 } else { 0.0 },
                zzsun: 1.0,
            }
        })
        .collect();
    TemplateLibrary::new(wave, flux, info, cfg.pixkms, cfg.wave_split)
}

/// 0 for a 10 Myr population, 1 for 10 Gyr.
fn age_fraction(age_yr: f64) -> f64 {
    ((age_yr.log10() - 7.0) / 3.0).clamp(0.0, 1.0)
}

/// Power-law continuum whose slope reddens with age, a 4000 Å break and a
/// handful of absorption lines, all deepening with age.
fn template_flux(wave: &[f64], age_yr: f64) -> Vec<f64> {
    let oldness = age_fraction(age_yr);
    let slope = 2.5 - 3.5 * oldness;
    let break_depth = 0.1 + 0.5 * oldness;
    wave.iter()
        .map(|&w| {
            let continuum = (w / 5500.0).powf(-slope);
            let step = 1.0 - break_depth * 0.5 * (1.0 - ((w - 4000.0) / 40.0).tanh());
            let lines: f64 = ABSORPTION
                .iter()
                .map(|(center, sigma, depth)| {
                    1.0 - depth * (0.3 + 0.7 * oldness) * (-0.5 * ((w - center) / sigma).powi(2)).exp()
                })
                .product();
            TEMPLATE_SCALE * (1.0 - 0.3 * oldness) * continuum * step * lines
        })
        .collect()
}

/// Optical top-hat bands `g r i z`.
pub fn toy_filters() -> Result<FilterSet, AppError> {
    FilterSet::new(vec![
        FilterCurve::top_hat("g", 4000.0, 5400.0, 141)?,
        FilterCurve::top_hat("r", 5600.0, 7000.0, 141)?,
        FilterCurve::top_hat("i", 7000.0, 8500.0, 151)?,
        FilterCurve::top_hat("z", 8500.0, 10_000.0, 151)?,
    ])
}

/// Toy filter sets for both photometric systems plus rest-frame `u g r`
/// bands for absolute magnitudes.
pub fn toy_photometric_filters() -> Result<PhotometricFilters, AppError> {
    let south = toy_filters()?;
    let north = FilterSet::new(vec![
        FilterCurve::top_hat("g", 4050.0, 5450.0, 141)?,
        FilterCurve::top_hat("r", 5650.0, 7050.0, 141)?,
        FilterCurve::top_hat("i", 7000.0, 8500.0, 151)?,
        FilterCurve::top_hat("z", 8450.0, 9950.0, 151)?,
    ])?;
    let absmag = FilterSet::new(vec![
        FilterCurve::top_hat("U", 3200.0, 3900.0, 71)?,
        FilterCurve::top_hat("G", 4000.0, 5400.0, 141)?,
        FilterCurve::top_hat("R", 5600.0, 7000.0, 141)?,
    ])?;
    let filters = PhotometricFilters { south, north, absmag };
    filters.validate()?;
    Ok(filters)
}

/// Gaussian emission line injected into a mock spectrum.
#[derive(Debug, Clone, Copy)]
pub struct EmissionLine {
    /// Rest-frame vacuum wavelength, Å.
    pub wave: f64,
    /// Peak flux density, 1e-17 erg/s/cm²/Å.
    pub amplitude: f64,
    pub sigma_kms: f64,
}

/// Recipe for one mock object.
#[derive(Debug, Clone)]
pub struct MockObject {
    pub id: String,
    pub redshift: f64,
    pub photsys: PhotSystem,
    pub ebv: f64,
    pub av: f64,
    pub vdisp: f64,
    /// One coefficient per template.
    pub coeff: Vec<f64>,
    /// Per-pixel noise, 1e-17 erg/s/cm²/Å.
    pub noise: f64,
    /// Fractional noise on each band flux.
    pub phot_noise: f64,
    pub lines: Vec<EmissionLine>,
    /// Observed-frame channel ranges (Å).
    pub channels: Vec<(String, f64, f64)>,
    pub channel_step: f64,
    /// Instrumental line-spread σ in pixels; `None` skips the resolution
    /// operator.
    pub resolution_sigma: Option<f64>,
}

impl MockObject {
    pub fn new(id: impl Into<String>, redshift: f64, coeff: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            redshift,
            photsys: PhotSystem::South,
            ebv: 0.0,
            av: 0.3,
            vdisp: 150.0,
            coeff,
            noise: 0.05,
            phot_noise: 0.02,
            lines: Vec::new(),
            channels: vec![
                ("b".to_string(), 3600.0, 5800.0),
                ("r".to_string(), 5760.0, 7620.0),
                ("z".to_string(), 7520.0, 9800.0),
            ],
            channel_step: 2.0,
            resolution_sigma: Some(1.0),
        }
    }
}

/// Render `mock` with the given templates: channel spectra (continuum plus
/// lines plus noise), broadband photometry and no coadd.
pub fn mock_observation(
    templates: &TemplateLibrary,
    cosmology: &dyn Cosmology,
    filters: &PhotometricFilters,
    mock: &MockObject,
) -> Result<Observation, AppError> {
    let mut rng = StdRng::seed_from_u64(seed_for(&mock.id));
    let noise = Normal::new(0.0, 1.0).map_err(|e| AppError::invalid(format!("noise distribution: {e}")))?;

    let grids: Vec<Vec<f64>> = mock
        .channels
        .iter()
        .map(|(_, lo, hi)| {
            let n = ((hi - lo) / mock.channel_step).floor() as usize + 1;
            (0..n).map(|i| lo + mock.channel_step * i as f64).collect()
        })
        .collect();
    let resolutions: Vec<Option<ResolutionMatrix>> = grids
        .iter()
        .map(|g| {
            mock.resolution_sigma
                .map(|sigma| ResolutionMatrix::gaussian(g.len(), sigma, 11))
                .transpose()
        })
        .collect::<Result<_, _>>()?;
    let channel_grids: Vec<ChannelGrid<'_>> = grids
        .iter()
        .zip(&resolutions)
        .map(|(wave, res)| ChannelGrid {
            wave,
            resolution: res.as_ref(),
        })
        .collect();

    let set = filters.for_system(mock.photsys);
    let model = ModelGenerator::new(templates, cosmology).with_filters(set).generate(&ModelRequest {
        av: Some(mock.av),
        vdisp: Some(mock.vdisp),
        channels: &channel_grids,
        synthphot: true,
        coeff: Some(&mock.coeff),
        ..ModelRequest::at_redshift(mock.redshift)
    })?;

    let ivar_value = 1.0 / (mock.noise * mock.noise);
    let channels = mock
        .channels
        .iter()
        .zip(&grids)
        .zip(&model.channels)
        .zip(resolutions)
        .map(|(((meta, wave), flux), resolution)| {
            let flux = wave
                .iter()
                .zip(flux.iter())
                .map(|(w, f)| f + line_flux(*w, mock) + mock.noise * noise.sample(&mut rng))
                .collect();
            Channel {
                name: meta.0.clone(),
                wave: wave.clone(),
                flux,
                ivar: vec![ivar_value; wave.len()],
                mask: None,
                resolution,
            }
        })
        .collect();

    let photometry = model.photometry.map(|phot| {
        let mut nanomaggies = Vec::with_capacity(set.len());
        let mut ivar = Vec::with_capacity(set.len());
        for (flam, lambda) in phot.iter().zip(set.effective_wavelengths()) {
            let truth = flam / FLUXNORM / maggies_to_flam(lambda) * 1e9;
            let sigma = (mock.phot_noise * truth.abs()).max(1e-3);
            nanomaggies.push(truth + sigma * noise.sample(&mut rng));
            ivar.push(1.0 / (sigma * sigma));
        }
        Photometry {
            bands: set.names(),
            nanomaggies,
            ivar,
        }
    });

    Ok(Observation {
        id: mock.id.clone(),
        redshift: mock.redshift,
        ebv: mock.ebv,
        photsys: mock.photsys,
        channels,
        coadd: None,
        photometry,
        fiber_photometry: None,
    })
}

fn line_flux(obs_wave: f64, mock: &MockObject) -> f64 {
    mock.lines
        .iter()
        .map(|line| {
            let center = line.wave * (1.0 + mock.redshift);
            let sigma = center * line.sigma_kms / C_LIGHT_KMS;
            line.amplitude * (-0.5 * ((obs_wave - center) / sigma).powi(2)).exp()
        })
        .sum()
}

/// Stable per-object seed so mock batches do not depend on evaluation order.
fn seed_for(id: &str) -> u64 {
    // FNV-1a
    id.bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3))
}

/// Power-law spectrum with Gaussian noise on an arbitrary grid, for
/// estimator tests that do not need templates.
pub fn noisy_power_law(wave: &[f64], amplitude: f64, slope: f64, noise: f64, seed: u64) -> (Vec<f64>, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let flux = match Normal::new(0.0, noise.max(f64::MIN_POSITIVE)) {
        Ok(dist) => wave
            .iter()
            .map(|w| amplitude * (w / 5000.0).powf(slope) + dist.sample(&mut rng))
            .collect(),
        Err(_) => wave.iter().map(|w| amplitude * (w / 5000.0).powf(slope)).collect(),
    };
    let ivar = vec![1.0 / (noise * noise); wave.len()];
    (flux, ivar)
}
