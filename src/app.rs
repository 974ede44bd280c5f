//! Top-level application orchestration.
//!
//! `src/main.rs` only initialises logging and maps errors to exit codes; this
//! module is the "real main" that:
//! - reads run settings from the environment (`.env` honoured)
//! - loads templates, filter curves, the run configuration and the batch
//! - fits every object in parallel
//! - writes the results table

use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::domain::FitConfig;
use crate::error::AppError;
use crate::io::{read_config, read_filters, read_observations, read_templates, write_results_csv, write_results_json};
use crate::models::FlatLambdaCdm;
use crate::report::format::format_batch_summary;

pub mod pipeline;

/// Where to read from and write to, plus the switches that may override the
/// configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub templates: PathBuf,
    pub filters: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub config: Option<PathBuf>,
    pub threads: Option<usize>,
    pub solve_vdisp: Option<bool>,
    pub fastphot: Option<bool>,
}

impl RunSettings {
    /// Settings from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Settings from an arbitrary variable lookup.
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let required = |key: &str| -> Result<PathBuf, AppError> {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| AppError::config(format!("missing {key} in environment (.env)")))
        };
        let threads = match get("FASTSPEC_THREADS") {
            Some(v) => {
                let n: usize = v
                    .trim()
                    .parse()
                    .map_err(|_| AppError::config(format!("FASTSPEC_THREADS must be a positive integer, got '{v}'")))?;
                if n == 0 {
                    return Err(AppError::config("FASTSPEC_THREADS must be at least 1"));
                }
                Some(n)
            }
            None => None,
        };
        Ok(Self {
            templates: required("FASTSPEC_TEMPLATES")?,
            filters: required("FASTSPEC_FILTERS")?,
            input: required("FASTSPEC_INPUT")?,
            output: required("FASTSPEC_OUTPUT")?,
            config: get("FASTSPEC_CONFIG").filter(|v| !v.trim().is_empty()).map(PathBuf::from),
            threads,
            solve_vdisp: get("FASTSPEC_SOLVE_VDISP").map(|v| parse_bool("FASTSPEC_SOLVE_VDISP", &v)).transpose()?,
            fastphot: get("FASTSPEC_FASTPHOT").map(|v| parse_bool("FASTSPEC_FASTPHOT", &v)).transpose()?,
        })
    }

    /// The configuration file (or defaults) with the switch overrides applied.
    pub fn fit_config(&self) -> Result<FitConfig, AppError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => FitConfig::default(),
        };
        if let Some(v) = self.solve_vdisp {
            config.solve_vdisp = v;
        }
        if let Some(v) = self.fastphot {
            config.fastphot = v;
        }
        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::config(format!("{key} must be a boolean, got '{other}'"))),
    }
}

fn wants_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Entry point for the `fastspec` binary.
pub fn run() -> Result<(), AppError> {
    let settings = RunSettings::from_env()?;
    run_with(&settings)
}

pub fn run_with(settings: &RunSettings) -> Result<(), AppError> {
    let config = settings.fit_config()?;
    let templates = read_templates(&settings.templates)?;
    let filters = read_filters(&settings.filters)?;
    let objects = read_observations(&settings.input)?;
    let cosmology = FlatLambdaCdm::default();

    let ctx = pipeline::FitContext::new(&templates, &filters, &cosmology, &config)?;
    let started = Instant::now();
    let (results, failures) = pipeline::fit_batch(&ctx, &objects, settings.threads)?;
    log::info!(
        "{}",
        format_batch_summary(results.len(), failures.len(), started.elapsed().as_secs_f64())
    );

    if wants_json(&settings.output) {
        write_results_json(&settings.output, &results, &failures, &config)?;
    } else {
        write_results_csv(&settings.output, &results, &failures)?;
    }
    log::info!("wrote results to {}", settings.output.display());

    if results.is_empty() {
        return Err(AppError::insufficient(format!(
            "all {} object(s) failed to fit",
            failures.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    const PATHS: [(&str, &str); 4] = [
        ("FASTSPEC_TEMPLATES", "templates.json"),
        ("FASTSPEC_FILTERS", "filters.json"),
        ("FASTSPEC_INPUT", "batch.json"),
        ("FASTSPEC_OUTPUT", "out.csv"),
    ];

    #[test]
    fn required_paths_and_optional_switches() {
        let settings = RunSettings::from_vars(vars(&PATHS)).unwrap();
        assert_eq!(settings.output, PathBuf::from("out.csv"));
        assert_eq!(settings.threads, None);
        assert_eq!(settings.fastphot, None);
        assert_eq!(settings.fit_config().unwrap(), FitConfig::default());

        let mut pairs = PATHS.to_vec();
        pairs.extend([("FASTSPEC_THREADS", "4"), ("FASTSPEC_SOLVE_VDISP", "Yes"), ("FASTSPEC_FASTPHOT", "0")]);
        let settings = RunSettings::from_vars(vars(&pairs)).unwrap();
        assert_eq!(settings.threads, Some(4));
        let config = settings.fit_config().unwrap();
        assert!(config.solve_vdisp);
        assert!(!config.fastphot);
    }

    #[test]
    fn missing_or_malformed_settings_are_config_errors() {
        let err = RunSettings::from_vars(vars(&PATHS[..3])).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        for (key, value) in [("FASTSPEC_THREADS", "0"), ("FASTSPEC_THREADS", "many"), ("FASTSPEC_FASTPHOT", "maybe")] {
            let mut pairs = PATHS.to_vec();
            pairs.push((key, value));
            let err = RunSettings::from_vars(vars(&pairs)).unwrap_err();
            assert_eq!(err.exit_code(), 2, "{key}={value}");
        }
    }

    #[test]
    fn output_format_follows_the_extension() {
        assert!(wants_json(Path::new("out/results.JSON")));
        assert!(!wants_json(Path::new("results.csv")));
        assert!(!wants_json(Path::new("results")));
    }
}
