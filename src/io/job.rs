//! Object batches and run configuration.
//!
//! A batch is a JSON array of `Observation`s (see `domain::spectrum`); the
//! configuration file is a partial `FitConfig`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::domain::{FitConfig, Observation};
use crate::error::AppError;

/// Read a batch. Objects are validated one by one later so that a bad object
/// does not sink the batch; only malformed JSON is fatal here.
pub fn read_observations(path: &Path) -> Result<Vec<Observation>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("failed to open input '{}': {e}", path.display())))?;
    let objects: Vec<Observation> = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::invalid(format!("invalid input '{}': {e}", path.display())))?;
    if objects.is_empty() {
        return Err(AppError::insufficient(format!("input '{}' holds no objects", path.display())));
    }
    log::info!("read {} object(s) from {}", objects.len(), path.display());
    Ok(objects)
}

pub fn write_observations(path: &Path, objects: &[Observation]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("failed to create '{}': {e}", path.display())))?;
    serde_json::to_writer(file, objects).map_err(|e| AppError::io(format!("failed to write observations: {e}")))
}

pub fn read_config(path: &Path) -> Result<FitConfig, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("failed to open config '{}': {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::config(format!("invalid config '{}': {e}", path.display())))
}
