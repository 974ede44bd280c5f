//! Template library JSON.
//!
//! ```json
//! {
//!   "wave": [1000.0, ...],
//!   "flux": [[...], [...]],
//!   "info": [{ "age": 1e9, "mstar": 0.8 }, ...],
//!   "pixkms": 25.0,
//!   "wave_split": 9100.0
//! }
//! ```
//!
//! `flux` holds one array per template, each on `wave`, in erg/s/cm²/Å for
//! one solar mass at 10 pc.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::{TemplateInfo, TemplateLibrary};
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateFile {
    pub wave: Vec<f64>,
    pub flux: Vec<Vec<f64>>,
    pub info: Vec<TemplateInfo>,
    pub pixkms: f64,
    pub wave_split: f64,
}

impl TemplateFile {
    pub fn into_library(self) -> Result<TemplateLibrary, AppError> {
        let npix = self.wave.len();
        if let Some((i, col)) = self.flux.iter().enumerate().find(|(_, c)| c.len() != npix) {
            return Err(AppError::invalid(format!(
                "template {i} has {} pixels, wavelength grid has {npix}",
                col.len()
            )));
        }
        let flux = DMatrix::from_fn(npix, self.flux.len(), |r, c| self.flux[c][r]);
        TemplateLibrary::new(self.wave, flux, self.info, self.pixkms, self.wave_split)
    }

    pub fn from_library(lib: &TemplateLibrary) -> Self {
        Self {
            wave: lib.wave().to_vec(),
            flux: lib.flux().column_iter().map(|c| c.iter().copied().collect()).collect(),
            info: lib.info().to_vec(),
            pixkms: lib.pixkms(),
            wave_split: lib.wave_split(),
        }
    }
}

pub fn read_templates(path: &Path) -> Result<TemplateLibrary, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("failed to open template library '{}': {e}", path.display())))?;
    let parsed: TemplateFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::invalid(format!("invalid template library '{}': {e}", path.display())))?;
    let lib = parsed.into_library()?;
    log::info!(
        "loaded {} templates on {} pixels ({:.0}-{:.0} Å) from {}",
        lib.nsed(),
        lib.npix(),
        lib.wave()[0],
        lib.wave()[lib.npix() - 1],
        path.display()
    );
    Ok(lib)
}

pub fn write_templates(path: &Path, lib: &TemplateLibrary) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("failed to create template library '{}': {e}", path.display())))?;
    serde_json::to_writer(file, &TemplateFile::from_library(lib))
        .map_err(|e| AppError::io(format!("failed to write template library: {e}")))
}
