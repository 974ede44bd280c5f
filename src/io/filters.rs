//! Filter-curve JSON: `{ "south": {...}, "north": {...}, "absmag": {...} }`,
//! each a `FilterSet` (`{ "filters": [{ "name", "wave", "response" }] }`).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::AppError;
use crate::models::PhotometricFilters;

pub fn read_filters(path: &Path) -> Result<PhotometricFilters, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("failed to open filter file '{}': {e}", path.display())))?;
    let filters: PhotometricFilters = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::invalid(format!("invalid filter file '{}': {e}", path.display())))?;
    filters.validate()?;
    log::info!(
        "loaded filters: south [{}], north [{}], absmag [{}]",
        filters.south.names().join(","),
        filters.north.names().join(","),
        filters.absmag.names().join(",")
    );
    Ok(filters)
}
