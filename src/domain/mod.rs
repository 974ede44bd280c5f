//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - shared constants and enums (`PhotSystem`, `ParamKind`, `FitStatus`)
//! - the template library and the explicit model cube
//! - per-object observations (channels, coadd, photometry)
//! - run configuration (`FitConfig`)
//! - fit results and derived quantities (`ObjectResult` and friends)

pub mod config;
pub mod cube;
pub mod results;
pub mod spectrum;
pub mod templates;
pub mod types;

pub use config::*;
pub use cube::*;
pub use results::*;
pub use spectrum::*;
pub use templates::*;
pub use types::*;
