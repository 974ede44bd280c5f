//! Model construction: the physical stages that turn rest-frame templates
//! into observed-frame spectra and photometry.
//!
//! Each stage is a small function over arrays so the generator can chain them
//! and tests can exercise them alone.

pub mod broaden;
pub mod cosmology;
pub mod dust;
pub mod extinction;
pub mod filters;
pub mod generator;
pub mod igm;
pub mod resolution;

pub use cosmology::{Cosmology, FlatLambdaCdm};
pub use filters::{FilterCurve, FilterSet, PhotometricFilters};
pub use generator::{ChannelGrid, ModelGenerator, ModelOutput, ModelRequest};
pub use resolution::ResolutionMatrix;
