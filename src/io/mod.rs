//! Input/output helpers.
//!
//! - template library JSON (`templates`)
//! - filter curves JSON (`filters`)
//! - object batches and run configuration (`job`)
//! - result exports, CSV/JSON (`export`)

pub mod export;
pub mod filters;
pub mod job;
pub mod templates;

pub use export::*;
pub use filters::*;
pub use job::*;
pub use templates::*;
