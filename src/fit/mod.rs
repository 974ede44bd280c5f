//! Continuum fitting.
//!
//! Responsibilities:
//!
//! - build the A(V) / vdisp parameter grids
//! - evaluate every grid value (parallel) and refine the chi-square minimum
//! - run the spectroscopic and photometric continuum fits

pub mod continuum;
pub mod param_grid;
pub mod scan;

pub use continuum::*;
pub use param_grid::*;
pub use scan::*;
