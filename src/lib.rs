//! `fastspec` library crate.
//!
//! Stellar-continuum fitting of galaxy spectra and broadband photometry with
//! a fixed library of simple stellar population templates. The binary
//! (`fastspec`) is a thin wrapper around this library so that:
//!
//! - the fitting core is testable without spawning processes
//! - readers and writers stay separate from the numerics

pub mod app;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod linemask;
pub mod math;
pub mod models;
pub mod report;
