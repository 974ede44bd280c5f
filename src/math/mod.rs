//! Numerical building blocks: constrained and unconstrained least squares,
//! robust statistics, interpolation and a small Levenberg–Marquardt fitter.

pub mod interp;
pub mod lm;
pub mod nnls;
pub mod ols;
pub mod stats;

pub use interp::{interp, interp_one, trapz_rebin};
pub use nnls::{NnlsOptions, NnlsSolution, nnls, nnls_normal};
pub use ols::{fit_quadratic, solve_least_squares};
