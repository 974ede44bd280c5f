//! Crate-wide error type.
//!
//! Only *fatal* conditions are errors. Numerical non-convergence (NNLS hitting
//! its iteration cap, a degenerate chi-square parabola, a D4000 window without
//! coverage) degrades to sentinel values plus a log warning and never shows up
//! here.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// A caller handed us data that violates an input contract
    /// (negative inverse variance, mismatched template dimensions, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Not enough usable pixels/bands left to fit an object.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Missing or malformed run configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Io(String),
}

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::InsufficientData(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Process exit code used by the `fastspec` binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) => 2,
            AppError::InvalidInput(_) => 3,
            AppError::InsufficientData(_) => 4,
            AppError::Io(_) => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            AppError::config("x").exit_code(),
            AppError::invalid("x").exit_code(),
            AppError::insufficient("x").exit_code(),
            AppError::io("x").exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn display_names_the_violation() {
        let err = AppError::invalid("negative inverse variance in channel b");
        assert_eq!(
            err.to_string(),
            "invalid input: negative inverse variance in channel b"
        );
    }
}
