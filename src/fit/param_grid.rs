//! Nuisance-parameter grids.
//!
//! Grids are linear between `min` and `max` with `ceil((max − min) / step)`
//! points (at least one), and always contain the nominal value so a failed
//! refinement can fall back to a grid point.

use crate::domain::{GridSpec, ParamKind};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    kind: ParamKind,
    values: Vec<f64>,
    nominal: f64,
}

impl ParamGrid {
    /// Validate an explicit grid.
    ///
    /// - values finite and strictly increasing
    /// - `nominal` is one of the values
    /// - an A(V) grid starts at exactly zero (the dust-free models)
    pub fn new(kind: ParamKind, values: Vec<f64>, nominal: f64) -> Result<Self, AppError> {
        if values.is_empty() {
            return Err(AppError::invalid(format!("{} grid is empty", kind.label())));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(AppError::invalid(format!("{} grid has non-finite values", kind.label())));
        }
        if values.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::invalid(format!(
                "{} grid is not strictly increasing",
                kind.label()
            )));
        }
        if kind == ParamKind::Av && values[0] != 0.0 {
            return Err(AppError::invalid(format!(
                "A(V) grid must start at 0, got {}",
                values[0]
            )));
        }
        if !values.contains(&nominal) {
            return Err(AppError::invalid(format!(
                "nominal {} = {nominal} is not on the grid",
                kind.label()
            )));
        }
        Ok(Self { kind, values, nominal })
    }

    /// Linearly spaced grid with the nominal value merged in.
    pub fn linear(kind: ParamKind, min: f64, max: f64, step: f64, nominal: f64) -> Result<Self, AppError> {
        if !(min.is_finite() && max.is_finite() && step.is_finite() && nominal.is_finite()) {
            return Err(AppError::invalid(format!("{} grid bounds must be finite", kind.label())));
        }
        if max < min || step <= 0.0 {
            return Err(AppError::invalid(format!(
                "invalid {} grid: min={min}, max={max}, step={step}",
                kind.label()
            )));
        }

        let n = (((max - min) / step).ceil() as usize).max(1);
        let mut values = linspace(min, max, n);
        if !values.contains(&nominal) {
            let at = values.partition_point(|v| *v < nominal);
            values.insert(at, nominal);
        }
        Self::new(kind, values, nominal)
    }

    pub fn from_spec(kind: ParamKind, spec: &GridSpec) -> Result<Self, AppError> {
        Self::linear(kind, spec.min, spec.max, spec.step, spec.nominal)
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn nominal(&self) -> f64 {
        self.nominal
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// `n` evenly spaced points from `start` to `stop` inclusive; a single point
/// is `start`.
fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![start];
    }
    let step = (stop - start) / (n - 1) as f64;
    (0..n)
        .map(|i| if i == n - 1 { stop } else { start + step * i as f64 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_av_grid_has_fifteen_points() {
        let grid = ParamGrid::from_spec(ParamKind::Av, &GridSpec::av()).unwrap();
        assert_eq!(grid.len(), 15);
        assert_eq!(grid.values()[0], 0.0);
        assert_eq!(grid.values()[14], 1.5);
        assert_eq!(grid.nominal(), 0.0);
    }

    #[test]
    fn vdisp_grid_gains_its_nominal_value() {
        let grid = ParamGrid::from_spec(ParamKind::Vdisp, &GridSpec::vdisp()).unwrap();
        // 13 linspace points between 100 and 350 do not hit 150 exactly.
        assert_eq!(grid.len(), 14);
        assert!(grid.values().contains(&150.0));
        assert!(grid.values().windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn degenerate_range_is_a_single_point() {
        let grid = ParamGrid::linear(ParamKind::Av, 0.0, 0.0, 0.1, 0.0).unwrap();
        assert_eq!(grid.values(), &[0.0]);
    }

    #[test]
    fn av_grid_must_start_at_zero() {
        let err = ParamGrid::new(ParamKind::Av, vec![0.1, 0.2], 0.1).unwrap_err();
        assert!(err.to_string().contains("start at 0"));
        assert!(ParamGrid::linear(ParamKind::Av, 0.1, 1.0, 0.1, 0.1).is_err());
    }

    #[test]
    fn rejects_unsorted_values() {
        assert!(ParamGrid::new(ParamKind::Vdisp, vec![100.0, 300.0, 200.0], 100.0).is_err());
    }
}
