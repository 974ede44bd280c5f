//! Model cube: model fluxes over `[pixel, template, parameter value]`.
//!
//! Stored as one `npix × ntemplate` matrix per parameter value. Flattening to a
//! single `npix × (nparam·ntemplate)` matrix is explicit and reversible: column
//! `k·ntemplate + t` holds template `t` at parameter value `k`.

use nalgebra::DMatrix;

use crate::domain::ParamKind;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct ModelCube {
    kind: ParamKind,
    values: Vec<f64>,
    slices: Vec<DMatrix<f64>>,
}

impl ModelCube {
    pub fn new(kind: ParamKind, values: Vec<f64>, slices: Vec<DMatrix<f64>>) -> Result<Self, AppError> {
        if values.is_empty() {
            return Err(AppError::invalid("model cube needs at least one parameter value"));
        }
        if values.len() != slices.len() {
            return Err(AppError::invalid(format!(
                "model cube has {} {} values but {} slices",
                values.len(),
                kind.label(),
                slices.len()
            )));
        }
        let shape = slices[0].shape();
        if let Some(k) = slices.iter().position(|s| s.shape() != shape) {
            return Err(AppError::invalid(format!(
                "model cube slice {k} has shape {:?}, expected {:?}",
                slices[k].shape(),
                shape
            )));
        }
        Ok(Self { kind, values, slices })
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn npix(&self) -> usize {
        self.slices[0].nrows()
    }

    pub fn ntemplate(&self) -> usize {
        self.slices[0].ncols()
    }

    pub fn nparam(&self) -> usize {
        self.values.len()
    }

    pub fn slice(&self, k: usize) -> &DMatrix<f64> {
        &self.slices[k]
    }

    pub fn slices(&self) -> &[DMatrix<f64>] {
        &self.slices
    }

    pub fn flatten(&self) -> DMatrix<f64> {
        let nt = self.ntemplate();
        DMatrix::from_fn(self.npix(), self.nparam() * nt, |r, c| self.slices[c / nt][(r, c % nt)])
    }

    /// Inverse of [`ModelCube::flatten`].
    pub fn from_flat(kind: ParamKind, values: Vec<f64>, flat: &DMatrix<f64>) -> Result<Self, AppError> {
        let nparam = values.len();
        if nparam == 0 || flat.ncols() % nparam != 0 {
            return Err(AppError::invalid(format!(
                "cannot split {} model columns into {nparam} parameter slices",
                flat.ncols()
            )));
        }
        let nt = flat.ncols() / nparam;
        let slices = (0..nparam)
            .map(|k| flat.columns(k * nt, nt).into_owned())
            .collect();
        Self::new(kind, values, slices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_round_trips() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = DMatrix::from_row_slice(2, 2, &[5.0, 6.0, 7.0, 8.0]);
        let cube = ModelCube::new(ParamKind::Av, vec![0.0, 0.5], vec![a.clone(), b.clone()]).unwrap();

        let flat = cube.flatten();
        assert_eq!(flat.shape(), (2, 4));
        // column k·ntemplate + t
        assert_eq!(flat[(1, 3)], b[(1, 1)]);
        assert_eq!(flat[(0, 1)], a[(0, 1)]);

        let back = ModelCube::from_flat(ParamKind::Av, vec![0.0, 0.5], &flat).unwrap();
        assert_eq!(back.slice(0), &a);
        assert_eq!(back.slice(1), &b);
    }

    #[test]
    fn rejects_ragged_slices() {
        let a = DMatrix::zeros(2, 2);
        let b = DMatrix::zeros(3, 2);
        assert!(ModelCube::new(ParamKind::Vdisp, vec![100.0, 150.0], vec![a, b]).is_err());
    }
}
