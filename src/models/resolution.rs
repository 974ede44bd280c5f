//! Instrumental resolution operator in banded (diagonal) storage.
//!
//! `data[d][j]` holds the matrix element on diagonal `d` in column `j`, with
//! diagonal offsets running `ndiag/2, …, 0, …, −ndiag/2`. Applied to a model
//! `x`, the convolved flux is
//!
//! ```text
//! y[i] = Σ_d data[d][i + off_d] · x[i + off_d]
//! ```

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionMatrix {
    data: Vec<Vec<f64>>,
}

impl ResolutionMatrix {
    pub fn new(data: Vec<Vec<f64>>) -> Result<Self, AppError> {
        let res = Self { data };
        res.validate()?;
        Ok(res)
    }

    /// Identity operator (one diagonal of ones).
    pub fn identity(npix: usize) -> Self {
        Self {
            data: vec![vec![1.0; npix]],
        }
    }

    /// Gaussian line-spread function of `sigma_pix` pixels with `ndiag`
    /// diagonals, each column normalised to unit sum.
    pub fn gaussian(npix: usize, sigma_pix: f64, ndiag: usize) -> Result<Self, AppError> {
        if ndiag % 2 == 0 || !(sigma_pix > 0.0) {
            return Err(AppError::invalid("gaussian resolution needs odd ndiag and sigma > 0"));
        }
        let half = (ndiag / 2) as f64;
        let profile: Vec<f64> = (0..ndiag)
            .map(|d| (-0.5 * ((half - d as f64) / sigma_pix).powi(2)).exp())
            .collect();
        let norm: f64 = profile.iter().sum();
        let data = profile.iter().map(|p| vec![p / norm; npix]).collect();
        Self::new(data)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let ndiag = self.data.len();
        if ndiag == 0 || ndiag % 2 == 0 {
            return Err(AppError::invalid(format!(
                "resolution matrix needs an odd number of diagonals, got {ndiag}"
            )));
        }
        let npix = self.data[0].len();
        if self.data.iter().any(|row| row.len() != npix) {
            return Err(AppError::invalid("resolution matrix diagonals have different lengths"));
        }
        if self.data.iter().flatten().any(|v| !v.is_finite()) {
            return Err(AppError::invalid("resolution matrix contains non-finite values"));
        }
        Ok(())
    }

    pub fn ndiag(&self) -> usize {
        self.data.len()
    }

    pub fn npix(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    pub fn apply(&self, x: &[f64]) -> Result<Vec<f64>, AppError> {
        let npix = self.npix();
        if x.len() != npix {
            return Err(AppError::invalid(format!(
                "resolution matrix covers {npix} pixels but the model has {}",
                x.len()
            )));
        }
        let half = (self.ndiag() / 2) as i64;
        let mut y = vec![0.0; npix];
        for (d, diag) in self.data.iter().enumerate() {
            let off = half - d as i64;
            for (i, yi) in y.iter_mut().enumerate() {
                let j = i as i64 + off;
                if j >= 0 && (j as usize) < npix {
                    *yi += diag[j as usize] * x[j as usize];
                }
            }
        }
        Ok(y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_a_no_op() {
        let x = vec![1.0, 5.0, 2.0];
        assert_eq!(ResolutionMatrix::identity(3).apply(&x).unwrap(), x);
    }

    #[test]
    fn offsets_follow_banded_convention() {
        // Three diagonals; only the upper one (offset +1) is non-zero, so
        // y[i] = data[0][i+1] · x[i+1].
        let data = vec![vec![10.0, 20.0, 30.0], vec![0.0; 3], vec![0.0; 3]];
        let r = ResolutionMatrix::new(data).unwrap();
        let y = r.apply(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(y, vec![40.0, 90.0, 0.0]);
    }

    #[test]
    fn gaussian_preserves_constant_interior() {
        let r = ResolutionMatrix::gaussian(50, 1.5, 11).unwrap();
        let y = r.apply(&vec![2.0; 50]).unwrap();
        assert!((y[25] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_even_band_count() {
        assert!(ResolutionMatrix::new(vec![vec![1.0], vec![1.0]]).is_err());
    }
}
