//! Intergalactic Lyman-series absorption (Madau 1995).
//!
//! Each series line `j` contributes an effective optical depth
//! `τ_j = A_j (λ_obs / λ_j)^3.46` for `λ_j ≤ λ_obs < λ_j (1 + z)`.

const LYMAN_WAVE: [f64; 4] = [1215.67, 1025.72, 972.537, 949.743];
const LYMAN_COEFF: [f64; 4] = [3.6e-3, 1.7e-3, 1.2e-3, 9.3e-4];
const LYMAN_EXPONENT: f64 = 3.46;

/// Transmission `exp(−Σ τ_j)` at observed-frame wavelengths.
pub fn lyman_transmission(obs_wave: &[f64], redshift: f64) -> Vec<f64> {
    if redshift <= 0.0 {
        return vec![1.0; obs_wave.len()];
    }
    obs_wave
        .iter()
        .map(|&w| {
            let tau: f64 = LYMAN_WAVE
                .iter()
                .zip(LYMAN_COEFF)
                .filter(|(lj, _)| w >= **lj && w < **lj * (1.0 + redshift))
                .map(|(lj, aj)| aj * (w / lj).powf(LYMAN_EXPONENT))
                .sum();
            (-tau).exp()
        })
        .collect()
}
