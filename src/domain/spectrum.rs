//! Per-object observational inputs, as handed over by the spectrum reader.

use serde::{Deserialize, Serialize};

use crate::domain::PhotSystem;
use crate::error::AppError;
use crate::models::resolution::ResolutionMatrix;

/// Wavelength / flux / inverse-variance triple on one grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub wave: Vec<f64>,
    pub flux: Vec<f64>,
    pub ivar: Vec<f64>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.wave.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wave.is_empty()
    }

    pub fn validate(&self, what: &str) -> Result<(), AppError> {
        validate_arrays(what, &self.wave, &self.flux, &self.ivar)
    }
}

/// One detector channel (camera) of a spectrum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub wave: Vec<f64>,
    pub flux: Vec<f64>,
    pub ivar: Vec<f64>,
    /// `true` marks a bad pixel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Vec<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionMatrix>,
}

impl Channel {
    pub fn len(&self) -> usize {
        self.wave.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wave.is_empty()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        validate_arrays(&format!("channel {}", self.name), &self.wave, &self.flux, &self.ivar)?;
        if let Some(mask) = &self.mask {
            if mask.len() != self.wave.len() {
                return Err(AppError::invalid(format!(
                    "channel {}: mask has {} pixels, expected {}",
                    self.name,
                    mask.len(),
                    self.wave.len()
                )));
            }
        }
        if let Some(res) = &self.resolution {
            if res.npix() != self.wave.len() {
                return Err(AppError::invalid(format!(
                    "channel {}: resolution matrix covers {} pixels, expected {}",
                    self.name,
                    res.npix(),
                    self.wave.len()
                )));
            }
        }
        Ok(())
    }

    /// Inverse variance with masked pixels zeroed.
    pub fn effective_ivar(&self) -> Vec<f64> {
        match &self.mask {
            Some(mask) => self
                .ivar
                .iter()
                .zip(mask)
                .map(|(iv, bad)| if *bad { 0.0 } else { *iv })
                .collect(),
            None => self.ivar.clone(),
        }
    }

    pub fn as_spectrum(&self) -> Spectrum {
        Spectrum {
            wave: self.wave.clone(),
            flux: self.flux.clone(),
            ivar: self.effective_ivar(),
        }
    }
}

/// Broadband fluxes in nanomaggies, in the band order of the object's filter
/// set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photometry {
    pub bands: Vec<String>,
    pub nanomaggies: Vec<f64>,
    pub ivar: Vec<f64>,
}

impl Photometry {
    pub fn validate(&self) -> Result<(), AppError> {
        let n = self.bands.len();
        if self.nanomaggies.len() != n || self.ivar.len() != n {
            return Err(AppError::invalid(format!(
                "photometry has {n} bands but {} fluxes and {} inverse variances",
                self.nanomaggies.len(),
                self.ivar.len()
            )));
        }
        if self.ivar.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(AppError::invalid("photometry inverse variance must be finite and >= 0"));
        }
        Ok(())
    }
}

/// Everything the fitter needs to know about one object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub redshift: f64,
    /// Milky-Way E(B−V) along the line of sight.
    #[serde(default)]
    pub ebv: f64,
    pub photsys: PhotSystem,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coadd: Option<Spectrum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photometry: Option<Photometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiber_photometry: Option<Photometry>,
}

impl Observation {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.redshift.is_finite() && self.redshift >= 0.0) {
            return Err(AppError::invalid(format!(
                "object {}: redshift must be finite and >= 0, got {}",
                self.id, self.redshift
            )));
        }
        if !(self.ebv.is_finite() && self.ebv >= 0.0) {
            return Err(AppError::invalid(format!("object {}: E(B-V) must be >= 0", self.id)));
        }
        for channel in &self.channels {
            channel.validate()?;
        }
        if let Some(coadd) = &self.coadd {
            coadd.validate("coadd")?;
        }
        if let Some(phot) = &self.photometry {
            phot.validate()?;
        }
        if let Some(phot) = &self.fiber_photometry {
            phot.validate()?;
        }
        Ok(())
    }

    /// The coadded spectrum, or the channels merged in wavelength order when
    /// the reader did not supply one.
    pub fn coadd_or_merged(&self) -> Option<Spectrum> {
        if let Some(coadd) = &self.coadd {
            return Some(coadd.clone());
        }
        merge_channels(&self.channels)
    }
}

/// Channels merged in wavelength order; where cameras overlap on the same
/// wavelength the better-measured pixel is kept. `None` without channels.
pub fn merge_channels(channels: &[Channel]) -> Option<Spectrum> {
    if channels.is_empty() {
        return None;
    }
    let mut pixels: Vec<(f64, f64, f64)> = channels
        .iter()
        .flat_map(|c| {
            let ivar = c.effective_ivar();
            c.wave
                .iter()
                .zip(&c.flux)
                .zip(ivar)
                .map(|((w, f), iv)| (*w, *f, iv))
                .collect::<Vec<_>>()
        })
        .collect();
    pixels.sort_by(|a, b| a.0.total_cmp(&b.0));
    pixels.dedup_by(|later, earlier| {
        if later.0 == earlier.0 {
            if later.2 > earlier.2 {
                *earlier = *later;
            }
            true
        } else {
            false
        }
    });
    Some(Spectrum {
        wave: pixels.iter().map(|p| p.0).collect(),
        flux: pixels.iter().map(|p| p.1).collect(),
        ivar: pixels.iter().map(|p| p.2).collect(),
    })
}

fn validate_arrays(what: &str, wave: &[f64], flux: &[f64], ivar: &[f64]) -> Result<(), AppError> {
    if wave.len() != flux.len() || wave.len() != ivar.len() {
        return Err(AppError::invalid(format!(
            "{what}: wave/flux/ivar lengths differ ({}/{}/{})",
            wave.len(),
            flux.len(),
            ivar.len()
        )));
    }
    if wave.windows(2).any(|w| !(w[1] > w[0])) {
        return Err(AppError::invalid(format!("{what}: wavelength grid is not strictly increasing")));
    }
    if let Some(i) = ivar.iter().position(|v| !v.is_finite() || *v < 0.0) {
        return Err(AppError::invalid(format!(
            "{what}: negative or non-finite inverse variance at pixel {i} ({})",
            ivar[i]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str, wave: Vec<f64>) -> Channel {
        let n = wave.len();
        Channel {
            name: name.into(),
            wave,
            flux: vec![1.0; n],
            ivar: vec![1.0; n],
            mask: None,
            resolution: None,
        }
    }

    #[test]
    fn negative_ivar_is_rejected() {
        let mut c = channel("b", vec![1.0, 2.0, 3.0]);
        c.ivar[1] = -1.0;
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn mask_zeroes_ivar() {
        let mut c = channel("r", vec![1.0, 2.0, 3.0]);
        c.mask = Some(vec![false, true, false]);
        assert_eq!(c.effective_ivar(), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn merged_coadd_is_sorted() {
        let obs = Observation {
            id: "t".into(),
            redshift: 0.1,
            ebv: 0.0,
            photsys: PhotSystem::South,
            channels: vec![channel("r", vec![5.0, 6.0, 7.0]), channel("b", vec![1.0, 2.0, 5.0])],
            coadd: None,
            photometry: None,
            fiber_photometry: None,
        };
        let coadd = obs.coadd_or_merged().unwrap();
        assert_eq!(coadd.wave, vec![1.0, 2.0, 5.0, 6.0, 7.0]);
    }
}
