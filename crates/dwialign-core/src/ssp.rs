use ndarray::{Array3, ArrayView3};

use crate::error::{DwiAlignError, Result};

/// Default slice profile width in voxel units.
pub const DEFAULT_SSP_WIDTH: f32 = 1.0;

/// Slice sensitivity profile: a symmetric through-slice weighting kernel
/// modelling the slice excitation response. Used to blend neighbouring
/// prediction slices into the registration template.
#[derive(Clone, Debug)]
pub struct SspKernel {
    weights: Vec<f32>,
}

impl SspKernel {
    /// Gaussian profile for a given slice thickness (FWHM in voxel units).
    pub fn from_width(fwhm: f32) -> Self {
        let sigma = (fwhm / 2.3548).max(1e-3);
        let radius = (fwhm.ceil() as usize).max(1);
        let size = 2 * radius + 1;
        let s2 = 2.0 * sigma * sigma;
        let mut weights = vec![0.0f32; size];
        let mut sum = 0.0f32;
        for (i, w) in weights.iter_mut().enumerate() {
            let z = i as f32 - radius as f32;
            *w = (-z * z / s2).exp();
            sum += *w;
        }
        for w in &mut weights {
            *w /= sum;
        }
        Self { weights }
    }

    /// Explicit profile vector. Must have odd length and non-negative
    /// entries; normalised to unit sum.
    pub fn from_vector(values: Vec<f32>) -> Result<Self> {
        if values.is_empty() || values.len() % 2 == 0 {
            return Err(DwiAlignError::InvalidInput(format!(
                "SSP vector must have odd length, got {}",
                values.len()
            )));
        }
        if values.iter().any(|&v| v < 0.0) {
            return Err(DwiAlignError::InvalidInput(
                "SSP vector entries must be non-negative".into(),
            ));
        }
        let sum: f32 = values.iter().sum();
        if sum <= 0.0 {
            return Err(DwiAlignError::InvalidInput(
                "SSP vector must have positive sum".into(),
            ));
        }
        Ok(Self {
            weights: values.into_iter().map(|v| v / sum).collect(),
        })
    }

    pub fn radius(&self) -> usize {
        self.weights.len() / 2
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Convolve a volume along the slice axis with the profile, clamping at
    /// the top and bottom slices.
    pub fn blend_along_z(&self, volume: &ArrayView3<'_, f32>) -> Array3<f32> {
        let (nx, ny, nz) = volume.dim();
        let radius = self.radius() as isize;
        let mut out = Array3::<f32>::zeros((nx, ny, nz));
        for z in 0..nz {
            for (k, &w) in self.weights.iter().enumerate() {
                let src = (z as isize + k as isize - radius).clamp(0, nz as isize - 1) as usize;
                for x in 0..nx {
                    for y in 0..ny {
                        out[[x, y, z]] += volume[[x, y, src]] * w;
                    }
                }
            }
        }
        out
    }
}

impl Default for SspKernel {
    fn default() -> Self {
        Self::from_width(DEFAULT_SSP_WIDTH)
    }
}
