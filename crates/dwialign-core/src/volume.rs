use ndarray::{Array3, Array4, ArrayD, ArrayView3, Axis};

use crate::error::{DwiAlignError, Result};

/// A 4-D diffusion-weighted series.
/// Axes are (x, y, slice, volume); voxel values are f32 signal intensities.
#[derive(Clone, Debug)]
pub struct VolumeSeries {
    pub data: Array4<f32>,
}

impl VolumeSeries {
    pub fn new(data: Array4<f32>) -> Self {
        Self { data }
    }

    /// Build a series from a dynamic-dimension array, rejecting anything
    /// that is not 4-D before any further processing happens.
    pub fn from_dyn(data: ArrayD<f32>) -> Result<Self> {
        match data.ndim() {
            4 => Ok(Self {
                data: data
                    .into_dimensionality()
                    .map_err(|e| DwiAlignError::InvalidInput(e.to_string()))?,
            }),
            n => Err(DwiAlignError::InvalidInput(format!(
                "4-D DWI series expected, got {}-D input",
                n
            ))),
        }
    }

    pub fn width(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn height(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn slices(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn volumes(&self) -> usize {
        self.data.shape()[3]
    }

    pub fn spatial_dims(&self) -> (usize, usize, usize) {
        (self.width(), self.height(), self.slices())
    }

    /// View of one 3-D volume.
    pub fn volume(&self, index: usize) -> ArrayView3<'_, f32> {
        self.data.index_axis(Axis(3), index)
    }
}

/// Spatial mask restricting registration and reconstruction to brain voxels.
/// Immutable once built; matches the first three dimensions of the series.
#[derive(Clone, Debug)]
pub struct Mask {
    pub data: Array3<bool>,
}

impl Mask {
    pub fn new(data: Array3<bool>) -> Self {
        Self { data }
    }

    /// All-true mask covering the full field of view.
    pub fn full(dims: (usize, usize, usize)) -> Self {
        Self {
            data: Array3::from_elem(dims, true),
        }
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        let s = self.data.shape();
        (s[0], s[1], s[2])
    }

    pub fn check_matches(&self, series: &VolumeSeries) -> Result<()> {
        if self.dims() != series.spatial_dims() {
            return Err(DwiAlignError::MaskMismatch {
                mask: self.dims(),
                series: series.spatial_dims(),
            });
        }
        Ok(())
    }

    /// Number of voxels inside the mask.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }
}
