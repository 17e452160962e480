use serde::{Deserialize, Serialize};

use crate::ssp::DEFAULT_SSP_WIDTH;
use crate::weights::DEFAULT_OUTLIER_THRESHOLD;

/// Settings for a full motion-correction run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorrectionConfig {
    /// Volume-to-volume epochs.
    #[serde(default = "default_volume_epochs")]
    pub volume_epochs: usize,

    /// Slice-to-volume epochs.
    #[serde(default = "default_slice_epochs")]
    pub slice_epochs: usize,

    /// Multiband factor; 0 keeps slice epochs at whole-volume granularity.
    #[serde(default)]
    pub multiband: usize,

    /// Residual threshold for outlier down-weighting, in standard deviations.
    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold: f32,

    /// Harmonic order for single-shell data; defaults to 0 when absent.
    #[serde(default)]
    pub lmax: Option<usize>,

    /// Restrict the correction to these b-values.
    #[serde(default)]
    pub shells: Option<Vec<f64>>,

    /// Per-shell radial basis (response) functions for multi-shell data.
    #[serde(default)]
    pub response: Option<Vec<Vec<f64>>>,

    /// Slice profile width in voxel units (FWHM of a Gaussian).
    #[serde(default = "default_ssp_width")]
    pub ssp_width: f32,

    /// Explicit slice profile vector; overrides `ssp_width` when set.
    #[serde(default)]
    pub ssp_vector: Option<Vec<f32>>,

    /// Iteration cap for each pairwise registration; 0 selects the
    /// optimizer's default.
    #[serde(default)]
    pub registration_max_iter: usize,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            volume_epochs: default_volume_epochs(),
            slice_epochs: default_slice_epochs(),
            multiband: 0,
            outlier_threshold: default_outlier_threshold(),
            lmax: None,
            shells: None,
            response: None,
            ssp_width: default_ssp_width(),
            ssp_vector: None,
            registration_max_iter: 0,
        }
    }
}

fn default_volume_epochs() -> usize {
    3
}

fn default_slice_epochs() -> usize {
    2
}

fn default_outlier_threshold() -> f32 {
    DEFAULT_OUTLIER_THRESHOLD
}

fn default_ssp_width() -> f32 {
    DEFAULT_SSP_WIDTH
}
