use ndarray::Array3;
use tracing::info;

use crate::gradient::GradientScheme;
use crate::volume::{Mask, VolumeSeries};

/// Threshold as a fraction of the robust maximum intensity.
const MASK_THRESHOLD_FRACTION: f32 = 0.1;
/// Percentile used as the robust maximum.
const ROBUST_MAX_PERCENTILE: f64 = 0.99;

/// Generate a mask by thresholding the mean b=0 volume at a fixed fraction
/// of its robust maximum. Falls back to the mean over all volumes when the
/// scheme has no b=0 shell.
pub fn auto_mask(series: &VolumeSeries, grad: &GradientScheme) -> Mask {
    let (nx, ny, nz) = series.spatial_dims();

    let b0_volumes: Vec<usize> = grad
        .shells()
        .iter()
        .filter(|s| s.is_b0())
        .flat_map(|s| s.volumes.iter().copied())
        .collect();
    let volumes: Vec<usize> = if b0_volumes.is_empty() {
        (0..series.volumes()).collect()
    } else {
        b0_volumes
    };

    let mut mean = Array3::<f32>::zeros((nx, ny, nz));
    for &v in &volumes {
        mean += &series.volume(v);
    }
    mean /= volumes.len() as f32;

    let mut sorted: Vec<f32> = mean.iter().copied().collect();
    sorted.sort_by(f32::total_cmp);
    let robust_max = sorted[((sorted.len() - 1) as f64 * ROBUST_MAX_PERCENTILE) as usize];
    let threshold = robust_max * MASK_THRESHOLD_FRACTION;

    let mask = Mask::new(mean.mapv(|v| v > threshold));
    info!(
        voxels = mask.count(),
        threshold, "generated mask from mean b=0 image"
    );
    mask
}
