use std::path::Path;

use ndarray::{Array2, Array4};

use crate::error::Result;
use crate::io::text::{read_matrix, write_matrix};
use crate::volume::{Mask, VolumeSeries};

/// Default residual threshold in standard deviations.
pub const DEFAULT_OUTLIER_THRESHOLD: f32 = 3.0;

/// Per-slice confidence weights in [0, 1], shaped (volumes, slices).
/// Recomputed every epoch from the latest prediction; independent of the
/// motion table's granularity.
#[derive(Clone, Debug)]
pub struct SliceWeightTable {
    pub data: Array2<f32>,
}

impl SliceWeightTable {
    /// Uniform full-confidence table.
    pub fn ones(volumes: usize, slices: usize) -> Self {
        Self {
            data: Array2::from_elem((volumes, slices), 1.0),
        }
    }

    pub fn volumes(&self) -> usize {
        self.data.nrows()
    }

    pub fn slices(&self) -> usize {
        self.data.ncols()
    }

    pub fn get(&self, volume: usize, slice: usize) -> f32 {
        self.data[[volume, slice]]
    }

    /// Weights of one volume, indexed by slice.
    pub fn volume_row(&self, volume: usize) -> Vec<f32> {
        self.data.row(volume).to_vec()
    }

    /// Persist as a plain-text matrix, one row per volume (volume-major,
    /// slice-minor).
    pub fn save(&self, path: &Path) -> Result<()> {
        write_matrix(
            path,
            (0..self.volumes()).map(|v| self.data.row(v).iter().map(|&w| w as f64).collect()),
        )
    }

    pub fn load(path: &Path) -> Result<Self> {
        let rows = read_matrix(path)?;
        let volumes = rows.len();
        let slices = rows.first().map_or(0, |r| r.len());
        let mut data = Array2::zeros((volumes, slices));
        for (v, row) in rows.iter().enumerate() {
            for (z, &w) in row.iter().enumerate() {
                data[[v, z]] = w as f32;
            }
        }
        Ok(Self { data })
    }
}

/// Turns per-slice residuals against the current prediction into per-slice
/// confidence weights.
pub trait OutlierWeighter: Send + Sync {
    fn weigh(
        &self,
        series: &VolumeSeries,
        prediction: &Array4<f32>,
        mask: &Mask,
    ) -> Result<SliceWeightTable>;
}

/// Reference weighter: per-slice RMS residual inside the mask, z-scored
/// across all slices, mapped through a logistic centred at the threshold.
/// Slices whose residual exceeds `threshold` standard deviations are
/// down-weighted towards zero; slices with no mask coverage stay at 1.
#[derive(Clone, Debug)]
pub struct ZScoreWeighter {
    pub threshold: f32,
}

impl ZScoreWeighter {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for ZScoreWeighter {
    fn default() -> Self {
        Self::new(DEFAULT_OUTLIER_THRESHOLD)
    }
}

impl OutlierWeighter for ZScoreWeighter {
    fn weigh(
        &self,
        series: &VolumeSeries,
        prediction: &Array4<f32>,
        mask: &Mask,
    ) -> Result<SliceWeightTable> {
        let (nx, ny, nz) = series.spatial_dims();
        let nv = series.volumes();

        // RMS residual per (volume, slice) inside the mask.
        let mut rms = Array2::<f64>::zeros((nv, nz));
        let mut covered = Array2::<bool>::from_elem((nv, nz), false);
        for v in 0..nv {
            for z in 0..nz {
                let mut sum = 0.0f64;
                let mut count = 0usize;
                for x in 0..nx {
                    for y in 0..ny {
                        if mask.data[[x, y, z]] {
                            let d =
                                (series.data[[x, y, z, v]] - prediction[[x, y, z, v]]) as f64;
                            sum += d * d;
                            count += 1;
                        }
                    }
                }
                if count > 0 {
                    rms[[v, z]] = (sum / count as f64).sqrt();
                    covered[[v, z]] = true;
                }
            }
        }

        // Z-score over all covered slices.
        let values: Vec<f64> = rms
            .iter()
            .zip(covered.iter())
            .filter(|(_, &c)| c)
            .map(|(&r, _)| r)
            .collect();
        if values.is_empty() {
            return Ok(SliceWeightTable::ones(nv, nz));
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>()
            / values.len() as f64;
        let std = var.sqrt().max(1e-12);

        let mut data = Array2::from_elem((nv, nz), 1.0f32);
        for v in 0..nv {
            for z in 0..nz {
                if covered[[v, z]] {
                    let zscore = (rms[[v, z]] - mean) / std;
                    let w = 1.0 / (1.0 + (2.0 * (zscore - self.threshold as f64)).exp());
                    data[[v, z]] = w as f32;
                }
            }
        }
        Ok(SliceWeightTable { data })
    }
}
