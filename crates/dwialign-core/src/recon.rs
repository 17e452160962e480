use ndarray::{Array3, Array4};
use rayon::prelude::*;
use tracing::debug;

use crate::error::Result;
use crate::gradient::GradientScheme;
use crate::motion::{MotionTable, SliceGroups};
use crate::register::resample::trilinear_sample;
use crate::sh;
use crate::volume::{Mask, VolumeSeries};
use crate::weights::SliceWeightTable;

/// Angular basis configuration for the signal prediction.
#[derive(Clone, Debug)]
pub enum BasisConfig {
    /// Spherical harmonics of one order, for single-shell data. The b=0
    /// shell is always fitted at order 0.
    SingleShell { lmax: usize },
    /// One radial basis (response) function per shell for multi-shell data;
    /// each row's length sets its shell's harmonic order.
    MultiShell { response: Vec<Vec<f64>> },
}

impl BasisConfig {
    /// Harmonic order for the `index`-th shell of the working scheme.
    fn order_for(&self, index: usize, is_b0: bool, shell_size: usize) -> usize {
        let requested = match self {
            Self::SingleShell { lmax } => {
                if is_b0 {
                    0
                } else {
                    *lmax
                }
            }
            Self::MultiShell { response } => response
                .get(index)
                .map_or(0, |r| 2 * r.len().saturating_sub(1)),
        };
        let supported = sh::max_order_for(shell_size);
        if requested > supported {
            debug!(requested, supported, "capping harmonic order to shell size");
        }
        requested.min(supported)
    }
}

/// Turns a motion estimate and slice weights into an updated signal
/// prediction with the same shape as the acquired series.
pub trait Reconstructor: Send + Sync {
    fn reconstruct(
        &self,
        series: &VolumeSeries,
        grad: &GradientScheme,
        motion: &MotionTable,
        groups: &SliceGroups,
        weights: &SliceWeightTable,
        mask: &Mask,
    ) -> Result<Array4<f32>>;
}

/// Reference reconstructor: per-shell weighted least-squares spherical-
/// harmonics fit per voxel. Each volume's contribution is sampled at its
/// estimated pose (per slice group) before fitting, and slice weights
/// multiply the fit weights.
#[derive(Clone, Debug)]
pub struct ShReconstructor {
    pub basis: BasisConfig,
}

impl ShReconstructor {
    pub fn new(basis: BasisConfig) -> Self {
        Self { basis }
    }
}

impl Reconstructor for ShReconstructor {
    fn reconstruct(
        &self,
        series: &VolumeSeries,
        grad: &GradientScheme,
        motion: &MotionTable,
        groups: &SliceGroups,
        weights: &SliceWeightTable,
        mask: &Mask,
    ) -> Result<Array4<f32>> {
        let (nx, ny, nz) = series.spatial_dims();
        let nv = series.volumes();
        let motion = motion.replicated(groups.count());
        let centre = [
            (nx as f64 - 1.0) / 2.0,
            (ny as f64 - 1.0) / 2.0,
            (nz as f64 - 1.0) / 2.0,
        ];

        // Per-shell basis matrices, fixed across voxels.
        let shells: Vec<ShellFit> = grad
            .shells()
            .iter()
            .enumerate()
            .map(|(i, shell)| {
                let dirs: Vec<[f64; 3]> = shell
                    .volumes
                    .iter()
                    .map(|&v| grad.entries()[v].direction)
                    .collect();
                let lmax = self.basis.order_for(i, shell.is_b0(), shell.volumes.len());
                ShellFit {
                    volumes: shell.volumes.clone(),
                    basis: sh::basis_matrix(&dirs, lmax),
                }
            })
            .collect();

        // One output slice per task; slices are independent.
        let slices: Vec<Array3<f32>> = (0..nz)
            .into_par_iter()
            .map(|z| {
                let mut out = Array3::<f32>::zeros((nx, ny, nv));
                let mut samples = vec![0.0f64; nv];
                let mut fit_weights = vec![0.0f64; nv];
                for x in 0..nx {
                    for y in 0..ny {
                        if !mask.data[[x, y, z]] {
                            continue;
                        }
                        let point = [x as f64, y as f64, z as f64];
                        for fit in &shells {
                            let n = fit.volumes.len();
                            for (i, &v) in fit.volumes.iter().enumerate() {
                                let pose = motion.get(v, groups.group_of(z));
                                let src = pose.apply_inverse(point, centre);
                                match trilinear_sample(&series.volume(v), src) {
                                    Some(value) => {
                                        let zs = (src[2].round().max(0.0) as usize)
                                            .min(nz - 1);
                                        samples[i] = value as f64;
                                        fit_weights[i] = weights.get(v, zs) as f64;
                                    }
                                    None => {
                                        samples[i] = 0.0;
                                        fit_weights[i] = 0.0;
                                    }
                                }
                            }
                            if let Some(coef) =
                                sh::fit_weighted(&fit.basis, &samples[..n], &fit_weights[..n])
                            {
                                for (i, &v) in fit.volumes.iter().enumerate() {
                                    let mut predicted = 0.0f64;
                                    for (j, &c) in coef.iter().enumerate() {
                                        predicted += fit.basis[[i, j]] * c;
                                    }
                                    out[[x, y, v]] = predicted as f32;
                                }
                            }
                        }
                    }
                }
                out
            })
            .collect();

        let mut prediction = Array4::<f32>::zeros((nx, ny, nz, nv));
        for (z, slice) in slices.into_iter().enumerate() {
            for x in 0..nx {
                for y in 0..ny {
                    for v in 0..nv {
                        prediction[[x, y, z, v]] = slice[[x, y, v]];
                    }
                }
            }
        }
        Ok(prediction)
    }
}

struct ShellFit {
    volumes: Vec<usize>,
    basis: ndarray::Array2<f64>,
}
