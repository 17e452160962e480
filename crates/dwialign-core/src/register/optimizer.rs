use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DwiAlignError, Result};
use crate::motion::{decompose_affine, RigidMotion, MOTION_DOF};
use crate::register::resample::trilinear_sample;
use crate::volume::Mask;

/// Default iteration cap for the reference optimizer.
pub const DEFAULT_MAX_ITER: usize = 100;

/// How a second echo contributes to registration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EchoPolicy {
    /// Fold both echoes' residuals into the objective.
    #[default]
    Average,
    /// Register on the first echo; check the second for consistency.
    Validate,
}

/// Second acquisition sharing the unit's motion.
pub struct EchoPair<'a> {
    pub target: ArrayView3<'a, f32>,
    pub template: ArrayView3<'a, f32>,
}

/// One pairwise rigid registration problem: align the moving `template`
/// (prediction block) to the fixed `target` (acquired block), restricted to
/// the masked voxels of the listed slices.
pub struct RegistrationRequest<'a> {
    pub volume: usize,
    pub group: usize,
    pub target: ArrayView3<'a, f32>,
    pub template: ArrayView3<'a, f32>,
    pub mask: &'a Mask,
    /// Raw slice indices belonging to this unit.
    pub slices: &'a [usize],
    /// Per-slice confidence for the target volume, indexed by raw slice.
    pub slice_weights: &'a [f32],
    pub init: RigidMotion,
    /// Annealing knob in (0, 1]: low values widen the initial search steps,
    /// 1.0 is the tightest setting.
    pub capture_scale: f64,
    /// Iteration cap; 0 selects the optimizer's own default.
    pub max_iter: usize,
    pub second_echo: Option<EchoPair<'a>>,
    pub echo_policy: EchoPolicy,
}

/// Black-box pairwise rigid registration: given two 3-D blocks and a mask,
/// return a 6-parameter rigid transform. Rigid only, non-symmetric (target
/// fixed, template moving).
pub trait RigidOptimizer: Send + Sync {
    fn register(&self, request: &RegistrationRequest<'_>) -> Result<RigidMotion>;
}

/// Reference optimizer: derivative-free pattern search on the masked,
/// slice-weighted mean-squared error. Each round probes ± the current step
/// along every parameter axis and keeps the best improvement; a stalled
/// round halves the steps. Terminates on its iteration cap or once the
/// steps shrink below `tolerance` of their initial size.
#[derive(Clone, Debug)]
pub struct PatternSearchOptimizer {
    pub max_iter: usize,
    /// Fraction of the initial step size at which the search stops.
    pub tolerance: f64,
    /// Initial translation step in voxels (before capture scaling).
    pub translation_step: f64,
    /// Initial rotation step in radians (before capture scaling).
    pub rotation_step: f64,
}

impl Default for PatternSearchOptimizer {
    fn default() -> Self {
        Self {
            max_iter: DEFAULT_MAX_ITER,
            tolerance: 1e-2,
            translation_step: 1.0,
            rotation_step: 0.05,
        }
    }
}

impl RigidOptimizer for PatternSearchOptimizer {
    fn register(&self, request: &RegistrationRequest<'_>) -> Result<RigidMotion> {
        let max_iter = if request.max_iter > 0 {
            request.max_iter
        } else {
            self.max_iter
        };
        let fail = |reason: &str| DwiAlignError::RegistrationFailed {
            volume: request.volume,
            group: request.group,
            reason: reason.to_string(),
        };

        let mut params = request.init.params();
        let mut best = objective(request, &RigidMotion::from_params(params))
            .ok_or_else(|| fail("no masked voxels in work unit"))?;
        if !best.is_finite() {
            return Err(fail("non-finite cost at initial estimate"));
        }

        // Wide capture range early in the schedule, tight late.
        let scale = 1.0 / request.capture_scale.clamp(1e-3, 1.0);
        let base_step = [
            self.translation_step * scale,
            self.translation_step * scale,
            self.translation_step * scale,
            self.rotation_step * scale,
            self.rotation_step * scale,
            self.rotation_step * scale,
        ];
        let mut shrink = 1.0f64;

        for _ in 0..max_iter {
            let mut improved = false;
            for d in 0..MOTION_DOF {
                let step = base_step[d] * shrink;
                for sign in [1.0, -1.0] {
                    let mut candidate = params;
                    candidate[d] += sign * step;
                    if let Some(cost) =
                        objective(request, &RigidMotion::from_params(candidate))
                    {
                        if !cost.is_finite() {
                            return Err(fail("cost diverged during search"));
                        }
                        if cost < best {
                            best = cost;
                            params = candidate;
                            improved = true;
                        }
                    }
                }
            }
            if !improved {
                shrink *= 0.5;
                if shrink < self.tolerance {
                    break;
                }
            }
        }

        // Emit the 6-vector through the affine decomposition, which also
        // canonicalises the Euler angles.
        let result = decompose_affine(&RigidMotion::from_params(params).to_affine()).to_motion();
        if let (Some(echo), EchoPolicy::Validate) = (&request.second_echo, request.echo_policy) {
            validate_second_echo(request, echo, &result);
        }
        Ok(result)
    }
}

/// Masked, slice-weighted mean-squared error of the template resampled at
/// `motion` against the target. `None` when no masked voxel contributes.
fn objective(request: &RegistrationRequest<'_>, motion: &RigidMotion) -> Option<f64> {
    let (mut ssd, mut wsum) = pair_residual(
        &request.target,
        &request.template,
        request,
        motion,
    );
    if let (Some(echo), EchoPolicy::Average) = (&request.second_echo, request.echo_policy) {
        let (s2, w2) = pair_residual(&echo.target, &echo.template, request, motion);
        ssd += s2;
        wsum += w2;
    }
    (wsum > 0.0).then(|| ssd / wsum)
}

fn pair_residual(
    target: &ArrayView3<'_, f32>,
    template: &ArrayView3<'_, f32>,
    request: &RegistrationRequest<'_>,
    motion: &RigidMotion,
) -> (f64, f64) {
    let (nx, ny, nz) = target.dim();
    let centre = [
        (nx as f64 - 1.0) / 2.0,
        (ny as f64 - 1.0) / 2.0,
        (nz as f64 - 1.0) / 2.0,
    ];
    let mut ssd = 0.0f64;
    let mut wsum = 0.0f64;
    for &z in request.slices {
        let wz = request.slice_weights.get(z).copied().unwrap_or(1.0) as f64;
        if wz <= 0.0 {
            continue;
        }
        for x in 0..nx {
            for y in 0..ny {
                if !request.mask.data[[x, y, z]] {
                    continue;
                }
                let p = motion.apply([x as f64, y as f64, z as f64], centre);
                if let Some(t) = trilinear_sample(template, p) {
                    let d = (target[[x, y, z]] - t) as f64;
                    ssd += wz * d * d;
                    wsum += wz;
                }
            }
        }
    }
    (ssd, wsum)
}

fn validate_second_echo(
    request: &RegistrationRequest<'_>,
    echo: &EchoPair<'_>,
    result: &RigidMotion,
) {
    let at_init = pair_residual(&echo.target, &echo.template, request, &request.init);
    let at_result = pair_residual(&echo.target, &echo.template, request, result);
    let (cost_init, cost_result) = (
        (at_init.1 > 0.0).then(|| at_init.0 / at_init.1),
        (at_result.1 > 0.0).then(|| at_result.0 / at_result.1),
    );
    if let (Some(before), Some(after)) = (cost_init, cost_result) {
        if after > before * 1.05 {
            warn!(
                volume = request.volume,
                group = request.group,
                before,
                after,
                "second echo residual worsened; transforms may be inconsistent"
            );
        }
    }
}
