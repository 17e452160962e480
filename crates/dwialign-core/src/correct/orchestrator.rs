use ndarray::Array4;
use tracing::info;

use crate::error::{DwiAlignError, Result};
use crate::gradient::{GradientEntry, GradientScheme};
use crate::mask::auto_mask;
use crate::motion::{Granularity, MotionTable, SliceGroups};
use crate::recon::{BasisConfig, Reconstructor, ShReconstructor};
use crate::register::{enumerate_units, run_epoch, EchoPolicy, EpochContext};
use crate::register::{PatternSearchOptimizer, RigidOptimizer};
use crate::ssp::SspKernel;
use crate::volume::{Mask, VolumeSeries};
use crate::weights::{OutlierWeighter, SliceWeightTable, ZScoreWeighter};

use super::config::CorrectionConfig;
use super::schedule::build_schedule;
use super::types::{CorrectionStage, ProgressReporter};

/// External collaborators of the correction loop, as typed services.
pub struct CorrectionServices<'a> {
    pub reconstructor: &'a dyn Reconstructor,
    pub weighter: &'a dyn OutlierWeighter,
    pub optimizer: &'a dyn RigidOptimizer,
}

/// Result of a correction run: the corrected series (final phase
/// checkpoint) plus the motion and weight tables that produced it.
pub struct CorrectionOutput {
    pub corrected: Array4<f32>,
    pub motion: MotionTable,
    pub weights: SliceWeightTable,
}

/// Inputs that passed validation, reduced to the selected shells.
#[derive(Debug)]
pub struct Validated {
    pub series: VolumeSeries,
    pub grad: GradientScheme,
    pub mask: Mask,
    pub basis: BasisConfig,
    pub slice_groups: SliceGroups,
}

/// The per-epoch state threaded through the loop: each epoch consumes the
/// previous state and produces a new one.
struct EpochState {
    motion: MotionTable,
    weights: SliceWeightTable,
    prediction: Array4<f32>,
}

/// Check all inputs and resolve the working data set. Every failure here is
/// fatal and reported before any computation starts.
pub fn validate(
    series: &VolumeSeries,
    grad: &GradientScheme,
    mask: Option<Mask>,
    config: &CorrectionConfig,
) -> Result<Validated> {
    grad.check_matches(series.volumes())?;
    if let Some(m) = &mask {
        m.check_matches(series)?;
    }
    let slice_groups = SliceGroups::new(series.slices(), config.multiband)?;

    // Reduce to the selected shells, keeping acquisition order.
    let (working, working_grad) = match &config.shells {
        Some(bvalues) => {
            let shell_indices = grad.select_shells(bvalues)?;
            let mut volumes: Vec<usize> = shell_indices
                .iter()
                .flat_map(|&s| grad.shells()[s].volumes.iter().copied())
                .collect();
            volumes.sort_unstable();
            info!(
                selected = volumes.len(),
                total = series.volumes(),
                "restricting correction to selected shells"
            );
            (subset_series(series, &volumes), subset_scheme(grad, &volumes))
        }
        None => (series.clone(), grad.clone()),
    };

    let basis = validate_basis(&working_grad, config)?;

    // The only non-trivial work; runs once every check has passed. The mask
    // comes from the full series so b=0 volumes stay available for it.
    let mask = match mask {
        Some(m) => m,
        None => auto_mask(series, grad),
    };

    Ok(Validated {
        series: working,
        grad: working_grad,
        mask,
        basis,
        slice_groups,
    })
}

fn subset_series(series: &VolumeSeries, volumes: &[usize]) -> VolumeSeries {
    let (nx, ny, nz) = series.spatial_dims();
    let mut data = Array4::<f32>::zeros((nx, ny, nz, volumes.len()));
    for (i, &v) in volumes.iter().enumerate() {
        data.index_axis_mut(ndarray::Axis(3), i)
            .assign(&series.volume(v));
    }
    VolumeSeries::new(data)
}

fn subset_scheme(grad: &GradientScheme, volumes: &[usize]) -> GradientScheme {
    let entries: Vec<GradientEntry> = volumes.iter().map(|&v| grad.entries()[v]).collect();
    GradientScheme::new(entries)
}

fn validate_basis(grad: &GradientScheme, config: &CorrectionConfig) -> Result<BasisConfig> {
    let shells = grad.shells().len();
    let non_b0 = grad.shells().iter().filter(|s| !s.is_b0()).count();
    match &config.response {
        Some(response) => {
            if response.len() != shells {
                return Err(DwiAlignError::IncompatibleBasis(format!(
                    "{} response functions given for {} shells",
                    response.len(),
                    shells
                )));
            }
            Ok(BasisConfig::MultiShell {
                response: response.clone(),
            })
        }
        None if non_b0 > 1 => Err(DwiAlignError::IncompatibleBasis(
            "multi-shell data requires radial basis functions".into(),
        )),
        None if non_b0 == 0 => {
            if config.lmax.unwrap_or(0) > 0 {
                Err(DwiAlignError::IncompatibleBasis(
                    "lmax > 0 requested on b=0 data".into(),
                ))
            } else {
                Ok(BasisConfig::SingleShell { lmax: 0 })
            }
        }
        None => Ok(BasisConfig::SingleShell {
            lmax: config.lmax.unwrap_or(0),
        }),
    }
}

/// Validate and run a full correction with the reference services.
pub fn correct(
    series: &VolumeSeries,
    grad: &GradientScheme,
    mask: Option<Mask>,
    config: &CorrectionConfig,
    reporter: &dyn ProgressReporter,
) -> Result<CorrectionOutput> {
    let validated = validate(series, grad, mask, config)?;
    let reconstructor = ShReconstructor::new(validated.basis.clone());
    let weighter = ZScoreWeighter::new(config.outlier_threshold);
    let optimizer = PatternSearchOptimizer::default();
    let services = CorrectionServices {
        reconstructor: &reconstructor,
        weighter: &weighter,
        optimizer: &optimizer,
    };
    run_correction(&validated, config, &services, reporter)
}

/// The correction loop: alternate registration against the current
/// prediction with reconstruction and outlier reweighting, first at volume
/// granularity, then per slice group, with an annealed capture range.
pub fn run_correction(
    validated: &Validated,
    config: &CorrectionConfig,
    services: &CorrectionServices<'_>,
    reporter: &dyn ProgressReporter,
) -> Result<CorrectionOutput> {
    let series = &validated.series;
    let volumes = series.volumes();
    let slices = series.slices();
    let volume_groups = SliceGroups::new(slices, 0)?;

    let ssp = match &config.ssp_vector {
        Some(v) => SspKernel::from_vector(v.clone())?,
        None => SspKernel::from_width(config.ssp_width),
    };

    let schedule = build_schedule(config.volume_epochs, config.slice_epochs);
    info!(
        volume_epochs = config.volume_epochs,
        slice_epochs = config.slice_epochs,
        volumes,
        slice_groups = validated.slice_groups.count(),
        "starting motion correction"
    );

    // Seed prediction and weights from a zero motion table.
    reporter.begin_stage(CorrectionStage::Reconstruction, None);
    let motion = MotionTable::zeros(volumes, 1);
    let seed_weights = SliceWeightTable::ones(volumes, slices);
    let prediction = services.reconstructor.reconstruct(
        series,
        &validated.grad,
        &motion,
        &validated.slice_groups,
        &seed_weights,
        &validated.mask,
    )?;
    reporter.finish_stage();

    reporter.begin_stage(CorrectionStage::Weighting, None);
    let weights = services.weighter.weigh(series, &prediction, &validated.mask)?;
    reporter.finish_stage();

    let mut state = EpochState {
        motion,
        weights,
        prediction,
    };
    let mut volume_checkpoint = state.prediction.clone();
    let mut slice_checkpoint: Option<Array4<f32>> = None;

    for (position, epoch) in schedule.iter().enumerate() {
        reporter.begin_epoch(epoch, position, schedule.len());
        info!(
            epoch = position,
            granularity = %epoch.granularity,
            capture_scale = epoch.capture_scale,
            "epoch"
        );

        let groups = match epoch.granularity {
            Granularity::Volume => &volume_groups,
            Granularity::Slice => &validated.slice_groups,
        };
        // The first slice epoch seeds per-group rows from the volume table.
        if state.motion.groups_per_volume() != groups.count() {
            state.motion = state.motion.expand(groups.count());
        }

        let units = enumerate_units(&state.motion, groups);
        reporter.begin_stage(CorrectionStage::Registration, Some(units.len()));
        let ctx = EpochContext {
            series,
            prediction: &state.prediction,
            mask: &validated.mask,
            weights: &state.weights,
            groups,
            ssp: &ssp,
            optimizer: services.optimizer,
            max_iter: config.registration_max_iter,
            second_echo: None,
            echo_policy: EchoPolicy::Average,
        };
        run_epoch(
            &ctx,
            &units,
            epoch.capture_scale,
            &mut state.motion,
            &|done| reporter.advance(done),
        )?;
        reporter.finish_stage();

        reporter.begin_stage(CorrectionStage::Reconstruction, None);
        let prediction = services.reconstructor.reconstruct(
            series,
            &validated.grad,
            &state.motion,
            &validated.slice_groups,
            &state.weights,
            &validated.mask,
        )?;
        reporter.finish_stage();

        reporter.begin_stage(CorrectionStage::Weighting, None);
        let weights = services.weighter.weigh(series, &prediction, &validated.mask)?;
        reporter.finish_stage();

        state = EpochState {
            motion: state.motion,
            weights,
            prediction,
        };

        match epoch.granularity {
            Granularity::Volume if epoch.index + 1 == config.volume_epochs => {
                volume_checkpoint = state.prediction.clone();
            }
            Granularity::Slice if epoch.index + 1 == config.slice_epochs => {
                slice_checkpoint = Some(state.prediction.clone());
            }
            _ => {}
        }
    }

    let corrected = slice_checkpoint.unwrap_or(volume_checkpoint);
    info!("motion correction finished");
    Ok(CorrectionOutput {
        corrected,
        motion: state.motion,
        weights: state.weights,
    })
}
