use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use ndarray::{Array4, Axis};
use rayon::prelude::*;
use tracing::debug;

use crate::error::{DwiAlignError, Result};
use crate::motion::{MotionTable, RigidMotion, SliceGroups, WorkUnit};
use crate::register::optimizer::{EchoPair, EchoPolicy, RegistrationRequest, RigidOptimizer};
use crate::ssp::SspKernel;
use crate::volume::{Mask, VolumeSeries};
use crate::weights::SliceWeightTable;

/// Second acquisition sharing the motion of the primary series.
pub struct SecondEcho<'a> {
    pub series: &'a VolumeSeries,
    pub prediction: &'a Array4<f32>,
}

/// Read-only shares for one epoch's registration run. Only the motion table
/// is written during the run, and only by the sink.
pub struct EpochContext<'a> {
    pub series: &'a VolumeSeries,
    pub prediction: &'a Array4<f32>,
    pub mask: &'a Mask,
    pub weights: &'a SliceWeightTable,
    pub groups: &'a SliceGroups,
    pub ssp: &'a SspKernel,
    pub optimizer: &'a dyn RigidOptimizer,
    /// Iteration cap handed to the optimizer; 0 selects its default.
    pub max_iter: usize,
    pub second_echo: Option<SecondEcho<'a>>,
    pub echo_policy: EchoPolicy,
}

/// Source stage: enumerate the epoch's work units in volume-major,
/// group-minor order, seeding each from the motion table.
pub fn enumerate_units(table: &MotionTable, groups: &SliceGroups) -> Vec<WorkUnit> {
    debug_assert_eq!(table.groups_per_volume(), groups.count());
    let mut units = Vec::with_capacity(table.len());
    for volume in 0..table.volumes() {
        for group in 0..groups.count() {
            units.push(WorkUnit {
                volume,
                group,
                row: table.row_index(volume, group),
                init: table.get(volume, group),
            });
        }
    }
    units
}

/// Run one epoch's registrations: workers process units in parallel and
/// send `(row, result)` over a channel; the sink writes each success into
/// the motion table at its row, so completion order never affects the
/// table. The first failure aborts the run after the channel drains.
pub fn run_epoch(
    ctx: &EpochContext<'_>,
    units: &[WorkUnit],
    capture_scale: f64,
    table: &mut MotionTable,
    on_unit_done: &(dyn Fn(usize) + Sync),
) -> Result<()> {
    debug!(
        units = units.len(),
        capture_scale, "starting registration epoch"
    );
    let (tx, rx) = mpsc::channel::<(usize, Result<RigidMotion>)>();
    let counter = AtomicUsize::new(0);

    let ((), failure) = rayon::join(
        move || {
            units.par_iter().for_each_with(tx, |tx, unit| {
                let result = register_unit(ctx, unit, capture_scale);
                let _ = tx.send((unit.row, result));
            });
        },
        move || {
            let mut failure: Option<DwiAlignError> = None;
            for (row, result) in rx.iter() {
                match result {
                    Ok(motion) => table.set_row(row, motion),
                    Err(e) => {
                        if failure.is_none() {
                            failure = Some(e);
                        }
                    }
                }
                let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
                on_unit_done(done);
            }
            failure
        },
    );

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Worker stage: extract the unit's target block, blend the prediction
/// through the slice profile, and hand both to the optimizer.
fn register_unit(
    ctx: &EpochContext<'_>,
    unit: &WorkUnit,
    capture_scale: f64,
) -> Result<RigidMotion> {
    let target = ctx.series.volume(unit.volume);
    let template = ctx
        .ssp
        .blend_along_z(&ctx.prediction.index_axis(Axis(3), unit.volume));
    let slice_weights = ctx.weights.volume_row(unit.volume);

    let echo_template = ctx
        .second_echo
        .as_ref()
        .map(|echo| ctx.ssp.blend_along_z(&echo.prediction.index_axis(Axis(3), unit.volume)));
    let second_echo = ctx.second_echo.as_ref().zip(echo_template.as_ref()).map(
        |(echo, template)| EchoPair {
            target: echo.series.volume(unit.volume),
            template: template.view(),
        },
    );

    let request = RegistrationRequest {
        volume: unit.volume,
        group: unit.group,
        target,
        template: template.view(),
        mask: ctx.mask,
        slices: ctx.groups.group(unit.group),
        slice_weights: &slice_weights,
        init: unit.init,
        capture_scale,
        max_iter: ctx.max_iter,
        second_echo,
        echo_policy: ctx.echo_policy,
    };
    ctx.optimizer.register(&request)
}
