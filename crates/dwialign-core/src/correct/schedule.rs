use crate::motion::Granularity;

/// Capture-scale base for the volume phase.
pub const VOLUME_CAPTURE_BASE: f64 = 0.3;
/// Capture-scale base for the slice phase.
pub const SLICE_CAPTURE_BASE: f64 = 0.5;

/// One epoch of the correction loop.
#[derive(Clone, Copy, Debug)]
pub struct EpochDescriptor {
    pub granularity: Granularity,
    /// Position within the phase.
    pub index: usize,
    /// Annealed capture-range scale in (0, 1]; non-decreasing within a
    /// phase. Registration searches wide at low scale, tight at 1.0.
    pub capture_scale: f64,
}

/// Build the epoch schedule: `volume_epochs` whole-volume entries followed
/// by `slice_epochs` slice-group entries, each phase annealing its capture
/// scale from the phase base up to 1.0.
pub fn build_schedule(volume_epochs: usize, slice_epochs: usize) -> Vec<EpochDescriptor> {
    let mut schedule = Vec::with_capacity(volume_epochs + slice_epochs);
    for k in 0..volume_epochs {
        schedule.push(EpochDescriptor {
            granularity: Granularity::Volume,
            index: k,
            capture_scale: capture_scale(VOLUME_CAPTURE_BASE, k, volume_epochs),
        });
    }
    for k in 0..slice_epochs {
        schedule.push(EpochDescriptor {
            granularity: Granularity::Slice,
            index: k,
            capture_scale: capture_scale(SLICE_CAPTURE_BASE, k, slice_epochs),
        });
    }
    schedule
}

fn capture_scale(base: f64, k: usize, n: usize) -> f64 {
    base + (1.0 - base) * (k + 1) as f64 / n as f64
}
