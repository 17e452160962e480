mod common;

use std::sync::Mutex;

use dwialign_core::correct::{
    correct, CorrectionConfig, CorrectionStage, EpochDescriptor, ProgressReporter,
};
use dwialign_core::motion::Granularity;

use common::{blob_series, full_mask, single_shell_scheme};

/// Records the epoch sequence and stage transitions the loop reports.
#[derive(Default)]
struct RecordingReporter {
    epochs: Mutex<Vec<Granularity>>,
    capture_scales: Mutex<Vec<f64>>,
    registrations: Mutex<usize>,
}

impl ProgressReporter for RecordingReporter {
    fn begin_epoch(&self, epoch: &EpochDescriptor, _position: usize, _total: usize) {
        self.epochs.lock().unwrap().push(epoch.granularity);
        self.capture_scales.lock().unwrap().push(epoch.capture_scale);
    }

    fn begin_stage(&self, stage: CorrectionStage, _total_items: Option<usize>) {
        if matches!(stage, CorrectionStage::Registration) {
            *self.registrations.lock().unwrap() += 1;
        }
    }
}

#[test]
fn test_volume_phase_only_run() {
    let series = blob_series(12, 12, 10, 4);
    let grad = single_shell_scheme(4);
    let config = CorrectionConfig {
        volume_epochs: 3,
        slice_epochs: 0,
        multiband: 1,
        ..Default::default()
    };

    let reporter = RecordingReporter::default();
    let output = correct(&series, &grad, Some(full_mask(&series)), &config, &reporter).unwrap();

    // Exactly three volume-granularity epochs ran.
    let epochs = reporter.epochs.lock().unwrap();
    assert_eq!(epochs.len(), 3);
    assert!(epochs.iter().all(|&g| g == Granularity::Volume));
    assert_eq!(*reporter.registrations.lock().unwrap(), 3);

    // One motion row per volume, output matches the input shape.
    assert_eq!(output.motion.len(), 4);
    assert_eq!(output.motion.groups_per_volume(), 1);
    assert_eq!(output.corrected.dim(), series.data.dim());
    assert!(output.corrected.iter().all(|v| v.is_finite()));
}

#[test]
fn test_slice_phase_expands_motion_table() {
    let series = blob_series(12, 12, 10, 4);
    let grad = single_shell_scheme(4);
    let config = CorrectionConfig {
        volume_epochs: 1,
        slice_epochs: 1,
        multiband: 2,
        ..Default::default()
    };

    let reporter = RecordingReporter::default();
    let output = correct(&series, &grad, Some(full_mask(&series)), &config, &reporter).unwrap();

    let epochs = reporter.epochs.lock().unwrap();
    assert_eq!(
        epochs.as_slice(),
        &[Granularity::Volume, Granularity::Slice]
    );

    // 4 volumes x (10 slices / mb 2) groups.
    assert_eq!(output.motion.len(), 20);
    assert_eq!(output.motion.groups_per_volume(), 5);
}

#[test]
fn test_capture_scales_anneal_within_each_phase() {
    let series = blob_series(10, 10, 4, 3);
    let grad = single_shell_scheme(3);
    let config = CorrectionConfig {
        volume_epochs: 2,
        slice_epochs: 2,
        multiband: 0,
        ..Default::default()
    };

    let reporter = RecordingReporter::default();
    correct(&series, &grad, Some(full_mask(&series)), &config, &reporter).unwrap();

    let scales = reporter.capture_scales.lock().unwrap();
    assert_eq!(scales.len(), 4);
    assert!(scales[0] < scales[1]);
    assert!(scales[2] < scales[3]);
    assert!((scales[1] - 1.0).abs() < 1e-12);
    assert!((scales[3] - 1.0).abs() < 1e-12);
}

#[test]
fn test_zero_epochs_returns_seed_prediction() {
    let series = blob_series(10, 10, 4, 3);
    let grad = single_shell_scheme(3);
    let config = CorrectionConfig {
        volume_epochs: 0,
        slice_epochs: 0,
        ..Default::default()
    };

    let reporter = RecordingReporter::default();
    let output = correct(&series, &grad, Some(full_mask(&series)), &config, &reporter).unwrap();

    assert!(reporter.epochs.lock().unwrap().is_empty());
    assert_eq!(output.motion.len(), 3);
    assert!(output
        .motion
        .rows()
        .iter()
        .all(|m| *m == Default::default()));
    assert_eq!(output.corrected.dim(), series.data.dim());
}
