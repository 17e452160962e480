mod common;

use ndarray::Array4;

use dwialign_core::motion::{MotionTable, SliceGroups};
use dwialign_core::recon::{BasisConfig, Reconstructor, ShReconstructor};
use dwialign_core::volume::VolumeSeries;
use dwialign_core::weights::SliceWeightTable;

use common::{full_mask, single_shell_scheme, two_shell_scheme};

#[test]
fn test_zero_motion_prediction_matches_constant_series() {
    // Every volume identical: the order-0 fit must reproduce the signal.
    let series = common::blob_series(12, 12, 6, 4);
    let grad = single_shell_scheme(4);
    let mask = full_mask(&series);
    let groups = SliceGroups::new(6, 0).unwrap();
    let motion = MotionTable::zeros(4, 1);
    let weights = SliceWeightTable::ones(4, 6);

    let recon = ShReconstructor::new(BasisConfig::SingleShell { lmax: 0 });
    let prediction = recon
        .reconstruct(&series, &grad, &motion, &groups, &weights, &mask)
        .unwrap();

    assert_eq!(prediction.dim(), series.data.dim());
    for x in 0..12 {
        for y in 0..12 {
            for z in 0..6 {
                for v in 0..4 {
                    let expected = series.data[[x, y, z, v]];
                    let got = prediction[[x, y, z, v]];
                    assert!(
                        (expected - got).abs() < 1e-3,
                        "voxel ({},{},{},{}) expected {} got {}",
                        x,
                        y,
                        z,
                        v,
                        expected,
                        got
                    );
                }
            }
        }
    }
}

#[test]
fn test_shells_are_fitted_independently() {
    // b=1000 volumes hold 80, b=2000 volumes hold 20.
    let mut data = Array4::<f32>::zeros((8, 8, 4, 6));
    for v in 0..6 {
        let value = if v % 2 == 0 { 80.0 } else { 20.0 };
        data.slice_mut(ndarray::s![.., .., .., v]).fill(value);
    }
    let series = VolumeSeries::new(data);
    let grad = two_shell_scheme(6);
    let mask = full_mask(&series);
    let groups = SliceGroups::new(4, 0).unwrap();
    let motion = MotionTable::zeros(6, 1);
    let weights = SliceWeightTable::ones(6, 4);

    let recon = ShReconstructor::new(BasisConfig::MultiShell {
        response: vec![vec![1.0], vec![1.0]],
    });
    let prediction = recon
        .reconstruct(&series, &grad, &motion, &groups, &weights, &mask)
        .unwrap();

    for v in 0..6 {
        let expected = if v % 2 == 0 { 80.0 } else { 20.0 };
        let got = prediction[[4, 4, 2, v]];
        assert!(
            (got - expected).abs() < 1e-2,
            "volume {} expected {} got {}",
            v,
            expected,
            got
        );
    }
}

#[test]
fn test_prediction_is_zero_outside_mask() {
    let series = common::blob_series(10, 10, 4, 3);
    let grad = single_shell_scheme(3);
    let mut mask = full_mask(&series);
    mask.data[[0, 0, 0]] = false;
    let groups = SliceGroups::new(4, 0).unwrap();
    let motion = MotionTable::zeros(3, 1);
    let weights = SliceWeightTable::ones(3, 4);

    let recon = ShReconstructor::new(BasisConfig::SingleShell { lmax: 0 });
    let prediction = recon
        .reconstruct(&series, &grad, &motion, &groups, &weights, &mask)
        .unwrap();
    for v in 0..3 {
        assert_eq!(prediction[[0, 0, 0, v]], 0.0);
    }
}
