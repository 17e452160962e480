mod common;

use dwialign_core::volume::Mask;
use dwialign_core::weights::{OutlierWeighter, SliceWeightTable, ZScoreWeighter};

use common::{blob_series, full_mask};

#[test]
fn test_weights_lie_in_unit_interval() {
    let series = blob_series(12, 12, 6, 4);
    let mut prediction = series.data.clone();
    // Perturb a few voxels so residuals vary.
    prediction[[6, 6, 2, 1]] += 40.0;
    prediction[[3, 3, 4, 2]] -= 25.0;

    let weights = ZScoreWeighter::default()
        .weigh(&series, &prediction, &full_mask(&series))
        .unwrap();
    assert_eq!(weights.volumes(), 4);
    assert_eq!(weights.slices(), 6);
    for &w in weights.data.iter() {
        assert!((0.0..=1.0).contains(&w), "weight {} out of range", w);
    }
}

#[test]
fn test_artefact_slice_is_down_weighted() {
    let series = blob_series(16, 16, 8, 3);
    let mut prediction = series.data.clone();
    // Large residual confined to (volume 1, slice 3).
    for x in 0..16 {
        for y in 0..16 {
            prediction[[x, y, 3, 1]] += 60.0;
        }
    }

    let weights = ZScoreWeighter::new(1.0)
        .weigh(&series, &prediction, &full_mask(&series))
        .unwrap();
    let artefact = weights.get(1, 3);
    let clean = weights.get(0, 3);
    assert!(
        artefact < 0.5,
        "artefact slice weight {} should be suppressed",
        artefact
    );
    assert!(clean > artefact);
}

#[test]
fn test_uncovered_slices_keep_full_confidence() {
    let series = blob_series(12, 12, 6, 2);
    let prediction = series.data.clone();
    let mask = Mask::new(ndarray::Array3::from_elem((12, 12, 6), false));

    let weights = ZScoreWeighter::default()
        .weigh(&series, &prediction, &mask)
        .unwrap();
    assert!(weights.data.iter().all(|&w| w == 1.0));
}

#[test]
fn test_weight_table_save_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.txt");

    let mut table = SliceWeightTable::ones(2, 4);
    table.data[[1, 2]] = 0.25;
    table.save(&path).unwrap();

    let loaded = SliceWeightTable::load(&path).unwrap();
    assert_eq!(loaded.volumes(), 2);
    assert_eq!(loaded.slices(), 4);
    assert!((loaded.get(1, 2) - 0.25).abs() < 1e-6);
    assert!((loaded.get(0, 0) - 1.0).abs() < 1e-6);
}
