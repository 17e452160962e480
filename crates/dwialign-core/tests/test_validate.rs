mod common;

use ndarray::Array3;

use dwialign_core::correct::{validate, CorrectionConfig};
use dwialign_core::error::DwiAlignError;
use dwialign_core::recon::BasisConfig;
use dwialign_core::volume::{Mask, VolumeSeries};

use common::{b0_scheme, blob_series, single_shell_scheme, two_shell_scheme};

#[test]
fn test_non_4d_input_is_rejected() {
    let err = VolumeSeries::from_dyn(Array3::<f32>::zeros((8, 8, 4)).into_dyn()).unwrap_err();
    assert!(matches!(err, DwiAlignError::InvalidInput(_)));
    assert!(err.to_string().contains("4-D"));
}

#[test]
fn test_gradient_count_mismatch_is_rejected() {
    let series = blob_series(8, 8, 4, 3);
    let grad = single_shell_scheme(5);
    let err = validate(&series, &grad, None, &CorrectionConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        DwiAlignError::GradientMismatch {
            rows: 5,
            volumes: 3
        }
    ));
}

#[test]
fn test_mask_shape_mismatch_is_rejected() {
    let series = blob_series(8, 8, 4, 3);
    let grad = single_shell_scheme(3);
    let mask = Mask::full((8, 8, 6));
    let err = validate(&series, &grad, Some(mask), &CorrectionConfig::default()).unwrap_err();
    assert!(matches!(err, DwiAlignError::MaskMismatch { .. }));
}

#[test]
fn test_non_divisible_multiband_is_rejected() {
    let series = blob_series(8, 8, 10, 3);
    let grad = single_shell_scheme(3);
    let config = CorrectionConfig {
        multiband: 3,
        ..Default::default()
    };
    let err = validate(&series, &grad, None, &config).unwrap_err();
    assert!(matches!(
        err,
        DwiAlignError::InvalidMultiband {
            factor: 3,
            slices: 10
        }
    ));
}

#[test]
fn test_multi_shell_without_response_is_rejected() {
    let series = blob_series(8, 8, 4, 6);
    let grad = two_shell_scheme(6);
    let err = validate(&series, &grad, None, &CorrectionConfig::default()).unwrap_err();
    assert!(matches!(err, DwiAlignError::IncompatibleBasis(_)));
}

#[test]
fn test_b0_shell_with_positive_lmax_is_rejected() {
    let series = blob_series(8, 8, 4, 3);
    let grad = b0_scheme(3);
    let config = CorrectionConfig {
        lmax: Some(2),
        ..Default::default()
    };
    let err = validate(&series, &grad, None, &config).unwrap_err();
    assert!(matches!(err, DwiAlignError::IncompatibleBasis(_)));
}

#[test]
fn test_single_shell_without_lmax_defaults_to_zero() {
    let series = blob_series(8, 8, 4, 4);
    let grad = single_shell_scheme(4);
    let validated = validate(&series, &grad, None, &CorrectionConfig::default()).unwrap();
    assert!(matches!(
        validated.basis,
        BasisConfig::SingleShell { lmax: 0 }
    ));
}

#[test]
fn test_response_count_must_match_shells() {
    let series = blob_series(8, 8, 4, 6);
    let grad = two_shell_scheme(6);
    let config = CorrectionConfig {
        response: Some(vec![vec![1.0, 0.5]]),
        ..Default::default()
    };
    let err = validate(&series, &grad, None, &config).unwrap_err();
    assert!(matches!(err, DwiAlignError::IncompatibleBasis(_)));
}

#[test]
fn test_multi_shell_with_response_passes() {
    let series = blob_series(8, 8, 4, 6);
    let grad = two_shell_scheme(6);
    let config = CorrectionConfig {
        response: Some(vec![vec![1.0], vec![0.7]]),
        ..Default::default()
    };
    let validated = validate(&series, &grad, None, &config).unwrap();
    assert!(matches!(validated.basis, BasisConfig::MultiShell { .. }));
}

#[test]
fn test_shell_selection_reduces_working_set() {
    let series = blob_series(8, 8, 4, 6);
    let grad = two_shell_scheme(6);
    let config = CorrectionConfig {
        shells: Some(vec![1000.0]),
        ..Default::default()
    };
    let validated = validate(&series, &grad, None, &config).unwrap();
    assert_eq!(validated.series.volumes(), 3);
    assert_eq!(validated.grad.len(), 3);
    assert_eq!(validated.grad.shells().len(), 1);
}

#[test]
fn test_unknown_shell_selection_is_rejected() {
    let series = blob_series(8, 8, 4, 6);
    let grad = two_shell_scheme(6);
    let config = CorrectionConfig {
        shells: Some(vec![500.0]),
        ..Default::default()
    };
    assert!(validate(&series, &grad, None, &config).is_err());
}

#[test]
fn test_missing_mask_is_auto_generated() {
    let series = blob_series(8, 8, 4, 3);
    let grad = single_shell_scheme(3);
    let validated = validate(&series, &grad, None, &CorrectionConfig::default()).unwrap();
    let inside = validated.mask.count();
    assert!(inside > 0);
    assert!(inside < 8 * 8 * 4);
}
