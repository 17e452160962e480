use approx::assert_relative_eq;

use dwialign_core::motion::{decompose_affine, MotionTable, RigidMotion};

#[test]
fn test_pure_translation_round_trip() {
    let motion = RigidMotion {
        translation: [2.0, 0.0, 0.0],
        rotation: [0.0, 0.0, 0.0],
    };
    let d = decompose_affine(&motion.to_affine());
    assert_relative_eq!(d.translation[0], 2.0, epsilon = 1e-12);
    assert_relative_eq!(d.translation[1], 0.0, epsilon = 1e-12);
    assert_relative_eq!(d.translation[2], 0.0, epsilon = 1e-12);
    for r in d.rotation {
        assert_relative_eq!(r, 0.0, epsilon = 1e-12);
    }
}

#[test]
fn test_general_rigid_round_trip() {
    let motion = RigidMotion {
        translation: [1.5, -0.75, 3.0],
        rotation: [0.1, -0.2, 0.3],
    };
    let d = decompose_affine(&motion.to_affine());
    for i in 0..3 {
        assert_relative_eq!(d.translation[i], motion.translation[i], epsilon = 1e-10);
        assert_relative_eq!(d.rotation[i], motion.rotation[i], epsilon = 1e-10);
    }
}

#[test]
fn test_apply_inverse_undoes_apply() {
    let motion = RigidMotion {
        translation: [0.5, 1.0, -2.0],
        rotation: [0.05, 0.1, -0.15],
    };
    let centre = [7.5, 7.5, 4.5];
    let p = [3.0, 11.0, 6.0];
    let q = motion.apply(p, centre);
    let back = motion.apply_inverse(q, centre);
    for i in 0..3 {
        assert_relative_eq!(back[i], p[i], epsilon = 1e-10);
    }
}

#[test]
fn test_params_order_is_translation_then_rotation() {
    let motion = RigidMotion {
        translation: [1.0, 2.0, 3.0],
        rotation: [4.0, 5.0, 6.0],
    };
    assert_eq!(motion.params(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert_eq!(RigidMotion::from_params(motion.params()), motion);
}

#[test]
fn test_table_row_order_is_volume_major() {
    let table = MotionTable::zeros(3, 4);
    assert_eq!(table.len(), 12);
    assert_eq!(table.row_index(0, 0), 0);
    assert_eq!(table.row_index(0, 3), 3);
    assert_eq!(table.row_index(1, 0), 4);
    assert_eq!(table.row_index(2, 3), 11);
}

#[test]
fn test_expand_seeds_groups_from_volume_rows() {
    let mut table = MotionTable::zeros(2, 1);
    table.set_row(
        1,
        RigidMotion {
            translation: [1.0, 2.0, 3.0],
            rotation: [0.0, 0.0, 0.1],
        },
    );
    let expanded = table.expand(5);
    assert_eq!(expanded.len(), 10);
    for g in 0..5 {
        assert_eq!(expanded.get(0, g), RigidMotion::identity());
        assert_eq!(expanded.get(1, g), table.get(1, 0));
    }
}

#[test]
fn test_table_save_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("motion.txt");

    let mut table = MotionTable::zeros(2, 3);
    table.set_row(
        4,
        RigidMotion {
            translation: [0.25, -1.5, 2.0],
            rotation: [0.01, 0.02, -0.03],
        },
    );
    table.save(&path).unwrap();

    let loaded = MotionTable::load(&path, 2, 3).unwrap();
    assert_eq!(loaded.len(), 6);
    for row in 0..6 {
        let (a, b) = (table.rows()[row], loaded.rows()[row]);
        for i in 0..6 {
            assert_relative_eq!(a.params()[i], b.params()[i], epsilon = 1e-6);
        }
    }
}

#[test]
fn test_volume_level_init_expands_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("motion.txt");

    let mut table = MotionTable::zeros(2, 1);
    table.set_row(
        0,
        RigidMotion {
            translation: [1.0, 0.0, 0.0],
            rotation: [0.0, 0.0, 0.0],
        },
    );
    table.save(&path).unwrap();

    let loaded = MotionTable::load(&path, 2, 4).unwrap();
    assert_eq!(loaded.len(), 8);
    assert_eq!(loaded.get(0, 3).translation[0], 1.0);
}

#[test]
fn test_load_rejects_wrong_row_count() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("motion.txt");
    MotionTable::zeros(3, 1).save(&path).unwrap();

    assert!(MotionTable::load(&path, 4, 2).is_err());
}
