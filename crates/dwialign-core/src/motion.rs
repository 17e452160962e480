use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DwiAlignError, Result};
use crate::io::text::{read_matrix, write_matrix};

/// Degrees of freedom of a rigid transform.
pub const MOTION_DOF: usize = 6;

/// Rigid motion of one work unit: translation in voxel units and Euler
/// rotation in radians, component order (x, y, z) in both.
///
/// The 6-vector layout is translation first, then rotation, matching the
/// persisted motion-table columns.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RigidMotion {
    pub translation: [f64; 3],
    pub rotation: [f64; 3],
}

impl RigidMotion {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn from_params(p: [f64; MOTION_DOF]) -> Self {
        Self {
            translation: [p[0], p[1], p[2]],
            rotation: [p[3], p[4], p[5]],
        }
    }

    pub fn params(&self) -> [f64; MOTION_DOF] {
        [
            self.translation[0],
            self.translation[1],
            self.translation[2],
            self.rotation[0],
            self.rotation[1],
            self.rotation[2],
        ]
    }

    /// Compose the homogeneous 4×4 matrix, R = Rz·Ry·Rx.
    pub fn to_affine(&self) -> [[f64; 4]; 4] {
        let (sa, ca) = self.rotation[0].sin_cos();
        let (sb, cb) = self.rotation[1].sin_cos();
        let (sc, cc) = self.rotation[2].sin_cos();

        [
            [
                cc * cb,
                cc * sb * sa - sc * ca,
                cc * sb * ca + sc * sa,
                self.translation[0],
            ],
            [
                sc * cb,
                sc * sb * sa + cc * ca,
                sc * sb * ca - cc * sa,
                self.translation[1],
            ],
            [-sb, cb * sa, cb * ca, self.translation[2]],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    /// Map a point through the inverse transform, rotating about `centre`.
    /// The rotation part is orthonormal, so its inverse is its transpose.
    pub fn apply_inverse(&self, point: [f64; 3], centre: [f64; 3]) -> [f64; 3] {
        let m = self.to_affine();
        let q = [
            point[0] - centre[0] - m[0][3],
            point[1] - centre[1] - m[1][3],
            point[2] - centre[2] - m[2][3],
        ];
        [
            m[0][0] * q[0] + m[1][0] * q[1] + m[2][0] * q[2] + centre[0],
            m[0][1] * q[0] + m[1][1] * q[1] + m[2][1] * q[2] + centre[1],
            m[0][2] * q[0] + m[1][2] * q[1] + m[2][2] * q[2] + centre[2],
        ]
    }

    /// Map a point through the transform, rotating about `centre`.
    pub fn apply(&self, point: [f64; 3], centre: [f64; 3]) -> [f64; 3] {
        let m = self.to_affine();
        let p = [
            point[0] - centre[0],
            point[1] - centre[1],
            point[2] - centre[2],
        ];
        [
            m[0][0] * p[0] + m[0][1] * p[1] + m[0][2] * p[2] + centre[0] + m[0][3],
            m[1][0] * p[0] + m[1][1] * p[1] + m[1][2] * p[2] + centre[1] + m[1][3],
            m[2][0] * p[0] + m[2][1] * p[1] + m[2][2] * p[2] + centre[2] + m[2][3],
        ]
    }
}

/// Rotation and translation components extracted from a general affine.
/// Rotation comes first in the record, mirroring the decomposition order.
#[derive(Clone, Copy, Debug)]
pub struct Decomposition {
    pub rotation: [f64; 3],
    pub translation: [f64; 3],
}

impl Decomposition {
    pub fn to_motion(&self) -> RigidMotion {
        RigidMotion {
            translation: self.translation,
            rotation: self.rotation,
        }
    }
}

/// Extract Euler angles (Rz·Ry·Rx convention) and translation from an
/// affine matrix. Scale and shear are ignored; the input is expected to be
/// rigid up to numerical noise.
pub fn decompose_affine(m: &[[f64; 4]; 4]) -> Decomposition {
    let ry = (-m[2][0]).clamp(-1.0, 1.0).asin();
    let rx = m[2][1].atan2(m[2][2]);
    let rz = m[1][0].atan2(m[0][0]);
    Decomposition {
        rotation: [rx, ry, rz],
        translation: [m[0][3], m[1][3], m[2][3]],
    }
}

/// Registration granularity: one transform per volume, or one per
/// slice group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    Volume,
    Slice,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Volume => write!(f, "volume"),
            Self::Slice => write!(f, "slice"),
        }
    }
}

/// Partition of the slice axis into groups of simultaneously-excited slices.
///
/// Group `g` of `S` slices at multiband factor `mb` holds slices
/// `{g, g + S/mb, g + 2·S/mb, …}`: the interleave used by multiband
/// sequences, so slices acquired together share one transform. Stable across
/// epochs, which lets later epochs seed from earlier estimates.
#[derive(Clone, Debug)]
pub struct SliceGroups {
    groups: Vec<Vec<usize>>,
    slices: usize,
}

impl SliceGroups {
    /// Build the partition. `factor` 0 selects volume mode (a single group
    /// spanning every slice), as does `factor == slices`.
    pub fn new(slices: usize, factor: usize) -> Result<Self> {
        let factor = if factor == 0 { slices } else { factor };
        if slices == 0 || factor > slices || slices % factor != 0 {
            return Err(DwiAlignError::InvalidMultiband { factor, slices });
        }
        let count = slices / factor;
        let groups = (0..count)
            .map(|g| (0..factor).map(|k| g + k * count).collect())
            .collect();
        Ok(Self { groups, slices })
    }

    pub fn count(&self) -> usize {
        self.groups.len()
    }

    pub fn slices(&self) -> usize {
        self.slices
    }

    pub fn group(&self, index: usize) -> &[usize] {
        &self.groups[index]
    }

    /// Index of the group containing a raw slice.
    pub fn group_of(&self, slice: usize) -> usize {
        slice % self.groups.len()
    }

    /// Whether the partition degenerates to a single whole-volume group.
    pub fn is_volume(&self) -> bool {
        self.groups.len() == 1
    }
}

/// One alignable block: a slice group within one volume, with the current
/// motion estimate used as the optimizer's initial guess.
#[derive(Clone, Copy, Debug)]
pub struct WorkUnit {
    pub volume: usize,
    pub group: usize,
    /// Row index into the motion table; fixed by (volume, group), never by
    /// completion order.
    pub row: usize,
    pub init: RigidMotion,
}

/// Motion estimates for every work unit, volume-major and group-minor.
/// Rows persist across epochs; an epoch overwrites only the rows its
/// pipeline touched.
#[derive(Clone, Debug)]
pub struct MotionTable {
    rows: Vec<RigidMotion>,
    volumes: usize,
    groups_per_volume: usize,
}

impl MotionTable {
    /// Zero-motion table, the seed for the first epoch.
    pub fn zeros(volumes: usize, groups_per_volume: usize) -> Self {
        Self {
            rows: vec![RigidMotion::identity(); volumes * groups_per_volume],
            volumes,
            groups_per_volume,
        }
    }

    pub fn volumes(&self) -> usize {
        self.volumes
    }

    pub fn groups_per_volume(&self) -> usize {
        self.groups_per_volume
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_index(&self, volume: usize, group: usize) -> usize {
        volume * self.groups_per_volume + group
    }

    pub fn get(&self, volume: usize, group: usize) -> RigidMotion {
        self.rows[self.row_index(volume, group)]
    }

    pub fn set_row(&mut self, row: usize, motion: RigidMotion) {
        self.rows[row] = motion;
    }

    pub fn rows(&self) -> &[RigidMotion] {
        &self.rows
    }

    /// Seed a finer-granularity table from a volume-level one: every slice
    /// group inherits the row of its volume. Row order stays volume-major.
    pub fn expand(&self, groups_per_volume: usize) -> Self {
        debug_assert_eq!(self.groups_per_volume, 1);
        let mut rows = Vec::with_capacity(self.volumes * groups_per_volume);
        for v in 0..self.volumes {
            let seed = self.rows[v * self.groups_per_volume];
            rows.extend(std::iter::repeat(seed).take(groups_per_volume));
        }
        Self {
            rows,
            volumes: self.volumes,
            groups_per_volume,
        }
    }

    /// Per-slice-group rows regardless of stored granularity, replicating
    /// volume-level rows across groups. This is the form the reconstructor
    /// consumes.
    pub fn replicated(&self, groups_per_volume: usize) -> Self {
        if groups_per_volume == self.groups_per_volume {
            self.clone()
        } else {
            self.expand(groups_per_volume)
        }
    }

    /// Write the table as a plain-text matrix: one row per work unit in row
    /// order, six columns (translation x, y, z then rotation x, y, z).
    pub fn save(&self, path: &Path) -> Result<()> {
        write_matrix(path, self.rows.iter().map(|m| m.params().to_vec()))
    }

    /// Load a table saved by [`MotionTable::save`] (or supplied as motion
    /// initialisation). The row count must equal `volumes * groups_per_volume`
    /// or `volumes` (volume-level rows, expanded on load).
    pub fn load(path: &Path, volumes: usize, groups_per_volume: usize) -> Result<Self> {
        let raw = read_matrix(path)?;
        let mut rows = Vec::with_capacity(raw.len());
        for (i, row) in raw.iter().enumerate() {
            if row.len() != MOTION_DOF {
                return Err(DwiAlignError::Parse {
                    path: path.display().to_string(),
                    message: format!("row {} has {} columns, expected {}", i, row.len(), MOTION_DOF),
                });
            }
            rows.push(RigidMotion::from_params([
                row[0], row[1], row[2], row[3], row[4], row[5],
            ]));
        }
        if rows.len() == volumes * groups_per_volume {
            Ok(Self {
                rows,
                volumes,
                groups_per_volume,
            })
        } else if rows.len() == volumes {
            let table = Self {
                rows,
                volumes,
                groups_per_volume: 1,
            };
            Ok(table.expand(groups_per_volume))
        } else {
            Err(DwiAlignError::InvalidInput(format!(
                "motion initialisation has {} rows, expected {} or {}",
                rows.len(),
                volumes,
                volumes * groups_per_volume
            )))
        }
    }
}
