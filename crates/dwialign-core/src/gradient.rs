use std::path::Path;

use crate::error::{DwiAlignError, Result};
use crate::io::text::read_matrix;

/// Tolerance for clustering b-values into shells, in s/mm².
pub const SHELL_TOLERANCE: f64 = 80.0;

/// One diffusion sensitisation: unit gradient direction and b-value.
#[derive(Clone, Copy, Debug)]
pub struct GradientEntry {
    pub direction: [f64; 3],
    pub bvalue: f64,
}

/// A group of volumes acquired at (approximately) the same b-value.
#[derive(Clone, Debug)]
pub struct Shell {
    /// Mean b-value of the member volumes.
    pub bvalue: f64,
    /// Volume indices belonging to this shell, in acquisition order.
    pub volumes: Vec<usize>,
}

impl Shell {
    pub fn is_b0(&self) -> bool {
        self.bvalue <= SHELL_TOLERANCE
    }
}

/// Diffusion gradient scheme: one entry per volume, clustered into shells.
#[derive(Clone, Debug)]
pub struct GradientScheme {
    entries: Vec<GradientEntry>,
    shells: Vec<Shell>,
}

impl GradientScheme {
    pub fn new(mut entries: Vec<GradientEntry>) -> Self {
        for e in &mut entries {
            let norm = (e.direction[0] * e.direction[0]
                + e.direction[1] * e.direction[1]
                + e.direction[2] * e.direction[2])
                .sqrt();
            if norm > 0.0 {
                for d in &mut e.direction {
                    *d /= norm;
                }
            }
        }
        let shells = cluster_shells(&entries);
        Self { entries, shells }
    }

    /// Parse an MRtrix-style gradient table: one row per volume,
    /// four columns (x, y, z, b).
    pub fn from_file(path: &Path) -> Result<Self> {
        let rows = read_matrix(path)?;
        let mut entries = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if row.len() < 4 {
                return Err(DwiAlignError::Parse {
                    path: path.display().to_string(),
                    message: format!("row {} has {} columns, expected 4", i, row.len()),
                });
            }
            entries.push(GradientEntry {
                direction: [row[0], row[1], row[2]],
                bvalue: row[3],
            });
        }
        Ok(Self::new(entries))
    }

    /// Parse an FSL bvecs/bvals pair: bvecs holds three rows of direction
    /// components, bvals a single row of b-values.
    pub fn from_fsl(bvecs: &Path, bvals: &Path) -> Result<Self> {
        let vecs = read_matrix(bvecs)?;
        if vecs.len() != 3 {
            return Err(DwiAlignError::Parse {
                path: bvecs.display().to_string(),
                message: format!("expected 3 rows in bvecs file, got {}", vecs.len()),
            });
        }
        let vals = read_matrix(bvals)?;
        if vals.len() != 1 {
            return Err(DwiAlignError::Parse {
                path: bvals.display().to_string(),
                message: format!("expected 1 row in bvals file, got {}", vals.len()),
            });
        }
        let n = vals[0].len();
        if vecs[0].len() != n || vecs[1].len() != n || vecs[2].len() != n {
            return Err(DwiAlignError::Parse {
                path: bvecs.display().to_string(),
                message: "bvecs and bvals disagree on volume count".into(),
            });
        }
        let entries = (0..n)
            .map(|i| GradientEntry {
                direction: [vecs[0][i], vecs[1][i], vecs[2][i]],
                bvalue: vals[0][i],
            })
            .collect();
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[GradientEntry] {
        &self.entries
    }

    pub fn shells(&self) -> &[Shell] {
        &self.shells
    }

    pub fn check_matches(&self, volumes: usize) -> Result<()> {
        if self.entries.len() != volumes {
            return Err(DwiAlignError::GradientMismatch {
                rows: self.entries.len(),
                volumes,
            });
        }
        Ok(())
    }

    /// Resolve requested b-values to shell indices. Each requested value must
    /// match a clustered shell within [`SHELL_TOLERANCE`].
    pub fn select_shells(&self, bvalues: &[f64]) -> Result<Vec<usize>> {
        let mut selected = Vec::with_capacity(bvalues.len());
        for &b in bvalues {
            let found = self
                .shells
                .iter()
                .position(|s| (s.bvalue - b).abs() <= SHELL_TOLERANCE);
            match found {
                Some(idx) if !selected.contains(&idx) => selected.push(idx),
                Some(_) => {}
                None => {
                    return Err(DwiAlignError::InvalidInput(format!(
                        "no shell matches b-value {}",
                        b
                    )))
                }
            }
        }
        selected.sort_unstable();
        Ok(selected)
    }
}

fn cluster_shells(entries: &[GradientEntry]) -> Vec<Shell> {
    let mut shells: Vec<Shell> = Vec::new();
    for (v, e) in entries.iter().enumerate() {
        match shells
            .iter_mut()
            .find(|s| (s.bvalue - e.bvalue).abs() <= SHELL_TOLERANCE)
        {
            Some(shell) => {
                // Running mean keeps the shell centre stable as members join.
                let n = shell.volumes.len() as f64;
                shell.bvalue = (shell.bvalue * n + e.bvalue) / (n + 1.0);
                shell.volumes.push(v);
            }
            None => shells.push(Shell {
                bvalue: e.bvalue,
                volumes: vec![v],
            }),
        }
    }
    shells.sort_by(|a, b| a.bvalue.total_cmp(&b.bvalue));
    shells
}
