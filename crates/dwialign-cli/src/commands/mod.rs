pub mod align;
pub mod correct;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use dwialign_core::gradient::GradientScheme;
use dwialign_core::io::text::read_matrix;

/// Resolve the gradient scheme from the mutually-exclusive table options.
pub fn load_gradients(
    grad: &Option<PathBuf>,
    fslgrad: &Option<Vec<PathBuf>>,
) -> Result<GradientScheme> {
    match (grad, fslgrad) {
        (Some(path), None) => GradientScheme::from_file(path)
            .with_context(|| format!("Failed to read gradient table {}", path.display())),
        (None, Some(pair)) if pair.len() == 2 => GradientScheme::from_fsl(&pair[0], &pair[1])
            .with_context(|| format!("Failed to read FSL gradients {}", pair[0].display())),
        (None, _) => bail!("a gradient table is required (--grad or --fslgrad)"),
        (Some(_), Some(_)) => bail!("--grad and --fslgrad are mutually exclusive"),
    }
}

/// An SSP argument: a Gaussian width, or a path to a profile vector.
pub enum SspArg {
    Width(f32),
    Vector(Vec<f32>),
}

pub fn parse_ssp(arg: &str) -> Result<SspArg> {
    if let Ok(width) = arg.parse::<f32>() {
        return Ok(SspArg::Width(width));
    }
    let rows = read_matrix(Path::new(arg))
        .with_context(|| format!("Failed to read SSP vector {}", arg))?;
    Ok(SspArg::Vector(
        rows.into_iter().flatten().map(|v| v as f32).collect(),
    ))
}
