use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use dwialign_core::correct::{correct, CorrectionConfig};
use dwialign_core::io::text::read_matrix;
use dwialign_core::io::{load_mask, load_series, save_series};

use super::{load_gradients, parse_ssp, SspArg};
use crate::progress::ProgressBarReporter;
use crate::summary::print_correction_summary;

#[derive(Args)]
pub struct CorrectArgs {
    /// Input DWI series (NIfTI)
    pub input: PathBuf,

    /// Output corrected series (NIfTI)
    pub output: PathBuf,

    /// Brain mask image (auto-generated when absent)
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// MRtrix-style gradient table, 4 columns per volume
    #[arg(long, conflicts_with = "fslgrad")]
    pub grad: Option<PathBuf>,

    /// FSL gradient pair
    #[arg(long, num_args = 2, value_names = ["BVECS", "BVALS"])]
    pub fslgrad: Option<Vec<PathBuf>>,

    /// Volume-to-volume epochs
    #[arg(long, default_value = "3")]
    pub niter: usize,

    /// Slice-to-volume epochs
    #[arg(long, default_value = "2")]
    pub svr: usize,

    /// Multiband factor (0 = volume-to-volume registration)
    #[arg(long, default_value = "0")]
    pub mb: usize,

    /// Comma-separated b-values to restrict the correction to
    #[arg(long)]
    pub shell: Option<String>,

    /// Harmonic order for single-shell data
    #[arg(long)]
    pub lmax: Option<usize>,

    /// Per-shell response function files (multi-shell data)
    #[arg(long, num_args = 1..)]
    pub rf: Vec<PathBuf>,

    /// Outlier rejection threshold in standard deviations
    #[arg(long = "or-thr", default_value = "3.0")]
    pub or_thr: f32,

    /// Slice profile: Gaussian width in voxels, or a vector file
    #[arg(long)]
    pub ssp: Option<String>,

    /// Iteration cap per registration (0 = optimizer default)
    #[arg(long, default_value = "0")]
    pub maxiter: usize,

    /// Correction config file (TOML); replaces the tuning flags above
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the motion table to this file
    #[arg(long)]
    pub motion_out: Option<PathBuf>,

    /// Write the slice weight table to this file
    #[arg(long)]
    pub weights_out: Option<PathBuf>,
}

pub fn run(args: &CorrectArgs) -> Result<()> {
    let config = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid correction config")?
    } else {
        build_config_from_args(args)?
    };

    print_correction_summary(&config, &args.input, &args.output);

    let series = load_series(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    info!(
        dims = ?series.data.dim(),
        "loaded DWI series"
    );
    let grad = load_gradients(&args.grad, &args.fslgrad)?;
    let mask = match &args.mask {
        Some(path) => Some(
            load_mask(path).with_context(|| format!("Failed to read mask {}", path.display()))?,
        ),
        None => None,
    };

    let reporter = ProgressBarReporter::new();
    let output = correct(&series, &grad, mask, &config, &reporter)?;

    save_series(&args.output, &output.corrected)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    if let Some(path) = &args.motion_out {
        output.motion.save(path)?;
    }
    if let Some(path) = &args.weights_out {
        output.weights.save(path)?;
    }

    println!("Corrected series saved to {}", args.output.display());
    Ok(())
}

fn build_config_from_args(args: &CorrectArgs) -> Result<CorrectionConfig> {
    let mut config = CorrectionConfig {
        volume_epochs: args.niter,
        slice_epochs: args.svr,
        multiband: args.mb,
        outlier_threshold: args.or_thr,
        lmax: args.lmax,
        registration_max_iter: args.maxiter,
        ..Default::default()
    };

    if let Some(shell) = &args.shell {
        let bvalues: Result<Vec<f64>, _> =
            shell.split(',').map(|t| t.trim().parse::<f64>()).collect();
        config.shells = Some(bvalues.context("Invalid --shell list")?);
    }

    if !args.rf.is_empty() {
        let mut response = Vec::with_capacity(args.rf.len());
        for path in &args.rf {
            let rows = read_matrix(path)
                .with_context(|| format!("Failed to read response {}", path.display()))?;
            let row = rows
                .into_iter()
                .next()
                .with_context(|| format!("Empty response file {}", path.display()))?;
            response.push(row);
        }
        config.response = Some(response);
    }

    if let Some(ssp) = &args.ssp {
        match parse_ssp(ssp)? {
            SspArg::Width(w) => config.ssp_width = w,
            SspArg::Vector(v) => config.ssp_vector = Some(v),
        }
    }

    Ok(config)
}
