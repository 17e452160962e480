use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use dwialign_core::motion::{MotionTable, SliceGroups};
use dwialign_core::register::{
    enumerate_units, run_epoch, EchoPolicy, EpochContext, PatternSearchOptimizer, SecondEcho,
};
use dwialign_core::io::{load_mask, load_series};
use dwialign_core::ssp::SspKernel;
use dwialign_core::volume::Mask;
use dwialign_core::weights::SliceWeightTable;

use super::{parse_ssp, SspArg};

#[derive(Clone, Copy, ValueEnum)]
pub enum EchoPolicyArg {
    Average,
    Validate,
}

impl From<EchoPolicyArg> for EchoPolicy {
    fn from(arg: EchoPolicyArg) -> Self {
        match arg {
            EchoPolicyArg::Average => EchoPolicy::Average,
            EchoPolicyArg::Validate => EchoPolicy::Validate,
        }
    }
}

#[derive(Args)]
pub struct AlignArgs {
    /// Input DWI data (NIfTI)
    pub data: PathBuf,

    /// Signal prediction with matching dimensions (NIfTI)
    pub prediction: PathBuf,

    /// Output motion parameter file
    pub output: PathBuf,

    /// Brain mask image
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// Multiband factor (0 = volume-to-volume registration)
    #[arg(long, default_value = "0")]
    pub mb: usize,

    /// Slice profile: Gaussian width in voxels, or a vector file
    #[arg(long)]
    pub ssp: Option<String>,

    /// Motion initialisation file (6 columns per row)
    #[arg(long)]
    pub init: Option<PathBuf>,

    /// Iteration cap per registration (0 = optimizer default)
    #[arg(long, default_value = "0")]
    pub maxiter: usize,

    /// Second echo sharing the same motion
    #[arg(long, num_args = 2, value_names = ["DATA", "PRED"])]
    pub multiecho: Option<Vec<PathBuf>>,

    /// How the second echo contributes to registration
    #[arg(long, value_enum, default_value = "average")]
    pub echo_policy: EchoPolicyArg,
}

pub fn run(args: &AlignArgs) -> Result<()> {
    let series = load_series(&args.data)
        .with_context(|| format!("Failed to read {}", args.data.display()))?;
    let prediction = load_series(&args.prediction)
        .with_context(|| format!("Failed to read {}", args.prediction.display()))?;
    if prediction.data.dim() != series.data.dim() {
        bail!(
            "prediction dimensions {:?} do not match data dimensions {:?}",
            prediction.data.dim(),
            series.data.dim()
        );
    }

    let mask = match &args.mask {
        Some(path) => {
            let mask =
                load_mask(path).with_context(|| format!("Failed to read mask {}", path.display()))?;
            mask.check_matches(&series)?;
            mask
        }
        None => Mask::full(series.spatial_dims()),
    };

    let groups = SliceGroups::new(series.slices(), args.mb)?;
    let mut table = match &args.init {
        Some(path) => MotionTable::load(path, series.volumes(), groups.count())
            .with_context(|| format!("Failed to read motion init {}", path.display()))?,
        None => MotionTable::zeros(series.volumes(), groups.count()),
    };

    let ssp = match &args.ssp {
        Some(arg) => match parse_ssp(arg)? {
            SspArg::Width(w) => SspKernel::from_width(w),
            SspArg::Vector(v) => SspKernel::from_vector(v)?,
        },
        None => SspKernel::default(),
    };

    let multiecho = match &args.multiecho {
        Some(paths) if paths.len() == 2 => {
            let data2 = load_series(&paths[0])
                .with_context(|| format!("Failed to read {}", paths[0].display()))?;
            let pred2 = load_series(&paths[1])
                .with_context(|| format!("Failed to read {}", paths[1].display()))?;
            if data2.data.dim() != series.data.dim() || pred2.data.dim() != series.data.dim() {
                bail!("multiecho dimensions do not match the primary series");
            }
            Some((data2, pred2))
        }
        _ => None,
    };

    let weights = SliceWeightTable::ones(series.volumes(), series.slices());
    let optimizer = PatternSearchOptimizer::default();
    let units = enumerate_units(&table, &groups);

    println!(
        "Registering {} work units ({} volumes x {} groups)",
        units.len(),
        series.volumes(),
        groups.count()
    );
    let pb = ProgressBar::new(units.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("Registering [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );

    let ctx = EpochContext {
        series: &series,
        prediction: &prediction.data,
        mask: &mask,
        weights: &weights,
        groups: &groups,
        ssp: &ssp,
        optimizer: &optimizer,
        max_iter: args.maxiter,
        second_echo: multiecho.as_ref().map(|(data, pred)| SecondEcho {
            series: data,
            prediction: &pred.data,
        }),
        echo_policy: args.echo_policy.into(),
    };
    run_epoch(&ctx, &units, 1.0, &mut table, &|done| {
        pb.set_position(done as u64)
    })?;
    pb.finish();

    table.save(&args.output)?;
    println!("Motion parameters saved to {}", args.output.display());
    Ok(())
}
