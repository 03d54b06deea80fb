use anyhow::{bail, Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use srn_core::StereoPair;
use srn_io::{discover_pairs, load_checkpoint, read_stereo_pair, write_rgb};
use srn_model::StereoRestorer;

use crate::{Backend, LoadModeArg};

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Model checkpoint
    #[arg(short, long)]
    pub checkpoint: PathBuf,

    /// Left view of a single pair
    #[arg(long, requires = "right", conflicts_with = "input_dir")]
    pub left: Option<PathBuf>,

    /// Right view of a single pair
    #[arg(long, requires = "left")]
    pub right: Option<PathBuf>,

    /// Directory holding `left/` (and `right/`) views, or the left directory itself
    #[arg(long, required_unless_present = "left")]
    pub input_dir: Option<PathBuf>,

    /// Results go to `<output>/left` and `<output>/right`
    #[arg(short, long)]
    pub output: PathBuf,

    #[arg(long, value_enum, default_value_t = LoadModeArg::Strict)]
    pub load_mode: LoadModeArg,
}

pub fn run(args: &RestoreArgs) -> Result<()> {
    let device = Default::default();
    let (model, config, report) = load_checkpoint::<Backend, _>(&args.checkpoint, &device, args.load_mode.into())
        .with_context(|| format!("Failed to load {}", args.checkpoint.display()))?;
    if !report.is_complete() {
        warn!("{} parameters kept their initial values", report.missing.len() + report.mismatched.len());
    }
    info!("Model: width {}, {} stages, fusion at {:?}", config.width, config.num_stages(), model.fusion_stages());

    let pairs = match (&args.left, &args.right, &args.input_dir) {
        (Some(left), Some(right), _) => vec![StereoPair::new(left.clone(), right.clone())],
        (_, _, Some(dir)) => {
            let left_dir = if dir.join("left").is_dir() { dir.join("left") } else { dir.clone() };
            discover_pairs(&left_dir)?.into_iter().map(|(_, pair)| pair).collect()
        }
        _ => bail!("Give either --left and --right or --input-dir"),
    };
    if pairs.is_empty() {
        bail!("No stereo pairs found");
    }

    let bar = ProgressBar::new(pairs.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut total = std::time::Duration::ZERO;
    for pair in &pairs {
        bar.set_message(file_name(&pair.left));
        let start = Instant::now();
        restore_pair(&model, pair, &args.output, &device)?;
        total += start.elapsed();
        bar.inc(1);
    }
    bar.finish_and_clear();

    info!(
        "Restored {} pairs into {} (inference {:.2}s, {:.3}s per pair)",
        pairs.len(),
        args.output.display(),
        total.as_secs_f64(),
        total.as_secs_f64() / pairs.len() as f64
    );
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn restore_pair(
    model: &StereoRestorer<Backend>,
    pair: &StereoPair<PathBuf>,
    output: &Path,
    device: &<Backend as burn::tensor::backend::Backend>::Device,
) -> Result<()> {
    let views = read_stereo_pair::<Backend, _>(&pair.left, &pair.right, device)?;
    let restored = model.restore(views.left, views.right)?;

    for (tensor, source, dir) in [
        (restored.left, &pair.left, "left"),
        (restored.right, &pair.right, "right"),
    ] {
        let target = output.join(dir).join(file_name(source)).with_extension("png");
        write_rgb(tensor, &target).with_context(|| format!("Failed to write {}", target.display()))?;
    }
    Ok(())
}
