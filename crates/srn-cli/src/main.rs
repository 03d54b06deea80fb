use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use burn::module::Module;

mod restore;
mod train;

use srn_io::{open_checkpoint, save_checkpoint, LoadMode};
use srn_model::presets;

/// CPU backend used for inference.
pub type Backend = burn::backend::NdArray<f32>;
/// Backend with gradients for training.
pub type TrainBackend = burn::backend::Autodiff<Backend>;

#[derive(Parser)]
#[command(name = "srn")]
#[command(about = "Stereo image restoration with frequency-aware cross-view fusion")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a freshly initialised checkpoint from a preset
    Init {
        /// Architecture preset
        #[arg(short, long, default_value = "lightweight", value_parser = clap::builder::PossibleValuesParser::new(presets::NAMES))]
        preset: String,

        /// Override the frequency-split cutoff ratio
        #[arg(long)]
        cutoff_ratio: Option<f64>,

        /// Checkpoint path (`.json` or `.json.gz`)
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print a checkpoint's configuration and parameter count
    Inspect {
        checkpoint: PathBuf,

        /// List every parameter with its shape
        #[arg(long)]
        params: bool,
    },

    /// Restore a stereo pair or a directory of pairs
    Restore(restore::RestoreArgs),

    /// Train on a stereo dataset (`input/{left,right}` and `gt/{left,right}`)
    Train(train::TrainArgs),
}

/// How to treat checkpoints that do not match the network exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LoadModeArg {
    #[default]
    Strict,
    Permissive,
}

impl From<LoadModeArg> for LoadMode {
    fn from(mode: LoadModeArg) -> Self {
        match mode {
            LoadModeArg::Strict => LoadMode::Strict,
            LoadModeArg::Permissive => LoadMode::Permissive,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            preset,
            cutoff_ratio,
            output,
        } => init(&preset, cutoff_ratio, &output)?,
        Commands::Inspect { checkpoint, params } => inspect(&checkpoint, params)?,
        Commands::Restore(args) => restore::run(&args)?,
        Commands::Train(args) => train::run(&args)?,
    }

    Ok(())
}

fn init(preset: &str, cutoff_ratio: Option<f64>, output: &std::path::Path) -> Result<()> {
    let mut config = presets::by_name(preset)
        .with_context(|| format!("Unknown preset: {}. Available: {}", preset, presets::NAMES.join(", ")))?;
    if let Some(ratio) = cutoff_ratio {
        config.fusion = config.fusion.clone().with_cutoff_ratio(ratio)?;
    }

    let device = Default::default();
    let model = config.init::<Backend>(&device)?;
    save_checkpoint(&model, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        "Initialised '{}' preset: {} parameters, fusion at stages {:?}",
        preset,
        model.num_params(),
        model.fusion_stages()
    );
    Ok(())
}

fn inspect(path: &std::path::Path, list_params: bool) -> Result<()> {
    let checkpoint = open_checkpoint(path).with_context(|| format!("Failed to read {}", path.display()))?;

    println!("Checkpoint: {}", path.display());
    println!("Format:     {} v{}", checkpoint.format, checkpoint.version);
    println!("Parameters: {}", checkpoint.num_parameters()?);
    println!("Stages:     {} (padder size {})", checkpoint.config.num_stages(), checkpoint.config.padder_size());
    println!("Fusion at:  {:?}", checkpoint.config.fusion_stage_indices());
    println!();
    println!("{}", serde_json::to_string_pretty(&checkpoint.config)?);

    if list_params {
        println!();
        for (name, shape) in checkpoint.parameter_shapes()? {
            println!("  {:<60} {:?}", name, shape);
        }
    }
    Ok(())
}
