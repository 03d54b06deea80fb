use anyhow::{bail, Context, Result};
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, AdamWConfig, Optimizer};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use srn_io::{discover_samples, load_checkpoint, save_checkpoint, StereoSample};
use srn_model::{presets, StereoRestorer};
use srn_train::{
    ConsoleProgressCallback, LearningRateSchedule, PixelLossConfig, ProgressCallback, ProgressInfo,
    ProgressTracker, StereoBatch, StereoTrainer, TrainingConfig, TrainingError,
};

use crate::{LoadModeArg, TrainBackend};

/// Norm used by `--grad-clip`.
const GRAD_CLIP_NORM: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OptimizerArg {
    Adam,
    Adamw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScheduleArg {
    Constant,
    Step,
    Cosine,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Dataset root with `input/` and `gt/`
    #[arg(long)]
    pub data: PathBuf,

    /// Run directory for checkpoints
    #[arg(short, long)]
    pub output: PathBuf,

    /// Start from this checkpoint instead of a fresh preset
    #[arg(short, long, conflicts_with = "preset")]
    pub checkpoint: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LoadModeArg::Strict)]
    pub load_mode: LoadModeArg,

    #[arg(long, default_value = "lightweight", value_parser = clap::builder::PossibleValuesParser::new(presets::NAMES))]
    pub preset: String,

    #[arg(long, default_value = "l1", value_parser = clap::builder::PossibleValuesParser::new(PixelLossConfig::NAMES))]
    pub loss: String,

    #[arg(long, default_value_t = 1.0)]
    pub loss_weight: f64,

    #[arg(long, value_enum, default_value_t = OptimizerArg::Adamw)]
    pub optimizer: OptimizerArg,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Final learning rate of the cosine schedule
    #[arg(long, default_value_t = 1e-7)]
    pub min_lr: f64,

    #[arg(long, value_enum, default_value_t = ScheduleArg::Cosine)]
    pub schedule: ScheduleArg,

    #[arg(long, default_value_t = 0.0)]
    pub weight_decay: f32,

    #[arg(long, default_value_t = 1000)]
    pub iterations: usize,

    #[arg(long, default_value_t = 1)]
    pub batch_size: usize,

    /// Save every N iterations (0: only at the end)
    #[arg(long, default_value_t = 0)]
    pub checkpoint_every: usize,

    /// Clip the gradient norm
    #[arg(long)]
    pub grad_clip: bool,

    #[arg(long, default_value_t = 100)]
    pub log_every: usize,
}

impl TrainArgs {
    fn schedule(&self) -> LearningRateSchedule {
        match self.schedule {
            ScheduleArg::Constant => LearningRateSchedule::constant(self.lr),
            ScheduleArg::Step => LearningRateSchedule::step(self.lr, 0.5, (self.iterations / 4).max(1)),
            ScheduleArg::Cosine => LearningRateSchedule::cosine_annealing(self.lr, self.min_lr, self.iterations),
        }
    }

    fn training_config(&self) -> Result<TrainingConfig> {
        let loss = PixelLossConfig::from_name(&self.loss, self.loss_weight)
            .with_context(|| format!("Unknown loss: {}", self.loss))?;
        Ok(TrainingConfig::new()
            .with_loss(loss)
            .with_schedule(self.schedule())
            .with_num_iterations(self.iterations)
            .with_checkpoint_every(self.checkpoint_every)
            .with_checkpoint_dir(Some(self.output.clone()))
            .with_grad_clip_norm(self.grad_clip.then_some(GRAD_CLIP_NORM)))
    }
}

/// Drives an indicatif bar from trainer progress.
struct BarCallback {
    bar: ProgressBar,
}

impl ProgressCallback for BarCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_position(info.iteration as u64);
        self.bar.set_message(format!("loss {:.5} lr {:.2e}", info.loss, info.learning_rate));
    }

    fn on_complete(&self, _info: &ProgressInfo) {
        self.bar.finish();
    }

    fn on_error(&self, _error: &str) {
        self.bar.abandon();
    }
}

pub fn run(args: &TrainArgs) -> Result<()> {
    if args.batch_size == 0 {
        bail!("--batch-size must be positive");
    }
    let device = Default::default();

    let model = match &args.checkpoint {
        Some(path) => {
            let (model, _, _) = load_checkpoint::<TrainBackend, _>(path, &device, args.load_mode.into())
                .with_context(|| format!("Failed to load {}", path.display()))?;
            model
        }
        None => presets::by_name(&args.preset)
            .with_context(|| format!("Unknown preset: {}", args.preset))?
            .init::<TrainBackend>(&device)?,
    };

    let samples: Vec<StereoSample> = discover_samples(&args.data)?
        .into_iter()
        .filter(|s| s.target.is_some())
        .collect();
    if samples.is_empty() {
        bail!("No samples with ground truth under {}", args.data.display());
    }
    info!("Training on {} pairs, batch size {}", samples.len(), args.batch_size);

    let config = args.training_config()?;
    let clipping = config.grad_clipping();
    let trained = match args.optimizer {
        OptimizerArg::Adam => {
            let mut optimizer = AdamConfig::new().with_grad_clipping(clipping);
            if args.weight_decay > 0.0 {
                optimizer = optimizer.with_weight_decay(Some(WeightDecayConfig::new(args.weight_decay)));
            }
            fit(model, optimizer.init(), config, &samples, args)?
        }
        OptimizerArg::Adamw => {
            let optimizer = AdamWConfig::new()
                .with_weight_decay(args.weight_decay)
                .with_grad_clipping(clipping);
            fit(model, optimizer.init(), config, &samples, args)?
        }
    };

    let final_path = args.output.join("final.json.gz");
    save_checkpoint(&trained.valid(), &final_path)?;
    info!("Final model written to {}", final_path.display());
    Ok(())
}

fn fit<O>(
    model: StereoRestorer<TrainBackend>,
    optimizer: O,
    config: TrainingConfig,
    samples: &[StereoSample],
    args: &TrainArgs,
) -> Result<StereoRestorer<TrainBackend>>
where
    O: Optimizer<StereoRestorer<TrainBackend>, TrainBackend>,
{
    let device = Default::default();
    let mut trainer = StereoTrainer::new(model, optimizer, config)?;

    let bar = ProgressBar::new(args.iterations as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );
    let tracker = ProgressTracker::new()
        .with_callback(Arc::new(BarCallback { bar: bar.clone() }))
        .with_callback(Arc::new(ConsoleProgressCallback::new(args.log_every)));

    let mut load_error: Option<TrainingError> = None;
    let batches = samples
        .chunks(args.batch_size)
        .cycle()
        .map_while(|chunk| match StereoBatch::load(chunk, &device) {
            Ok(batch) => Some(batch),
            Err(err) => {
                load_error = Some(err);
                None
            }
        });
    trainer.fit(batches, &tracker)?;
    if let Some(err) = load_error {
        bar.abandon();
        return Err(err).context("Failed to load a training batch");
    }

    Ok(trainer.into_model())
}
