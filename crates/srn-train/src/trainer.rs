//! Supervised training of a [`StereoRestorer`].
//!
//! One step restores both views, sums the left and right pixel losses,
//! back-propagates and lets the optimizer update the network with the
//! scheduled learning rate.

use std::path::PathBuf;

use burn::grad_clipping::GradientClippingConfig;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use srn_core::{RestoreError, StereoPair};
use srn_io::{batch_tensors, read_stereo_pair, save_checkpoint, StereoSample};
use srn_model::StereoRestorer;
use tracing::{debug, info};

use crate::error::TrainingError;
use crate::loss::{PixelLoss, PixelLossConfig};
use crate::progress::{ProgressInfo, ProgressTracker};
use crate::schedule::LearningRateSchedule;

#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = "PixelLossConfig::default()")]
    pub loss: PixelLossConfig,
    #[config(default = "LearningRateSchedule::default()")]
    pub schedule: LearningRateSchedule,
    #[config(default = 1000)]
    pub num_iterations: usize,
    /// Save every this many iterations; 0 disables intermediate saves.
    #[config(default = 0)]
    pub checkpoint_every: usize,
    /// Directory for `iter_XXXXXX.json.gz` checkpoints
    pub checkpoint_dir: Option<PathBuf>,
    /// Gradient-norm clipping threshold.
    pub grad_clip_norm: Option<f32>,
}

impl TrainingConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.num_iterations == 0 {
            return Err(TrainingError::invalid_configuration("num_iterations must be positive"));
        }
        if self.checkpoint_every > 0 && self.checkpoint_dir.is_none() {
            return Err(TrainingError::invalid_configuration(
                "checkpoint_every is set but no checkpoint_dir was given",
            ));
        }
        if self.grad_clip_norm.is_some_and(|n| !(n > 0.0)) {
            return Err(TrainingError::invalid_configuration("grad_clip_norm must be positive"));
        }
        self.schedule.validate()
    }

    /// Clipping to pass to a burn optimizer config.
    pub fn grad_clipping(&self) -> Option<GradientClippingConfig> {
        self.grad_clip_norm.map(GradientClippingConfig::Norm)
    }
}

/// Degraded inputs with their clean targets, all `[B, C, H, W]`.
#[derive(Debug, Clone)]
pub struct StereoBatch<B: Backend> {
    pub input: StereoPair<Tensor<B, 4>>,
    pub target: StereoPair<Tensor<B, 4>>,
}

impl<B: Backend> StereoBatch<B> {
    pub fn new(input: StereoPair<Tensor<B, 4>>, target: StereoPair<Tensor<B, 4>>) -> Self {
        Self { input, target }
    }

    /// Load and stack samples that have ground truth.
    pub fn load(samples: &[StereoSample], device: &B::Device) -> crate::error::Result<Self> {
        let mut inputs = Vec::with_capacity(samples.len());
        let mut targets = Vec::with_capacity(samples.len());
        for sample in samples {
            let target = sample.target.as_ref().ok_or_else(|| {
                TrainingError::invalid_configuration(format!("sample {} has no ground truth", sample.name))
            })?;
            inputs.push(read_stereo_pair::<B, _>(&sample.input.left, &sample.input.right, device)?);
            targets.push(read_stereo_pair::<B, _>(&target.left, &target.right, device)?);
        }
        Ok(Self {
            input: stack(inputs)?,
            target: stack(targets)?,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.input.left.dims()[0]
    }
}

fn stack<B: Backend>(pairs: Vec<StereoPair<Tensor<B, 4>>>) -> crate::error::Result<StereoPair<Tensor<B, 4>>> {
    let (left, right): (Vec<_>, Vec<_>) = pairs.into_iter().map(StereoPair::into_tuple).unzip();
    Ok(StereoPair::new(batch_tensors(left)?, batch_tensors(right)?))
}

/// Losses and learning rate of one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepStats {
    /// 1-based iteration that produced these numbers
    pub iteration: usize,
    pub loss: f64,
    pub loss_left: f64,
    pub loss_right: f64,
    pub learning_rate: f64,
}

impl StepStats {
    fn progress(&self, total: usize) -> ProgressInfo {
        ProgressInfo::new(self.iteration, Some(total), self.loss, Default::default(), self.learning_rate)
            .with_view_losses(self.loss_left, self.loss_right)
    }
}

/// Owns the network, its optimizer and the loss for one training run.
pub struct StereoTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<StereoRestorer<B>, B>,
{
    model: StereoRestorer<B>,
    optimizer: O,
    loss: Box<dyn PixelLoss<B>>,
    config: TrainingConfig,
    iteration: usize,
}

impl<B, O> StereoTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<StereoRestorer<B>, B>,
{
    pub fn new(model: StereoRestorer<B>, optimizer: O, config: TrainingConfig) -> crate::error::Result<Self> {
        config.validate()?;
        let loss = config.loss.init::<B>();
        info!(
            "Trainer ready: {} parameters, {} loss, {} iterations",
            model.num_params(),
            loss.name(),
            config.num_iterations
        );
        Ok(Self {
            model,
            optimizer,
            loss,
            config,
            iteration: 0,
        })
    }

    pub fn model(&self) -> &StereoRestorer<B> {
        &self.model
    }

    pub fn into_model(self) -> StereoRestorer<B> {
        self.model
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Completed iterations.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// One optimisation step on `batch`.
    ///
    /// A non-finite loss leaves the network untouched and returns
    /// [`TrainingError::NumericalInstability`].
    pub fn step(&mut self, batch: StereoBatch<B>) -> crate::error::Result<StepStats> {
        let output = self.model.restore(batch.input.left, batch.input.right)?;
        for (out, target) in [(&output.left, &batch.target.left), (&output.right, &batch.target.right)] {
            if out.dims() != target.dims() {
                return Err(RestoreError::shape_mismatch(&target.dims(), &out.dims()).into());
            }
        }

        let loss_left = self.loss.forward(output.left, batch.target.left);
        let loss_right = self.loss.forward(output.right, batch.target.right);
        let left = loss_left.clone().into_scalar().elem::<f64>();
        let right = loss_right.clone().into_scalar().elem::<f64>();
        let total = left + right;
        if !total.is_finite() {
            return Err(TrainingError::numerical_instability(format!(
                "loss is {} at iteration {} (left {}, right {})",
                total,
                self.iteration + 1,
                left,
                right
            )));
        }

        let learning_rate = self.config.schedule.learning_rate(self.iteration);
        let grads = (loss_left + loss_right).backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optimizer.step(learning_rate, self.model.clone(), grads);
        self.iteration += 1;

        Ok(StepStats {
            iteration: self.iteration,
            loss: total,
            loss_left: left,
            loss_right: right,
            learning_rate,
        })
    }

    /// Train until `num_iterations`, the end of `batches`, or an early stop.
    ///
    /// Checkpoints go to `checkpoint_dir` every `checkpoint_every`
    /// iterations and once more at the end.
    pub fn fit<I>(&mut self, batches: I, tracker: &ProgressTracker) -> crate::error::Result<Vec<StepStats>>
    where
        I: IntoIterator<Item = StereoBatch<B>>,
    {
        let total = self.config.num_iterations;
        let every = self.config.checkpoint_every;
        let mut history = Vec::new();
        let mut saved_last = false;
        tracker.start();

        for batch in batches {
            if self.iteration >= total || tracker.should_stop() {
                break;
            }
            let stats = match self.step(batch) {
                Ok(stats) => stats,
                Err(err) => {
                    tracker.error(&err.to_string());
                    return Err(err);
                }
            };
            tracker.update(stats.progress(total));
            history.push(stats);

            saved_last = every > 0 && self.iteration % every == 0;
            if saved_last {
                self.save()?;
            }
        }

        if let Some(last) = history.last() {
            if !saved_last {
                self.save()?;
            }
            tracker.complete(last.progress(total));
        }
        Ok(history)
    }

    /// Write `iter_XXXXXX.json.gz` into the checkpoint directory.
    pub fn save(&self) -> crate::error::Result<Option<PathBuf>> {
        let Some(dir) = &self.config.checkpoint_dir else {
            return Ok(None);
        };
        let path = dir.join(format!("iter_{:06}.json.gz", self.iteration));
        save_checkpoint(&self.model, &path)?;
        debug!("Checkpoint at iteration {}", self.iteration);
        Ok(Some(path))
    }
}
