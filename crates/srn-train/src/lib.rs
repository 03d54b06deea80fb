//! Training collaborator for the stereo restoration network.
//!
//! The model crate knows nothing about optimisation. This crate wraps a
//! [`StereoRestorer`](srn_model::StereoRestorer) with a pixel loss, a
//! learning-rate schedule and any burn optimizer, and reports progress
//! through [`ProgressTracker`] callbacks.

pub mod error;
pub mod loss;
pub mod progress;
pub mod schedule;
pub mod trainer;

pub use error::{Result, TrainingError};
pub use loss::{CharbonnierLoss, L1Loss, MseLoss, PixelLoss, PixelLossConfig, PsnrLoss};
pub use progress::{
    ConsoleProgressCallback, EarlyStoppingCallback, HistoryCallback, ProgressCallback, ProgressInfo,
    ProgressTracker,
};
pub use schedule::LearningRateSchedule;
pub use trainer::{StepStats, StereoBatch, StereoTrainer, TrainingConfig};
