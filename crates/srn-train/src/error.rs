//! Error types for training.

use srn_core::RestoreError;
use srn_io::{CheckpointError, ImageError};
use thiserror::Error;

/// Main error type for training runs.
#[derive(Error, Debug)]
pub enum TrainingError {
    /// The loss became NaN or infinite.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// Invalid training configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The forward pass rejected its inputs.
    #[error(transparent)]
    Restore(#[from] RestoreError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Image(#[from] ImageError),
}

/// Result type for training operations.
pub type Result<T> = std::result::Result<T, TrainingError>;

impl TrainingError {
    pub fn numerical_instability(msg: impl Into<String>) -> Self {
        Self::NumericalInstability(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
