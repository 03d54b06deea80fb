//! Error types for checkpoint and image I/O.

use std::path::PathBuf;

use srn_core::RestoreError;
use thiserror::Error;

/// Errors raised while saving or loading checkpoints.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrong format tag, unsupported version or malformed parameter tree.
    #[error("Invalid checkpoint format: {0}")]
    Format(String),

    /// Parameter names or shapes disagree with the target architecture.
    #[error(
        "Parameter mismatch: missing {missing:?}, unexpected {unexpected:?}, mismatched shapes {mismatched:?}"
    )]
    ParameterMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
        mismatched: Vec<String>,
    },

    /// The embedded configuration does not describe a valid network.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(#[from] RestoreError),
}

impl CheckpointError {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}

/// Errors raised while reading or writing images.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image codec error: {0}")]
    Codec(#[from] image::ImageError),

    /// Two images that must match in size do not.
    #[error("Size mismatch: {0}")]
    SizeMismatch(String),

    /// The tensor cannot be turned into an image.
    #[error("Invalid tensor: {0}")]
    InvalidTensor(String),

    /// A path in the stereo layout is missing.
    #[error("Missing file: {}", .0.display())]
    Missing(PathBuf),
}
