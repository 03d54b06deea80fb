//! Error types for stereo restoration.
//!
//! Every failure of a forward pass is local to that call: the error is
//! returned to the driver, which decides whether to skip the batch or abort.

use thiserror::Error;

/// Main error type for restoration operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RestoreError {
    /// Left and right views, or a view and the model, disagree on a dimension.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for restoration operations.
pub type Result<T> = std::result::Result<T, RestoreError>;

impl RestoreError {
    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a shape mismatch error from two shapes.
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
