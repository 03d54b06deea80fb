//! Complete stereo restoration network.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use srn_model::network::StereoRestorerConfig;
//! use burn::tensor::Tensor;
//! use burn_ndarray::NdArray;
//!
//! type B = NdArray;
//! let device = Default::default();
//!
//! let model = StereoRestorerConfig::lightweight().init::<B>(&device).unwrap();
//! let left = Tensor::<B, 4>::zeros([1, 3, 64, 64], &device);
//! let right = Tensor::<B, 4>::zeros([1, 3, 64, 64], &device);
//! let restored = model.restore(left, right).unwrap();
//! assert_eq!(restored.left.dims(), [1, 3, 64, 64]);
//! ```

pub mod architecture;

pub use architecture::{presets, StereoRestorer, StereoRestorerConfig};
