pub mod error;
pub mod checkpoint;
pub mod image_io;
pub mod pairs;

pub use error::{CheckpointError, ImageError};
pub use checkpoint::{
    load_checkpoint, load_weights, open_checkpoint, read_checkpoint, save_checkpoint, write_checkpoint, Checkpoint,
    LoadMode, LoadReport,
};
pub use image_io::{batch_tensors, read_rgb, read_stereo_pair, write_rgb};
pub use pairs::{derive_right_path, discover_pairs, discover_samples, StereoSample};
