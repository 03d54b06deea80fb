//! Stereo restoration network.
//!
//! A shared-weight NAFNet-style U-Net applied to a left/right image pair.
//! The two branches exchange information only inside [`fusion::FusionBlock`],
//! which splits features into frequency bands, aligns the high band across
//! views with deformable convolution and fuses the low band with stereo
//! cross-attention.
//!
//! # Module Structure
//!
//! ```text
//! srn-model/
//! ├── layer_norm     - channel LayerNorm for NCHW maps
//! ├── naf_block      - NAF residual block (SimpleGate + channel attention)
//! ├── deconv         - re-parameterised difference convolution
//! ├── deblock        - detail enhancement residual unit
//! ├── aligner        - deformable cross-view alignment of the high band
//! ├── scam           - stereo cross-attention on the low band
//! ├── fusion         - split, align, attend, merge
//! ├── encoder        - encoder stages with optional fusion
//! ├── decoder        - pixel-shuffle decoder stages
//! └── network/       - StereoRestorer and presets
//! ```

pub mod layer_norm;
pub mod naf_block;
pub mod deconv;
pub mod deblock;
pub mod aligner;
pub mod scam;
pub mod fusion;
pub mod encoder;
pub mod decoder;
pub mod network;

pub use fusion::{BandMerge, FusionBlock, FusionConfig};
pub use naf_block::{NafBlock, NafBlockConfig};
pub use network::{presets, StereoRestorer, StereoRestorerConfig};
