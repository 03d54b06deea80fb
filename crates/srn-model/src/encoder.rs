//! Encoder stages of the stereo backbone.
//!
//! ```text
//!   (x_l, x_r) [C, H, W]
//!        │  NAF blocks (shared weights, per view)
//!        ▼
//!   optional FusionBlock (couples the views)
//!        │──────────────► skip (x_l, x_r) [C, H, W]
//!        ▼
//!   2x2 stride-2 conv (shared) ─► [2C, H/2, W/2]
//! ```

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;
use srn_core::StereoPair;

use crate::fusion::{FusionBlock, FusionConfig};
use crate::naf_block::{forward_blocks, NafBlock, NafBlockConfig};

/// Shape of one encoder stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderStageConfig {
    /// Channels entering the stage; the downsampler doubles them
    pub channels: usize,
    /// Number of NAF blocks
    pub depth: usize,
    /// Whether a fusion block follows the NAF blocks
    pub fusion: bool,
}

#[derive(Module, Debug)]
pub struct EncoderStage<B: Backend> {
    pub blocks: Vec<NafBlock<B>>,
    pub fusion: Option<FusionBlock<B>>,
    pub down: Conv2d<B>,
}

impl<B: Backend> EncoderStage<B> {
    pub fn new(
        stage: &EncoderStageConfig,
        naf: &NafBlockConfig,
        fusion: &FusionConfig,
        scale_init: f64,
        device: &B::Device,
    ) -> Self {
        let c = stage.channels;
        let blocks = (0..stage.depth)
            .map(|_| NafBlock::new(c, naf, scale_init, device))
            .collect();
        let fusion = stage
            .fusion
            .then(|| FusionBlock::new(c, fusion, scale_init, device));
        let down = Conv2dConfig::new([c, 2 * c], [2, 2])
            .with_stride([2, 2])
            .init(device);

        Self { blocks, fusion, down }
    }

    /// Returns `(skip, downsampled)`.
    pub fn forward(
        &self,
        x: StereoPair<Tensor<B, 4>>,
    ) -> (StereoPair<Tensor<B, 4>>, StereoPair<Tensor<B, 4>>) {
        let x = x.map(|view| forward_blocks(&self.blocks, view));
        let x = match &self.fusion {
            Some(fusion) => fusion.forward(x),
            None => x,
        };
        let down = x.clone().map(|view| self.down.forward(view));
        (x, down)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_encoder_stage_forward() {
        let device = Default::default();
        let config = EncoderStageConfig {
            channels: 4,
            depth: 2,
            fusion: true,
        };
        let stage = EncoderStage::<TestBackend>::new(
            &config,
            &NafBlockConfig::new(),
            &FusionConfig::new(),
            0.0,
            &device,
        );
        assert_eq!(stage.blocks.len(), 2);
        assert!(stage.fusion.is_some());

        let x = Tensor::<TestBackend, 4>::zeros([1, 4, 8, 12], &device);
        let (skip, down) = stage.forward(StereoPair::new(x.clone(), x));
        assert_eq!(skip.left.dims(), [1, 4, 8, 12]);
        assert_eq!(down.right.dims(), [1, 8, 4, 6]);
    }

    #[test]
    fn test_stage_without_fusion() {
        let device = Default::default();
        let config = EncoderStageConfig {
            channels: 2,
            depth: 0,
            fusion: false,
        };
        let stage = EncoderStage::<TestBackend>::new(
            &config,
            &NafBlockConfig::new(),
            &FusionConfig::new(),
            0.0,
            &device,
        );
        assert!(stage.fusion.is_none());
        assert!(stage.blocks.is_empty());
    }
}
