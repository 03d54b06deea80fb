//! Decoder stages of the stereo backbone.
//!
//! ```text
//!   (x_l, x_r) [2C, H/2, W/2]
//!        │  1x1 conv (no bias) ─► [4C, H/2, W/2] ─► pixel shuffle ─► [C, H, W]
//!        ▼
//!   + skip (x_l, x_r) [C, H, W]
//!        │  NAF blocks
//!        ▼
//!   (x_l, x_r) [C, H, W]
//! ```

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::prelude::*;
use srn_core::filter::pixel_shuffle;
use srn_core::StereoPair;

use crate::naf_block::{forward_blocks, NafBlock, NafBlockConfig};

/// Upsampling factor of every decoder stage.
pub const UPSCALE: usize = 2;

#[derive(Module, Debug)]
pub struct DecoderStage<B: Backend> {
    pub up: Conv2d<B>,
    pub blocks: Vec<NafBlock<B>>,
}

impl<B: Backend> DecoderStage<B> {
    /// Stage taking `in_channels` to `in_channels / 2`.
    pub fn new(
        in_channels: usize,
        depth: usize,
        naf: &NafBlockConfig,
        scale_init: f64,
        device: &B::Device,
    ) -> Self {
        let out_channels = in_channels / UPSCALE;
        let up = Conv2dConfig::new([in_channels, in_channels * UPSCALE], [1, 1])
            .with_bias(false)
            .init(device);
        let blocks = (0..depth)
            .map(|_| NafBlock::new(out_channels, naf, scale_init, device))
            .collect();
        Self { up, blocks }
    }

    pub fn upsample(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        pixel_shuffle(self.up.forward(x), UPSCALE)
    }

    pub fn forward(
        &self,
        x: StereoPair<Tensor<B, 4>>,
        skip: StereoPair<Tensor<B, 4>>,
    ) -> StereoPair<Tensor<B, 4>> {
        x.zip(skip)
            .map(|(view, skip)| forward_blocks(&self.blocks, self.upsample(view) + skip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_decoder_stage_forward() {
        let device = Default::default();
        let stage = DecoderStage::<TestBackend>::new(8, 1, &NafBlockConfig::new(), 0.0, &device);

        let x = Tensor::<TestBackend, 4>::zeros([2, 8, 3, 5], &device);
        let skip = Tensor::<TestBackend, 4>::ones([2, 4, 6, 10], &device);
        let out = stage.forward(
            StereoPair::new(x.clone(), x),
            StereoPair::new(skip.clone(), skip),
        );
        assert_eq!(out.left.dims(), [2, 4, 6, 10]);
        assert_eq!(out.right.dims(), [2, 4, 6, 10]);

        // Zero input, no bias on the upsampler, identity blocks: the skip passes through.
        let value = out.left.mean().into_scalar();
        assert!((value - 1.0).abs() < 1e-6);
    }
}
