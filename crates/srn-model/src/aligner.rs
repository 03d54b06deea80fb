//! Cross-view alignment of the high-frequency band.
//!
//! # Architecture
//! ```text
//!   H_l ──┐                                   ┌─► offset_l(H_l) ─► deform_l(F) ─┐
//!         ├─► cat ─► 1x1 ─► DEBlock ─► F ─────┤                                 │
//!   H_r ──┘                                   └─► offset_r(H_r) ─► deform_r(F) ─┤
//!                                                                               ▼
//!   H_l' = H_l + (proj_l(H_l) ⊙ F_l) · beta      H_r' = H_r + (proj_r(H_r) ⊙ F_r) · gamma
//! ```
//!
//! Each view predicts its own offset field (two coordinates per kernel tap)
//! and resamples the shared candidate `F` with it. The offsets are produced
//! on every call and never stored.

use burn::module::Param;
use burn::nn::conv::{Conv2d, Conv2dConfig, DeformConv2d, DeformConv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use srn_core::StereoPair;

use crate::deblock::DeBlock;
use crate::naf_block::{conv1x1, residual_scale};

/// Kernel size of the deformable resampling.
pub const DEFORM_KERNEL: usize = 3;

/// Channels of an offset field: (dy, dx) per kernel tap.
pub const OFFSET_CHANNELS: usize = 2 * DEFORM_KERNEL * DEFORM_KERNEL;

#[derive(Module, Debug)]
pub struct CrossViewAligner<B: Backend> {
    pub conv_down: Conv2d<B>,
    pub enhance: DeBlock<B>,
    pub offset_left: Conv2d<B>,
    pub offset_right: Conv2d<B>,
    pub deform_left: DeformConv2d<B>,
    pub deform_right: DeformConv2d<B>,
    pub proj_left: Conv2d<B>,
    pub proj_right: Conv2d<B>,
    pub beta: Param<Tensor<B, 4>>,
    pub gamma: Param<Tensor<B, 4>>,
}

impl<B: Backend> CrossViewAligner<B> {
    pub fn new(channels: usize, scale_init: f64, device: &B::Device) -> Self {
        let pad = DEFORM_KERNEL / 2;
        let offset = || {
            Conv2dConfig::new([channels, OFFSET_CHANNELS], [DEFORM_KERNEL, DEFORM_KERNEL])
                .with_padding(PaddingConfig2d::Explicit(pad, pad))
                .init(device)
        };
        let deform = || {
            DeformConv2dConfig::new([channels, channels], [DEFORM_KERNEL, DEFORM_KERNEL])
                .with_padding(PaddingConfig2d::Explicit(pad, pad))
                .with_bias(false)
                .init(device)
        };

        Self {
            conv_down: conv1x1(2 * channels, channels, device),
            enhance: DeBlock::new(channels, device),
            offset_left: offset(),
            offset_right: offset(),
            deform_left: deform(),
            deform_right: deform(),
            proj_left: conv1x1(channels, channels, device),
            proj_right: conv1x1(channels, channels, device),
            beta: residual_scale(channels, scale_init, device),
            gamma: residual_scale(channels, scale_init, device),
        }
    }

    /// Per-view offset fields `[B, 18, H, W]`.
    pub fn offsets(&self, high: StereoPair<&Tensor<B, 4>>) -> StereoPair<Tensor<B, 4>> {
        StereoPair::new(
            self.offset_left.forward(high.left.clone()),
            self.offset_right.forward(high.right.clone()),
        )
    }

    pub fn forward(&self, high: StereoPair<Tensor<B, 4>>) -> StereoPair<Tensor<B, 4>> {
        let fused = self
            .conv_down
            .forward(Tensor::cat(vec![high.left.clone(), high.right.clone()], 1));
        let candidate = self.enhance.forward(fused);

        let offsets = self.offsets(high.as_ref());
        let aligned_left = self
            .deform_left
            .forward(candidate.clone(), offsets.left, None);
        let aligned_right = self.deform_right.forward(candidate, offsets.right, None);

        let cross_left = self.proj_left.forward(high.left.clone()) * aligned_left;
        let cross_right = self.proj_right.forward(high.right.clone()) * aligned_right;

        StereoPair::new(
            high.left + cross_left * self.beta.val(),
            high.right + cross_right * self.gamma.val(),
        )
    }
}
