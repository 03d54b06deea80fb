//! NAF Block - Nonlinear Activation Free residual unit
//!
//! # Architecture
//! ```text
//! x ─┬─► LN ─► 1x1 (×dw) ─► DW 3x3 ─► SimpleGate ─► SCA ─► 1x1 ─► Drop ─► ·beta ─┐
//!    └────────────────────────────────────────────────────────────────────────── + ─► y
//! y ─┬─► LN ─► 1x1 (×ffn) ─► SimpleGate ─► 1x1 ─► Drop ─► ·gamma ─┐
//!    └─────────────────────────────────────────────────────────── + ─► out
//! ```
//!
//! SimpleGate splits the channels in half and multiplies the halves, so the
//! expansions must be even. SCA is global average pooling, a 1x1 conv, and a
//! channel-wise product.

use burn::module::Param;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, PaddingConfig2d};
use burn::prelude::*;

use crate::layer_norm::LayerNorm2d;

/// Configuration shared by every NAF block of a network.
#[derive(Config, Debug, PartialEq)]
pub struct NafBlockConfig {
    /// Channel expansion of the depthwise branch
    #[config(default = "2")]
    pub dw_expand: usize,
    /// Channel expansion of the feed-forward branch
    #[config(default = "2")]
    pub ffn_expand: usize,
    /// Dropout probability after each branch
    #[config(default = "0.0")]
    pub dropout: f64,
}

/// Per-channel residual scale of shape `[1, C, 1, 1]`.
pub(crate) fn residual_scale<B: Backend>(
    channels: usize,
    init: f64,
    device: &B::Device,
) -> Param<Tensor<B, 4>> {
    Param::from_tensor(Tensor::full([1, channels, 1, 1], init, device))
}

pub(crate) fn conv1x1<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [1, 1]).init(device)
}

pub(crate) fn conv3x3<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

/// Multiply the two channel halves of `x`.
pub fn simple_gate<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let half = x.dims()[1] / 2;
    let x1 = x.clone().narrow(1, 0, half);
    let x2 = x.narrow(1, half, half);
    x1 * x2
}

#[derive(Module, Debug)]
pub struct NafBlock<B: Backend> {
    pub norm1: LayerNorm2d<B>,
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub sca_pool: AdaptiveAvgPool2d,
    pub sca_conv: Conv2d<B>,
    pub conv3: Conv2d<B>,
    pub norm2: LayerNorm2d<B>,
    pub conv4: Conv2d<B>,
    pub conv5: Conv2d<B>,
    pub dropout1: Dropout,
    pub dropout2: Dropout,
    pub beta: Param<Tensor<B, 4>>,
    pub gamma: Param<Tensor<B, 4>>,
}

impl<B: Backend> NafBlock<B> {
    /// Create a block on `channels` channels with residual scales set to `scale_init`.
    pub fn new(channels: usize, config: &NafBlockConfig, scale_init: f64, device: &B::Device) -> Self {
        let dw_channels = channels * config.dw_expand;
        let ffn_channels = channels * config.ffn_expand;

        let conv2 = Conv2dConfig::new([dw_channels, dw_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_groups(dw_channels)
            .init(device);

        Self {
            norm1: LayerNorm2d::new(channels, device),
            conv1: conv1x1(channels, dw_channels, device),
            conv2,
            sca_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            sca_conv: conv1x1(dw_channels / 2, dw_channels / 2, device),
            conv3: conv1x1(dw_channels / 2, channels, device),
            norm2: LayerNorm2d::new(channels, device),
            conv4: conv1x1(channels, ffn_channels, device),
            conv5: conv1x1(ffn_channels / 2, channels, device),
            dropout1: DropoutConfig::new(config.dropout).init(),
            dropout2: DropoutConfig::new(config.dropout).init(),
            beta: residual_scale(channels, scale_init, device),
            gamma: residual_scale(channels, scale_init, device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.norm1.forward(input.clone());
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = simple_gate(x);
        let attention = self.sca_conv.forward(self.sca_pool.forward(x.clone()));
        let x = x * attention;
        let x = self.conv3.forward(x);
        let x = self.dropout1.forward(x);
        let y = input + x * self.beta.val();

        let x = self.norm2.forward(y.clone());
        let x = self.conv4.forward(x);
        let x = simple_gate(x);
        let x = self.conv5.forward(x);
        let x = self.dropout2.forward(x);
        y + x * self.gamma.val()
    }
}

/// Run a sequence of NAF blocks.
pub fn forward_blocks<B: Backend>(blocks: &[NafBlock<B>], input: Tensor<B, 4>) -> Tensor<B, 4> {
    blocks.iter().fold(input, |x, block| block.forward(x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_simple_gate() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([2.0, 3.0, 5.0, 7.0], &device)
            .reshape([1, 4, 1, 1]);
        let y: Vec<f32> = simple_gate(x).into_data().to_vec().unwrap();
        assert_eq!(y, vec![10.0, 21.0]);
    }

    #[test]
    fn test_naf_block_shape() {
        let device = Default::default();
        let block = NafBlock::<TestBackend>::new(8, &NafBlockConfig::new(), 0.1, &device);
        let x = Tensor::<TestBackend, 4>::random([2, 8, 6, 10], Distribution::Default, &device);
        assert_eq!(block.forward(x).dims(), [2, 8, 6, 10]);
    }

    #[test]
    fn test_naf_block_identity_at_zero_init() {
        let device = Default::default();
        let block = NafBlock::<TestBackend>::new(4, &NafBlockConfig::new(), 0.0, &device);
        let x = Tensor::<TestBackend, 4>::random([1, 4, 8, 8], Distribution::Default, &device);
        let y = block.forward(x.clone());
        assert_eq!((y - x).abs().max().into_scalar(), 0.0);
    }

    #[test]
    fn test_nonzero_scale_changes_output() {
        let device = Default::default();
        let block = NafBlock::<TestBackend>::new(4, &NafBlockConfig::new(), 0.5, &device);
        let x = Tensor::<TestBackend, 4>::random([1, 4, 8, 8], Distribution::Default, &device);
        let y = block.forward(x.clone());
        assert!((y - x).abs().max().into_scalar() > 0.0);
    }
}
