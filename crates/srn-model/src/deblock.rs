//! Detail enhancement residual unit.
//!
//! ```text
//! x ─┬─► DEConv ─► ReLU ─► + ─► conv 3x3 ─► + ─► out
//!    ├──────────────────────┘                │
//!    └───────────────────────────────────────┘
//! ```

use burn::nn::conv::Conv2d;
use burn::nn::Relu;
use burn::prelude::*;

use crate::deconv::{DeConv, DeConvConfig};
use crate::naf_block::conv3x3;

#[derive(Module, Debug)]
pub struct DeBlock<B: Backend> {
    pub deconv: DeConv<B>,
    pub activation: Relu,
    pub conv: Conv2d<B>,
}

impl<B: Backend> DeBlock<B> {
    pub fn new(channels: usize, device: &B::Device) -> Self {
        Self {
            deconv: DeConvConfig::new(channels).init(device),
            activation: Relu::new(),
            conv: conv3x3(channels, channels, device),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let res = self.activation.forward(self.deconv.forward(input.clone()));
        let res = self.conv.forward(res + input.clone());
        res + input
    }
}
