//! Stereo Cross-Attention Module.
//!
//! Rectified stereo pairs only disagree along image rows, so attention runs
//! independently per row: every left pixel attends to all right pixels of
//! the same row and vice versa.
//!
//! ```text
//!   Q_l = proj1_l(LN_l(L_l))   [B, H, W, C]      V_l = proj2_l(L_l)
//!   Q_r = proj1_r(LN_r(L_r))   [B, H, C, W]ᵀ     V_r = proj2_r(L_r)
//!   A   = Q_l · Q_rᵀ · C^-1/2  [B, H, W, W]
//!   L_l' = L_l + beta  · softmax(A)  · V_r
//!   L_r' = L_r + gamma · softmax(Aᵀ) · V_l
//! ```

use burn::module::Param;
use burn::nn::conv::Conv2d;
use burn::prelude::*;
use burn::tensor::activation::softmax;
use srn_core::StereoPair;

use crate::layer_norm::LayerNorm2d;
use crate::naf_block::{conv1x1, residual_scale};

#[derive(Module, Debug)]
pub struct Scam<B: Backend> {
    pub norm_left: LayerNorm2d<B>,
    pub norm_right: LayerNorm2d<B>,
    pub query_left: Conv2d<B>,
    pub query_right: Conv2d<B>,
    pub value_left: Conv2d<B>,
    pub value_right: Conv2d<B>,
    pub beta: Param<Tensor<B, 4>>,
    pub gamma: Param<Tensor<B, 4>>,
    scale: f64,
}

impl<B: Backend> Scam<B> {
    pub fn new(channels: usize, scale_init: f64, device: &B::Device) -> Self {
        Self {
            norm_left: LayerNorm2d::new(channels, device),
            norm_right: LayerNorm2d::new(channels, device),
            query_left: conv1x1(channels, channels, device),
            query_right: conv1x1(channels, channels, device),
            value_left: conv1x1(channels, channels, device),
            value_right: conv1x1(channels, channels, device),
            beta: residual_scale(channels, scale_init, device),
            gamma: residual_scale(channels, scale_init, device),
            scale: (channels as f64).powf(-0.5),
        }
    }

    /// Row-wise attention logits `[B, H, W_left, W_right]`.
    pub fn attention(&self, low: StereoPair<&Tensor<B, 4>>) -> Tensor<B, 4> {
        let q_left = self
            .query_left
            .forward(self.norm_left.forward(low.left.clone()))
            .permute([0, 2, 3, 1]);
        let q_right_t = self
            .query_right
            .forward(self.norm_right.forward(low.right.clone()))
            .permute([0, 2, 1, 3]);
        q_left.matmul(q_right_t) * self.scale
    }

    pub fn forward(&self, low: StereoPair<Tensor<B, 4>>) -> StereoPair<Tensor<B, 4>> {
        let attention = self.attention(low.as_ref());

        let v_left = self.value_left.forward(low.left.clone()).permute([0, 2, 3, 1]);
        let v_right = self.value_right.forward(low.right.clone()).permute([0, 2, 3, 1]);

        let right_to_left = softmax(attention.clone(), 3)
            .matmul(v_right)
            .permute([0, 3, 1, 2]);
        let left_to_right = softmax(attention.swap_dims(2, 3), 3)
            .matmul(v_left)
            .permute([0, 3, 1, 2]);

        StereoPair::new(
            low.left + right_to_left * self.beta.val(),
            low.right + left_to_right * self.gamma.val(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn random_pair(shape: [usize; 4]) -> StereoPair<Tensor<TestBackend, 4>> {
        let device = Default::default();
        StereoPair::new(
            Tensor::random(shape, Distribution::Default, &device),
            Tensor::random(shape, Distribution::Default, &device),
        )
    }

    #[test]
    fn test_attention_shape() {
        let device = Default::default();
        let scam = Scam::<TestBackend>::new(4, 0.0, &device);
        let low = random_pair([2, 4, 5, 7]);
        assert_eq!(scam.attention(low.as_ref()).dims(), [2, 5, 7, 7]);
    }

    #[test]
    fn test_identity_at_zero_init() {
        let device = Default::default();
        let scam = Scam::<TestBackend>::new(4, 0.0, &device);
        let low = random_pair([1, 4, 6, 6]);
        let out = scam.forward(low.clone());
        assert_eq!((out.left - low.left).abs().max().into_scalar(), 0.0);
        assert_eq!((out.right - low.right).abs().max().into_scalar(), 0.0);
    }

    #[test]
    fn test_rows_do_not_mix() {
        // Changing one row of the right view leaves other rows of the left output untouched.
        let device = Default::default();
        let scam = Scam::<TestBackend>::new(2, 1.0, &device);
        let low = random_pair([1, 2, 4, 5]);
        let out = scam.forward(low.clone());

        let bump = Tensor::<TestBackend, 4>::ones([1, 2, 1, 5], &device);
        let right = low.right.clone().slice_assign(
            [0..1, 0..2, 2..3, 0..5],
            low.right.clone().slice([0..1, 0..2, 2..3, 0..5]) + bump,
        );
        let perturbed = scam.forward(StereoPair::new(low.left.clone(), right));

        let untouched = |t: Tensor<TestBackend, 4>| t.slice([0..1, 0..2, 0..2, 0..5]);
        let diff = (untouched(out.left.clone()) - untouched(perturbed.left.clone()))
            .abs()
            .max()
            .into_scalar();
        assert!(diff < 1e-6);

        let changed = (out.left.slice([0..1, 0..2, 2..3, 0..5])
            - perturbed.left.slice([0..1, 0..2, 2..3, 0..5]))
        .abs()
        .max()
        .into_scalar();
        assert!(changed > 0.0);
    }
}
