//! Per-pixel LayerNorm over the channel axis of an NCHW feature map.

use burn::nn::{LayerNorm, LayerNormConfig};
use burn::prelude::*;

/// Epsilon added to the variance in every normalisation.
pub const LAYER_NORM_EPS: f64 = 1e-6;

/// LayerNorm across channels at each spatial position.
#[derive(Module, Debug)]
pub struct LayerNorm2d<B: Backend> {
    pub norm: LayerNorm<B>,
}

impl<B: Backend> LayerNorm2d<B> {
    pub fn new(channels: usize, device: &B::Device) -> Self {
        Self {
            norm: LayerNormConfig::new(channels)
                .with_epsilon(LAYER_NORM_EPS)
                .init(device),
        }
    }

    /// `[B, C, H, W]` -> `[B, C, H, W]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        // LayerNorm expects channels last: [B, C, H, W] -> [B, H, W, C]
        let x = self.norm.forward(input.permute([0, 2, 3, 1]));
        x.permute([0, 3, 1, 2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_normalises_channels() {
        let device = Default::default();
        let norm = LayerNorm2d::<TestBackend>::new(4, &device);

        // One pixel with channel values 1..4, one with a constant.
        let x = Tensor::<TestBackend, 1>::from_floats(
            [1.0, 5.0, 2.0, 5.0, 3.0, 5.0, 4.0, 5.0],
            &device,
        )
        .reshape([1, 4, 1, 2]);
        let y = norm.forward(x);
        assert_eq!(y.dims(), [1, 4, 1, 2]);

        let mean = y.clone().mean_dim(1);
        assert!(mean.abs().max().into_scalar() < 1e-5);

        // The constant pixel maps to zero instead of NaN.
        let constant: Vec<f32> = y.slice([0..1, 0..4, 0..1, 1..2]).into_data().to_vec().unwrap();
        assert!(constant.iter().all(|v| v.abs() < 1e-5));
    }
}
