//! Pixel losses between a restored view and its ground truth.
//!
//! Every loss reduces `[B, C, H, W]` inputs to a single-element tensor and
//! is scaled by its `loss_weight`.

use std::f64::consts::LN_10;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// A differentiable distance between prediction and target.
pub trait PixelLoss<B: Backend>: Send + Sync {
    fn forward(&self, prediction: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Mean absolute error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct L1Loss {
    pub loss_weight: f64,
}

impl L1Loss {
    pub fn new(loss_weight: f64) -> Self {
        Self { loss_weight }
    }
}

impl<B: Backend> PixelLoss<B> for L1Loss {
    fn forward(&self, prediction: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        (prediction - target).abs().mean().mul_scalar(self.loss_weight)
    }

    fn name(&self) -> &'static str {
        "l1"
    }
}

/// Mean squared error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MseLoss {
    pub loss_weight: f64,
}

impl MseLoss {
    pub fn new(loss_weight: f64) -> Self {
        Self { loss_weight }
    }
}

impl<B: Backend> PixelLoss<B> for MseLoss {
    fn forward(&self, prediction: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        (prediction - target).powf_scalar(2.0).mean().mul_scalar(self.loss_weight)
    }

    fn name(&self) -> &'static str {
        "mse"
    }
}

/// Smooth L1 variant: `mean(sqrt(d² + eps²))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharbonnierLoss {
    pub loss_weight: f64,
    pub eps: f64,
}

impl CharbonnierLoss {
    pub const DEFAULT_EPS: f64 = 1e-3;

    pub fn new(loss_weight: f64) -> Self {
        Self {
            loss_weight,
            eps: Self::DEFAULT_EPS,
        }
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }
}

impl<B: Backend> PixelLoss<B> for CharbonnierLoss {
    fn forward(&self, prediction: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        (prediction - target)
            .powf_scalar(2.0)
            .add_scalar(self.eps * self.eps)
            .sqrt()
            .mean()
            .mul_scalar(self.loss_weight)
    }

    fn name(&self) -> &'static str {
        "charbonnier"
    }
}

/// Negative PSNR up to a constant: `10 / ln 10 · mean_b(log(mse_b + 1e-8))`.
///
/// The per-sample MSE is taken over channels and pixels before the log, so
/// the loss of a batch is the mean of its samples' losses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PsnrLoss {
    pub loss_weight: f64,
}

impl PsnrLoss {
    const EPS: f64 = 1e-8;

    pub fn new(loss_weight: f64) -> Self {
        Self { loss_weight }
    }
}

impl<B: Backend> PixelLoss<B> for PsnrLoss {
    fn forward(&self, prediction: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
        let [batch, _, _, _] = prediction.dims();
        let per_sample = (prediction - target)
            .powf_scalar(2.0)
            .reshape([batch as i32, -1])
            .mean_dim(1);
        per_sample
            .add_scalar(Self::EPS)
            .log()
            .mean()
            .mul_scalar(self.loss_weight * 10.0 / LN_10)
    }

    fn name(&self) -> &'static str {
        "psnr"
    }
}

/// Serializable choice of pixel loss.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PixelLossConfig {
    L1 { loss_weight: f64 },
    Mse { loss_weight: f64 },
    Charbonnier { loss_weight: f64, eps: f64 },
    Psnr { loss_weight: f64 },
}

impl Default for PixelLossConfig {
    fn default() -> Self {
        Self::L1 { loss_weight: 1.0 }
    }
}

impl PixelLossConfig {
    /// Names accepted by [`PixelLossConfig::from_name`].
    pub const NAMES: [&'static str; 4] = ["l1", "mse", "charbonnier", "psnr"];

    pub fn from_name(name: &str, loss_weight: f64) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "l1" => Some(Self::L1 { loss_weight }),
            "mse" | "l2" => Some(Self::Mse { loss_weight }),
            "charbonnier" => Some(Self::Charbonnier {
                loss_weight,
                eps: CharbonnierLoss::DEFAULT_EPS,
            }),
            "psnr" => Some(Self::Psnr { loss_weight }),
            _ => None,
        }
    }

    pub fn loss_weight(&self) -> f64 {
        match *self {
            Self::L1 { loss_weight }
            | Self::Mse { loss_weight }
            | Self::Charbonnier { loss_weight, .. }
            | Self::Psnr { loss_weight } => loss_weight,
        }
    }

    pub fn init<B: Backend>(&self) -> Box<dyn PixelLoss<B>> {
        match *self {
            Self::L1 { loss_weight } => Box::new(L1Loss::new(loss_weight)),
            Self::Mse { loss_weight } => Box::new(MseLoss::new(loss_weight)),
            Self::Charbonnier { loss_weight, eps } => {
                Box::new(CharbonnierLoss::new(loss_weight).with_eps(eps))
            }
            Self::Psnr { loss_weight } => Box::new(PsnrLoss::new(loss_weight)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn pair() -> (Tensor<TestBackend, 4>, Tensor<TestBackend, 4>) {
        let device = Default::default();
        let prediction = Tensor::from_data(TensorData::new(vec![0.0f32, 0.5, 1.0, 0.25], [1, 1, 2, 2]), &device);
        let target = Tensor::from_data(TensorData::new(vec![0.0f32, 0.0, 0.5, 0.75], [1, 1, 2, 2]), &device);
        (prediction, target)
    }

    fn value(loss: &dyn PixelLoss<TestBackend>) -> f64 {
        let (p, t) = pair();
        loss.forward(p, t).into_scalar() as f64
    }

    #[test]
    fn test_l1_and_mse() {
        // Differences: 0, 0.5, 0.5, -0.5
        assert!((value(&L1Loss::new(1.0)) - 0.375).abs() < 1e-6);
        assert!((value(&L1Loss::new(2.0)) - 0.75).abs() < 1e-6);
        assert!((value(&MseLoss::new(1.0)) - 0.1875).abs() < 1e-6);
    }

    #[test]
    fn test_charbonnier() {
        let eps = CharbonnierLoss::DEFAULT_EPS;
        let expected = (eps + 3.0 * (0.25 + eps * eps).sqrt()) / 4.0;
        assert!((value(&CharbonnierLoss::new(1.0)) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_psnr_loss() {
        let expected = 10.0 / LN_10 * (0.1875f64 + 1e-8).ln();
        assert!((value(&PsnrLoss::new(1.0)) - expected).abs() < 1e-4);

        // Identical inputs hit the epsilon floor: -80 dB.
        let (p, _) = pair();
        let floor = PixelLoss::<TestBackend>::forward(&PsnrLoss::new(1.0), p.clone(), p).into_scalar();
        assert!((floor as f64 + 80.0).abs() < 1e-2);
    }

    #[test]
    fn test_psnr_loss_averages_samples() {
        let device = Default::default();
        let prediction = Tensor::<TestBackend, 4>::zeros([2, 1, 1, 2], &device);
        let target = Tensor::from_data(TensorData::new(vec![0.1f32, 0.1, 1.0, 1.0], [2, 1, 1, 2]), &device);
        let loss = PixelLoss::<TestBackend>::forward(&PsnrLoss::new(1.0), prediction, target).into_scalar() as f64;
        let expected = 10.0 / LN_10 * ((0.01f64 + 1e-8).ln() + (1.0f64 + 1e-8).ln()) / 2.0;
        assert!((loss - expected).abs() < 1e-3);
    }

    #[test]
    fn test_config_from_name() {
        assert_eq!(PixelLossConfig::from_name("L1", 1.0), Some(PixelLossConfig::L1 { loss_weight: 1.0 }));
        assert_eq!(PixelLossConfig::from_name("l2", 0.5).map(|c| c.loss_weight()), Some(0.5));
        assert!(PixelLossConfig::from_name("ssim", 1.0).is_none());
        for name in PixelLossConfig::NAMES {
            let config = PixelLossConfig::from_name(name, 1.0).unwrap();
            assert_eq!(config.init::<TestBackend>().name(), name);
        }
    }

    #[test]
    fn test_config_serde() {
        let config = PixelLossConfig::Charbonnier { loss_weight: 1.0, eps: 1e-3 };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"type\":\"charbonnier\""));
        let back: PixelLossConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
