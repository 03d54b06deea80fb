//! Detail-enhanced convolution (DEConv).
//!
//! Five parallel 3x3 branches whose kernels are folded into a single
//! convolution on every forward pass:
//!
//! ```text
//!  branch       learned weights    effective 3x3 kernel (taps 0..8, row-major)
//!  ───────────  ─────────────────  ──────────────────────────────────────────────
//!  central      w  [O, I, 3, 3]    w, with tap 4 replaced by w4 - Σ w
//!  horizontal   t  [O, I, 3]       t in column 0, -t in column 2
//!  vertical     t  [O, I, 3]       t in row 0, -t in row 2
//!  angular      w  [O, I, 3, 3]    w - θ·w[3, 0, 1, 6, 4, 2, 7, 8, 5]
//!  standard     w  [O, I, 3, 3]    w
//! ```
//!
//! Each difference operator is linear in the learned taps, so it is applied
//! as a right-multiplication by a small tap matrix (`[9, 9]` or `[3, 9]`).
//! Biases of all branches are summed.

use burn::module::Ignored;
use burn::nn::conv::{Conv1d, Conv1dConfig, Conv2d, Conv2dConfig};
use burn::nn::{PaddingConfig1d, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::module::conv2d;
use burn::tensor::ops::ConvOptions;

const TAPS: usize = 9;
const ANGULAR_PERMUTATION: [usize; TAPS] = [3, 0, 1, 6, 4, 2, 7, 8, 5];
const CENTRE_TAP: usize = 4;

/// `[9, 9]` matrix mapping learned taps to central-difference taps.
fn central_difference_matrix() -> Vec<f32> {
    let mut m = vec![0.0f32; TAPS * TAPS];
    for k in 0..TAPS {
        m[k * TAPS + k] = 1.0;
        m[k * TAPS + CENTRE_TAP] -= 1.0;
    }
    m
}

/// `[9, 9]` matrix mapping learned taps to angular-difference taps.
fn angular_difference_matrix(theta: f32) -> Vec<f32> {
    let mut m = vec![0.0f32; TAPS * TAPS];
    for (j, &src) in ANGULAR_PERMUTATION.iter().enumerate() {
        m[j * TAPS + j] += 1.0;
        m[src * TAPS + j] -= theta;
    }
    m
}

/// `[3, 9]` matrix placing three taps at `positive` and their negation at `negative`.
fn line_difference_matrix(positive: [usize; 3], negative: [usize; 3]) -> Vec<f32> {
    let mut m = vec![0.0f32; 3 * TAPS];
    for t in 0..3 {
        m[t * TAPS + positive[t]] = 1.0;
        m[t * TAPS + negative[t]] = -1.0;
    }
    m
}

fn horizontal_difference_matrix() -> Vec<f32> {
    line_difference_matrix([0, 3, 6], [2, 5, 8])
}

fn vertical_difference_matrix() -> Vec<f32> {
    line_difference_matrix([0, 1, 2], [6, 7, 8])
}

/// Right-multiply the flattened taps of `weight` (`[O, I, k]`) by a `[k, 9]` matrix.
fn apply_taps<B: Backend>(weight: Tensor<B, 3>, matrix: Vec<f32>) -> Tensor<B, 4> {
    let [o, i, k] = weight.dims();
    let device = weight.device();
    let matrix = Tensor::<B, 2>::from_data(TensorData::new(matrix, [k, TAPS]), &device);
    weight
        .reshape([o * i, k])
        .matmul(matrix)
        .reshape([o, i, 3, 3])
}

/// Configuration for [`DeConv`].
#[derive(Config, Debug, PartialEq)]
pub struct DeConvConfig {
    pub channels: usize,
    /// Weight of the permuted kernel in the angular branch
    #[config(default = "1.0")]
    pub theta: f64,
}

impl DeConvConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DeConv<B> {
        let c = self.channels;
        let square = || {
            Conv2dConfig::new([c, c], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };
        let line = || {
            Conv1dConfig::new(c, c, 3)
                .with_padding(PaddingConfig1d::Explicit(1))
                .init(device)
        };

        DeConv {
            central: square(),
            horizontal: line(),
            vertical: line(),
            angular: square(),
            standard: square(),
            theta: Ignored(self.theta),
        }
    }
}

#[derive(Module, Debug)]
pub struct DeConv<B: Backend> {
    pub central: Conv2d<B>,
    pub horizontal: Conv1d<B>,
    pub vertical: Conv1d<B>,
    pub angular: Conv2d<B>,
    pub standard: Conv2d<B>,
    theta: Ignored<f64>,
}

impl<B: Backend> DeConv<B> {
    /// Folded `(weight [O, I, 3, 3], bias [O])` of all five branches.
    pub fn reparameterize(&self) -> (Tensor<B, 4>, Option<Tensor<B, 1>>) {
        let flat = |conv: &Conv2d<B>| {
            let weight = conv.weight.val();
            let [o, i, _, _] = weight.dims();
            weight.reshape([o, i, TAPS])
        };

        let weight = apply_taps(flat(&self.central), central_difference_matrix())
            + apply_taps(self.horizontal.weight.val(), horizontal_difference_matrix())
            + apply_taps(self.vertical.weight.val(), vertical_difference_matrix())
            + apply_taps(flat(&self.angular), angular_difference_matrix(*self.theta as f32))
            + self.standard.weight.val();

        let biases = [
            self.central.bias.as_ref(),
            self.horizontal.bias.as_ref(),
            self.vertical.bias.as_ref(),
            self.angular.bias.as_ref(),
            self.standard.bias.as_ref(),
        ];
        let bias = biases
            .into_iter()
            .flatten()
            .map(|b| b.val())
            .reduce(|acc, b| acc + b);

        (weight, bias)
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let (weight, bias) = self.reparameterize();
        conv2d(input, weight, bias, ConvOptions::new([1, 1], [1, 1], [1, 1], 1))
    }
}
