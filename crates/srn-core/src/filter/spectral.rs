//! Low/high frequency band splitting.
//!
//! The reference operation is: orthonormal 2D DFT, shift the zero frequency to
//! the centre, keep a centred rectangular window, shift back, inverse DFT,
//! take the real part as the low band. The high band is whatever is left:
//!
//! ```text
//!   x ──► DFT ──► shift ──► ⊙ mask ──► unshift ──► IDFT ──► Re ──► low
//!   │                                                              │
//!   └──────────────────────────── x - low ──────────────────────────► high
//! ```
//!
//! Every step is linear and the window is a product of one window per axis,
//! so the whole chain collapses into two small complex matrices:
//!
//! ```text
//!   P_n = F_nᴴ · diag(mask_n) · F_n                (n × n, complex)
//!   low = Re(P_h)·X·Re(P_w)ᵀ − Im(P_h)·X·Im(P_w)ᵀ
//! ```
//!
//! `P_n` is built with `rustfft` on host memory; the products run as plain
//! tensor matmuls, so the split is differentiable on every backend. An
//! [`OperatorCache`] keeps each `P_n` after its first use so repeated
//! forward passes only pay for the upload.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use burn::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::error::{RestoreError, Result};

/// Low and high frequency bands of one feature map.
#[derive(Debug, Clone)]
pub struct FrequencyPair<B: Backend> {
    pub low: Tensor<B, 4>,
    pub high: Tensor<B, 4>,
}

impl<B: Backend> FrequencyPair<B> {
    /// Sum of the bands, which equals the source map.
    pub fn recombine(self) -> Tensor<B, 4> {
        self.low + self.high
    }
}

/// A way to split a `[B, C, H, W]` map into two bands that sum to the input.
pub trait BandSplit {
    fn split<B: Backend>(&self, x: Tensor<B, 4>) -> FrequencyPair<B>;

    /// Same as [`split`](BandSplit::split), reusing operators from `cache`.
    fn split_cached<B: Backend>(&self, x: Tensor<B, 4>, cache: &OperatorCache) -> FrequencyPair<B> {
        let _ = cache;
        self.split(x)
    }
}

type OperatorKey = (usize, usize, usize);

/// Low-pass operators memoised by `(n, start, end)`.
///
/// Clones share storage, so a cache owned by a module survives the module
/// clones made during training.
#[derive(Debug, Clone, Default)]
pub struct OperatorCache {
    operators: Arc<Mutex<HashMap<OperatorKey, Arc<LowpassOperator>>>>,
}

impl OperatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operator for an axis of length `n` keeping `[start, end)`, built on first request.
    pub fn get(&self, n: usize, start: usize, end: usize) -> Arc<LowpassOperator> {
        let mut operators = self.operators.lock().unwrap_or_else(PoisonError::into_inner);
        operators
            .entry((n, start, end))
            .or_insert_with(|| Arc::new(LowpassOperator::build(n, start, end)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.operators.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Centred-window spectral splitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralSplitter {
    /// Fraction of each spectral axis kept in the low band, in `[0, 1]`.
    pub cutoff_ratio: f64,
}

impl Default for SpectralSplitter {
    fn default() -> Self {
        Self { cutoff_ratio: 0.5 }
    }
}

impl SpectralSplitter {
    /// Create a splitter, rejecting ratios outside `[0, 1]`.
    pub fn new(cutoff_ratio: f64) -> Result<Self> {
        let splitter = Self { cutoff_ratio };
        splitter.validate()?;
        Ok(splitter)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.cutoff_ratio) {
            return Err(RestoreError::invalid_configuration(format!(
                "cutoff ratio must be in [0, 1], got {}",
                self.cutoff_ratio
            )));
        }
        Ok(())
    }

    /// Kept window `[start, end)` on the shifted axis of length `n`.
    pub fn passband(&self, n: usize) -> (usize, usize) {
        let half = (self.cutoff_ratio * n as f64 / 2.0).floor() as usize;
        let centre = n / 2;
        (centre.saturating_sub(half), (centre + half).min(n))
    }

    /// Complex low-pass operator for an axis of length `n`.
    pub fn lowpass_operator(&self, n: usize) -> LowpassOperator {
        let (start, end) = self.passband(n);
        LowpassOperator::build(n, start, end)
    }
}

impl BandSplit for SpectralSplitter {
    fn split<B: Backend>(&self, x: Tensor<B, 4>) -> FrequencyPair<B> {
        self.split_cached(x, &OperatorCache::new())
    }

    fn split_cached<B: Backend>(&self, x: Tensor<B, 4>, cache: &OperatorCache) -> FrequencyPair<B> {
        let [_, _, h, w] = x.dims();
        let (h0, h1) = self.passband(h);
        let (w0, w1) = self.passband(w);

        if h0 >= h1 || w0 >= w1 {
            let low = x.zeros_like();
            return FrequencyPair { low, high: x };
        }
        if (h0, h1) == (0, h) && (w0, w1) == (0, w) {
            let high = x.zeros_like();
            return FrequencyPair { low: x, high };
        }

        let device = x.device();
        let (ph_re, ph_im) = cache.get(h, h0, h1).to_tensors::<B>(&device);
        let (pw_re, pw_im) = cache.get(w, w0, w1).to_tensors::<B>(&device);

        // X·Pwᵀ along the width axis, then Ph·(…) along the height axis.
        let real_part = along_height(along_width(x.clone(), pw_re), ph_re);
        let imag_part = along_height(along_width(x.clone(), pw_im), ph_im);
        let low = real_part - imag_part;
        let high = x - low.clone();

        FrequencyPair { low, high }
    }
}

/// Available band splitters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FrequencySplitter {
    Spectral(SpectralSplitter),
}

impl Default for FrequencySplitter {
    fn default() -> Self {
        FrequencySplitter::Spectral(SpectralSplitter::default())
    }
}

impl FrequencySplitter {
    pub fn spectral(cutoff_ratio: f64) -> Result<Self> {
        Ok(FrequencySplitter::Spectral(SpectralSplitter::new(cutoff_ratio)?))
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            FrequencySplitter::Spectral(s) => s.validate(),
        }
    }

    pub fn cutoff_ratio(&self) -> f64 {
        match self {
            FrequencySplitter::Spectral(s) => s.cutoff_ratio,
        }
    }
}

impl BandSplit for FrequencySplitter {
    fn split<B: Backend>(&self, x: Tensor<B, 4>) -> FrequencyPair<B> {
        match self {
            FrequencySplitter::Spectral(s) => s.split(x),
        }
    }

    fn split_cached<B: Backend>(&self, x: Tensor<B, 4>, cache: &OperatorCache) -> FrequencyPair<B> {
        match self {
            FrequencySplitter::Spectral(s) => s.split_cached(x, cache),
        }
    }
}

/// `F_nᴴ · diag(mask) · F_n` for one axis, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct LowpassOperator {
    pub size: usize,
    pub real: Vec<f32>,
    pub imag: Vec<f32>,
}

impl LowpassOperator {
    /// Build the operator keeping shifted frequencies `[start, end)`.
    fn build(n: usize, start: usize, end: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);

        // Unshifted bin u sits at position (u + n/2) mod n after the shift.
        let keep: Vec<bool> = (0..n)
            .map(|u| {
                let k = (u + n / 2) % n;
                k >= start && k < end
            })
            .collect();

        let mut real = vec![0.0f32; n * n];
        let mut imag = vec![0.0f32; n * n];
        let scale = 1.0 / n as f64;

        for col in 0..n {
            let mut buf = vec![Complex::new(0.0f64, 0.0); n];
            buf[col] = Complex::new(1.0, 0.0);
            forward.process(&mut buf);
            for (v, &k) in buf.iter_mut().zip(keep.iter()) {
                if !k {
                    *v = Complex::new(0.0, 0.0);
                }
            }
            inverse.process(&mut buf);
            for (row, v) in buf.iter().enumerate() {
                real[row * n + col] = (v.re * scale) as f32;
                imag[row * n + col] = (v.im * scale) as f32;
            }
        }

        Self { size: n, real, imag }
    }

    /// Upload as `(Re, Im)` matrices of shape `[n, n]`.
    pub fn to_tensors<B: Backend>(&self, device: &B::Device) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let n = self.size;
        let re = Tensor::from_data(TensorData::new(self.real.clone(), [n, n]), device);
        let im = Tensor::from_data(TensorData::new(self.imag.clone(), [n, n]), device);
        (re, im)
    }
}

/// `X · opᵀ` on the last axis.
fn along_width<B: Backend>(x: Tensor<B, 4>, op: Tensor<B, 2>) -> Tensor<B, 4> {
    let [b, c, h, w] = x.dims();
    x.reshape([b * c * h, w])
        .matmul(op.transpose())
        .reshape([b, c, h, w])
}

/// `op · X` on the height axis.
fn along_height<B: Backend>(x: Tensor<B, 4>, op: Tensor<B, 2>) -> Tensor<B, 4> {
    along_width(x.swap_dims(2, 3), op).swap_dims(2, 3)
}
