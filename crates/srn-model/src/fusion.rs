//! Frequency-aware stereo fusion block.
//!
//! ```text
//!   X_l ─► split ─► (L_l, H_l) ─┐          ┌─► H_l' ─┐
//!                                ├─ align ──┤         ├─► merge ─► X_l'
//!   X_r ─► split ─► (L_r, H_r) ─┤          └─► H_r' ─┤
//!                                └─ SCAM ───► L_l', L_r'┴─► merge ─► X_r'
//! ```
//!
//! This is the only place where the two views exchange information.

use burn::module::Ignored;
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use srn_core::filter::{BandSplit, FrequencyPair, FrequencySplitter, OperatorCache};
use srn_core::StereoPair;

use crate::aligner::CrossViewAligner;
use crate::scam::Scam;

/// How the processed bands are recombined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BandMerge {
    #[default]
    Sum,
}

impl BandMerge {
    pub fn merge<B: Backend>(&self, bands: FrequencyPair<B>) -> Tensor<B, 4> {
        match self {
            BandMerge::Sum => bands.recombine(),
        }
    }
}

/// Fusion settings shared by every fusion stage.
#[derive(Config, Debug, PartialEq)]
pub struct FusionConfig {
    /// Band splitter
    #[config(default = "FrequencySplitter::default()")]
    pub splitter: FrequencySplitter,
    /// Band recombination
    #[config(default = "BandMerge::Sum")]
    pub merge: BandMerge,
}

impl FusionConfig {
    /// Spectral splitting with the given cutoff ratio.
    pub fn with_cutoff_ratio(self, cutoff_ratio: f64) -> srn_core::Result<Self> {
        Ok(self.with_splitter(FrequencySplitter::spectral(cutoff_ratio)?))
    }

    pub fn validate(&self) -> srn_core::Result<()> {
        self.splitter.validate()
    }
}

#[derive(Module, Debug)]
pub struct FusionBlock<B: Backend> {
    pub aligner: CrossViewAligner<B>,
    pub scam: Scam<B>,
    splitter: Ignored<FrequencySplitter>,
    merge: Ignored<BandMerge>,
    operators: Ignored<OperatorCache>,
}

impl<B: Backend> FusionBlock<B> {
    pub fn new(channels: usize, config: &FusionConfig, scale_init: f64, device: &B::Device) -> Self {
        Self {
            aligner: CrossViewAligner::new(channels, scale_init, device),
            scam: Scam::new(channels, scale_init, device),
            splitter: Ignored(config.splitter),
            merge: Ignored(config.merge),
            operators: Ignored(OperatorCache::new()),
        }
    }

    pub fn splitter(&self) -> &FrequencySplitter {
        &self.splitter
    }

    /// Band-split operators built so far, shared with every clone of this block.
    pub fn operators(&self) -> &OperatorCache {
        &self.operators
    }

    pub fn forward(&self, x: StereoPair<Tensor<B, 4>>) -> StereoPair<Tensor<B, 4>> {
        let bands = x.map(|view| self.splitter.split_cached(view, &self.operators));
        let (left, right) = bands.into_tuple();

        let high = self
            .aligner
            .forward(StereoPair::new(left.high, right.high));
        let low = self.scam.forward(StereoPair::new(left.low, right.low));

        low.zip(high)
            .map(|(low, high)| self.merge.merge(FrequencyPair { low, high }))
    }
}
