//! StereoRestorer - Shared-Weight Stereo U-Net
//!
//! # Architecture Overview
//!
//! ```text
//! (left, right) [B, 3, H, W]
//!          │ pad bottom/right to a multiple of 2^stages
//!          ▼
//!     intro 3x3 (shared)
//!          │
//!     ┌─────────┐
//!     │ Encoder │──► skips (per view)      NAF blocks ─► [fusion] ─► down
//!     └─────────┘
//!          │
//!     middle NAF blocks
//!          │
//!     ┌─────────┐
//!     │ Decoder │◄── skips, deepest first   up ─► + skip ─► NAF blocks
//!     └─────────┘
//!          │
//!     ending 3x3 (shared) + padded input
//!          │ crop back (configurable)
//!          ▼
//! (left', right') [B, 3, H, W]
//! ```
//!
//! Both views run through the same weights; they only interact inside the
//! fusion blocks of the selected encoder stages.

use burn::module::Ignored;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{Initializer, PaddingConfig2d};
use burn::prelude::*;
use srn_core::filter::{crop, pad_to_multiple, PaddingMode};
use srn_core::{RestoreError, StereoPair};
use tracing::debug;

use crate::decoder::DecoderStage;
use crate::encoder::{EncoderStage, EncoderStageConfig};
use crate::fusion::FusionConfig;
use crate::naf_block::{conv3x3, forward_blocks, NafBlock, NafBlockConfig};

/// Configuration for the stereo restoration network
#[derive(Config, Debug, PartialEq)]
pub struct StereoRestorerConfig {
    /// Image channels (3 for RGB)
    #[config(default = "3")]
    pub img_channels: usize,
    /// Feature channels after the intro conv
    #[config(default = "16")]
    pub width: usize,
    /// NAF blocks at the lowest resolution
    #[config(default = "1")]
    pub middle_blocks: usize,
    /// NAF blocks per encoder stage; its length is the number of stages
    #[config(default = "vec![1, 1, 1, 1]")]
    pub encoder_blocks: Vec<usize>,
    /// NAF blocks per decoder stage, deepest first
    #[config(default = "vec![1, 1, 1, 1]")]
    pub decoder_blocks: Vec<usize>,
    /// Encoder stages followed by a fusion block (all stages if unset)
    pub fusion_stages: Option<Vec<usize>>,
    /// Fusion block settings
    #[config(default = "FusionConfig::new()")]
    pub fusion: FusionConfig,
    /// NAF block settings
    #[config(default = "NafBlockConfig::new()")]
    pub naf: NafBlockConfig,
    /// Fill mode for the stage-multiple padding
    #[config(default = "PaddingMode::Zero")]
    pub padding: PaddingMode,
    /// Crop outputs back to the input size
    #[config(default = "true")]
    pub crop_to_input: bool,
    /// Initial value of every beta/gamma residual scale
    #[config(default = "0.0")]
    pub residual_scale_init: f64,
    /// Start the ending conv at zero so a fresh model is the identity
    #[config(default = "true")]
    pub zero_init_ending: bool,
}

impl StereoRestorerConfig {
    /// Three stages, one block each, width 16.
    pub fn lightweight() -> Self {
        Self::new()
            .with_width(16)
            .with_middle_blocks(1)
            .with_encoder_blocks(vec![1, 1, 1])
            .with_decoder_blocks(vec![1, 1, 1])
    }

    /// NAFNet width-32 block layout.
    pub fn standard() -> Self {
        Self::new()
            .with_width(32)
            .with_middle_blocks(12)
            .with_encoder_blocks(vec![2, 2, 4, 8])
            .with_decoder_blocks(vec![2, 2, 2, 2])
    }

    /// Layout used for stereo waterdrop removal.
    pub fn waterdrop() -> Self {
        Self::new()
            .with_width(32)
            .with_middle_blocks(2)
            .with_encoder_blocks(vec![2, 2, 2, 2])
            .with_decoder_blocks(vec![2, 2, 2, 2])
    }

    pub fn num_stages(&self) -> usize {
        self.encoder_blocks.len()
    }

    /// Spatial multiple required by the encoder.
    pub fn padder_size(&self) -> usize {
        1 << self.num_stages()
    }

    /// Resolved list of fusion stages.
    pub fn fusion_stage_indices(&self) -> Vec<usize> {
        match &self.fusion_stages {
            Some(stages) => stages.clone(),
            None => (0..self.num_stages()).collect(),
        }
    }

    /// Channels entering each encoder stage.
    pub fn stage_channels(&self) -> Vec<usize> {
        (0..self.num_stages()).map(|i| self.width << i).collect()
    }

    pub fn validate(&self) -> srn_core::Result<()> {
        if self.img_channels == 0 {
            return Err(RestoreError::invalid_configuration("img_channels must be positive"));
        }
        if self.width == 0 {
            return Err(RestoreError::invalid_configuration("width must be positive"));
        }
        if self.encoder_blocks.len() != self.decoder_blocks.len() {
            return Err(RestoreError::invalid_configuration(format!(
                "{} encoder stages but {} decoder stages",
                self.encoder_blocks.len(),
                self.decoder_blocks.len()
            )));
        }
        if let Some(bad) = self
            .fusion_stage_indices()
            .into_iter()
            .find(|&i| i >= self.num_stages())
        {
            return Err(RestoreError::invalid_configuration(format!(
                "fusion stage {} out of range for {} encoder stages",
                bad,
                self.num_stages()
            )));
        }
        for (name, expand) in [("dw_expand", self.naf.dw_expand), ("ffn_expand", self.naf.ffn_expand)] {
            if expand == 0 || (self.width * expand) % 2 != 0 {
                return Err(RestoreError::invalid_configuration(format!(
                    "{} = {} must give an even, non-zero channel count at width {}",
                    name, expand, self.width
                )));
            }
        }
        if !(0.0..1.0).contains(&self.naf.dropout) {
            return Err(RestoreError::invalid_configuration(format!(
                "dropout must be in [0, 1), got {}",
                self.naf.dropout
            )));
        }
        self.fusion.validate()
    }

    /// Validate and build the network.
    pub fn init<B: Backend>(&self, device: &B::Device) -> srn_core::Result<StereoRestorer<B>> {
        self.validate()?;
        debug!(
            "Building StereoRestorer: width {}, {} stages, fusion at {:?}",
            self.width,
            self.num_stages(),
            self.fusion_stage_indices()
        );
        Ok(StereoRestorer::new(self, device))
    }
}

/// Shared-weight stereo restoration network.
#[derive(Module, Debug)]
pub struct StereoRestorer<B: Backend> {
    pub intro: Conv2d<B>,
    pub encoders: Vec<EncoderStage<B>>,
    pub middle: Vec<NafBlock<B>>,
    pub decoders: Vec<DecoderStage<B>>,
    pub ending: Conv2d<B>,
    config: Ignored<StereoRestorerConfig>,
}

impl<B: Backend> StereoRestorer<B> {
    /// Build the network. Call [`StereoRestorerConfig::validate`] first, or
    /// use [`StereoRestorerConfig::init`].
    pub fn new(config: &StereoRestorerConfig, device: &B::Device) -> Self {
        let scale = config.residual_scale_init;
        let fusion_stages = config.fusion_stage_indices();
        let channels = config.stage_channels();

        let encoders = channels
            .iter()
            .zip(&config.encoder_blocks)
            .enumerate()
            .map(|(i, (&c, &depth))| {
                let stage = EncoderStageConfig {
                    channels: c,
                    depth,
                    fusion: fusion_stages.contains(&i),
                };
                EncoderStage::new(&stage, &config.naf, &config.fusion, scale, device)
            })
            .collect();

        let bottom = config.width << config.num_stages();
        let middle = (0..config.middle_blocks)
            .map(|_| NafBlock::new(bottom, &config.naf, scale, device))
            .collect();

        let decoders = config
            .decoder_blocks
            .iter()
            .enumerate()
            .map(|(i, &depth)| {
                let in_channels = bottom >> i;
                DecoderStage::new(in_channels, depth, &config.naf, scale, device)
            })
            .collect();

        let mut ending = Conv2dConfig::new([config.width, config.img_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1));
        if config.zero_init_ending {
            ending = ending.with_initializer(Initializer::Zeros);
        }

        Self {
            intro: conv3x3(config.img_channels, config.width, device),
            encoders,
            middle,
            decoders,
            ending: ending.init(device),
            config: Ignored(config.clone()),
        }
    }

    pub fn config(&self) -> &StereoRestorerConfig {
        &self.config
    }

    pub fn num_stages(&self) -> usize {
        self.encoders.len()
    }

    /// Spatial multiple inputs are padded to.
    pub fn padder_size(&self) -> usize {
        1 << self.num_stages()
    }

    /// Encoder stages carrying a fusion block.
    pub fn fusion_stages(&self) -> Vec<usize> {
        self.encoders
            .iter()
            .enumerate()
            .filter(|(_, stage)| stage.fusion.is_some())
            .map(|(i, _)| i)
            .collect()
    }

    fn check_inputs(&self, left: &Tensor<B, 4>, right: &Tensor<B, 4>) -> srn_core::Result<()> {
        let left_dims = left.dims();
        let right_dims = right.dims();
        if left_dims != right_dims {
            return Err(RestoreError::shape_mismatch(&left_dims, &right_dims));
        }
        let [_, channels, height, width] = left_dims;
        if channels != self.config.img_channels {
            return Err(RestoreError::dimension_mismatch(format!(
                "expected {} image channels, got {}",
                self.config.img_channels, channels
            )));
        }
        if height == 0 || width == 0 {
            return Err(RestoreError::dimension_mismatch(format!(
                "empty image of {}x{}",
                height, width
            )));
        }
        Ok(())
    }

    /// Restore a stereo pair of `[B, C, H, W]` images.
    ///
    /// # Errors
    /// * `ShapeMismatch` if the views differ in shape.
    /// * `DimensionMismatch` on a wrong channel count, an empty image, or
    ///   reflect padding wider than the image.
    pub fn restore(&self, left: Tensor<B, 4>, right: Tensor<B, 4>) -> srn_core::Result<StereoPair<Tensor<B, 4>>> {
        self.check_inputs(&left, &right)?;

        let multiple = self.padder_size();
        let mode = self.config.padding;
        let padded = StereoPair::new(left, right)
            .try_map(|view| pad_to_multiple(view, multiple, mode))?;
        let pad_info = padded.left.1;
        let inputs = padded.map(|(view, _)| view);

        let mut x = inputs.clone().map(|view| self.intro.forward(view));

        let mut skips = Vec::with_capacity(self.encoders.len());
        for encoder in &self.encoders {
            let (skip, down) = encoder.forward(x);
            skips.push(skip);
            x = down;
        }

        x = x.map(|view| forward_blocks(&self.middle, view));

        for (decoder, skip) in self.decoders.iter().zip(skips.into_iter().rev()) {
            x = decoder.forward(x, skip);
        }

        let out = x
            .zip(inputs)
            .map(|(view, input)| self.ending.forward(view) + input);

        Ok(if self.config.crop_to_input {
            out.map(|view| crop(view, &pad_info))
        } else {
            out
        })
    }

    /// Tuple form of [`restore`](Self::restore).
    pub fn forward(&self, left: Tensor<B, 4>, right: Tensor<B, 4>) -> srn_core::Result<(Tensor<B, 4>, Tensor<B, 4>)> {
        Ok(self.restore(left, right)?.into_tuple())
    }
}

/// Preset configurations
pub mod presets {
    use super::*;

    /// Small network for tests and CPU runs.
    pub fn lightweight() -> StereoRestorerConfig {
        StereoRestorerConfig::lightweight()
    }

    /// General restoration with a deep bottleneck.
    pub fn standard() -> StereoRestorerConfig {
        StereoRestorerConfig::standard()
    }

    /// Stereo waterdrop removal.
    pub fn waterdrop() -> StereoRestorerConfig {
        StereoRestorerConfig::waterdrop()
    }

    /// Look up a preset by name.
    pub fn by_name(name: &str) -> Option<StereoRestorerConfig> {
        match name {
            "lightweight" => Some(lightweight()),
            "standard" => Some(standard()),
            "waterdrop" => Some(waterdrop()),
            _ => None,
        }
    }

    pub const NAMES: [&str; 3] = ["lightweight", "standard", "waterdrop"];
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::module::Param;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn tiny() -> StereoRestorerConfig {
        StereoRestorerConfig::new()
            .with_width(4)
            .with_middle_blocks(1)
            .with_encoder_blocks(vec![1, 1])
            .with_decoder_blocks(vec![1, 1])
    }

    fn random(shape: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::random(shape, Distribution::Default, &Default::default())
    }

    fn max_diff(a: Tensor<TestBackend, 4>, b: Tensor<TestBackend, 4>) -> f32 {
        (a - b).abs().max().into_scalar()
    }

    #[test]
    fn test_config_defaults() {
        let config = StereoRestorerConfig::new();
        assert_eq!(config.img_channels, 3);
        assert_eq!(config.width, 16);
        assert_eq!(config.padding, PaddingMode::Zero);
        assert!(config.crop_to_input);
        assert!(config.zero_init_ending);
        assert_eq!(config.fusion_stage_indices(), vec![0, 1, 2, 3]);
        assert_eq!(config.padder_size(), 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mismatched = tiny().with_decoder_blocks(vec![1]);
        assert!(matches!(mismatched.validate(), Err(RestoreError::InvalidConfiguration(_))));

        let bad_fusion = tiny().with_fusion_stages(Some(vec![0, 5]));
        assert!(bad_fusion.validate().is_err());

        assert!(tiny().with_width(0).validate().is_err());
        assert!(tiny().with_img_channels(0).validate().is_err());
        assert!(tiny()
            .with_naf(NafBlockConfig::new().with_dw_expand(0))
            .validate()
            .is_err());

        let device = Default::default();
        assert!(tiny().with_width(0).init::<TestBackend>(&device).is_err());
    }

    #[test]
    fn test_presets() {
        for name in presets::NAMES {
            let config = presets::by_name(name).unwrap();
            assert!(config.validate().is_ok(), "{} preset invalid", name);
        }
        assert_eq!(presets::waterdrop().width, 32);
        assert_eq!(presets::waterdrop().num_stages(), 4);
        assert!(presets::by_name("unknown").is_none());
    }

    #[test]
    fn test_network_structure() {
        let device = Default::default();
        let config = tiny().with_fusion_stages(Some(vec![1]));
        let model = config.init::<TestBackend>(&device).unwrap();
        assert_eq!(model.num_stages(), 2);
        assert_eq!(model.padder_size(), 4);
        assert_eq!(model.fusion_stages(), vec![1]);
        assert_eq!(model.config().stage_channels(), vec![4, 8]);
    }

    #[test]
    fn test_shape_preserved_for_divisible_input() {
        let device = Default::default();
        let model = tiny()
            .with_residual_scale_init(0.1)
            .with_zero_init_ending(false)
            .init::<TestBackend>(&device)
            .unwrap();
        let out = model.restore(random([2, 3, 8, 12]), random([2, 3, 8, 12])).unwrap();
        assert_eq!(out.left.dims(), [2, 3, 8, 12]);
        assert_eq!(out.right.dims(), [2, 3, 8, 12]);
    }

    #[test]
    fn test_rejects_mismatched_views() {
        let device = Default::default();
        let model = tiny().init::<TestBackend>(&device).unwrap();

        let err = model.restore(random([1, 3, 8, 8]), random([1, 3, 8, 4])).unwrap_err();
        assert_eq!(err, RestoreError::shape_mismatch(&[1, 3, 8, 8], &[1, 3, 8, 4]));

        let err = model.restore(random([1, 1, 8, 8]), random([1, 1, 8, 8])).unwrap_err();
        assert!(matches!(err, RestoreError::DimensionMismatch(_)));
    }

    #[test]
    fn test_padding_matches_manual_pad_and_crop() {
        let device = Default::default();
        let model = tiny()
            .with_padding(PaddingMode::Zero)
            .with_residual_scale_init(0.1)
            .with_zero_init_ending(false)
            .init::<TestBackend>(&device)
            .unwrap();

        let left = random([1, 3, 6, 7]);
        let right = random([1, 3, 6, 7]);
        let auto = model.restore(left.clone(), right.clone()).unwrap();
        assert_eq!(auto.left.dims(), [1, 3, 6, 7]);

        let (left_p, info) = pad_to_multiple(left, 4, PaddingMode::Zero).unwrap();
        let (right_p, _) = pad_to_multiple(right, 4, PaddingMode::Zero).unwrap();
        let manual = model.restore(left_p, right_p).unwrap();
        assert_eq!(manual.left.dims(), [1, 3, 8, 8]);

        assert!(max_diff(auto.left, crop(manual.left, &info)) < 1e-5);
        assert!(max_diff(auto.right, crop(manual.right, &info)) < 1e-5);
    }

    #[test]
    fn test_crop_can_be_disabled() {
        let device = Default::default();
        let model = tiny()
            .with_crop_to_input(false)
            .init::<TestBackend>(&device)
            .unwrap();
        let out = model.restore(random([1, 3, 5, 6]), random([1, 3, 5, 6])).unwrap();
        assert_eq!(out.left.dims(), [1, 3, 8, 8]);
    }

    #[test]
    fn test_reflect_padding_too_wide_is_rejected() {
        let device = Default::default();
        let model = tiny()
            .with_padding(PaddingMode::Reflect)
            .init::<TestBackend>(&device)
            .unwrap();
        // 2 rows padded to 4 would need 2 mirrored rows from a 2-row image.
        let err = model.restore(random([1, 3, 2, 8]), random([1, 3, 2, 8])).unwrap_err();
        assert!(matches!(err, RestoreError::DimensionMismatch(_)));
    }

    #[test]
    fn test_default_padding_accepts_small_inputs() {
        let device = Default::default();
        assert_eq!(presets::waterdrop().padding, PaddingMode::Zero);

        // Four stages pad an 8x8 pair to 16x16, wider than reflection allows.
        let model = tiny()
            .with_width(2)
            .with_encoder_blocks(vec![1, 1, 1, 1])
            .with_decoder_blocks(vec![1, 1, 1, 1])
            .init::<TestBackend>(&device)
            .unwrap();
        let x = random([1, 3, 8, 8]);
        let out = model.restore(x.clone(), x.clone()).unwrap();
        assert_eq!(out.left.dims(), [1, 3, 8, 8]);
        assert_eq!(max_diff(out.left, x), 0.0);

        let tiny_input = random([1, 3, 2, 3]);
        let out = model.restore(tiny_input.clone(), tiny_input).unwrap();
        assert_eq!(out.right.dims(), [1, 3, 2, 3]);
    }

    /// Make every right-view module a copy of its left counterpart so the
    /// network treats both views the same way.
    fn mirror_views(model: StereoRestorer<TestBackend>) -> StereoRestorer<TestBackend> {
        let mut model = model;
        for stage in model.encoders.iter_mut() {
            if let Some(fusion) = stage.fusion.as_mut() {
                let aligner = &mut fusion.aligner;
                aligner.offset_right = aligner.offset_left.clone();
                aligner.deform_right = aligner.deform_left.clone();
                aligner.proj_right = aligner.proj_left.clone();
                let beta = Tensor::random(aligner.beta.val().dims(), Distribution::Default, &Default::default());
                aligner.beta = Param::from_tensor(beta.clone());
                aligner.gamma = Param::from_tensor(beta);

                // conv_down sees cat(l, r) for one order and cat(r, l) for the other.
                let w = aligner.conv_down.weight.val();
                let [o, i, kh, kw] = w.dims();
                let half = w.slice([0..o, 0..i / 2, 0..kh, 0..kw]);
                aligner.conv_down.weight = Param::from_tensor(Tensor::cat(vec![half.clone(), half], 1));

                let scam = &mut fusion.scam;
                scam.norm_right = scam.norm_left.clone();
                scam.query_right = scam.query_left.clone();
                scam.value_right = scam.value_left.clone();
                let beta = Tensor::random(scam.beta.val().dims(), Distribution::Default, &Default::default());
                scam.beta = Param::from_tensor(beta.clone());
                scam.gamma = Param::from_tensor(beta);
            }
        }
        model
    }

    #[test]
    fn test_swapping_views_swaps_outputs() {
        let device = Default::default();
        let model = tiny()
            .with_residual_scale_init(0.2)
            .with_zero_init_ending(false)
            .init::<TestBackend>(&device)
            .unwrap();
        let model = mirror_views(model);

        let a = random([1, 3, 8, 8]);
        let b = random([1, 3, 8, 8]);
        let forward = model.restore(a.clone(), b.clone()).unwrap();
        let swapped = model.restore(b, a).unwrap();

        assert!(max_diff(forward.left, swapped.right) < 1e-4);
        assert!(max_diff(forward.right, swapped.left) < 1e-4);
    }

    #[test]
    fn test_fresh_model_is_identity() {
        let device = Default::default();
        let model = tiny().init::<TestBackend>(&device).unwrap();
        let x = random([1, 3, 9, 10]);
        let out = model.restore(x.clone(), x.clone()).unwrap();
        assert_eq!(max_diff(out.left, x.clone()), 0.0);
        assert_eq!(max_diff(out.right, x), 0.0);
    }

    #[test]
    fn test_ending_initialisation_is_configurable() {
        let device = Default::default();
        let fresh = tiny().init::<TestBackend>(&device).unwrap();
        assert_eq!(fresh.ending.weight.val().abs().max().into_scalar(), 0.0);

        let random_init = tiny().with_zero_init_ending(false).init::<TestBackend>(&device).unwrap();
        assert!(random_init.ending.weight.val().abs().max().into_scalar() > 0.0);
    }
}
