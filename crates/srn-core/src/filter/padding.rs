//! Padding to a stage-count multiple and the matching crop-back.
//!
//! The backbone halves the resolution once per encoder stage, so both views
//! are padded on the bottom/right edges until height and width are multiples
//! of `2^stages`. [`PadInfo`] remembers what was added so the output can be
//! cropped back to the caller's size.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{RestoreError, Result};

/// How padded pixels are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaddingMode {
    /// Mirror the interior without repeating the edge pixel.
    Reflect,
    /// Fill with zeros. Works for any input size.
    #[default]
    Zero,
}

/// Record of the padding applied to a feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadInfo {
    /// Height before padding.
    pub height: usize,
    /// Width before padding.
    pub width: usize,
    /// Rows appended at the bottom.
    pub pad_bottom: usize,
    /// Columns appended on the right.
    pub pad_right: usize,
}

impl PadInfo {
    pub fn padded_height(&self) -> usize {
        self.height + self.pad_bottom
    }

    pub fn padded_width(&self) -> usize {
        self.width + self.pad_right
    }

    /// True when nothing was added.
    pub fn is_noop(&self) -> bool {
        self.pad_bottom == 0 && self.pad_right == 0
    }
}

/// Amount needed to round `size` up to the next multiple of `multiple`.
pub fn required_padding(size: usize, multiple: usize) -> usize {
    (multiple - size % multiple) % multiple
}

/// Pad a `[B, C, H, W]` tensor so H and W become multiples of `multiple`.
///
/// # Errors
/// * `InvalidConfiguration` if `multiple` is zero.
/// * `DimensionMismatch` if a spatial dimension is empty, or if reflect
///   padding would need more rows/columns than the input has.
pub fn pad_to_multiple<B: Backend>(
    input: Tensor<B, 4>,
    multiple: usize,
    mode: PaddingMode,
) -> Result<(Tensor<B, 4>, PadInfo)> {
    if multiple == 0 {
        return Err(RestoreError::invalid_configuration(
            "padding multiple must be positive",
        ));
    }
    let [_, _, height, width] = input.dims();
    if height == 0 || width == 0 {
        return Err(RestoreError::dimension_mismatch(format!(
            "cannot pad an empty feature map of {}x{}",
            height, width
        )));
    }

    let info = PadInfo {
        height,
        width,
        pad_bottom: required_padding(height, multiple),
        pad_right: required_padding(width, multiple),
    };
    if info.is_noop() {
        return Ok((input, info));
    }

    let padded = match mode {
        PaddingMode::Zero => zero_pad(input, info.pad_bottom, info.pad_right),
        PaddingMode::Reflect => {
            if info.pad_bottom >= height || info.pad_right >= width {
                return Err(RestoreError::dimension_mismatch(format!(
                    "reflect padding of ({}, {}) does not fit a {}x{} input; \
                     it must be smaller than the padded dimension",
                    info.pad_bottom, info.pad_right, height, width
                )));
            }
            reflect_pad(input, info.pad_bottom, info.pad_right)
        }
    };

    Ok((padded, info))
}

/// Undo [`pad_to_multiple`] by slicing away the padded rows and columns.
pub fn crop<B: Backend>(input: Tensor<B, 4>, info: &PadInfo) -> Tensor<B, 4> {
    if info.is_noop() {
        return input;
    }
    let [b, c, _, _] = input.dims();
    input.slice([0..b, 0..c, 0..info.height, 0..info.width])
}

fn zero_pad<B: Backend>(x: Tensor<B, 4>, bottom: usize, right: usize) -> Tensor<B, 4> {
    let device = x.device();
    let mut x = x;

    if right > 0 {
        let [b, c, h, _] = x.dims();
        let padding = Tensor::zeros([b, c, h, right], &device);
        x = Tensor::cat(vec![x, padding], 3);
    }

    if bottom > 0 {
        let [b, c, _, w] = x.dims();
        let padding = Tensor::zeros([b, c, bottom, w], &device);
        x = Tensor::cat(vec![x, padding], 2);
    }

    x
}

fn reflect_pad<B: Backend>(x: Tensor<B, 4>, bottom: usize, right: usize) -> Tensor<B, 4> {
    let mut x = x;

    if right > 0 {
        let [b, c, h, w] = x.dims();
        // Columns w-1-right .. w-2, mirrored around the last column.
        let mirror = x.clone().slice([0..b, 0..c, 0..h, (w - 1 - right)..(w - 1)]).flip([3]);
        x = Tensor::cat(vec![x, mirror], 3);
    }

    if bottom > 0 {
        let [b, c, h, w] = x.dims();
        let mirror = x.clone().slice([0..b, 0..c, (h - 1 - bottom)..(h - 1), 0..w]).flip([2]);
        x = Tensor::cat(vec![x, mirror], 2);
    }

    x
}
