//! Sub-pixel rearrangement used by the decoder upsampler.

use burn::prelude::*;

/// Rearrange `[B, C·r², H, W]` into `[B, C, H·r, W·r]`.
///
/// Output pixel `(h·r + i, w·r + j)` of channel `c` reads input channel
/// `c·r² + i·r + j` at `(h, w)`.
///
/// # Panics
/// If the channel count is not divisible by `r²`.
pub fn pixel_shuffle<B: Backend>(input: Tensor<B, 4>, factor: usize) -> Tensor<B, 4> {
    let [b, c, h, w] = input.dims();
    let r2 = factor * factor;
    assert!(
        c % r2 == 0,
        "pixel_shuffle: {} channels are not divisible by {}",
        c,
        r2
    );
    let out_c = c / r2;

    input
        .reshape([b, out_c, factor, factor, h, w])
        .permute([0, 1, 4, 2, 5, 3])
        .reshape([b, out_c, h * factor, w * factor])
}
