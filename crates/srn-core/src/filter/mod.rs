pub mod padding;
pub mod pixel_shuffle;
pub mod spectral;

pub use padding::{crop, pad_to_multiple, required_padding, PadInfo, PaddingMode};
pub use pixel_shuffle::pixel_shuffle;
pub use spectral::{
    BandSplit, FrequencyPair, FrequencySplitter, LowpassOperator, OperatorCache, SpectralSplitter,
};
