pub mod error;
pub mod pair;
pub mod filter;

pub use error::{RestoreError, Result};
pub use pair::{StereoPair, View};
pub use filter::{
    BandSplit, FrequencyPair, FrequencySplitter, OperatorCache, PadInfo, PaddingMode,
    SpectralSplitter,
};
