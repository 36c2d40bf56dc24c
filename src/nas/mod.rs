//! Neural Architecture Search (NAS) Module
//!
//! Token-encoded convolutional search spaces:
//! - [`SearchSpace`] interface consumed by NAS controllers
//! - [`MobileNetV2Space`] inverted-residual search space
//! - [`NetArch`] deferred network builder returned by decoding
//! - [`SearchSpaceRegistry`] name-keyed constructors

mod arch;
mod config;
mod mobilenet_v2;
mod search_space;

pub use arch::{
    inverted_residual_unit, invresi_blocks, scale_channels, select_stages, InvertedResidual,
    NetArch, StageDescriptor, MAX_BLOCK_NUM, STEM_CHANNELS,
};
pub use config::SearchSpaceConfig;
pub use mobilenet_v2::{MobileNetV2Space, NUM_STAGES, TOKEN_LEN};
pub use search_space::{SearchSpace, SearchSpaceFactory, SearchSpaceRegistry};
