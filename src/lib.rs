//! NAS search spaces over convolutional networks
//!
//! This crate encodes MobileNetV2-style architectures as fixed-length integer
//! token vectors, declares the legal range of every token, and decodes token
//! vectors into deferred network builders for a NAS controller.
//!
//! # Modules
//!
//! - [`nas`] - Search-space trait, MobileNetV2 space, decoding and registry
//! - [`graph`] - Graph-builder seam with symbolic and `ndarray` backends
//! - [`cli`] - Command-line inspection of search spaces
//!
//! # Example
//!
//! ```
//! use nas_searchspace::prelude::*;
//!
//! let space = MobileNetV2Space::with_sizes(224, 7, 5)?;
//! let arch = space.token2arch(None)?;
//!
//! let mut graph = ShapeGraph::new();
//! let input = graph.input(&[1, 3, 224, 224]);
//! let output = arch.build(&mut graph, &input)?;
//! assert_eq!(graph.spatial_size(&output), 7);
//! # Ok::<(), nas_searchspace::NasError>(())
//! ```

// Core error handling
pub mod error;

// Search spaces
pub mod nas;

// Graph backends
pub mod graph;

// Services
pub mod cli;

pub use error::{NasError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{NasError, Result};

    // Search spaces
    pub use crate::nas::{
        MobileNetV2Space, NetArch, SearchSpace, SearchSpaceConfig, SearchSpaceRegistry,
        StageDescriptor,
    };

    // Graph backends
    pub use crate::graph::{EagerGraph, GraphBuilder, GraphSummary, ShapeGraph};
}
