//! Graph-building backends
//!
//! Decoded architectures are materialized through the [`GraphBuilder`] trait:
//! - [`ShapeGraph`] - symbolic builder with shape inference and cost accounting
//! - [`EagerGraph`] - `ndarray` executor that runs the network on real data

mod eager;
mod ops;
mod params;
mod shape;

pub use eager::EagerGraph;
pub use ops::{same_output_size, same_padding_before, Activation, ConvBn, FullyConnected};
pub use params::{ParamSlot, ParamStore};
pub use shape::{GraphOp, GraphSummary, ShapeGraph, SymbolicTensor};

use crate::error::Result;

/// Tensor/graph framework seam used by decoded architectures.
///
/// Tensors are laid out NCHW until a fully connected layer flattens them.
pub trait GraphBuilder {
    /// Handle to a tensor produced by this builder
    type Tensor: Clone;

    /// Convolution + batch normalization + optional activation
    fn conv_bn(&mut self, input: &Self::Tensor, conv: &ConvBn) -> Result<Self::Tensor>;

    /// Elementwise sum of two tensors of identical shape
    fn elementwise_add(&mut self, x: &Self::Tensor, y: &Self::Tensor) -> Result<Self::Tensor>;

    /// Fully connected layer
    fn fc(&mut self, input: &Self::Tensor, fc: &FullyConnected) -> Result<Self::Tensor>;

    /// Shape of a tensor
    fn shape(&self, tensor: &Self::Tensor) -> Vec<usize>;

    /// Height of an NCHW tensor (1 for flattened tensors)
    fn spatial_size(&self, tensor: &Self::Tensor) -> usize {
        self.shape(tensor).get(2).copied().unwrap_or(1)
    }

    /// Channel count of an NCHW tensor
    fn channels(&self, tensor: &Self::Tensor) -> usize {
        self.shape(tensor).get(1).copied().unwrap_or(0)
    }
}
