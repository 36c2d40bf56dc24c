//! Symbolic graph builder
//!
//! Records every layer with its inferred output shape, creates named parameter
//! slots and accumulates a per-sample multiply-accumulate estimate.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::ops::{same_output_size, Activation, ConvBn, FullyConnected};
use super::params::{checked_product, ParamStore};
use super::GraphBuilder;
use crate::error::{NasError, Result};

/// Tensor handle produced by [`ShapeGraph`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolicTensor {
    /// Position of the producing op in the op log
    pub id: usize,
    pub shape: Vec<usize>,
}

/// Recorded layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphOp {
    Input {
        shape: Vec<usize>,
    },
    ConvBn {
        name: String,
        input: usize,
        filters: usize,
        filter_size: usize,
        stride: usize,
        groups: usize,
        act: Option<Activation>,
        shape: Vec<usize>,
    },
    Add {
        x: usize,
        y: usize,
        shape: Vec<usize>,
    },
    Fc {
        weight_name: String,
        input: usize,
        shape: Vec<usize>,
    },
}

/// Aggregate cost of a built graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub num_ops: usize,
    /// Named parameter tensors
    pub num_param_tensors: usize,
    /// Scalar parameters, batch-norm statistics included
    pub num_params: usize,
    /// Multiply-accumulates for a single sample
    pub flops: u64,
    pub output_shape: Vec<usize>,
}

/// Symbolic [`GraphBuilder`]
#[derive(Debug, Clone, Default)]
pub struct ShapeGraph {
    ops: Vec<GraphOp>,
    params: ParamStore<()>,
    flops: u64,
}

impl ShapeGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an input placeholder
    pub fn input(&mut self, shape: &[usize]) -> SymbolicTensor {
        self.push(GraphOp::Input {
            shape: shape.to_vec(),
        })
    }

    pub fn ops(&self) -> &[GraphOp] {
        &self.ops
    }

    pub fn params(&self) -> &ParamStore<()> {
        &self.params
    }

    pub fn num_params(&self) -> usize {
        self.params.num_elements()
    }

    pub fn flops(&self) -> u64 {
        self.flops
    }

    /// Summarize the graph as seen from `output`
    pub fn summary(&self, output: &SymbolicTensor) -> GraphSummary {
        GraphSummary {
            num_ops: self.ops.len(),
            num_param_tensors: self.params.len(),
            num_params: self.params.num_elements(),
            flops: self.flops,
            output_shape: output.shape.clone(),
        }
    }

    fn push(&mut self, op: GraphOp) -> SymbolicTensor {
        let shape = match &op {
            GraphOp::Input { shape }
            | GraphOp::ConvBn { shape, .. }
            | GraphOp::Add { shape, .. }
            | GraphOp::Fc { shape, .. } => shape.clone(),
        };
        self.ops.push(op);
        SymbolicTensor {
            id: self.ops.len() - 1,
            shape,
        }
    }

    /// Add the multiply-accumulates of one layer, the product of `factors`
    fn add_cost(&mut self, layer: &str, factors: &[usize]) -> Result<()> {
        let total = factors
            .iter()
            .try_fold(1u64, |acc, &f| acc.checked_mul(f as u64))
            .and_then(|cost| self.flops.checked_add(cost));

        match total {
            Some(total) => {
                self.flops = total;
                Ok(())
            }
            None => Err(NasError::InvalidParameter {
                name: layer.to_string(),
                value: format!("{:?}", factors),
                reason: "multiply-accumulate count overflows u64".to_string(),
            }),
        }
    }

    fn declare(&mut self, name: &str, shape: &[usize]) -> Result<()> {
        self.params.get_or_create(name, shape, |_| ())?;
        Ok(())
    }
}

impl GraphBuilder for ShapeGraph {
    type Tensor = SymbolicTensor;

    fn conv_bn(&mut self, input: &SymbolicTensor, conv: &ConvBn) -> Result<SymbolicTensor> {
        let [n, c, h, w] = match input.shape.as_slice() {
            &[n, c, h, w] => [n, c, h, w],
            other => {
                return Err(NasError::ShapeError {
                    expected: "4-D NCHW tensor".to_string(),
                    actual: format!("{:?}", other),
                })
            }
        };
        conv.validate(c)?;

        let oh = same_output_size(h, conv.stride);
        let ow = same_output_size(w, conv.stride);

        let bn_shape = [conv.num_filters];
        self.declare(&conv.weight_name(), &conv.weight_shape(c))?;
        self.declare(&conv.bn_scale_name(), &bn_shape)?;
        self.declare(&conv.bn_offset_name(), &bn_shape)?;
        self.declare(&conv.bn_mean_name(), &bn_shape)?;
        self.declare(&conv.bn_variance_name(), &bn_shape)?;

        let group_channels = c / conv.num_groups;
        self.add_cost(
            &conv.name,
            &[conv.num_filters, oh, ow, group_channels, conv.filter_size, conv.filter_size],
        )?;

        let out_shape = vec![n, conv.num_filters, oh, ow];
        trace!(name = %conv.name, in_shape = ?input.shape, out_shape = ?out_shape, "conv_bn");

        Ok(self.push(GraphOp::ConvBn {
            name: conv.name.clone(),
            input: input.id,
            filters: conv.num_filters,
            filter_size: conv.filter_size,
            stride: conv.stride,
            groups: conv.num_groups,
            act: conv.act,
            shape: out_shape,
        }))
    }

    fn elementwise_add(&mut self, x: &SymbolicTensor, y: &SymbolicTensor) -> Result<SymbolicTensor> {
        if x.shape != y.shape {
            return Err(NasError::ShapeError {
                expected: format!("{:?}", x.shape),
                actual: format!("{:?}", y.shape),
            });
        }
        Ok(self.push(GraphOp::Add {
            x: x.id,
            y: y.id,
            shape: x.shape.clone(),
        }))
    }

    fn fc(&mut self, input: &SymbolicTensor, fc: &FullyConnected) -> Result<SymbolicTensor> {
        let Some((&n, rest)) = input.shape.split_first() else {
            return Err(NasError::ShapeError {
                expected: "tensor with a batch dimension".to_string(),
                actual: "scalar".to_string(),
            });
        };
        let features = checked_product(rest).ok_or_else(|| NasError::ShapeError {
            expected: "flattenable tensor".to_string(),
            actual: format!("{:?}", input.shape),
        })?;

        self.declare(&fc.weight_name, &[features, fc.size])?;
        self.declare(&fc.bias_name, &[fc.size])?;
        self.add_cost(&fc.weight_name, &[features, fc.size])?;

        Ok(self.push(GraphOp::Fc {
            weight_name: fc.weight_name.clone(),
            input: input.id,
            shape: vec![n, fc.size],
        }))
    }

    fn shape(&self, tensor: &SymbolicTensor) -> Vec<usize> {
        tensor.shape.clone()
    }
}
