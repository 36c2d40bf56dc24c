//! Layer specifications handed to graph builders

use serde::{Deserialize, Serialize};

use crate::error::{NasError, Result};

/// Activation applied after batch normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activation {
    /// ReLU clipped to [0, 6]
    Relu6,
}

impl Activation {
    /// Apply the activation to a scalar
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Relu6 => x.clamp(0.0, 6.0),
        }
    }
}

/// Spatial output size of a SAME-padded convolution along one axis: `ceil(input / stride)`
pub fn same_output_size(input: usize, stride: usize) -> usize {
    (input + stride - 1) / stride
}

/// SAME padding placed before the first element of one axis; an odd total puts
/// the extra row/column after
pub fn same_padding_before(input: usize, filter_size: usize, stride: usize) -> usize {
    let out = same_output_size(input, stride);
    if out == 0 {
        return 0;
    }
    let total = ((out - 1) * stride + filter_size).saturating_sub(input);
    total / 2
}

/// Convolution followed by batch normalization and an optional activation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvBn {
    /// Parameter name prefix
    pub name: String,
    /// Number of output channels
    pub num_filters: usize,
    /// Square kernel size
    pub filter_size: usize,
    /// Stride on both spatial axes, SAME padding
    pub stride: usize,
    /// Channel groups (equal to the channel count for depthwise)
    pub num_groups: usize,
    /// Activation after batch normalization
    pub act: Option<Activation>,
}

impl ConvBn {
    /// Create a 1-group, stride-1 convolution without activation
    pub fn new(name: impl Into<String>, num_filters: usize, filter_size: usize) -> Self {
        Self {
            name: name.into(),
            num_filters,
            filter_size,
            stride: 1,
            num_groups: 1,
            act: None,
        }
    }

    /// Set stride
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    /// Set channel groups
    pub fn with_groups(mut self, num_groups: usize) -> Self {
        self.num_groups = num_groups;
        self
    }

    /// Set activation
    pub fn with_act(mut self, act: Activation) -> Self {
        self.act = Some(act);
        self
    }

    pub fn weight_name(&self) -> String {
        format!("{}_weights", self.name)
    }

    pub fn bn_scale_name(&self) -> String {
        format!("{}_bn_scale", self.name)
    }

    pub fn bn_offset_name(&self) -> String {
        format!("{}_bn_offset", self.name)
    }

    pub fn bn_mean_name(&self) -> String {
        format!("{}_bn_mean", self.name)
    }

    pub fn bn_variance_name(&self) -> String {
        format!("{}_bn_variance", self.name)
    }

    /// Kernel shape `[filters, in_channels / groups, k, k]`
    pub fn weight_shape(&self, in_channels: usize) -> Vec<usize> {
        vec![
            self.num_filters,
            in_channels / self.num_groups.max(1),
            self.filter_size,
            self.filter_size,
        ]
    }

    /// Check the layer against the channel count it will be applied to
    pub fn validate(&self, in_channels: usize) -> Result<()> {
        let invalid = |name: &str, value: usize, reason: &str| NasError::InvalidParameter {
            name: format!("{}.{}", self.name, name),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        if self.num_filters == 0 {
            return Err(invalid("num_filters", 0, "must be positive"));
        }
        if self.filter_size == 0 {
            return Err(invalid("filter_size", 0, "must be positive"));
        }
        if self.stride == 0 {
            return Err(invalid("stride", 0, "must be positive"));
        }
        if self.num_groups == 0 {
            return Err(invalid("num_groups", 0, "must be positive"));
        }
        if in_channels % self.num_groups != 0 {
            return Err(invalid(
                "num_groups",
                self.num_groups,
                &format!("must divide the {} input channels", in_channels),
            ));
        }
        if self.num_filters % self.num_groups != 0 {
            return Err(invalid(
                "num_groups",
                self.num_groups,
                &format!("must divide the {} filters", self.num_filters),
            ));
        }
        Ok(())
    }
}

/// Fully connected layer over the flattened non-batch dimensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullyConnected {
    /// Output features
    pub size: usize,
    pub weight_name: String,
    pub bias_name: String,
}

impl FullyConnected {
    pub fn new(size: usize, weight_name: impl Into<String>, bias_name: impl Into<String>) -> Self {
        Self {
            size,
            weight_name: weight_name.into(),
            bias_name: bias_name.into(),
        }
    }
}
