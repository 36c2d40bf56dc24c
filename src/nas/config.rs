//! Search-space configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::arch::MAX_BLOCK_NUM;
use crate::error::{NasError, Result};

/// Configuration shared by the convolutional search spaces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSpaceConfig {
    /// Spatial size (height = width) of the network input
    pub input_size: usize,
    /// Spatial size of the network output; 1 appends a classification head
    pub output_size: usize,
    /// Number of resolution-halving stages, the stem included
    pub block_num: usize,
    /// Channel width multiplier
    pub scale: f64,
    /// Output classes of the classification head
    pub class_dim: usize,
}

impl Default for SearchSpaceConfig {
    fn default() -> Self {
        Self {
            input_size: 224,
            output_size: 1,
            block_num: 6,
            scale: 1.0,
            class_dim: 1000,
        }
    }
}

impl SearchSpaceConfig {
    /// Create config from sizes and stage count
    pub fn new(input_size: usize, output_size: usize, block_num: usize) -> Self {
        Self {
            input_size,
            output_size,
            block_num,
            ..Self::default()
        }
    }

    /// Set channel width multiplier
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Set classifier output classes
    pub fn with_class_dim(mut self, class_dim: usize) -> Self {
        self.class_dim = class_dim;
        self
    }

    /// Validate parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.block_num == 0 || self.block_num >= MAX_BLOCK_NUM {
            return Err(NasError::InvalidBlockNum {
                block_num: self.block_num,
                max: MAX_BLOCK_NUM,
            });
        }
        if self.input_size == 0 {
            return Err(NasError::InvalidParameter {
                name: "input_size".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.output_size == 0 {
            return Err(NasError::InvalidParameter {
                name: "output_size".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(NasError::InvalidParameter {
                name: "scale".to_string(),
                value: self.scale.to_string(),
                reason: "must be a positive finite number".to_string(),
            });
        }
        if self.class_dim == 0 {
            return Err(NasError::InvalidParameter {
                name: "class_dim".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Parse and validate a JSON config
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
