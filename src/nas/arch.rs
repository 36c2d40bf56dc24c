//! Decoded architectures and the inverted-residual network builder

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::config::SearchSpaceConfig;
use crate::error::{NasError, Result};
use crate::graph::{same_output_size, Activation, ConvBn, FullyConnected, GraphBuilder};

/// Exclusive upper bound on `block_num`
pub const MAX_BLOCK_NUM: usize = 7;

/// Output channels of the stem convolution before scaling
pub const STEM_CHANNELS: usize = 32;

const STEM_KERNEL: usize = 3;
const STEM_STRIDE: usize = 2;

/// One network stage: `repeat` inverted residual units sharing channels, kernel and stride
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageDescriptor {
    /// Expansion factor `t`
    pub expansion: usize,
    /// Output channels `c`
    pub channels: usize,
    /// Number of units `n`
    pub repeat: usize,
    /// Stride of the first unit `s`
    pub stride: usize,
    /// Depthwise kernel size `k`
    pub kernel_size: usize,
}

impl StageDescriptor {
    pub fn new(expansion: usize, channels: usize, repeat: usize, stride: usize, kernel_size: usize) -> Self {
        Self {
            expansion,
            channels,
            repeat,
            stride,
            kernel_size,
        }
    }

    /// Whether this stage halves the resolution
    pub fn downsamples(&self) -> bool {
        self.stride > 1
    }
}

/// Scale a channel count by the width multiplier, keeping at least one channel
pub fn scale_channels(channels: usize, scale: f64) -> usize {
    ((channels as f64 * scale).round() as usize).max(1)
}

/// Greedy truncation of the candidate stages under a downsampling budget.
///
/// Stride-1 stages are always kept. A stride-2 stage is kept while more than one
/// unit of budget remains (the stem consumes the last one); the first stride-2
/// stage that cannot be paid for ends the walk and everything after it is dropped.
pub fn select_stages(candidates: &[StageDescriptor], block_num: usize) -> Result<Vec<StageDescriptor>> {
    if block_num == 0 || block_num >= MAX_BLOCK_NUM {
        return Err(NasError::InvalidBlockNum {
            block_num,
            max: MAX_BLOCK_NUM,
        });
    }

    let mut budget = block_num;
    let mut selected = Vec::with_capacity(candidates.len());
    for stage in candidates {
        if !stage.downsamples() {
            selected.push(*stage);
        } else if budget > 1 {
            selected.push(*stage);
            budget -= 1;
        } else {
            break;
        }
    }

    debug!(
        block_num,
        candidates = candidates.len(),
        selected = selected.len(),
        "selected stages"
    );
    Ok(selected)
}

/// Deferred network description produced by a search space.
///
/// Holds the selected stages and the construction settings; nothing is built
/// until [`NetArch::build`] is called with a graph builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetArch {
    stages: Vec<StageDescriptor>,
    config: SearchSpaceConfig,
}

impl NetArch {
    pub fn new(stages: Vec<StageDescriptor>, config: SearchSpaceConfig) -> Self {
        Self { stages, config }
    }

    /// Selected stages, channel counts unscaled
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    pub fn config(&self) -> &SearchSpaceConfig {
        &self.config
    }

    /// Resolution halvings performed by the network, the stem included
    pub fn num_downsamples(&self) -> usize {
        1 + self.stages.iter().filter(|s| s.downsamples()).count()
    }

    /// Spatial size of the feature map before the head, for a given input size
    pub fn expected_output_size(&self, input_size: usize) -> usize {
        let stem = same_output_size(input_size, STEM_STRIDE);
        self.stages
            .iter()
            .fold(stem, |size, stage| same_output_size(size, stage.stride))
    }

    /// Materialize the network on `graph`, returning the output tensor
    pub fn build<G: GraphBuilder>(&self, graph: &mut G, input: &G::Tensor) -> Result<G::Tensor> {
        let scale = self.config.scale;
        let stem_channels = scale_channels(STEM_CHANNELS, scale);

        // all padding is SAME, so every stride-2 layer halves the resolution (rounding up)
        let stem = ConvBn::new("conv1_1", stem_channels, STEM_KERNEL)
            .with_stride(STEM_STRIDE)
            .with_act(Activation::Relu6);
        let mut x = graph.conv_bn(input, &stem)?;

        let mut in_channels = stem_channels;
        for (i, stage) in self.stages.iter().enumerate() {
            let scaled = StageDescriptor {
                channels: scale_channels(stage.channels, scale),
                ..*stage
            };
            x = invresi_blocks(graph, &x, in_channels, &scaled, &format!("conv{}", i + 2))?;
            in_channels = scaled.channels;
        }

        if self.config.output_size == 1 {
            let head = FullyConnected::new(self.config.class_dim, "fc10_weights", "fc10_offset");
            x = graph.fc(&x, &head)?;
        } else {
            let actual = graph.spatial_size(&x);
            if actual != self.config.output_size {
                return Err(NasError::OutputSizeMismatch {
                    input_size: self.config.input_size,
                    output_size: self.config.output_size,
                    block_num: self.config.block_num,
                    actual,
                });
            }
        }

        debug!(stages = self.stages.len(), out_shape = ?graph.shape(&x), "built network");
        Ok(x)
    }
}

/// Settings of one inverted residual unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvertedResidual {
    pub in_channels: usize,
    pub out_channels: usize,
    pub expansion: usize,
    pub stride: usize,
    pub kernel_size: usize,
    /// Add the unit input to its output; input and output shapes must match
    pub shortcut: bool,
}

impl InvertedResidual {
    /// Channels after the pointwise expansion
    pub fn expanded_channels(&self) -> Result<usize> {
        self.in_channels
            .checked_mul(self.expansion)
            .ok_or_else(|| NasError::InvalidParameter {
                name: "expanded_channels".to_string(),
                value: format!("{} x {}", self.in_channels, self.expansion),
                reason: "channel count overflows".to_string(),
            })
    }
}

/// Expand (1x1, relu6) -> depthwise (kxk, relu6) -> linear projection (1x1), plus
/// an optional residual add. Shortcut compatibility is left to the caller.
pub fn inverted_residual_unit<G: GraphBuilder>(
    graph: &mut G,
    input: &G::Tensor,
    unit: &InvertedResidual,
    name: &str,
) -> Result<G::Tensor> {
    let expanded = unit.expanded_channels()?;
    trace!(name, ?unit, expanded, "inverted residual unit");

    let expand = ConvBn::new(format!("{}_expand", name), expanded, 1).with_act(Activation::Relu6);
    let x = graph.conv_bn(input, &expand)?;

    let dwise = ConvBn::new(format!("{}_dwise", name), expanded, unit.kernel_size)
        .with_stride(unit.stride)
        .with_groups(expanded)
        .with_act(Activation::Relu6);
    let x = graph.conv_bn(&x, &dwise)?;

    let linear = ConvBn::new(format!("{}_linear", name), unit.out_channels, 1);
    let out = graph.conv_bn(&x, &linear)?;

    if unit.shortcut {
        graph.elementwise_add(input, &out)
    } else {
        Ok(out)
    }
}

/// Build `stage.repeat` units: the first at the stage stride without shortcut,
/// the rest at stride 1 with identity shortcuts. `stage.channels` must already be scaled.
pub fn invresi_blocks<G: GraphBuilder>(
    graph: &mut G,
    input: &G::Tensor,
    in_channels: usize,
    stage: &StageDescriptor,
    name: &str,
) -> Result<G::Tensor> {
    let first = InvertedResidual {
        in_channels,
        out_channels: stage.channels,
        expansion: stage.expansion,
        stride: stage.stride,
        kernel_size: stage.kernel_size,
        shortcut: false,
    };
    let mut out = inverted_residual_unit(graph, input, &first, &format!("{}_1", name))?;

    let repeated = InvertedResidual {
        in_channels: stage.channels,
        stride: 1,
        shortcut: true,
        ..first
    };
    for j in 1..stage.repeat {
        out = inverted_residual_unit(graph, &out, &repeated, &format!("{}_{}", name, j + 1))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphOp, ShapeGraph};

    fn candidates() -> Vec<StageDescriptor> {
        vec![
            StageDescriptor::new(1, 16, 1, 1, 3),
            StageDescriptor::new(6, 24, 2, 2, 3),
            StageDescriptor::new(6, 32, 3, 2, 3),
            StageDescriptor::new(6, 96, 3, 1, 3),
            StageDescriptor::new(6, 160, 3, 2, 3),
            StageDescriptor::new(6, 320, 1, 1, 3),
        ]
    }

    #[test]
    fn test_select_keeps_everything_with_enough_budget() {
        let selected = select_stages(&candidates(), 6).unwrap();
        assert_eq!(selected, candidates());
    }

    #[test]
    fn test_select_truncates_at_first_unaffordable_downsample() {
        let selected = select_stages(&candidates(), 3).unwrap();
        // two stride-2 stages paid for, the third stops the walk and drops the trailing stride-1 stage
        assert_eq!(selected.len(), 4);
        assert_eq!(selected.iter().filter(|s| s.downsamples()).count(), 2);
        assert_eq!(selected[3].channels, 96);
    }

    #[test]
    fn test_select_budget_one_keeps_leading_stride1_only() {
        let selected = select_stages(&candidates(), 1).unwrap();
        assert_eq!(selected, vec![StageDescriptor::new(1, 16, 1, 1, 3)]);
    }

    #[test]
    fn test_select_rejects_out_of_range_budget() {
        assert!(matches!(
            select_stages(&candidates(), 7),
            Err(NasError::InvalidBlockNum { block_num: 7, max: 7 })
        ));
        assert!(select_stages(&candidates(), 0).is_err());
    }

    #[test]
    fn test_scale_channels() {
        assert_eq!(scale_channels(32, 1.0), 32);
        assert_eq!(scale_channels(24, 0.5), 12);
        assert_eq!(scale_channels(3, 0.5), 2);
        assert_eq!(scale_channels(3, 0.1), 1);
    }

    #[test]
    fn test_unit_layers_and_names() {
        let mut graph = ShapeGraph::new();
        let x = graph.input(&[1, 8, 16, 16]);
        let unit = InvertedResidual {
            in_channels: 8,
            out_channels: 8,
            expansion: 6,
            stride: 1,
            kernel_size: 5,
            shortcut: true,
        };
        let y = inverted_residual_unit(&mut graph, &x, &unit, "conv3_2").unwrap();

        assert_eq!(y.shape, vec![1, 8, 16, 16]);
        assert_eq!(graph.params().shape("conv3_2_expand_weights"), Some(&[48, 8, 1, 1][..]));
        assert_eq!(graph.params().shape("conv3_2_dwise_weights"), Some(&[48, 1, 5, 5][..]));
        assert_eq!(graph.params().shape("conv3_2_linear_weights"), Some(&[8, 48, 1, 1][..]));
        assert!(matches!(graph.ops().last(), Some(GraphOp::Add { .. })));
    }

    #[test]
    fn test_expanded_channels_overflow() {
        let unit = InvertedResidual {
            in_channels: usize::MAX,
            out_channels: 8,
            expansion: 6,
            stride: 1,
            kernel_size: 3,
            shortcut: false,
        };
        assert!(matches!(
            unit.expanded_channels(),
            Err(NasError::InvalidParameter { .. })
        ));

        let mut graph = ShapeGraph::new();
        let x = graph.input(&[1, 8, 4, 4]);
        assert!(inverted_residual_unit(&mut graph, &x, &unit, "u").is_err());
    }

    #[test]
    fn test_unit_without_shortcut_has_no_add() {
        let mut graph = ShapeGraph::new();
        let x = graph.input(&[1, 8, 16, 16]);
        let unit = InvertedResidual {
            in_channels: 8,
            out_channels: 12,
            expansion: 1,
            stride: 2,
            kernel_size: 3,
            shortcut: false,
        };
        let y = inverted_residual_unit(&mut graph, &x, &unit, "u").unwrap();

        assert_eq!(y.shape, vec![1, 12, 8, 8]);
        assert!(!graph.ops().iter().any(|op| matches!(op, GraphOp::Add { .. })));
    }

    #[test]
    fn test_invresi_blocks_repeats_with_shortcuts() {
        let mut graph = ShapeGraph::new();
        let x = graph.input(&[1, 16, 32, 32]);
        let stage = StageDescriptor::new(6, 24, 3, 2, 3);
        let y = invresi_blocks(&mut graph, &x, 16, &stage, "conv3").unwrap();

        assert_eq!(y.shape, vec![1, 24, 16, 16]);
        let adds = graph
            .ops()
            .iter()
            .filter(|op| matches!(op, GraphOp::Add { .. }))
            .count();
        assert_eq!(adds, 2);
        assert_eq!(graph.params().shape("conv3_1_expand_weights"), Some(&[96, 16, 1, 1][..]));
        assert_eq!(graph.params().shape("conv3_3_expand_weights"), Some(&[144, 24, 1, 1][..]));
        assert!(!graph.params().contains("conv3_4_expand_weights"));
    }

    #[test]
    fn test_expected_output_size() {
        let arch = NetArch::new(candidates(), SearchSpaceConfig::new(224, 1, 4));
        assert_eq!(arch.num_downsamples(), 4);
        assert_eq!(arch.expected_output_size(224), 14);
        assert_eq!(arch.expected_output_size(30), 2);
    }

    #[test]
    fn test_build_checks_output_size() {
        let stages = vec![StageDescriptor::new(1, 16, 1, 1, 3), StageDescriptor::new(6, 24, 1, 2, 3)];

        let ok = NetArch::new(stages.clone(), SearchSpaceConfig::new(32, 8, 2));
        let mut graph = ShapeGraph::new();
        let x = graph.input(&[1, 3, 32, 32]);
        let y = ok.build(&mut graph, &x).unwrap();
        assert_eq!(y.shape, vec![1, 24, 8, 8]);

        let bad = NetArch::new(stages, SearchSpaceConfig::new(32, 4, 2));
        let mut graph = ShapeGraph::new();
        let x = graph.input(&[1, 3, 32, 32]);
        assert!(matches!(
            bad.build(&mut graph, &x),
            Err(NasError::OutputSizeMismatch { actual: 8, output_size: 4, .. })
        ));
    }
}
