//! Search-space inspection CLI
//!
//! Prints token encodings, range tables and decoded architectures.

use clap::{Parser, Subcommand};
use colored::*;
use serde::Serialize;
use std::path::PathBuf;

use crate::error::Result;
use crate::graph::{GraphSummary, ShapeGraph};
use crate::nas::{SearchSpace, SearchSpaceConfig, StageDescriptor};

#[derive(Parser)]
#[command(name = "nas-space")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect token-encoded neural architecture search spaces")]
#[command(long_about = None)]
pub struct Cli {
    /// Registered search space
    #[arg(long, default_value = "MobileNetV2Space", global = true)]
    pub space: String,

    /// JSON config file; replaces the size flags when given
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Input spatial size
    #[arg(long, default_value = "224", global = true)]
    pub input_size: usize,

    /// Output spatial size (1 adds a classifier head)
    #[arg(long, default_value = "1", global = true)]
    pub output_size: usize,

    /// Number of resolution-halving stages, stem included
    #[arg(long, default_value = "6", global = true)]
    pub block_num: usize,

    /// Channel width multiplier
    #[arg(long, default_value = "1.0", global = true)]
    pub scale: f64,

    /// Classifier output classes
    #[arg(long, default_value = "1000", global = true)]
    pub class_dim: usize,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the reference token vector
    Tokens,

    /// Print the exclusive upper bound of every token position
    Ranges,

    /// Decode tokens and build the network symbolically
    Decode {
        /// Comma-separated tokens (reference encoding when omitted)
        #[arg(short, long, value_delimiter = ',')]
        tokens: Option<Vec<usize>>,

        /// Batch size of the input placeholder
        #[arg(long, default_value = "1")]
        batch: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Config from `--config` or from the size flags
    pub fn search_config(&self) -> Result<SearchSpaceConfig> {
        match &self.config {
            Some(path) => SearchSpaceConfig::from_json_file(path),
            None => {
                let config = SearchSpaceConfig::new(self.input_size, self.output_size, self.block_num)
                    .with_scale(self.scale)
                    .with_class_dim(self.class_dim);
                config.validate()?;
                Ok(config)
            }
        }
    }
}

/// Result of decoding and building one token vector
#[derive(Debug, Clone, Serialize)]
pub struct DecodeReport {
    pub space: String,
    pub tokens: Vec<usize>,
    pub stages: Vec<StageDescriptor>,
    pub num_downsamples: usize,
    pub summary: GraphSummary,
}

/// Decode `tokens` and build the network on a [`ShapeGraph`]
pub fn decode_report(
    space: &dyn SearchSpace,
    tokens: Option<&[usize]>,
    batch: usize,
) -> Result<DecodeReport> {
    let tokens = match tokens {
        Some(tokens) => tokens.to_vec(),
        None => space.init_tokens(),
    };
    let arch = space.token2arch(Some(tokens.as_slice()))?;

    let input_size = arch.config().input_size;
    let mut graph = ShapeGraph::new();
    let input = graph.input(&[batch, 3, input_size, input_size]);
    let output = arch.build(&mut graph, &input)?;

    Ok(DecodeReport {
        space: space.name().to_string(),
        tokens,
        stages: arch.stages().to_vec(),
        num_downsamples: arch.num_downsamples(),
        summary: graph.summary(&output),
    })
}

pub fn cmd_tokens(space: &dyn SearchSpace) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(&space.init_tokens())?);
    Ok(())
}

pub fn cmd_ranges(space: &dyn SearchSpace) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(&space.range_table())?);
    Ok(())
}

pub fn cmd_decode(
    space: &dyn SearchSpace,
    tokens: Option<&[usize]>,
    batch: usize,
    json: bool,
) -> anyhow::Result<()> {
    let report = decode_report(space, tokens, batch)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  {}", report.space.white().bold());
    println!("  {}", "─".repeat(44).dimmed());
    println!(
        "  {:<7} {:>3} {:>6} {:>3} {:>3} {:>3}",
        "stage".dimmed(),
        "t".dimmed(),
        "c".dimmed(),
        "n".dimmed(),
        "s".dimmed(),
        "k".dimmed()
    );
    for (i, stage) in report.stages.iter().enumerate() {
        println!(
            "  {:<7} {:>3} {:>6} {:>3} {:>3} {:>3}",
            format!("conv{}", i + 2),
            stage.expansion,
            stage.channels,
            stage.repeat,
            stage.stride,
            stage.kernel_size
        );
    }
    println!("  {}", "─".repeat(44).dimmed());
    println!("  {:<12} {}", "downsamples".dimmed(), report.num_downsamples);
    println!("  {:<12} {:?}", "output".dimmed(), report.summary.output_shape);
    println!("  {:<12} {}", "params".dimmed(), report.summary.num_params);
    println!("  {:<12} {}", "MACs".dimmed(), report.summary.flops);
    println!();
    Ok(())
}
