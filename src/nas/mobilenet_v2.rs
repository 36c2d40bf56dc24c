//! MobileNetV2 search space
//!
//! Token layout (29 entries):
//! - `tokens[0]` indexes `HEAD_NUM`, the channel count of the leading stride-1 stage
//! - `tokens[1 + 4 * s .. 5 + 4 * s]` for stage `s` in `0..7` are
//!   `[expansion, channels, repeat, kernel_size]` indices into `MULTIPLY`,
//!   the stage's channel table, `REPEAT` and `K_SIZE`

use tracing::debug;

use super::arch::{select_stages, NetArch, StageDescriptor};
use super::config::SearchSpaceConfig;
use super::search_space::SearchSpace;
use crate::error::{NasError, Result};

/// Number of tokens in an encoding
pub const TOKEN_LEN: usize = 1 + 4 * NUM_STAGES;

/// Searchable stages after the head stage
pub const NUM_STAGES: usize = 7;

const HEAD_NUM: [usize; 7] = [3, 4, 8, 12, 16, 24, 32];
const FILTER_NUM1: [usize; 8] = [3, 4, 8, 12, 16, 24, 32, 48];
const FILTER_NUM2: [usize; 8] = [8, 12, 16, 24, 32, 48, 64, 80];
const FILTER_NUM3: [usize; 8] = [16, 24, 32, 48, 64, 80, 96, 128];
const FILTER_NUM4: [usize; 10] = [24, 32, 48, 64, 80, 96, 128, 144, 160, 192];
const FILTER_NUM5: [usize; 10] = [32, 48, 64, 80, 96, 128, 144, 160, 192, 224];
const FILTER_NUM6: [usize; 12] = [64, 80, 96, 128, 144, 160, 192, 224, 256, 320, 384, 512];
const K_SIZE: [usize; 2] = [3, 5];
const MULTIPLY: [usize; 5] = [1, 2, 3, 4, 6];
const REPEAT: [usize; 6] = [1, 2, 3, 4, 5, 6];

/// Fixed stride of each searchable stage
const STAGE_STRIDES: [usize; NUM_STAGES] = [2, 2, 2, 2, 1, 2, 1];

/// Channel table indexed by each searchable stage
const STAGE_CHANNELS: [&[usize]; NUM_STAGES] = [
    &FILTER_NUM1,
    &FILTER_NUM1,
    &FILTER_NUM2,
    &FILTER_NUM3,
    &FILTER_NUM4,
    &FILTER_NUM5,
    &FILTER_NUM6,
];

/// Encoding of the reference MobileNetV2
const CANONICAL_TOKENS: [usize; TOKEN_LEN] = [
    4, // 1, 16, 1
    4, 5, 1, 0, // 6, 24, 2
    4, 5, 1, 0, // 6, 24, 2
    4, 4, 2, 0, // 6, 32, 3
    4, 4, 3, 0, // 6, 64, 4
    4, 5, 2, 0, // 6, 96, 3
    4, 7, 2, 0, // 6, 160, 3
    4, 9, 0, 0, // 6, 320, 1
];

/// MobileNetV2 search space
#[derive(Debug, Clone)]
pub struct MobileNetV2Space {
    config: SearchSpaceConfig,
    range_table: Vec<usize>,
}

impl MobileNetV2Space {
    /// Registry name
    pub const NAME: &'static str = "MobileNetV2Space";

    /// Create a search space, validating the config
    pub fn new(config: SearchSpaceConfig) -> Result<Self> {
        config.validate()?;

        let mut range_table = Vec::with_capacity(TOKEN_LEN);
        range_table.push(HEAD_NUM.len());
        for channels in STAGE_CHANNELS {
            range_table.extend([MULTIPLY.len(), channels.len(), REPEAT.len(), K_SIZE.len()]);
        }

        Ok(Self { config, range_table })
    }

    /// Create a search space with default scale and class count
    pub fn with_sizes(input_size: usize, output_size: usize, block_num: usize) -> Result<Self> {
        Self::new(SearchSpaceConfig::new(input_size, output_size, block_num))
    }

    pub fn config(&self) -> &SearchSpaceConfig {
        &self.config
    }

    /// All eight candidate stages encoded by `tokens`, before truncation
    pub fn decode_candidates(&self, tokens: &[usize]) -> Result<Vec<StageDescriptor>> {
        if tokens.len() != TOKEN_LEN {
            return Err(NasError::TokenLength {
                expected: TOKEN_LEN,
                actual: tokens.len(),
            });
        }

        let pick = |position: usize, table: &[usize]| -> Result<usize> {
            let value = tokens[position];
            table.get(value).copied().ok_or(NasError::TokenOutOfRange {
                position,
                value,
                bound: table.len(),
            })
        };

        let mut candidates = Vec::with_capacity(1 + NUM_STAGES);
        candidates.push(StageDescriptor::new(1, pick(0, &HEAD_NUM[..])?, 1, 1, 3));

        for (stage, (channels, stride)) in STAGE_CHANNELS.into_iter().zip(STAGE_STRIDES).enumerate() {
            let base = 1 + 4 * stage;
            candidates.push(StageDescriptor::new(
                pick(base, &MULTIPLY[..])?,
                pick(base + 1, channels)?,
                pick(base + 2, &REPEAT[..])?,
                stride,
                pick(base + 3, &K_SIZE[..])?,
            ));
        }
        Ok(candidates)
    }
}

impl SearchSpace for MobileNetV2Space {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn init_tokens(&self) -> Vec<usize> {
        CANONICAL_TOKENS.to_vec()
    }

    fn range_table(&self) -> Vec<usize> {
        self.range_table.clone()
    }

    fn token2arch(&self, tokens: Option<&[usize]>) -> Result<NetArch> {
        let candidates = match tokens {
            Some(tokens) => self.decode_candidates(tokens)?,
            None => self.decode_candidates(&CANONICAL_TOKENS)?,
        };

        let stages = select_stages(&candidates, self.config.block_num)?;
        debug!(
            input_size = self.config.input_size,
            output_size = self.config.output_size,
            block_num = self.config.block_num,
            stages = stages.len(),
            "decoded MobileNetV2 tokens"
        );
        Ok(NetArch::new(stages, self.config.clone()))
    }
}
