//! NAS Search Space Definition
//!
//! The interface a NAS controller drives, and a name-keyed registry of
//! search-space constructors.

use std::collections::BTreeMap;

use super::arch::NetArch;
use super::config::SearchSpaceConfig;
use super::mobilenet_v2::MobileNetV2Space;
use crate::error::{NasError, Result};

/// A token-encoded space of network architectures.
///
/// A controller calls [`init_tokens`](SearchSpace::init_tokens) once to seed the
/// search, [`range_table`](SearchSpace::range_table) once to bound its sampling and
/// mutation, and [`token2arch`](SearchSpace::token2arch) for every candidate.
pub trait SearchSpace: Send + Sync {
    /// Registry name of the space
    fn name(&self) -> &'static str;

    /// Encoding of the reference architecture
    fn init_tokens(&self) -> Vec<usize>;

    /// Exclusive upper bound of each token position
    fn range_table(&self) -> Vec<usize>;

    /// Decode tokens (the reference encoding when `None`) into a buildable network
    fn token2arch(&self, tokens: Option<&[usize]>) -> Result<NetArch>;

    /// Check length and per-position ranges against [`range_table`](SearchSpace::range_table)
    fn check_tokens(&self, tokens: &[usize]) -> Result<()> {
        let table = self.range_table();
        if tokens.len() != table.len() {
            return Err(NasError::TokenLength {
                expected: table.len(),
                actual: tokens.len(),
            });
        }
        for (position, (&value, &bound)) in tokens.iter().zip(&table).enumerate() {
            if value >= bound {
                return Err(NasError::TokenOutOfRange {
                    position,
                    value,
                    bound,
                });
            }
        }
        Ok(())
    }
}

/// Constructor stored in a [`SearchSpaceRegistry`]
pub type SearchSpaceFactory = fn(SearchSpaceConfig) -> Result<Box<dyn SearchSpace>>;

/// Search spaces keyed by name
#[derive(Debug, Clone)]
pub struct SearchSpaceRegistry {
    factories: BTreeMap<String, SearchSpaceFactory>,
}

impl Default for SearchSpaceRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(MobileNetV2Space::NAME, |config| {
            Ok(Box::new(MobileNetV2Space::new(config)?))
        });
        registry
    }
}

impl SearchSpaceRegistry {
    /// Registry with the built-in spaces
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry without any spaces
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a constructor, replacing any previous one under the same name
    pub fn register(&mut self, name: impl Into<String>, factory: SearchSpaceFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Construct the space registered under `name`
    pub fn build(&self, name: &str, config: SearchSpaceConfig) -> Result<Box<dyn SearchSpace>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| NasError::UnknownSearchSpace(name.to_string()))?;
        factory(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_builds_mobilenet_v2() {
        let registry = SearchSpaceRegistry::new();
        let space = registry
            .build("MobileNetV2Space", SearchSpaceConfig::default())
            .unwrap();

        assert_eq!(space.name(), "MobileNetV2Space");
        assert_eq!(space.init_tokens().len(), 29);
    }

    #[test]
    fn test_registry_unknown_name() {
        let registry = SearchSpaceRegistry::new();
        let result = registry.build("ResNetSpace", SearchSpaceConfig::default());
        assert!(matches!(result, Err(NasError::UnknownSearchSpace(_))));
    }

    #[test]
    fn test_registry_propagates_config_errors() {
        let registry = SearchSpaceRegistry::new();
        let result = registry.build("MobileNetV2Space", SearchSpaceConfig::new(224, 1, 8));
        assert!(matches!(result, Err(NasError::InvalidBlockNum { .. })));
    }

    #[test]
    fn test_empty_registry_and_register() {
        let mut registry = SearchSpaceRegistry::empty();
        assert!(registry.names().is_empty());

        registry.register("mbv2", |config| Ok(Box::new(MobileNetV2Space::new(config)?)));
        assert!(registry.contains("mbv2"));
        assert_eq!(registry.names(), vec!["mbv2"]);
    }

    #[test]
    fn test_check_tokens() {
        let space = MobileNetV2Space::new(SearchSpaceConfig::default()).unwrap();
        assert!(space.check_tokens(&space.init_tokens()).is_ok());

        let mut tokens = space.init_tokens();
        tokens[4] = 2;
        assert!(matches!(
            space.check_tokens(&tokens),
            Err(NasError::TokenOutOfRange { position: 4, value: 2, bound: 2 })
        ));
        assert!(matches!(
            space.check_tokens(&tokens[..10]),
            Err(NasError::TokenLength { .. })
        ));
    }
}
