//! Named parameter storage shared by graph builders

use std::collections::HashMap;

use crate::error::{NasError, Result};

/// Product of `dims`, or `None` when it overflows `usize`
pub(crate) fn checked_product(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// One named parameter
#[derive(Debug, Clone)]
pub struct ParamSlot<V> {
    pub name: String,
    pub shape: Vec<usize>,
    pub value: V,
}

impl<V> ParamSlot<V> {
    /// Number of scalar elements
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Parameters keyed by name, kept in creation order.
///
/// Requesting an existing name with the same shape returns the existing slot
/// (the parameter is shared); a different shape is a [`NasError::ParamConflict`].
#[derive(Debug, Clone)]
pub struct ParamStore<V> {
    slots: Vec<ParamSlot<V>>,
    index: HashMap<String, usize>,
}

impl<V> Default for ParamStore<V> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V> ParamStore<V> {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a parameter, creating it with `init` if absent.
    ///
    /// Shapes whose element count does not fit an array allocation are rejected
    /// with [`NasError::InvalidParameter`] before `init` runs.
    pub fn get_or_create<F>(&mut self, name: &str, shape: &[usize], init: F) -> Result<&V>
    where
        F: FnOnce(&[usize]) -> V,
    {
        if let Some(&idx) = self.index.get(name) {
            let slot = &self.slots[idx];
            if slot.shape != shape {
                return Err(NasError::ParamConflict {
                    name: name.to_string(),
                    existing: slot.shape.clone(),
                    requested: shape.to_vec(),
                });
            }
            return Ok(&slot.value);
        }

        if checked_product(shape).map_or(true, |n| n > isize::MAX as usize) {
            return Err(NasError::InvalidParameter {
                name: name.to_string(),
                value: format!("{:?}", shape),
                reason: "element count overflows".to_string(),
            });
        }

        let value = init(shape);
        self.index.insert(name.to_string(), self.slots.len());
        self.slots.push(ParamSlot {
            name: name.to_string(),
            shape: shape.to_vec(),
            value,
        });
        Ok(&self.slots[self.slots.len() - 1].value)
    }

    pub fn get(&self, name: &str) -> Option<&V> {
        self.index.get(name).map(|&idx| &self.slots[idx].value)
    }

    pub fn shape(&self, name: &str) -> Option<&[usize]> {
        self.index.get(name).map(|&idx| self.slots[idx].shape.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of named parameters
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Total scalar elements across all parameters
    pub fn num_elements(&self) -> usize {
        self.slots
            .iter()
            .fold(0usize, |acc, slot| acc.saturating_add(slot.numel()))
    }

    /// Parameter names in creation order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamSlot<V>> {
        self.slots.iter()
    }
}
