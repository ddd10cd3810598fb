//! Immutable protocol catalogue

use std::collections::HashSet;

use super::{ProtocolDescriptor, ProtocolFlags};
use crate::error::RegistryError;

/// Ordered, read-only set of protocol descriptors with unique names
#[derive(Debug, Clone)]
pub struct ProtocolRegistry {
    items: Vec<ProtocolDescriptor>,
}

impl ProtocolRegistry {
    /// Build a registry, rejecting duplicate names
    pub fn new(items: Vec<ProtocolDescriptor>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if !seen.insert(item.name()) {
                return Err(RegistryError::DuplicateProtocol(item.name().to_string()));
            }
        }
        Ok(Self { items })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Descriptors in registration order
    pub fn iter(&self) -> impl Iterator<Item = &ProtocolDescriptor> {
        self.items.iter()
    }

    pub fn get_by_index(&self, index: usize) -> Option<&ProtocolDescriptor> {
        self.items.get(index)
    }

    /// Exact name lookup
    pub fn get(&self, name: &str) -> Option<&ProtocolDescriptor> {
        self.items.iter().find(|p| p.name() == name)
    }

    /// Descriptors carrying every flag in `flags`
    pub fn filtered(&self, flags: ProtocolFlags) -> impl Iterator<Item = &ProtocolDescriptor> {
        self.items.iter().filter(move |p| p.flags().contains(flags))
    }
}
