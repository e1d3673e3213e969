//! Manager for property indices
//!
//! An index is keyed by an optional label and a property name. A keyless
//! (`label: None`) index spans every vertex and backs global lookups such as
//! the stable entity ID; labelled indices form the type-partitioned
//! secondary index.

use super::property_index::PropertyIndex;
use crate::graph::{Label, NodeId, PropertyValue};
use std::collections::HashMap;

/// Key for identifying a property index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyIndexKey {
    pub label: Option<Label>,
    pub property: String,
}

impl PropertyIndexKey {
    pub fn new(label: Option<&Label>, property: &str) -> Self {
        Self {
            label: label.cloned(),
            property: property.to_string(),
        }
    }
}

/// All property indices of one store.
///
/// Owned by value so a store snapshot carries its indices with it.
#[derive(Debug, Clone, Default)]
pub struct IndexManager {
    indices: HashMap<PropertyIndexKey, PropertyIndex>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index; returns false if it already existed
    pub fn create_index(&mut self, label: Option<Label>, property: impl Into<String>) -> bool {
        let key = PropertyIndexKey {
            label,
            property: property.into(),
        };
        if self.indices.contains_key(&key) {
            return false;
        }
        self.indices.insert(key, PropertyIndex::new());
        true
    }

    pub fn drop_index(&mut self, label: Option<&Label>, property: &str) -> bool {
        self.indices.remove(&PropertyIndexKey::new(label, property)).is_some()
    }

    pub fn has_index(&self, label: Option<&Label>, property: &str) -> bool {
        self.indices.contains_key(&PropertyIndexKey::new(label, property))
    }

    /// Mirror a property write into the labelled and the global index, if present
    pub fn index_insert(&mut self, label: &Label, property: &str, value: &PropertyValue, node_id: NodeId) {
        for key in Self::keys_for(label, property) {
            if let Some(index) = self.indices.get_mut(&key) {
                index.insert(value.clone(), node_id);
            }
        }
    }

    pub fn index_remove(&mut self, label: &Label, property: &str, value: &PropertyValue, node_id: NodeId) {
        for key in Self::keys_for(label, property) {
            if let Some(index) = self.indices.get_mut(&key) {
                index.remove(value, node_id);
            }
        }
    }

    /// `None` when no such index exists, so callers can fall back to a scan
    pub fn lookup(&self, label: Option<&Label>, property: &str, value: &PropertyValue) -> Option<Vec<NodeId>> {
        self.indices
            .get(&PropertyIndexKey::new(label, property))
            .map(|index| index.get(value))
    }

    pub fn get_index_mut(&mut self, label: Option<&Label>, property: &str) -> Option<&mut PropertyIndex> {
        self.indices.get_mut(&PropertyIndexKey::new(label, property))
    }

    pub fn clear(&mut self) {
        self.indices.clear();
    }

    fn keys_for(label: &Label, property: &str) -> [PropertyIndexKey; 2] {
        [
            PropertyIndexKey::new(Some(label), property),
            PropertyIndexKey::new(None, property),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labelled_and_global_indices() {
        let mut manager = IndexManager::new();
        let unit = Label::new("Unit");
        let country = Label::new("Country");
        assert!(manager.create_index(Some(unit.clone()), "identifier"));
        assert!(manager.create_index(None, "identifier"));
        assert!(!manager.create_index(None, "identifier"));

        let value = PropertyValue::from("c1");
        manager.index_insert(&unit, "identifier", &value, NodeId::new(1));
        manager.index_insert(&country, "identifier", &value, NodeId::new(2));

        assert_eq!(manager.lookup(Some(&unit), "identifier", &value), Some(vec![NodeId::new(1)]));
        assert_eq!(manager.lookup(None, "identifier", &value), Some(vec![NodeId::new(1), NodeId::new(2)]));
        assert_eq!(manager.lookup(Some(&country), "identifier", &value), None);

        manager.index_remove(&unit, "identifier", &value, NodeId::new(1));
        assert_eq!(manager.lookup(None, "identifier", &value), Some(vec![NodeId::new(2)]));
    }

    #[test]
    fn test_drop_index() {
        let mut manager = IndexManager::new();
        manager.create_index(None, "__id");
        assert!(manager.has_index(None, "__id"));
        assert!(manager.drop_index(None, "__id"));
        assert!(!manager.has_index(None, "__id"));
    }
}
