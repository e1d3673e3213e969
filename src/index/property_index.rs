//! B-Tree based property index

use crate::graph::{NodeId, PropertyValue};
use std::collections::{BTreeMap, BTreeSet};

/// Value -> vertices holding that value, for one (label, property) pair
#[derive(Debug, Clone, Default)]
pub struct PropertyIndex {
    index: BTreeMap<PropertyValue, BTreeSet<NodeId>>,
}

impl PropertyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: PropertyValue, node_id: NodeId) {
        self.index.entry(value).or_default().insert(node_id);
    }

    pub fn remove(&mut self, value: &PropertyValue, node_id: NodeId) {
        if let Some(nodes) = self.index.get_mut(value) {
            nodes.remove(&node_id);
            if nodes.is_empty() {
                self.index.remove(value);
            }
        }
    }

    /// Vertices holding `value`, in arena order
    pub fn get(&self, value: &PropertyValue) -> Vec<NodeId> {
        self.index
            .get(value)
            .map(|nodes| nodes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of distinct indexed values
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_index_ops() {
        let mut index = PropertyIndex::new();
        let n1 = NodeId::new(1);
        let n2 = NodeId::new(2);
        let val = PropertyValue::from("en");

        index.insert(val.clone(), n2);
        index.insert(val.clone(), n1);
        assert_eq!(index.get(&val), vec![n1, n2]);

        index.remove(&val, n1);
        assert_eq!(index.get(&val), vec![n2]);

        index.remove(&val, n2);
        assert!(index.is_empty());
        assert!(index.get(&val).is_empty());
    }
}
