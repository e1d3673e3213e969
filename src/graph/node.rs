//! Vertex representation

use super::property::{PropertyMap, PropertyValue};
use super::types::{Label, NodeId};
use serde::{Deserialize, Serialize};

/// A vertex in the property graph
///
/// Each vertex carries exactly one label. Entity vertices use their type
/// tag as the label so label scans double as type scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,

    pub label: Label,

    pub properties: PropertyMap,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Node {
    pub fn new(id: NodeId, label: impl Into<Label>) -> Self {
        Self::new_with_properties(id, label, PropertyMap::new())
    }

    pub fn new_with_properties(id: NodeId, label: impl Into<Label>, properties: PropertyMap) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Node {
            id,
            label: label.into(),
            properties,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_label(&self, label: &Label) -> bool {
        &self.label == label
    }

    /// Set a property, returning the value it replaced
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Option<PropertyValue> {
        let old = self.properties.insert(key.into(), value.into());
        self.touch();
        old
    }

    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Shorthand for string-valued properties
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(PropertyValue::as_string)
    }

    pub fn remove_property(&mut self, key: &str) -> Option<PropertyValue> {
        let removed = self.properties.remove(key);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_properties() {
        let mut node = Node::new(NodeId::new(1), "Unit");
        assert!(node.has_label(&Label::new("Unit")));

        assert_eq!(node.set_property("identifier", "c1"), None);
        let old = node.set_property("identifier", "c2");
        assert_eq!(old, Some(PropertyValue::from("c1")));
        assert_eq!(node.get_str("identifier"), Some("c2"));

        assert!(node.remove_property("identifier").is_some());
        assert!(!node.has_property("identifier"));
        assert_eq!(node.property_count(), 0);
    }

    #[test]
    fn test_timestamps_advance_on_write() {
        let mut node = Node::new(NodeId::new(3), "Unit");
        let created = node.created_at;
        node.set_property("title", "x");
        assert!(node.updated_at >= created);
    }
}
