//! Directed, labelled edge representation

use super::property::{PropertyMap, PropertyValue};
use super::types::{Direction, EdgeId, EdgeType, NodeId};
use serde::{Deserialize, Serialize};

/// A directed edge between two vertices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,

    /// Edge goes FROM this vertex
    pub source: NodeId,

    /// Edge goes TO this vertex
    pub target: NodeId,

    pub edge_type: EdgeType,

    pub properties: PropertyMap,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl Edge {
    pub fn new(id: EdgeId, source: NodeId, target: NodeId, edge_type: impl Into<EdgeType>) -> Self {
        Self::new_with_properties(id, source, target, edge_type, PropertyMap::new())
    }

    pub fn new_with_properties(
        id: EdgeId,
        source: NodeId,
        target: NodeId,
        edge_type: impl Into<EdgeType>,
        properties: PropertyMap,
    ) -> Self {
        Edge {
            id,
            source,
            target,
            edge_type: edge_type.into(),
            properties,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn remove_property(&mut self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }

    /// The vertex at the far end when walking this edge in `direction`
    pub fn other_end(&self, direction: Direction) -> NodeId {
        match direction {
            Direction::Out => self.target,
            Direction::In => self.source,
        }
    }

    pub fn starts_from(&self, node: NodeId) -> bool {
        self.source == node
    }

    pub fn ends_at(&self, node: NodeId) -> bool {
        self.target == node
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Edge {}

impl std::hash::Hash for Edge {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
