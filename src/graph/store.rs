//! In-memory graph storage
//!
//! Arena-allocated vertices and edges with:
//! - per-vertex outgoing/incoming adjacency lists in insertion order
//! - label and edge-type indices
//! - property indices kept in step with every property write
//! - free-slot reuse for deleted vertices and edges

use super::edge::Edge;
use super::node::Node;
use super::property::{PropertyMap, PropertyValue};
use super::transaction::Transaction;
use super::types::{Direction, EdgeId, EdgeType, Label, NodeId};
use crate::index::IndexManager;
use indexmap::IndexSet;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during graph operations
#[derive(Error, Debug, PartialEq)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Edge {0} not found")]
    EdgeNotFound(EdgeId),

    #[error("Invalid edge: source node {0} does not exist")]
    InvalidEdgeSource(NodeId),

    #[error("Invalid edge: target node {0} does not exist")]
    InvalidEdgeTarget(NodeId),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// In-memory graph storage
///
/// `Clone` produces an independent deep copy; transactions use it as their
/// rollback image.
#[derive(Debug, Clone)]
pub struct GraphStore {
    nodes: Vec<Option<Node>>,

    edges: Vec<Option<Edge>>,

    /// Outgoing edges for each node (adjacency list)
    outgoing: Vec<Vec<EdgeId>>,

    /// Incoming edges for each node (adjacency list)
    incoming: Vec<Vec<EdgeId>>,

    free_node_ids: Vec<u64>,

    free_edge_ids: Vec<u64>,

    /// Label index, insertion ordered
    label_index: HashMap<Label, IndexSet<NodeId>>,

    edge_type_index: HashMap<EdgeType, IndexSet<EdgeId>>,

    /// Property indices manager
    pub property_index: IndexManager,

    next_node_id: u64,

    next_edge_id: u64,
}

impl GraphStore {
    pub fn new() -> Self {
        GraphStore {
            nodes: Vec::with_capacity(1024),
            edges: Vec::with_capacity(4096),
            outgoing: Vec::with_capacity(1024),
            incoming: Vec::with_capacity(1024),
            free_node_ids: Vec::new(),
            free_edge_ids: Vec::new(),
            label_index: HashMap::new(),
            edge_type_index: HashMap::new(),
            property_index: IndexManager::new(),
            next_node_id: 1,
            next_edge_id: 1,
        }
    }

    /// Open a unit of work; dropping it without `commit` restores this store
    pub fn begin(&mut self) -> Transaction<'_> {
        Transaction::new(self)
    }

    // ============================================================
    // Vertices
    // ============================================================

    pub fn create_node(&mut self, label: impl Into<Label>) -> NodeId {
        self.create_node_with_properties(label, PropertyMap::new())
    }

    pub fn create_node_with_properties(&mut self, label: impl Into<Label>, properties: PropertyMap) -> NodeId {
        let node_id = NodeId::new(self.allocate_node_id());
        let idx = node_id.slot();

        if idx >= self.nodes.len() {
            self.nodes.resize(idx + 1, None);
            self.outgoing.resize(idx + 1, Vec::new());
            self.incoming.resize(idx + 1, Vec::new());
        }

        let node = Node::new_with_properties(node_id, label, properties);
        self.label_index
            .entry(node.label.clone())
            .or_default()
            .insert(node_id);
        for (key, value) in &node.properties {
            self.property_index.index_insert(&node.label, key, value, node_id);
        }

        self.nodes[idx] = Some(node);
        node_id
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.slot()).and_then(Option::as_ref)
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.get_node(id).is_some()
    }

    /// Set a vertex property, keeping property indices in step
    pub fn set_node_property(
        &mut self,
        node_id: NodeId,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> GraphResult<Option<PropertyValue>> {
        let key = key.into();
        let value = value.into();
        let node = self
            .nodes
            .get_mut(node_id.slot())
            .and_then(Option::as_mut)
            .ok_or(GraphError::NodeNotFound(node_id))?;

        let old = node.set_property(key.clone(), value.clone());
        let label = node.label.clone();
        if let Some(old_value) = &old {
            self.property_index.index_remove(&label, &key, old_value, node_id);
        }
        self.property_index.index_insert(&label, &key, &value, node_id);
        Ok(old)
    }

    pub fn remove_node_property(&mut self, node_id: NodeId, key: &str) -> GraphResult<Option<PropertyValue>> {
        let node = self
            .nodes
            .get_mut(node_id.slot())
            .and_then(Option::as_mut)
            .ok_or(GraphError::NodeNotFound(node_id))?;

        let removed = node.remove_property(key);
        if let Some(value) = &removed {
            let label = node.label.clone();
            self.property_index.index_remove(&label, key, value, node_id);
        }
        Ok(removed)
    }

    /// Delete a vertex: index entries first, then every incident edge
    pub fn delete_node(&mut self, id: NodeId) -> GraphResult<Node> {
        let idx = id.slot();
        let node = self
            .nodes
            .get_mut(idx)
            .and_then(Option::take)
            .ok_or(GraphError::NodeNotFound(id))?;

        if let Some(node_set) = self.label_index.get_mut(&node.label) {
            node_set.shift_remove(&id);
        }
        for (key, value) in &node.properties {
            self.property_index.index_remove(&node.label, key, value, id);
        }

        let outgoing_edges = std::mem::take(&mut self.outgoing[idx]);
        let incoming_edges = std::mem::take(&mut self.incoming[idx]);
        for edge_id in outgoing_edges.iter().chain(incoming_edges.iter()) {
            // self-loops appear in both lists
            if self.has_edge(*edge_id) {
                self.delete_edge(*edge_id)?;
            }
        }

        self.free_node_ids.push(id.as_u64());
        debug!("deleted node {} ({})", id, node.label);
        Ok(node)
    }

    // ============================================================
    // Edges
    // ============================================================

    pub fn create_edge(&mut self, source: NodeId, target: NodeId, edge_type: impl Into<EdgeType>) -> GraphResult<EdgeId> {
        self.create_edge_with_properties(source, target, edge_type, PropertyMap::new())
    }

    pub fn create_edge_with_properties(
        &mut self,
        source: NodeId,
        target: NodeId,
        edge_type: impl Into<EdgeType>,
        properties: PropertyMap,
    ) -> GraphResult<EdgeId> {
        if !self.has_node(source) {
            return Err(GraphError::InvalidEdgeSource(source));
        }
        if !self.has_node(target) {
            return Err(GraphError::InvalidEdgeTarget(target));
        }

        let edge_id = EdgeId::new(self.allocate_edge_id());
        let idx = edge_id.slot();
        if idx >= self.edges.len() {
            self.edges.resize(idx + 1, None);
        }

        let edge = Edge::new_with_properties(edge_id, source, target, edge_type, properties);
        self.outgoing[source.slot()].push(edge_id);
        self.incoming[target.slot()].push(edge_id);
        self.edge_type_index
            .entry(edge.edge_type.clone())
            .or_default()
            .insert(edge_id);

        self.edges[idx] = Some(edge);
        Ok(edge_id)
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.slot()).and_then(Option::as_ref)
    }

    pub fn has_edge(&self, id: EdgeId) -> bool {
        self.get_edge(id).is_some()
    }

    pub fn set_edge_property(
        &mut self,
        id: EdgeId,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> GraphResult<()> {
        let edge = self
            .edges
            .get_mut(id.slot())
            .and_then(Option::as_mut)
            .ok_or(GraphError::EdgeNotFound(id))?;
        edge.set_property(key, value);
        Ok(())
    }

    pub fn delete_edge(&mut self, id: EdgeId) -> GraphResult<Edge> {
        let edge = self
            .edges
            .get_mut(id.slot())
            .and_then(Option::take)
            .ok_or(GraphError::EdgeNotFound(id))?;

        self.free_edge_ids.push(id.as_u64());

        if let Some(edge_set) = self.edge_type_index.get_mut(&edge.edge_type) {
            edge_set.shift_remove(&id);
        }
        if let Some(adj) = self.outgoing.get_mut(edge.source.slot()) {
            adj.retain(|&eid| eid != id);
        }
        if let Some(adj) = self.incoming.get_mut(edge.target.slot()) {
            adj.retain(|&eid| eid != id);
        }

        Ok(edge)
    }

    pub fn get_outgoing_edges(&self, node_id: NodeId) -> Vec<&Edge> {
        self.adjacent(&self.outgoing, node_id)
    }

    pub fn get_incoming_edges(&self, node_id: NodeId) -> Vec<&Edge> {
        self.adjacent(&self.incoming, node_id)
    }

    /// Edges of one type touching `node_id` in `direction`, in insertion order
    pub fn edges_of(&self, node_id: NodeId, edge_type: &str, direction: Direction) -> Vec<&Edge> {
        let list = match direction {
            Direction::Out => &self.outgoing,
            Direction::In => &self.incoming,
        };
        self.adjacent(list, node_id)
            .into_iter()
            .filter(|edge| edge.edge_type.as_str() == edge_type)
            .collect()
    }

    /// `(edge, far vertex)` pairs for one edge type and direction
    pub fn neighbours(&self, node_id: NodeId, edge_type: &str, direction: Direction) -> Vec<(EdgeId, NodeId)> {
        self.edges_of(node_id, edge_type, direction)
            .into_iter()
            .map(|edge| (edge.id, edge.other_end(direction)))
            .collect()
    }

    /// The single far vertex of a single-valued edge, if any
    pub fn neighbour(&self, node_id: NodeId, edge_type: &str, direction: Direction) -> Option<NodeId> {
        self.neighbours(node_id, edge_type, direction)
            .first()
            .map(|(_, node)| *node)
    }

    /// Remove every edge of one type touching `node_id` in `direction`
    pub fn remove_edges(&mut self, node_id: NodeId, edge_type: &str, direction: Direction) -> GraphResult<usize> {
        let ids: Vec<EdgeId> = self
            .edges_of(node_id, edge_type, direction)
            .iter()
            .map(|edge| edge.id)
            .collect();
        for id in &ids {
            self.delete_edge(*id)?;
        }
        Ok(ids.len())
    }

    fn adjacent<'a>(&'a self, list: &[Vec<EdgeId>], node_id: NodeId) -> Vec<&'a Edge> {
        list.get(node_id.slot())
            .map(|edge_ids| edge_ids.iter().filter_map(|&id| self.get_edge(id)).collect())
            .unwrap_or_default()
    }

    // ============================================================
    // Scans and indices
    // ============================================================

    /// Vertices with a label, in creation order
    pub fn get_nodes_by_label(&self, label: &Label) -> Vec<&Node> {
        self.label_index
            .get(label)
            .map(|node_ids| node_ids.iter().filter_map(|&id| self.get_node(id)).collect())
            .unwrap_or_default()
    }

    pub fn get_edges_by_type(&self, edge_type: &EdgeType) -> Vec<&Edge> {
        self.edge_type_index
            .get(edge_type)
            .map(|edge_ids| edge_ids.iter().filter_map(|&id| self.get_edge(id)).collect())
            .unwrap_or_default()
    }

    /// Create a property index and backfill it from existing vertices
    pub fn create_index(&mut self, label: Option<Label>, property: &str) {
        if !self.property_index.create_index(label.clone(), property) {
            return;
        }
        let entries: Vec<(PropertyValue, NodeId)> = self
            .nodes
            .iter()
            .flatten()
            .filter(|node| label.as_ref().map_or(true, |l| node.has_label(l)))
            .filter_map(|node| node.get_property(property).map(|v| (v.clone(), node.id)))
            .collect();
        if let Some(index) = self.property_index.get_index_mut(label.as_ref(), property) {
            for (value, node_id) in entries {
                index.insert(value, node_id);
            }
        }
        debug!(
            "created index on {}.{}",
            label.as_ref().map_or("*", Label::as_str),
            property
        );
    }

    pub fn has_index(&self, label: Option<&Label>, property: &str) -> bool {
        self.property_index.has_index(label, property)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().flatten().count()
    }

    pub fn all_nodes(&self) -> Vec<&Node> {
        self.nodes.iter().flatten().collect()
    }

    pub fn clear(&mut self) {
        *self = GraphStore::new();
    }

    fn allocate_node_id(&mut self) -> u64 {
        self.free_node_ids.pop().unwrap_or_else(|| {
            let id = self.next_node_id;
            self.next_node_id += 1;
            id
        })
    }

    fn allocate_edge_id(&mut self) -> u64 {
        self.free_edge_ids.pop().unwrap_or_else(|| {
            let id = self.next_edge_id;
            self.next_edge_id += 1;
            id
        })
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get_node() {
        let mut store = GraphStore::new();
        let node_id = store.create_node("Unit");

        assert_eq!(store.node_count(), 1);
        let node = store.get_node(node_id).unwrap();
        assert_eq!(node.id, node_id);
        assert!(node.has_label(&Label::new("Unit")));
    }

    #[test]
    fn test_edge_validation() {
        let mut store = GraphStore::new();
        let node1 = store.create_node("Unit");
        let invalid_node = NodeId::new(999);

        let result = store.create_edge(invalid_node, node1, "describes");
        assert_eq!(result, Err(GraphError::InvalidEdgeSource(invalid_node)));

        let result = store.create_edge(node1, invalid_node, "describes");
        assert_eq!(result, Err(GraphError::InvalidEdgeTarget(invalid_node)));
    }

    #[test]
    fn test_typed_neighbours_keep_insertion_order() {
        let mut store = GraphStore::new();
        let unit = store.create_node("Unit");
        let d1 = store.create_node("UnitDescription");
        let d2 = store.create_node("UnitDescription");
        let repo = store.create_node("Repository");

        store.create_edge(d2, unit, "describes").unwrap();
        store.create_edge(d1, unit, "describes").unwrap();
        store.create_edge(unit, repo, "heldBy").unwrap();

        let described_by: Vec<NodeId> = store
            .neighbours(unit, "describes", Direction::In)
            .into_iter()
            .map(|(_, n)| n)
            .collect();
        assert_eq!(described_by, vec![d2, d1]);
        assert_eq!(store.neighbour(unit, "heldBy", Direction::Out), Some(repo));
        assert!(store.neighbours(unit, "describes", Direction::Out).is_empty());
    }

    #[test]
    fn test_delete_node_removes_incident_edges() {
        let mut store = GraphStore::new();
        let a = store.create_node("Unit");
        let b = store.create_node("Unit");
        let c = store.create_node("Unit");
        store.create_edge(a, b, "childOf").unwrap();
        store.create_edge(c, a, "childOf").unwrap();
        store.create_edge(a, a, "self").unwrap();

        store.delete_node(a).unwrap();
        assert_eq!(store.node_count(), 2);
        assert_eq!(store.edge_count(), 0);
        assert!(store.get_incoming_edges(b).is_empty());
        assert!(store.get_outgoing_edges(c).is_empty());
        assert_eq!(store.delete_node(a), Err(GraphError::NodeNotFound(a)));
    }

    #[test]
    fn test_property_writes_update_indices() {
        let mut store = GraphStore::new();
        let label = Label::new("Unit");
        store.create_index(Some(label.clone()), "identifier");

        let n = store.create_node("Unit");
        store.set_node_property(n, "identifier", "c1").unwrap();
        let c1 = PropertyValue::from("c1");
        assert_eq!(store.property_index.lookup(Some(&label), "identifier", &c1), Some(vec![n]));

        store.set_node_property(n, "identifier", "c2").unwrap();
        assert_eq!(store.property_index.lookup(Some(&label), "identifier", &c1), Some(vec![]));

        store.delete_node(n).unwrap();
        let c2 = PropertyValue::from("c2");
        assert_eq!(store.property_index.lookup(Some(&label), "identifier", &c2), Some(vec![]));
    }

    #[test]
    fn test_create_index_backfills() {
        let mut store = GraphStore::new();
        let mut props = PropertyMap::new();
        props.insert("languageCode".to_string(), "en".into());
        let n = store.create_node_with_properties("UnitDescription", props);

        store.create_index(None, "languageCode");
        assert_eq!(
            store.property_index.lookup(None, "languageCode", &PropertyValue::from("en")),
            Some(vec![n])
        );
    }

    #[test]
    fn test_label_scan_order_and_id_reuse() {
        let mut store = GraphStore::new();
        let a = store.create_node("Unit");
        let b = store.create_node("Unit");
        store.delete_node(a).unwrap();
        let c = store.create_node("Unit");
        assert_eq!(c, a);

        let ids: Vec<NodeId> = store
            .get_nodes_by_label(&Label::new("Unit"))
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![b, c]);
    }

    #[test]
    fn test_remove_edges_by_type() {
        let mut store = GraphStore::new();
        let a = store.create_node("Unit");
        let b = store.create_node("Group");
        let c = store.create_node("Group");
        store.create_edge(a, b, "access").unwrap();
        store.create_edge(a, c, "access").unwrap();
        store.create_edge(a, c, "heldBy").unwrap();

        assert_eq!(store.remove_edges(a, "access", Direction::Out).unwrap(), 2);
        assert_eq!(store.edge_count(), 1);
        assert_eq!(store.get_edges_by_type(&EdgeType::new("access")).len(), 0);
    }
}
