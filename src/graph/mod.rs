//! In-memory property graph
//!
//! This module provides the storage the persistence layers run against:
//! - Vertices with one label and a property map
//! - Directed, typed edges with properties; adjacency kept in insertion order
//! - Label, edge-type and property indices
//! - An explicit [`Transaction`] with commit/rollback

pub mod edge;
pub mod node;
pub mod property;
pub mod store;
pub mod transaction;
pub mod types;

pub use edge::Edge;
pub use node::Node;
pub use property::{PropertyMap, PropertyValue};
pub use store::{GraphError, GraphResult, GraphStore};
pub use transaction::Transaction;
pub use types::{Direction, EdgeId, EdgeType, Label, NodeId};
