//! Stable-ID entity index over the graph store
//!
//! Entity vertices carry two managed properties, [`ID_KEY`] and [`TYPE_KEY`].
//! The ID is globally unique and resolved through a keyless property index;
//! the type tag doubles as the vertex label, so the label index is the
//! type index. Any further secondary keys are policy driven, see
//! [`apply_index_policy`].

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::graph::{GraphStore, Label, NodeId, PropertyMap, PropertyValue};
use crate::schema::SchemaRegistry;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Managed vertex property holding the stable ID
pub const ID_KEY: &str = "__id";
/// Managed vertex property holding the type tag
pub const TYPE_KEY: &str = "__type";
/// Prefix of every property the engine manages itself
pub const SYSTEM_PREFIX: &str = "__";

/// Handle to a graph-resident entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Entity {
    #[serde(skip)]
    pub node: NodeId,
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

impl Entity {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.entity_type, self.id)
    }
}

/// Maps stable string IDs and type tags to vertices
pub trait EntityIndex {
    /// Create an entity vertex; fails with `Integrity` if the ID is taken
    fn create_entity(&mut self, id: &str, entity_type: &str, props: PropertyMap) -> EngineResult<Entity>;

    /// Replace an entity's user properties; fails with `ItemNotFound` if absent
    fn update_entity(&mut self, id: &str, entity_type: &str, props: PropertyMap) -> EngineResult<Entity>;

    fn entity(&self, id: &str) -> EngineResult<Entity>;

    fn exists(&self, id: &str) -> bool;

    /// Entities of `entity_type` whose `key` equals `value`
    fn find(&self, key: &str, value: &PropertyValue, entity_type: &str) -> Vec<Entity>;

    /// All entities of a type, in creation order
    fn entities_of_type(&self, entity_type: &str) -> Vec<Entity>;

    fn entity_for_node(&self, node: NodeId) -> Option<Entity>;

    /// Remove the vertex, its index entries and every incident edge
    fn delete_entity(&mut self, id: &str) -> EngineResult<()>;
}

impl EntityIndex for GraphStore {
    fn create_entity(&mut self, id: &str, entity_type: &str, props: PropertyMap) -> EngineResult<Entity> {
        if !self.has_index(None, ID_KEY) {
            self.create_index(None, ID_KEY);
        }
        if self.exists(id) {
            return Err(EngineError::Integrity(format!("item '{}' already exists", id)));
        }

        let mut properties: PropertyMap = props
            .into_iter()
            .filter(|(key, value)| !key.starts_with(SYSTEM_PREFIX) && !value.is_null())
            .collect();
        properties.insert(ID_KEY.to_string(), id.into());
        properties.insert(TYPE_KEY.to_string(), entity_type.into());

        let node = self.create_node_with_properties(entity_type, properties);
        debug!("created entity {} ({}) at {}", id, entity_type, node);
        Ok(Entity {
            node,
            id: id.to_string(),
            entity_type: entity_type.to_string(),
        })
    }

    fn update_entity(&mut self, id: &str, entity_type: &str, props: PropertyMap) -> EngineResult<Entity> {
        let entity = self.entity(id)?;
        if entity.entity_type != entity_type {
            return Err(EngineError::Integrity(format!(
                "item '{}' is a {}, not a {}",
                id, entity.entity_type, entity_type
            )));
        }

        let node = self
            .get_node(entity.node)
            .ok_or_else(|| EngineError::not_found(id))?;
        let stale: Vec<String> = node
            .properties
            .keys()
            .filter(|key| !key.starts_with(SYSTEM_PREFIX))
            .filter(|key| props.get(*key).map_or(true, PropertyValue::is_null))
            .cloned()
            .collect();
        let changed: Vec<(String, PropertyValue)> = props
            .into_iter()
            .filter(|(key, value)| !key.starts_with(SYSTEM_PREFIX) && !value.is_null())
            .filter(|(key, value)| node.get_property(key) != Some(value))
            .collect();

        for key in stale {
            self.remove_node_property(entity.node, &key)?;
        }
        for (key, value) in changed {
            self.set_node_property(entity.node, key, value)?;
        }
        Ok(entity)
    }

    fn entity(&self, id: &str) -> EngineResult<Entity> {
        self.property_index
            .lookup(None, ID_KEY, &PropertyValue::from(id))
            .and_then(|nodes| nodes.first().copied())
            .and_then(|node| self.entity_for_node(node))
            .ok_or_else(|| EngineError::not_found(id))
    }

    fn exists(&self, id: &str) -> bool {
        self.property_index
            .lookup(None, ID_KEY, &PropertyValue::from(id))
            .map_or(false, |nodes| !nodes.is_empty())
    }

    fn find(&self, key: &str, value: &PropertyValue, entity_type: &str) -> Vec<Entity> {
        let label = Label::new(entity_type);
        match self.property_index.lookup(Some(&label), key, value) {
            Some(nodes) => nodes
                .into_iter()
                .filter_map(|node| self.entity_for_node(node))
                .collect(),
            None => self
                .get_nodes_by_label(&label)
                .into_iter()
                .filter(|node| node.get_property(key) == Some(value))
                .filter_map(|node| self.entity_for_node(node.id))
                .collect(),
        }
    }

    fn entities_of_type(&self, entity_type: &str) -> Vec<Entity> {
        self.get_nodes_by_label(&Label::new(entity_type))
            .into_iter()
            .filter_map(|node| self.entity_for_node(node.id))
            .collect()
    }

    fn entity_for_node(&self, node: NodeId) -> Option<Entity> {
        let vertex = self.get_node(node)?;
        Some(Entity {
            node,
            id: vertex.get_str(ID_KEY)?.to_string(),
            entity_type: vertex.get_str(TYPE_KEY)?.to_string(),
        })
    }

    fn delete_entity(&mut self, id: &str) -> EngineResult<()> {
        let entity = self.entity(id)?;
        self.delete_node(entity.node)?;
        debug!("deleted entity {}", entity);
        Ok(())
    }
}

/// Install the secondary indices implied by the schema and configuration:
/// the global ID index, every type's unique keys and any configured keys.
pub fn apply_index_policy(store: &mut GraphStore, registry: &SchemaRegistry, config: &EngineConfig) {
    store.create_index(None, ID_KEY);
    let mut count = 1;
    for schema in registry.types() {
        for key in &schema.unique {
            store.create_index(Some(Label::new(schema.name.as_str())), key);
            count += 1;
        }
    }
    for (entity_type, keys) in &config.indexed_properties {
        for key in keys {
            store.create_index(Some(Label::new(entity_type.as_str())), key);
            count += 1;
        }
    }
    info!("index policy applied ({} indices)", count);
}
