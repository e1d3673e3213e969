//! Per-type schema descriptors
//!
//! Every entity type is described by a [`TypeSchema`]:
//! - mandatory, unique and enumerated properties
//! - relation descriptors (direction, dependent/reference kind, cardinality)
//! - independent capability flags (accessible, versioned, ...)
//! - the policy used to generate stable IDs
//!
//! The serializer, validator and persister consult the [`SchemaRegistry`]
//! instead of inspecting entity structure at runtime.

pub mod defaults;

use crate::error::{EngineError, EngineResult};
use crate::graph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// Child lifecycle owned by the parent; created, updated and deleted with it
    Dependent,
    /// Link to an independently owned entity; never cascaded
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationSchema {
    pub name: String,
    #[serde(default)]
    pub direction: Direction,
    pub kind: RelationKind,
    #[serde(default = "many")]
    pub cardinality: Cardinality,
    /// Include the relation when serializing
    #[serde(default = "yes")]
    pub fetch: bool,
    /// Only follow the relation while above this depth
    #[serde(default)]
    pub if_below_level: Option<usize>,
}

fn many() -> Cardinality {
    Cardinality::Many
}

impl RelationSchema {
    pub fn dependent(name: &str, direction: Direction) -> Self {
        Self {
            name: name.to_string(),
            direction,
            kind: RelationKind::Dependent,
            cardinality: Cardinality::Many,
            fetch: true,
            if_below_level: None,
        }
    }

    pub fn reference(name: &str, cardinality: Cardinality) -> Self {
        Self {
            name: name.to_string(),
            direction: Direction::Out,
            kind: RelationKind::Reference,
            cardinality,
            fetch: true,
            if_below_level: None,
        }
    }

    pub fn below_level(mut self, level: usize) -> Self {
        self.if_below_level = Some(level);
        self
    }

    pub fn is_dependent(&self) -> bool {
        self.kind == RelationKind::Dependent
    }

    /// Whether the serializer follows this relation at `depth`
    pub fn fetched_at(&self, depth: usize) -> bool {
        self.fetch && self.if_below_level.map_or(true, |level| depth < level)
    }
}

/// Independent behaviour flags; features check these instead of type names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub accessible: bool,
    pub versioned: bool,
    pub annotatable: bool,
    pub watchable: bool,
    pub promotable: bool,
    pub permission_scope: bool,
    pub accessor: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdPolicy {
    /// Scope path plus the slugged `identifier` property
    Identifier,
    /// Parent ID plus `languageCode` (and `identifier` when present)
    Description,
    /// Random UUID
    Generated,
}

impl Default for IdPolicy {
    fn default() -> Self {
        IdPolicy::Generated
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSchema {
    pub name: String,
    #[serde(default)]
    pub mandatory: Vec<String>,
    #[serde(default)]
    pub unique: Vec<String>,
    #[serde(default)]
    pub enums: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub relations: Vec<RelationSchema>,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub id_policy: IdPolicy,
}

impl TypeSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mandatory: Vec::new(),
            unique: Vec::new(),
            enums: BTreeMap::new(),
            relations: Vec::new(),
            capabilities: Capabilities::default(),
            id_policy: IdPolicy::Generated,
        }
    }

    pub fn mandatory(mut self, keys: &[&str]) -> Self {
        self.mandatory.extend(keys.iter().map(|k| k.to_string()));
        self
    }

    pub fn unique(mut self, keys: &[&str]) -> Self {
        self.unique.extend(keys.iter().map(|k| k.to_string()));
        self
    }

    pub fn enumerated(mut self, key: &str, values: &[&str]) -> Self {
        self.enums
            .insert(key.to_string(), values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn relation(mut self, relation: RelationSchema) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn id_policy(mut self, policy: IdPolicy) -> Self {
        self.id_policy = policy;
        self
    }

    pub fn relation_named(&self, name: &str) -> Option<&RelationSchema> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn dependents(&self) -> impl Iterator<Item = &RelationSchema> {
        self.relations.iter().filter(|r| r.is_dependent())
    }

    pub fn references(&self) -> impl Iterator<Item = &RelationSchema> {
        self.relations.iter().filter(|r| !r.is_dependent())
    }

    pub fn is_mandatory(&self, key: &str) -> bool {
        self.mandatory.iter().any(|k| k == key)
    }
}

/// Lookup table of type schemas by type tag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    types: BTreeMap<String, TypeSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: TypeSchema) {
        self.types.insert(schema.name.clone(), schema);
    }

    pub fn with(mut self, schema: TypeSchema) -> Self {
        self.register(schema);
        self
    }

    pub fn get(&self, entity_type: &str) -> Option<&TypeSchema> {
        self.types.get(entity_type)
    }

    /// Like `get`, but an unknown tag is a serialization failure
    pub fn require(&self, entity_type: &str) -> EngineResult<&TypeSchema> {
        self.get(entity_type)
            .ok_or_else(|| EngineError::Serialization(format!("unknown entity type '{}'", entity_type)))
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeSchema> {
        self.types.values()
    }

    /// Load a registry from a YAML list of type schemas
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        let schemas: Vec<TypeSchema> = serde_yaml::from_str(text)?;
        let mut registry = Self::new();
        for schema in schemas {
            registry.register(schema);
        }
        Ok(registry)
    }

    /// Fold another registry into this one; later definitions win
    pub fn extend(&mut self, other: SchemaRegistry) {
        self.types.extend(other.types);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
- name: Box
  mandatory: [identifier]
  id_policy: identifier
  capabilities:
    accessible: true
  relations:
    - name: describes
      direction: in
      kind: dependent
    - name: storedIn
      kind: reference
      cardinality: one
- name: BoxDescription
  mandatory: [languageCode]
  id_policy: description
"#;

    #[test]
    fn test_yaml_registry() {
        let registry = SchemaRegistry::from_yaml_str(YAML).unwrap();
        let schema = registry.get("Box").unwrap();
        assert_eq!(schema.id_policy, IdPolicy::Identifier);
        assert!(schema.capabilities.accessible);
        assert!(!schema.capabilities.versioned);

        let describes = schema.relation_named("describes").unwrap();
        assert_eq!(describes.direction, Direction::In);
        assert!(describes.is_dependent());
        assert_eq!(describes.cardinality, Cardinality::Many);
        assert!(describes.fetch);

        let stored = schema.relation_named("storedIn").unwrap();
        assert_eq!(stored.direction, Direction::Out);
        assert_eq!(stored.cardinality, Cardinality::One);
        assert_eq!(schema.references().count(), 1);
    }

    #[test]
    fn test_require_unknown_type() {
        let registry = SchemaRegistry::new();
        assert!(matches!(registry.require("Nope"), Err(EngineError::Serialization(_))));
    }

    #[test]
    fn test_fetch_levels() {
        let rel = RelationSchema::reference("heldBy", Cardinality::One).below_level(1);
        assert!(rel.fetched_at(0));
        assert!(!rel.fetched_at(1));
    }
}
