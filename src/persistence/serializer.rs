//! Entity → Bundle serialization
//!
//! Two modes:
//! - `Full` follows dependent and reference relations; a reference is
//!   emitted in full (lite) while above `reference_depth` and as an ID-only
//!   stub below it
//! - `DependentOnly` follows dependent relations only; used for snapshots,
//!   mutation detection and subtree enumeration
//!
//! Dependent children are emitted in their persisted order, so serializing
//! an unchanged entity twice gives identical bundles.

use crate::bundle::Bundle;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::graph::{EdgeId, GraphStore, NodeId};
use crate::index::{Entity, EntityIndex, SYSTEM_PREFIX};
use crate::schema::{RelationKind, RelationSchema, SchemaRegistry};
use lru::LruCache;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroUsize;

/// Edge property recording a child's position within its relation
pub const ORDER_KEY: &str = "_order";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SerializeMode {
    Full,
    DependentOnly,
}

/// Children of one relation in persisted order: by `_order`, then by edge
/// insertion order
pub fn ordered_children(store: &GraphStore, node: NodeId, relation: &RelationSchema) -> Vec<(EdgeId, NodeId)> {
    let mut children: Vec<(i64, EdgeId, NodeId)> = store
        .edges_of(node, &relation.name, relation.direction)
        .into_iter()
        .map(|edge| {
            let order = edge
                .get_property(ORDER_KEY)
                .and_then(|v| v.as_integer())
                .unwrap_or(i64::MAX);
            (order, edge.id, edge.other_end(relation.direction))
        })
        .collect();
    children.sort_by_key(|(order, _, _)| *order);
    children.into_iter().map(|(_, edge, child)| (edge, child)).collect()
}

type CacheKey = (NodeId, usize, bool);

pub struct Serializer<'a> {
    registry: &'a SchemaRegistry,
    mode: SerializeMode,
    max_depth: usize,
    reference_depth: usize,
    lite: bool,
    include_props: Vec<String>,
    cache: Option<RefCell<LruCache<CacheKey, Bundle>>>,
}

impl<'a> Serializer<'a> {
    pub fn new(registry: &'a SchemaRegistry, config: &EngineConfig) -> Self {
        Serializer {
            registry,
            mode: SerializeMode::Full,
            max_depth: config.max_depth,
            reference_depth: config.reference_depth,
            lite: false,
            include_props: Vec::new(),
            cache: None,
        }
    }

    pub fn dependent_only(self) -> Self {
        self.with_mode(SerializeMode::DependentOnly)
    }

    pub fn with_mode(mut self, mode: SerializeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_reference_depth(mut self, depth: usize) -> Self {
        self.reference_depth = depth;
        self
    }

    /// Emit only mandatory properties plus any `include_props`
    pub fn lite(mut self) -> Self {
        self.lite = true;
        self
    }

    pub fn include_props(mut self, keys: &[&str]) -> Self {
        self.include_props.extend(keys.iter().map(|k| k.to_string()));
        self
    }

    /// Memoise serialized vertices. Only sound while the store is not
    /// written to, e.g. for one bulk listing.
    pub fn with_cache(mut self, capacity: usize) -> Self {
        self.cache = NonZeroUsize::new(capacity).map(|cap| RefCell::new(LruCache::new(cap)));
        self
    }

    pub fn mode(&self) -> SerializeMode {
        self.mode
    }

    pub fn to_bundle(&self, store: &GraphStore, entity: &Entity) -> EngineResult<Bundle> {
        self.vertex_to_bundle(store, entity.node, 0, self.lite, &mut Vec::new())
    }

    pub fn to_bundle_by_id(&self, store: &GraphStore, id: &str) -> EngineResult<Bundle> {
        let entity = store.entity(id)?;
        self.to_bundle(store, &entity)
    }

    pub fn to_json(&self, store: &GraphStore, entity: &Entity) -> EngineResult<String> {
        self.to_bundle(store, entity)?.to_json()
    }

    /// Visit every dependent descendant depth-first, parents before
    /// children. The callback gets the entity, its depth (children of
    /// `entity` are depth 1), the relation it hangs from and its position.
    pub fn traverse_subtree<F>(&self, store: &GraphStore, entity: &Entity, mut visit: F) -> EngineResult<()>
    where
        F: FnMut(&Entity, usize, &str, usize),
    {
        let mut seen = HashSet::new();
        seen.insert(entity.node);
        self.walk(store, entity, 1, &mut seen, &mut visit)
    }

    fn walk(
        &self,
        store: &GraphStore,
        entity: &Entity,
        depth: usize,
        seen: &mut HashSet<NodeId>,
        visit: &mut dyn FnMut(&Entity, usize, &str, usize),
    ) -> EngineResult<()> {
        let schema = self.registry.require(&entity.entity_type)?;
        for relation in schema.dependents() {
            for (i, (_, child)) in ordered_children(store, entity.node, relation).into_iter().enumerate() {
                if !seen.insert(child) {
                    continue;
                }
                let child = self.entity_at(store, child)?;
                visit(&child, depth, &relation.name, i);
                self.walk(store, &child, depth + 1, seen, visit)?;
            }
        }
        Ok(())
    }

    fn entity_at(&self, store: &GraphStore, node: NodeId) -> EngineResult<Entity> {
        store
            .entity_for_node(node)
            .ok_or_else(|| EngineError::Serialization(format!("vertex {} is not an entity", node)))
    }

    /// Dependent-only output follows every dependent relation to the
    /// bottom of the tree, since it is the image updates are diffed on;
    /// `path` holds the vertices above `node` and stops dependent cycles.
    fn vertex_to_bundle(
        &self,
        store: &GraphStore,
        node: NodeId,
        depth: usize,
        lite: bool,
        path: &mut Vec<NodeId>,
    ) -> EngineResult<Bundle> {
        let key = (node, depth, lite);
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.borrow_mut().get(&key) {
                return Ok(hit.clone());
            }
        }

        let entity = self.entity_at(store, node)?;
        let schema = self.registry.require(&entity.entity_type)?;
        let vertex = store
            .get_node(node)
            .ok_or_else(|| EngineError::Serialization(format!("vertex {} vanished", node)))?;

        let data: BTreeMap<_, _> = vertex
            .properties
            .iter()
            .filter(|(key, _)| !key.starts_with(SYSTEM_PREFIX))
            .filter(|(key, _)| !lite || schema.is_mandatory(key) || self.include_props.contains(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let mut bundle = Bundle::new(entity.entity_type.as_str())
            .with_id(entity.id.as_str())
            .with_data(data)
            .with_meta("gid", serde_json::json!(node.as_u64()));

        let dependent_only = self.mode == SerializeMode::DependentOnly;
        if dependent_only || depth < self.max_depth {
            path.push(node);
            let followed = schema
                .relations
                .iter()
                .filter(|r| if dependent_only { r.is_dependent() } else { r.fetched_at(depth) });
            for relation in followed {
                let targets = ordered_children(store, node, relation);
                let mut children = Vec::with_capacity(targets.len());
                for (_, target) in targets {
                    let child = match relation.kind {
                        RelationKind::Dependent if path.contains(&target) => continue,
                        RelationKind::Dependent => self.vertex_to_bundle(store, target, depth + 1, lite, path)?,
                        RelationKind::Reference if depth < self.reference_depth => {
                            self.vertex_to_bundle(store, target, depth + 1, true, path)?
                        }
                        RelationKind::Reference => self.stub(store, target)?,
                    };
                    children.push(child);
                }
                if !children.is_empty() {
                    bundle = bundle.with_relation(relation.name.as_str(), children);
                }
            }
            path.pop();
        }

        if let Some(cache) = &self.cache {
            cache.borrow_mut().put(key, bundle.clone());
        }
        Ok(bundle)
    }

    fn stub(&self, store: &GraphStore, node: NodeId) -> EngineResult<Bundle> {
        let entity = self.entity_at(store, node)?;
        Ok(Bundle::new(entity.entity_type).with_id(entity.id))
    }
}
