//! Cascading bundle persistence
//!
//! A bundle tree is written in three phases:
//! 1. IDs are generated, the tree is validated (all violations at once),
//!    and ID integrity and reference targets are checked
//! 2. literal properties are written, dependent relations are reconciled
//!    against the existing children by ID and reference edges are replaced
//! 3. for updates the dependent subtree is re-serialized and compared with
//!    the pre-write image to classify the mutation
//!
//! Every check that can fail runs in phase 1, so a rejected bundle normally
//! never reaches the store. Phase 2 still runs inside its own
//! [`Transaction`](crate::graph::Transaction), and an error there rolls the
//! store back to where it was. Callers wanting all-or-nothing semantics
//! across several operations wrap them in a transaction of their own.

use super::serializer::{ordered_children, Serializer, ORDER_KEY};
use super::validator::BundleValidator;
use super::Mutation;
use crate::acl::scope::{scope_identifiers, set_permission_scope};
use crate::acl::{AclManager, BELONGS_TO};
use crate::bundle::Bundle;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::graph::{Direction, EdgeId, GraphStore, NodeId, PropertyMap, PropertyValue};
use crate::index::{Entity, EntityIndex};
use crate::schema::{RelationSchema, SchemaRegistry};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// How far a delete may cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeConsent {
    /// Remove the whole dependent subtree
    All,
    /// Remove the item and its direct dependents only; refuse if any
    /// dependent has dependents of its own
    Shallow,
}

/// Pre/post-write image used to classify updates
#[derive(Debug, PartialEq)]
struct Snapshot {
    bundle: Bundle,
    /// (owner id, relation) → target ids, for every reference in the subtree
    links: BTreeMap<(String, String), Vec<String>>,
}

pub struct BundlePersister<'a> {
    registry: &'a SchemaRegistry,
    config: &'a EngineConfig,
    scopes: Vec<String>,
    scope: Option<Entity>,
}

impl<'a> BundlePersister<'a> {
    pub fn new(registry: &'a SchemaRegistry, config: &'a EngineConfig) -> Self {
        BundlePersister {
            registry,
            config,
            scopes: Vec::new(),
            scope: None,
        }
    }

    /// Generate IDs under an explicit identifier path
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Create items inside `scope`: IDs are namespaced by the scope's
    /// identifier path and new roots get `scope` as their permission scope
    pub fn with_scope(mut self, store: &GraphStore, scope: &Entity) -> Self {
        self.scopes = scope_identifiers(store, scope, self.config.max_group_depth);
        self.scope = Some(scope.clone());
        self
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    fn snapshotter(&self) -> Serializer<'a> {
        Serializer::new(self.registry, self.config).dependent_only()
    }

    // ============================================================
    // Operations
    // ============================================================

    pub fn create(&self, store: &mut GraphStore, bundle: &Bundle) -> EngineResult<Entity> {
        let bundle = bundle.generate_ids(self.registry, &self.scopes);
        let errors = BundleValidator::new(self.registry, store).validate_for_create(&bundle);
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }

        let id = required_id(&bundle)?;
        if store.exists(id) {
            return Err(EngineError::Integrity(format!("item '{}' already exists", id)));
        }
        self.check_integrity(store, &bundle, &HashMap::new())?;
        self.check_references(store, &bundle)?;

        let mut tx = store.begin();
        let entity = self.create_tree(&mut tx, &bundle)?;
        if let Some(scope) = &self.scope {
            set_permission_scope(&mut tx, &entity, scope)?;
        }
        tx.commit();
        debug!("created {} ({} items)", entity, bundle.count());
        Ok(entity)
    }

    pub fn update(&self, store: &mut GraphStore, bundle: &Bundle) -> EngineResult<Mutation> {
        let bundle = bundle.generate_ids(self.registry, &self.scopes);
        let errors = BundleValidator::new(self.registry, store).validate_for_update(&bundle);
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }

        let entity = store.entity(required_id(&bundle)?)?;
        if entity.entity_type != bundle.entity_type() {
            return Err(EngineError::Integrity(format!(
                "item '{}' is a {}, not a {}",
                entity.id,
                entity.entity_type,
                bundle.entity_type()
            )));
        }
        let placements = self.placements(store, &entity)?;
        self.check_integrity(store, &bundle, &placements)?;
        self.check_references(store, &bundle)?;

        let before = self.snapshot(store, &entity)?;
        let mut tx = store.begin();
        self.update_tree(&mut tx, &entity, &bundle)?;
        let after = self.snapshot(&tx, &entity)?;
        tx.commit();

        if before == after {
            debug!("{} unchanged", entity);
            Ok(Mutation::unchanged(entity))
        } else {
            debug!("updated {}", entity);
            Ok(Mutation::updated(entity, before.bundle))
        }
    }

    /// Update if the bundle's (possibly generated) ID exists, else create
    pub fn create_or_update(&self, store: &mut GraphStore, bundle: &Bundle) -> EngineResult<Mutation> {
        let bundle = bundle.generate_ids(self.registry, &self.scopes);
        match bundle.id() {
            Some(id) if store.exists(id) => self.update(store, &bundle),
            _ => self.create(store, &bundle).map(Mutation::created),
        }
    }

    /// Delete an item and its whole dependent subtree; returns the number
    /// of entities removed
    pub fn delete(&self, store: &mut GraphStore, bundle: &Bundle) -> EngineResult<usize> {
        self.delete_with(store, bundle, CascadeConsent::All)
    }

    pub fn delete_with(&self, store: &mut GraphStore, bundle: &Bundle, consent: CascadeConsent) -> EngineResult<usize> {
        let id = bundle
            .id()
            .ok_or_else(|| EngineError::invalid("id", "is required for a delete"))?;
        let entity = store.entity(id)?;

        if consent == CascadeConsent::Shallow {
            let mut nested = None;
            self.snapshotter().traverse_subtree(store, &entity, |child, depth, _, _| {
                if depth > 1 && nested.is_none() {
                    nested = Some(child.id.clone());
                }
            })?;
            if let Some(nested) = nested {
                return Err(EngineError::Hierarchy(format!(
                    "deleting {} would also remove nested item '{}'",
                    entity, nested
                )));
            }
        }

        let mut tx = store.begin();
        let removed = self.delete_subtree(&mut tx, &entity)?;
        tx.commit();
        debug!("deleted {} ({} items)", entity, removed);
        Ok(removed)
    }

    // ============================================================
    // Pre-write checks
    // ============================================================

    /// Current position (parent id, relation) of every dependent below `entity`
    fn placements(&self, store: &GraphStore, entity: &Entity) -> EngineResult<HashMap<String, (String, String)>> {
        let mut out = HashMap::new();
        let mut path = vec![entity.id.clone()];
        self.snapshotter().traverse_subtree(store, entity, |child, depth, relation, _| {
            path.truncate(depth);
            if let Some(parent) = path.last() {
                out.insert(child.id.clone(), (parent.clone(), relation.to_string()));
            }
            path.push(child.id.clone());
        })?;
        Ok(out)
    }

    /// Nested IDs must be new, or already sit at the same place in the
    /// subtree being updated
    fn check_integrity(
        &self,
        store: &GraphStore,
        bundle: &Bundle,
        placements: &HashMap<String, (String, String)>,
    ) -> EngineResult<()> {
        let schema = self.registry.require(bundle.entity_type())?;
        let parent = required_id(bundle)?;
        for (relation, child) in bundle.dependents_only(schema) {
            let id = required_id(child)?;
            if let Ok(existing) = store.entity(id) {
                let in_place = placements
                    .get(id)
                    .map_or(false, |(p, r)| p == parent && r == relation);
                if !in_place {
                    return Err(EngineError::Integrity(format!("item '{}' already exists", id)));
                }
                if existing.entity_type != child.entity_type() {
                    return Err(EngineError::Integrity(format!(
                        "item '{}' is a {}, not a {}",
                        id,
                        existing.entity_type,
                        child.entity_type()
                    )));
                }
            }
            self.check_integrity(store, child, placements)?;
        }
        Ok(())
    }

    /// Every reference target anywhere in the tree must exist, and group
    /// memberships must not close a cycle
    fn check_references(&self, store: &GraphStore, bundle: &Bundle) -> EngineResult<()> {
        let schema = self.registry.require(bundle.entity_type())?;
        let guard_groups = self.config.reject_group_cycles && schema.capabilities.accessor;
        for relation in &schema.relations {
            for child in bundle.relation(&relation.name) {
                if relation.is_dependent() {
                    self.check_references(store, child)?;
                    continue;
                }
                let target = store.entity(required_id(child)?)?;
                if guard_groups && relation.name == BELONGS_TO {
                    self.check_membership(store, bundle, &target)?;
                }
            }
        }
        Ok(())
    }

    fn check_membership(&self, store: &GraphStore, member: &Bundle, group: &Entity) -> EngineResult<()> {
        let id = required_id(member)?;
        let closes = match store.entity(id) {
            Ok(existing) => AclManager::new(self.registry, self.config).closes_cycle(store, group, &existing),
            // a new item cannot be reachable from an existing group
            Err(_) => false,
        };
        if closes {
            return Err(EngineError::Hierarchy(format!(
                "adding '{}' to {} would create a membership cycle",
                id, group
            )));
        }
        Ok(())
    }

    // ============================================================
    // Writes
    // ============================================================

    fn create_tree(&self, store: &mut GraphStore, bundle: &Bundle) -> EngineResult<Entity> {
        let schema = self.registry.require(bundle.entity_type())?;
        let entity = store.create_entity(required_id(bundle)?, bundle.entity_type(), properties(bundle))?;
        for relation in &schema.relations {
            let children = bundle.relation(&relation.name);
            if relation.is_dependent() {
                for (i, child) in children.iter().enumerate() {
                    let child_entity = self.create_tree(store, child)?;
                    attach(store, &entity, &child_entity, relation, i)?;
                }
            } else {
                self.link_references(store, &entity, relation, children)?;
            }
        }
        Ok(entity)
    }

    fn update_tree(&self, store: &mut GraphStore, entity: &Entity, bundle: &Bundle) -> EngineResult<()> {
        let schema = self.registry.require(&entity.entity_type)?;
        store.update_entity(&entity.id, &entity.entity_type, properties(bundle))?;
        for relation in &schema.relations {
            let children = bundle.relation(&relation.name);
            if relation.is_dependent() {
                self.reconcile(store, entity, relation, children)?;
            } else {
                self.link_references(store, entity, relation, children)?;
            }
        }
        Ok(())
    }

    /// Bring one dependent relation in line with `children`: matching IDs
    /// are updated in place, new ones created, vanished ones deleted
    fn reconcile(
        &self,
        store: &mut GraphStore,
        parent: &Entity,
        relation: &RelationSchema,
        children: &[Bundle],
    ) -> EngineResult<()> {
        let existing: IndexMap<String, (EdgeId, Entity)> = ordered_children(store, parent.node, relation)
            .into_iter()
            .filter_map(|(edge, node)| store.entity_for_node(node).map(|e| (e.id.clone(), (edge, e))))
            .collect();
        let wanted: HashSet<&str> = children.iter().filter_map(Bundle::id).collect();

        for (id, (_, child)) in &existing {
            if !wanted.contains(id.as_str()) {
                let removed = self.delete_subtree(store, child)?;
                debug!("{} dropped from {}.{} ({} items)", child, parent, relation.name, removed);
            }
        }

        for (i, child) in children.iter().enumerate() {
            match existing.get(required_id(child)?) {
                Some((edge, entity)) => {
                    self.update_tree(store, entity, child)?;
                    let order = PropertyValue::from(i);
                    let current = store.get_edge(*edge).and_then(|e| e.get_property(ORDER_KEY));
                    if current != Some(&order) {
                        store.set_edge_property(*edge, ORDER_KEY, order)?;
                    }
                }
                None => {
                    let created = self.create_tree(store, child)?;
                    attach(store, parent, &created, relation, i)?;
                }
            }
        }
        Ok(())
    }

    /// Point a reference relation at exactly `targets`, in order
    fn link_references(
        &self,
        store: &mut GraphStore,
        owner: &Entity,
        relation: &RelationSchema,
        targets: &[Bundle],
    ) -> EngineResult<()> {
        let mut resolved = Vec::with_capacity(targets.len());
        for target in targets {
            if !target.data().is_empty() || !target.relations().is_empty() {
                warn!(
                    "ignoring nested data on {} reference from {} to {:?}",
                    relation.name,
                    owner,
                    target.id()
                );
            }
            resolved.push(store.entity(required_id(target)?)?.node);
        }

        let current: Vec<NodeId> = ordered_children(store, owner.node, relation)
            .into_iter()
            .map(|(_, node)| node)
            .collect();
        if current == resolved {
            return Ok(());
        }

        store.remove_edges(owner.node, &relation.name, relation.direction)?;
        for (i, node) in resolved.into_iter().enumerate() {
            let (source, target) = oriented(owner.node, node, relation.direction);
            store.create_edge_with_properties(source, target, relation.name.as_str(), order_props(i))?;
        }
        Ok(())
    }

    /// Post-order removal of an entity and its dependents, including its
    /// event links, versions and permission grants
    fn delete_subtree(&self, store: &mut GraphStore, entity: &Entity) -> EngineResult<usize> {
        let schema = self.registry.require(&entity.entity_type)?;
        let mut removed = 0;
        for relation in schema.dependents() {
            for (_, node) in ordered_children(store, entity.node, relation) {
                if let Some(child) = store.entity_for_node(node) {
                    removed += self.delete_subtree(store, &child)?;
                }
            }
        }
        crate::events::purge_history(store, entity)?;
        crate::acl::purge_grants(store, entity)?;
        store.delete_entity(&entity.id)?;
        Ok(removed + 1)
    }

    fn snapshot(&self, store: &GraphStore, entity: &Entity) -> EngineResult<Snapshot> {
        let serializer = self.snapshotter();
        let bundle = serializer.to_bundle(store, entity)?;

        let mut members = vec![entity.clone()];
        serializer.traverse_subtree(store, entity, |child, _, _, _| members.push(child.clone()))?;

        let mut links = BTreeMap::new();
        for member in &members {
            let schema = self.registry.require(&member.entity_type)?;
            for relation in schema.references() {
                let targets: Vec<String> = ordered_children(store, member.node, relation)
                    .into_iter()
                    .filter_map(|(_, node)| store.entity_for_node(node))
                    .map(|target| target.id)
                    .collect();
                if !targets.is_empty() {
                    links.insert((member.id.clone(), relation.name.clone()), targets);
                }
            }
        }
        Ok(Snapshot { bundle, links })
    }
}

fn required_id(bundle: &Bundle) -> EngineResult<&str> {
    bundle
        .id()
        .ok_or_else(|| EngineError::invalid("id", format!("{} has no id", bundle.entity_type())))
}

fn properties(bundle: &Bundle) -> PropertyMap {
    bundle
        .data()
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn order_props(order: usize) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert(ORDER_KEY.to_string(), PropertyValue::from(order));
    props
}

/// (source, target) of an edge from `owner` along a relation
fn oriented(owner: NodeId, other: NodeId, direction: Direction) -> (NodeId, NodeId) {
    match direction {
        Direction::Out => (owner, other),
        Direction::In => (other, owner),
    }
}

fn attach(
    store: &mut GraphStore,
    parent: &Entity,
    child: &Entity,
    relation: &RelationSchema,
    order: usize,
) -> EngineResult<()> {
    let (source, target) = oriented(parent.node, child.node, relation.direction);
    store.create_edge_with_properties(source, target, relation.name.as_str(), order_props(order))?;
    Ok(())
}
