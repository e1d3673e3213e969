//! Access control
//!
//! Two independent mechanisms:
//! - visibility: `item -[access]-> accessor` edges; an item without any is
//!   visible to everyone, otherwise only to the listed accessors and
//!   members (transitively) of listed groups
//! - permissions: grants of a [`PermissionType`] to an accessor, on one
//!   item or on a whole content type, inherited down permission scopes
//!
//! Members of the `admin` group pass every check. Group membership is
//! `member -[belongsTo]-> group`; closures are computed with a bounded BFS
//! and a visited set, and cyclic memberships are refused at write time when
//! `reject_group_cycles` is set.

pub mod grant;
pub mod scope;

pub use grant::{PermissionGrant, PermissionTarget, PermissionType};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::graph::{Direction, GraphStore, NodeId, PropertyMap, PropertyValue};
use crate::index::{Entity, EntityIndex};
use crate::schema::defaults::PERMISSION_GRANT;
use crate::schema::SchemaRegistry;
use grant::{CONTENT_TYPE_KEY, HAS_ACCESSOR, HAS_GRANT_SCOPE, HAS_TARGET, PERMISSION_KEY};
use rustc_hash::FxHashSet;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

pub const ACCESS: &str = "access";
pub const BELONGS_TO: &str = "belongsTo";
pub const ADMIN_GROUP: &str = "admin";

/// Who is asking
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Accessor {
    Anonymous,
    Account(Entity),
}

impl Accessor {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Accessor::Anonymous)
    }

    pub fn entity(&self) -> Option<&Entity> {
        match self {
            Accessor::Anonymous => None,
            Accessor::Account(entity) => Some(entity),
        }
    }
}

impl From<Entity> for Accessor {
    fn from(entity: Entity) -> Self {
        Accessor::Account(entity)
    }
}

impl From<&Entity> for Accessor {
    fn from(entity: &Entity) -> Self {
        Accessor::Account(entity.clone())
    }
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accessor::Anonymous => f.write_str("anonymous"),
            Accessor::Account(entity) => write!(f, "{}", entity),
        }
    }
}

/// Content type → permissions
pub type PermissionMatrix = BTreeMap<String, Vec<PermissionType>>;

pub struct AclManager<'a> {
    registry: &'a SchemaRegistry,
    config: &'a EngineConfig,
    scope: Option<Entity>,
}

impl<'a> AclManager<'a> {
    pub fn new(registry: &'a SchemaRegistry, config: &'a EngineConfig) -> Self {
        AclManager {
            registry,
            config,
            scope: None,
        }
    }

    /// Grants written by this manager are limited to `scope`, and
    /// content-type checks consider grants held in `scope` or above
    pub fn with_scope(mut self, scope: Entity) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn scope(&self) -> Option<&Entity> {
        self.scope.as_ref()
    }

    // ============================================================
    // Groups
    // ============================================================

    /// The accessor itself plus every group reachable through `belongsTo`
    pub fn group_closure(&self, store: &GraphStore, accessor: &Entity) -> FxHashSet<NodeId> {
        let mut seen = FxHashSet::default();
        seen.insert(accessor.node);
        let mut frontier = VecDeque::from([(accessor.node, 0usize)]);
        while let Some((node, depth)) = frontier.pop_front() {
            if depth >= self.config.max_group_depth {
                warn!("group closure of {} truncated at depth {}", accessor, depth);
                continue;
            }
            for (_, group) in store.neighbours(node, BELONGS_TO, Direction::Out) {
                if seen.insert(group) {
                    frontier.push_back((group, depth + 1));
                }
            }
        }
        seen
    }

    /// Groups `member` belongs to directly
    pub fn groups(&self, store: &GraphStore, member: &Entity) -> Vec<Entity> {
        store
            .neighbours(member.node, BELONGS_TO, Direction::Out)
            .into_iter()
            .filter_map(|(_, node)| store.entity_for_node(node))
            .collect()
    }

    pub fn add_to_group(&self, store: &mut GraphStore, group: &Entity, member: &Entity) -> EngineResult<()> {
        let accessor_type = |entity: &Entity| {
            self.registry
                .get(&entity.entity_type)
                .map_or(false, |schema| schema.capabilities.accessor)
        };
        if !accessor_type(group) || !accessor_type(member) {
            return Err(EngineError::Integrity(format!(
                "cannot make {} a member of {}",
                member, group
            )));
        }
        if self.groups(store, member).contains(group) {
            return Ok(());
        }
        if self.config.reject_group_cycles && self.closes_cycle(store, group, member) {
            return Err(EngineError::Hierarchy(format!(
                "adding {} to {} would create a membership cycle",
                member, group
            )));
        }
        store.create_edge(member.node, group.node, BELONGS_TO)?;
        debug!("{} joined {}", member, group);
        Ok(())
    }

    /// Whether making `member` a member of `group` would let the membership
    /// closure loop back on itself
    pub(crate) fn closes_cycle(&self, store: &GraphStore, group: &Entity, member: &Entity) -> bool {
        group == member || self.group_closure(store, group).contains(&member.node)
    }

    pub fn remove_from_group(&self, store: &mut GraphStore, group: &Entity, member: &Entity) -> EngineResult<bool> {
        let edges: Vec<_> = store
            .neighbours(member.node, BELONGS_TO, Direction::Out)
            .into_iter()
            .filter(|(_, node)| *node == group.node)
            .map(|(edge, _)| edge)
            .collect();
        for edge in &edges {
            store.delete_edge(*edge)?;
        }
        Ok(!edges.is_empty())
    }

    pub fn is_admin(&self, store: &GraphStore, accessor: &Accessor) -> bool {
        match accessor {
            Accessor::Anonymous => false,
            Accessor::Account(entity) => {
                entity.id == ADMIN_GROUP
                    || store
                        .entity(ADMIN_GROUP)
                        .map_or(false, |admin| self.group_closure(store, entity).contains(&admin.node))
            }
        }
    }

    // ============================================================
    // Visibility
    // ============================================================

    /// Accessors an item is restricted to; empty means unrestricted
    pub fn accessors(&self, store: &GraphStore, item: &Entity) -> Vec<Entity> {
        store
            .neighbours(item.node, ACCESS, Direction::Out)
            .into_iter()
            .filter_map(|(_, node)| store.entity_for_node(node))
            .collect()
    }

    /// Replace an item's accessor list; an empty list lifts the restriction
    pub fn set_accessors(&self, store: &mut GraphStore, item: &Entity, accessors: &[Entity]) -> EngineResult<()> {
        if let Some(missing) = accessors.iter().find(|a| !store.has_node(a.node)) {
            return Err(EngineError::not_found(missing.id.as_str()));
        }
        store.remove_edges(item.node, ACCESS, Direction::Out)?;
        let mut added = FxHashSet::default();
        for accessor in accessors {
            if added.insert(accessor.node) {
                store.create_edge(item.node, accessor.node, ACCESS)?;
            }
        }
        debug!("{} restricted to {} accessors", item, added.len());
        Ok(())
    }

    pub fn remove_accessor(&self, store: &mut GraphStore, item: &Entity, accessor: &Entity) -> EngineResult<()> {
        let edges: Vec<_> = store
            .neighbours(item.node, ACCESS, Direction::Out)
            .into_iter()
            .filter(|(_, node)| *node == accessor.node)
            .map(|(edge, _)| edge)
            .collect();
        for edge in edges {
            store.delete_edge(edge)?;
        }
        Ok(())
    }

    pub fn is_accessible(&self, store: &GraphStore, item: &Entity, accessor: &Accessor) -> bool {
        self.acl_filter(store, accessor)(item)
    }

    /// Visibility predicate for bulk filtering. The accessor's group closure
    /// is resolved once here, not per item.
    pub fn acl_filter<'s>(&self, store: &'s GraphStore, accessor: &Accessor) -> impl Fn(&Entity) -> bool + 's {
        let admin = self.is_admin(store, accessor);
        let closure = match accessor {
            Accessor::Anonymous => FxHashSet::default(),
            Accessor::Account(entity) => self.group_closure(store, entity),
        };
        move |item: &Entity| {
            if admin {
                return true;
            }
            let allowed = store.neighbours(item.node, ACCESS, Direction::Out);
            allowed.is_empty() || allowed.iter().any(|(_, node)| closure.contains(node))
        }
    }

    // ============================================================
    // Grants
    // ============================================================

    pub fn grant_permission(
        &self,
        store: &mut GraphStore,
        accessor: &Accessor,
        target: &PermissionTarget,
        permission: PermissionType,
    ) -> EngineResult<PermissionGrant> {
        let holder = self.grantee(store, accessor)?;
        if let PermissionTarget::Item(item) = target {
            if !store.has_node(item.node) {
                return Err(EngineError::not_found(item.id.as_str()));
            }
        }
        if let Some(existing) = self
            .grants_held(store, &holder)?
            .into_iter()
            .find(|g| g.matches(&holder, target, permission, self.scope.as_ref()))
        {
            return Ok(existing);
        }

        let mut props = PropertyMap::new();
        props.insert(PERMISSION_KEY.to_string(), PropertyValue::from(permission.as_str()));
        if let PermissionTarget::ContentType(content_type) = target {
            props.insert(CONTENT_TYPE_KEY.to_string(), PropertyValue::from(content_type.as_str()));
        }
        let grant = store.create_entity(&Uuid::new_v4().to_string(), PERMISSION_GRANT, props)?;
        store.create_edge(grant.node, holder.node, HAS_ACCESSOR)?;
        if let PermissionTarget::Item(item) = target {
            store.create_edge(grant.node, item.node, HAS_TARGET)?;
        }
        if let Some(scope) = &self.scope {
            store.create_edge(grant.node, scope.node, HAS_GRANT_SCOPE)?;
        }
        debug!("granted {} on {} to {}", permission, target, holder);
        PermissionGrant::load(store, grant)
    }

    /// Remove a grant made in this manager's scope; false if there was none
    pub fn revoke_permission(
        &self,
        store: &mut GraphStore,
        accessor: &Accessor,
        target: &PermissionTarget,
        permission: PermissionType,
    ) -> EngineResult<bool> {
        let holder = match accessor.entity() {
            Some(holder) => holder,
            None => return Ok(false),
        };
        let matching: Vec<Entity> = self
            .grants_held(store, holder)?
            .into_iter()
            .filter(|g| g.matches(holder, target, permission, self.scope.as_ref()))
            .map(|g| g.entity)
            .collect();
        for grant in &matching {
            store.delete_node(grant.node)?;
        }
        if !matching.is_empty() {
            debug!("revoked {} on {} from {}", permission, target, holder);
        }
        Ok(!matching.is_empty())
    }

    /// Grants held directly by `accessor`
    pub fn grants_held(&self, store: &GraphStore, accessor: &Entity) -> EngineResult<Vec<PermissionGrant>> {
        store
            .neighbours(accessor.node, HAS_ACCESSOR, Direction::In)
            .into_iter()
            .filter_map(|(_, node)| store.entity_for_node(node))
            .map(|grant| PermissionGrant::load(store, grant))
            .collect()
    }

    /// Permissions granted directly to `accessor` on `item`
    pub fn item_permissions(&self, store: &GraphStore, item: &Entity, accessor: &Entity) -> EngineResult<Vec<PermissionType>> {
        let target = PermissionTarget::Item(item.clone());
        let mut perms: Vec<PermissionType> = self
            .grants_held(store, accessor)?
            .into_iter()
            .filter(|g| g.target == target)
            .map(|g| g.permission)
            .collect();
        perms.sort();
        perms.dedup();
        Ok(perms)
    }

    /// Replace `accessor`'s direct grants on `item`
    pub fn set_item_permissions(
        &self,
        store: &mut GraphStore,
        item: &Entity,
        accessor: &Accessor,
        permissions: &[PermissionType],
    ) -> EngineResult<()> {
        let holder = self.grantee(store, accessor)?;
        let target = PermissionTarget::Item(item.clone());
        for grant in self.grants_held(store, &holder)? {
            if grant.target == target && grant.scope.as_ref() == self.scope.as_ref() {
                store.delete_node(grant.entity.node)?;
            }
        }
        for permission in permissions {
            self.grant_permission(store, accessor, &target, *permission)?;
        }
        Ok(())
    }

    /// Content-type grants held directly by `accessor` in this manager's scope
    pub fn global_permissions(&self, store: &GraphStore, accessor: &Entity) -> EngineResult<PermissionMatrix> {
        let mut matrix = PermissionMatrix::new();
        for grant in self.grants_held(store, accessor)? {
            if grant.scope.as_ref() != self.scope.as_ref() {
                continue;
            }
            if let PermissionTarget::ContentType(content_type) = grant.target {
                let perms = matrix.entry(content_type).or_default();
                if !perms.contains(&grant.permission) {
                    perms.push(grant.permission);
                    perms.sort();
                }
            }
        }
        Ok(matrix)
    }

    /// Replace `accessor`'s content-type grants in this manager's scope
    pub fn set_permission_matrix(
        &self,
        store: &mut GraphStore,
        accessor: &Accessor,
        matrix: &PermissionMatrix,
    ) -> EngineResult<()> {
        let holder = self.grantee(store, accessor)?;
        for grant in self.grants_held(store, &holder)? {
            let global = matches!(grant.target, PermissionTarget::ContentType(_));
            if global && grant.scope.as_ref() == self.scope.as_ref() {
                store.delete_node(grant.entity.node)?;
            }
        }
        for (content_type, permissions) in matrix {
            let target = PermissionTarget::ContentType(content_type.clone());
            for permission in permissions {
                self.grant_permission(store, accessor, &target, *permission)?;
            }
        }
        Ok(())
    }

    /// Content-type grants of the accessor and of every group it belongs
    /// to, the accessor first
    pub fn inherited_global_permissions(
        &self,
        store: &GraphStore,
        accessor: &Entity,
    ) -> EngineResult<Vec<(Entity, PermissionMatrix)>> {
        let mut members: Vec<Entity> = self
            .group_closure(store, accessor)
            .into_iter()
            .filter(|node| *node != accessor.node)
            .filter_map(|node| store.entity_for_node(node))
            .collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members.insert(0, accessor.clone());
        members
            .into_iter()
            .map(|member| {
                let matrix = self.global_permissions(store, &member)?;
                Ok((member, matrix))
            })
            .collect()
    }

    /// Whether `accessor` may exercise `permission` on all items of
    /// `content_type` within this manager's scope
    pub fn has_content_type_permission(
        &self,
        store: &GraphStore,
        content_type: &str,
        permission: PermissionType,
        accessor: &Accessor,
    ) -> EngineResult<bool> {
        if self.is_admin(store, accessor) {
            return Ok(true);
        }
        let entity = match accessor.entity() {
            Some(entity) => entity,
            None => return Ok(false),
        };
        let scopes = match &self.scope {
            Some(scope) => self.scopes_of(store, scope),
            None => FxHashSet::default(),
        };
        for grant in self.closure_grants(store, entity)? {
            if grant.permission.implies(permission)
                && grant.target == PermissionTarget::ContentType(content_type.to_string())
                && grant.scope.as_ref().map_or(true, |s| scopes.contains(&s.node))
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether `accessor` may exercise `permission` on `item`, through a
    /// grant on the item or one of its scopes, or a content-type grant
    pub fn has_permission(
        &self,
        store: &GraphStore,
        item: &Entity,
        permission: PermissionType,
        accessor: &Accessor,
    ) -> EngineResult<bool> {
        if self.is_admin(store, accessor) {
            return Ok(true);
        }
        let entity = match accessor.entity() {
            Some(entity) => entity,
            None => return Ok(false),
        };
        let scopes = self.scopes_of(store, item);
        for grant in self.closure_grants(store, entity)? {
            if !grant.permission.implies(permission) {
                continue;
            }
            let applies = match &grant.target {
                PermissionTarget::Item(target) => scopes.contains(&target.node),
                PermissionTarget::ContentType(content_type) => {
                    *content_type == item.entity_type
                        && grant.scope.as_ref().map_or(true, |s| scopes.contains(&s.node))
                }
            };
            if applies {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Fail with `PermissionDenied` unless `has_permission`
    pub fn check_entity_permission(
        &self,
        store: &GraphStore,
        item: &Entity,
        accessor: &Accessor,
        permission: PermissionType,
    ) -> EngineResult<()> {
        if self.has_permission(store, item, permission, accessor)? {
            Ok(())
        } else {
            Err(EngineError::PermissionDenied(format!(
                "{} may not {} {}",
                accessor, permission, item
            )))
        }
    }

    pub fn check_content_type_permission(
        &self,
        store: &GraphStore,
        content_type: &str,
        accessor: &Accessor,
        permission: PermissionType,
    ) -> EngineResult<()> {
        if self.has_content_type_permission(store, content_type, permission, accessor)? {
            Ok(())
        } else {
            Err(EngineError::PermissionDenied(format!(
                "{} may not {} {} items",
                accessor, permission, content_type
            )))
        }
    }

    fn grantee(&self, store: &GraphStore, accessor: &Accessor) -> EngineResult<Entity> {
        match accessor {
            Accessor::Anonymous => Err(EngineError::PermissionDenied(
                "cannot grant permissions to anonymous accessors".to_string(),
            )),
            Accessor::Account(entity) if entity.id == ADMIN_GROUP => Err(EngineError::PermissionDenied(
                "cannot grant permissions to the admin group".to_string(),
            )),
            Accessor::Account(entity) if !store.has_node(entity.node) => Err(EngineError::not_found(entity.id.as_str())),
            Accessor::Account(entity) => Ok(entity.clone()),
        }
    }

    fn closure_grants(&self, store: &GraphStore, accessor: &Entity) -> EngineResult<Vec<PermissionGrant>> {
        let mut grants = Vec::new();
        for node in self.group_closure(store, accessor) {
            if let Some(member) = store.entity_for_node(node) {
                grants.extend(self.grants_held(store, &member)?);
            }
        }
        Ok(grants)
    }

    /// `item` and its scope chain as a node set
    fn scopes_of(&self, store: &GraphStore, item: &Entity) -> FxHashSet<NodeId> {
        let mut nodes: FxHashSet<NodeId> = scope::scope_chain(store, item, self.config.max_group_depth)
            .into_iter()
            .map(|scope| scope.node)
            .collect();
        nodes.insert(item.node);
        nodes
    }
}

/// Remove grants held by, targeting or scoped to `entity` ahead of
/// deleting it
pub fn purge_grants(store: &mut GraphStore, entity: &Entity) -> EngineResult<()> {
    let mut grants: Vec<NodeId> = [HAS_ACCESSOR, HAS_TARGET, HAS_GRANT_SCOPE]
        .iter()
        .flat_map(|label| store.neighbours(entity.node, label, Direction::In))
        .map(|(_, node)| node)
        .collect();
    grants.sort();
    grants.dedup();
    for grant in &grants {
        store.delete_node(*grant)?;
    }
    if !grants.is_empty() {
        debug!("purged {} grants of {}", grants.len(), entity);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(store: &mut GraphStore, id: &str, ty: &str) -> Entity {
        store.create_entity(id, ty, PropertyMap::new()).unwrap()
    }

    #[test]
    fn test_cycles_rejected_or_bounded() {
        let registry = SchemaRegistry::archival();
        let mut store = GraphStore::new();
        let a = account(&mut store, "a", "Group");
        let b = account(&mut store, "b", "Group");

        let strict = EngineConfig::default();
        let acl = AclManager::new(&registry, &strict);
        acl.add_to_group(&mut store, &b, &a).unwrap();
        assert!(matches!(
            acl.add_to_group(&mut store, &a, &b),
            Err(EngineError::Hierarchy(_))
        ));
        assert!(matches!(acl.add_to_group(&mut store, &a, &a), Err(EngineError::Hierarchy(_))));

        let lenient = EngineConfig {
            reject_group_cycles: false,
            ..EngineConfig::default()
        };
        let acl = AclManager::new(&registry, &lenient);
        acl.add_to_group(&mut store, &a, &b).unwrap();
        let closure = acl.group_closure(&store, &a);
        assert_eq!(closure.len(), 2);
        assert!(closure.contains(&b.node));
    }

    #[test]
    fn test_only_accessors_join_groups() {
        let registry = SchemaRegistry::archival();
        let config = EngineConfig::default();
        let mut store = GraphStore::new();
        let group = account(&mut store, "g", "Group");
        let unit = account(&mut store, "c1", "Unit");
        let acl = AclManager::new(&registry, &config);
        assert!(matches!(
            acl.add_to_group(&mut store, &group, &unit),
            Err(EngineError::Integrity(_))
        ));
    }

    #[test]
    fn test_purge_grants() {
        let registry = SchemaRegistry::archival();
        let config = EngineConfig::default();
        let mut store = GraphStore::new();
        let user = account(&mut store, "u", "UserProfile");
        let item = account(&mut store, "c1", "Unit");
        let acl = AclManager::new(&registry, &config);
        acl.grant_permission(
            &mut store,
            &Accessor::from(&user),
            &PermissionTarget::Item(item.clone()),
            PermissionType::Update,
        )
        .unwrap();
        assert_eq!(store.entities_of_type(PERMISSION_GRANT).len(), 1);

        purge_grants(&mut store, &item).unwrap();
        assert!(store.entities_of_type(PERMISSION_GRANT).is_empty());
        assert!(acl.grants_held(&store, &user).unwrap().is_empty());
    }
}
