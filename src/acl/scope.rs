//! Permission scopes
//!
//! An item points at its containing scope through a single
//! `hasPermissionScope` edge; following those edges gives the scope chain
//! (nearest first) used for ID namespacing and grant inheritance. Chains
//! are walked with a visited set and a depth bound, so a malformed cyclic
//! chain terminates.

use crate::error::EngineResult;
use crate::graph::{Direction, GraphStore, NodeId};
use crate::index::{Entity, EntityIndex};
use rustc_hash::FxHashSet;
use tracing::warn;

pub const PERMISSION_SCOPE: &str = "hasPermissionScope";

/// Scopes above `item`, nearest first
pub fn scope_chain(store: &GraphStore, item: &Entity, max_depth: usize) -> Vec<Entity> {
    let mut chain = Vec::new();
    let mut seen: FxHashSet<NodeId> = FxHashSet::default();
    seen.insert(item.node);
    let mut current = item.node;
    while chain.len() < max_depth {
        let next = match store.neighbour(current, PERMISSION_SCOPE, Direction::Out) {
            Some(next) => next,
            None => return chain,
        };
        if !seen.insert(next) {
            warn!("permission scope cycle at {}", item);
            return chain;
        }
        match store.entity_for_node(next) {
            Some(scope) => chain.push(scope),
            None => return chain,
        }
        current = next;
    }
    warn!("permission scope chain of {} truncated at {}", item, max_depth);
    chain
}

pub fn permission_scope(store: &GraphStore, item: &Entity) -> Option<Entity> {
    store
        .neighbour(item.node, PERMISSION_SCOPE, Direction::Out)
        .and_then(|node| store.entity_for_node(node))
}

/// Point `item` at `scope`, replacing any previous scope
pub fn set_permission_scope(store: &mut GraphStore, item: &Entity, scope: &Entity) -> EngineResult<()> {
    store.remove_edges(item.node, PERMISSION_SCOPE, Direction::Out)?;
    store.create_edge(item.node, scope.node, PERMISSION_SCOPE)?;
    Ok(())
}

/// Identifier path of `scope` and its own scopes, outermost first. Each
/// segment is the scope's `identifier` property, or its ID without one.
pub fn scope_identifiers(store: &GraphStore, scope: &Entity, max_depth: usize) -> Vec<String> {
    let mut chain = vec![scope.clone()];
    chain.extend(scope_chain(store, scope, max_depth));
    chain
        .iter()
        .rev()
        .map(|entity| {
            store
                .get_node(entity.node)
                .and_then(|node| node.get_str("identifier"))
                .map(str::to_string)
                .unwrap_or_else(|| entity.id.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PropertyMap, PropertyValue};

    fn entity(store: &mut GraphStore, id: &str, ty: &str, identifier: &str) -> Entity {
        let mut props = PropertyMap::new();
        props.insert("identifier".into(), PropertyValue::from(identifier));
        store.create_entity(id, ty, props).unwrap()
    }

    #[test]
    fn test_chain_and_identifiers() {
        let mut store = GraphStore::new();
        let country = entity(&mut store, "us", "Country", "us");
        let repo = entity(&mut store, "us-r1", "Repository", "r1");
        let unit = entity(&mut store, "us-r1-c1", "Unit", "c1");
        set_permission_scope(&mut store, &repo, &country).unwrap();
        set_permission_scope(&mut store, &unit, &repo).unwrap();

        let chain = scope_chain(&store, &unit, 10);
        assert_eq!(chain, vec![repo.clone(), country.clone()]);
        assert_eq!(permission_scope(&store, &unit), Some(repo.clone()));
        assert_eq!(scope_identifiers(&store, &repo, 10), vec!["us", "r1"]);
        assert!(scope_chain(&store, &country, 10).is_empty());
    }

    #[test]
    fn test_cyclic_chain_terminates() {
        let mut store = GraphStore::new();
        let a = entity(&mut store, "a", "Repository", "a");
        let b = entity(&mut store, "b", "Repository", "b");
        set_permission_scope(&mut store, &a, &b).unwrap();
        set_permission_scope(&mut store, &b, &a).unwrap();

        assert_eq!(scope_chain(&store, &a, 10), vec![b.clone()]);
        assert_eq!(scope_chain(&store, &a, 0), Vec::<Entity>::new());
    }

    #[test]
    fn test_rescoping_replaces_edge() {
        let mut store = GraphStore::new();
        let a = entity(&mut store, "a", "Country", "a");
        let b = entity(&mut store, "b", "Country", "b");
        let item = entity(&mut store, "i", "Repository", "i");
        set_permission_scope(&mut store, &item, &a).unwrap();
        set_permission_scope(&mut store, &item, &b).unwrap();
        assert_eq!(scope_chain(&store, &item, 10), vec![b]);
    }
}
