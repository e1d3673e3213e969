//! Newest-first linked lists in the graph
//!
//! A chain hangs off an owner vertex: `owner -[head]-> newest -[next]-> older
//! -[next]-> ...`. Prepending moves the head edge; the previous head stays
//! reachable through `next`. Used for the global event queue, per-actioner
//! actions, per-subject event links and per-entity versions.

use crate::error::EngineResult;
use crate::graph::{Direction, GraphStore, NodeId};
use rustc_hash::FxHashSet;

/// Make `item` the newest element of the chain hanging off `owner`
pub fn prepend(store: &mut GraphStore, owner: NodeId, head: &str, next: &str, item: NodeId) -> EngineResult<()> {
    let previous = store.neighbour(owner, head, Direction::Out);
    store.remove_edges(owner, head, Direction::Out)?;
    store.create_edge(owner, item, head)?;
    if let Some(previous) = previous {
        store.create_edge(item, previous, next)?;
    }
    Ok(())
}

/// Chain elements newest first, at most `limit` of them
pub fn walk(store: &GraphStore, owner: NodeId, head: &str, next: &str, limit: Option<usize>) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut seen = FxHashSet::default();
    let mut cursor = store.neighbour(owner, head, Direction::Out);
    while let Some(node) = cursor {
        if limit.map_or(false, |l| out.len() >= l) || !seen.insert(node) {
            break;
        }
        out.push(node);
        cursor = store.neighbour(node, next, Direction::Out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_and_walk() {
        let mut store = GraphStore::new();
        let owner = store.create_node("Owner");
        let items: Vec<NodeId> = (0..3).map(|_| store.create_node("Item")).collect();
        for item in &items {
            prepend(&mut store, owner, "latest", "prior", *item).unwrap();
        }

        let expected: Vec<NodeId> = items.iter().rev().copied().collect();
        assert_eq!(walk(&store, owner, "latest", "prior", None), expected);
        assert_eq!(walk(&store, owner, "latest", "prior", Some(2)), expected[..2].to_vec());
        assert_eq!(store.neighbours(owner, "latest", Direction::Out).len(), 1);
    }

    #[test]
    fn test_walk_stops_on_loop() {
        let mut store = GraphStore::new();
        let owner = store.create_node("Owner");
        let a = store.create_node("Item");
        let b = store.create_node("Item");
        store.create_edge(owner, a, "latest").unwrap();
        store.create_edge(a, b, "prior").unwrap();
        store.create_edge(b, a, "prior").unwrap();
        assert_eq!(walk(&store, owner, "latest", "prior", None), vec![a, b]);
    }
}
