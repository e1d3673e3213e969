//! Persistence layer
//!
//! Maps bundle trees onto graph subtrees:
//! - `idgen`: stable, scope-namespaced ID generation
//! - `serializer`: entity → bundle, full or dependent-only
//! - `validator`: aggregated schema validation of a whole bundle tree
//! - `persister`: cascading create/update/delete returning a [`Mutation`]

pub mod idgen;
pub mod persister;
pub mod serializer;
pub mod validator;

pub use persister::{BundlePersister, CascadeConsent};
pub use serializer::{ordered_children, SerializeMode, Serializer, ORDER_KEY};
pub use validator::BundleValidator;

use crate::bundle::Bundle;
use crate::index::Entity;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutationState {
    Created,
    Updated,
    Unchanged,
}

impl MutationState {
    /// Whether the write changed anything in the graph
    pub fn mutated(self) -> bool {
        self != MutationState::Unchanged
    }
}

impl fmt::Display for MutationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationState::Created => "CREATED",
            MutationState::Updated => "UPDATED",
            MutationState::Unchanged => "UNCHANGED",
        };
        f.write_str(name)
    }
}

/// Result of one persist operation
///
/// `prior` is the dependent-only bundle as it was before the write, and is
/// only present when the state is `Updated`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation<T = Entity> {
    node: T,
    state: MutationState,
    prior: Option<Bundle>,
}

impl<T> Mutation<T> {
    pub fn created(node: T) -> Self {
        Mutation {
            node,
            state: MutationState::Created,
            prior: None,
        }
    }

    pub fn updated(node: T, prior: Bundle) -> Self {
        Mutation {
            node,
            state: MutationState::Updated,
            prior: Some(prior),
        }
    }

    pub fn unchanged(node: T) -> Self {
        Mutation {
            node,
            state: MutationState::Unchanged,
            prior: None,
        }
    }

    pub fn node(&self) -> &T {
        &self.node
    }

    pub fn state(&self) -> MutationState {
        self.state
    }

    pub fn prior(&self) -> Option<&Bundle> {
        self.prior.as_ref()
    }

    pub fn created_new(&self) -> bool {
        self.state == MutationState::Created
    }

    pub fn updated_existing(&self) -> bool {
        self.state == MutationState::Updated
    }

    pub fn unchanged_existing(&self) -> bool {
        self.state == MutationState::Unchanged
    }

    pub fn into_node(self) -> T {
        self.node
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Mutation<U> {
        Mutation {
            node: f(self.node),
            state: self.state,
            prior: self.prior,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_states() {
        let m: Mutation<&str> = Mutation::created("x");
        assert!(m.created_new());
        assert!(m.prior().is_none());
        assert!(m.state().mutated());

        let m = Mutation::updated("x", Bundle::new("Unit"));
        assert!(m.updated_existing());
        assert_eq!(m.prior().map(Bundle::entity_type), Some("Unit"));

        let m = Mutation::unchanged(3).map(|n| n * 2);
        assert!(m.unchanged_existing());
        assert!(!m.state().mutated());
        assert_eq!(m.into_node(), 6);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(MutationState::Updated.to_string(), "UPDATED");
        assert_eq!(serde_json::to_string(&MutationState::Created).unwrap(), "\"CREATED\"");
    }
}
