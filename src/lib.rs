//! Arkiv
//!
//! A hierarchical, permissioned document store layered over a property
//! graph. Documents travel as [`Bundle`] trees; the engine maps each tree
//! onto a vertex subtree, records every change as an auditable event and
//! gates reads and writes through access control.
//!
//! # Layers
//!
//! - [`graph`]: in-memory property graph with label/property indices and
//!   snapshot transactions
//! - [`index`]: entity identity (`__id`, `__type`) over graph vertices
//! - [`schema`]: per-type relations, mandatory/unique keys, ID policies
//! - [`bundle`]: the document model, its JSON codec and path addressing
//! - [`persistence`]: bundle validation, serialization and the cascading
//!   persister with change detection
//! - [`events`]: system events, lifecycle chains and version snapshots
//! - [`acl`]: visibility, group membership, grants and permission scopes
//! - [`query`]: filtered, sorted, paginated listings composed with ACL
//!
//! ## Example Usage
//!
//! ```rust
//! use arkiv::{Bundle, BundlePersister, EngineConfig, GraphStore, MutationState, SchemaRegistry};
//!
//! let registry = SchemaRegistry::archival();
//! let config = EngineConfig::default();
//! let persister = BundlePersister::new(&registry, &config);
//! let mut store = GraphStore::new();
//!
//! let unit = Bundle::new("Unit")
//!     .with_value("identifier", "c1")
//!     .with_relation_item(
//!         "describes",
//!         Bundle::new("UnitDescription")
//!             .with_value("languageCode", "en")
//!             .with_value("title", "Letters"),
//!     );
//!
//! let mut tx = store.begin();
//! let created = persister.create(&mut tx, &unit).unwrap();
//! tx.commit();
//! assert_eq!(created.id, "c1");
//!
//! let again = persister.create_or_update(&mut store, &unit.with_id("c1")).unwrap();
//! assert_eq!(again.state(), MutationState::Unchanged);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod acl;
pub mod bundle;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod index;
pub mod persistence;
pub mod query;
pub mod schema;

pub use acl::{Accessor, AclManager, PermissionGrant, PermissionTarget, PermissionType};
pub use bundle::{Bundle, BundlePath, ErrorSet, PathError};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use events::{ActionManager, EventContext, EventType, SystemEvent, Version};
pub use graph::{Direction, GraphStore, PropertyMap, PropertyValue, Transaction};
pub use index::{Entity, EntityIndex};
pub use persistence::{BundlePersister, CascadeConsent, Mutation, MutationState, SerializeMode, Serializer};
pub use query::{FilterPredicate, Page, Query, SortOrder};
pub use schema::SchemaRegistry;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }
}
