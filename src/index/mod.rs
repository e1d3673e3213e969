//! Indexing
//!
//! B-Tree property indices, their manager, and the stable-ID entity index
//! the persistence layers resolve entities through.

pub mod entity;
pub mod manager;
pub mod property_index;

pub use entity::{apply_index_policy, Entity, EntityIndex, ID_KEY, SYSTEM_PREFIX, TYPE_KEY};
pub use manager::{IndexManager, PropertyIndexKey};
pub use property_index::PropertyIndex;
