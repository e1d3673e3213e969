//! Permission grants
//!
//! A grant is a `PermissionGrant` vertex:
//! `grant -[hasAccessor]-> accessor`, `grant -[hasTarget]-> item` (or a
//! `contentType` property for a type-wide grant) and optionally
//! `grant -[hasGrantScope]-> scope`.

use crate::error::{EngineError, EngineResult};
use crate::graph::{Direction, GraphStore};
use crate::index::{Entity, EntityIndex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const HAS_ACCESSOR: &str = "hasAccessor";
pub const HAS_TARGET: &str = "hasTarget";
pub const HAS_GRANT_SCOPE: &str = "hasGrantScope";
pub const PERMISSION_KEY: &str = "permission";
pub const CONTENT_TYPE_KEY: &str = "contentType";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    Create,
    Update,
    Delete,
    Annotate,
    Owner,
    Grant,
    Promote,
}

impl PermissionType {
    pub const ALL: [PermissionType; 7] = [
        PermissionType::Create,
        PermissionType::Update,
        PermissionType::Delete,
        PermissionType::Annotate,
        PermissionType::Owner,
        PermissionType::Grant,
        PermissionType::Promote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::Create => "create",
            PermissionType::Update => "update",
            PermissionType::Delete => "delete",
            PermissionType::Annotate => "annotate",
            PermissionType::Owner => "owner",
            PermissionType::Grant => "grant",
            PermissionType::Promote => "promote",
        }
    }

    /// Holding `self` is enough for `wanted`; owner implies everything
    pub fn implies(self, wanted: PermissionType) -> bool {
        self == wanted || self == PermissionType::Owner
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionType {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        PermissionType::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| EngineError::Serialization(format!("unknown permission '{}'", s)))
    }
}

/// What a grant applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PermissionTarget {
    Item(Entity),
    /// Every item of a type, optionally limited by the grant's scope
    ContentType(String),
}

impl fmt::Display for PermissionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionTarget::Item(item) => write!(f, "{}", item),
            PermissionTarget::ContentType(t) => write!(f, "all {}", t),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PermissionGrant {
    pub entity: Entity,
    pub accessor: Entity,
    pub permission: PermissionType,
    pub target: PermissionTarget,
    pub scope: Option<Entity>,
}

impl PermissionGrant {
    pub fn load(store: &GraphStore, entity: Entity) -> EngineResult<Self> {
        let node = store
            .get_node(entity.node)
            .ok_or_else(|| EngineError::not_found(entity.id.as_str()))?;
        let permission = node
            .get_str(PERMISSION_KEY)
            .ok_or_else(|| EngineError::Serialization(format!("grant {} has no permission", entity.id)))?
            .parse()?;
        let linked = |label: &str| {
            store
                .neighbour(entity.node, label, Direction::Out)
                .and_then(|n| store.entity_for_node(n))
        };
        let accessor = linked(HAS_ACCESSOR)
            .ok_or_else(|| EngineError::Serialization(format!("grant {} has no accessor", entity.id)))?;
        let target = match (linked(HAS_TARGET), node.get_str(CONTENT_TYPE_KEY)) {
            (Some(item), _) => PermissionTarget::Item(item),
            (None, Some(content_type)) => PermissionTarget::ContentType(content_type.to_string()),
            (None, None) => {
                return Err(EngineError::Serialization(format!("grant {} has no target", entity.id)));
            }
        };
        let scope = linked(HAS_GRANT_SCOPE);
        Ok(PermissionGrant {
            entity,
            accessor,
            permission,
            target,
            scope,
        })
    }

    /// Same accessor, target, permission and scope
    pub fn matches(
        &self,
        accessor: &Entity,
        target: &PermissionTarget,
        permission: PermissionType,
        scope: Option<&Entity>,
    ) -> bool {
        self.accessor == *accessor && self.target == *target && self.permission == permission && self.scope.as_ref() == scope
    }
}
