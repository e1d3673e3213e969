//! Audit events and versions
//!
//! Every logical mutation is recorded as one `SystemEvent` vertex:
//! - linked to its actioner, its subjects and (optionally) the scope of the
//!   manager that produced it
//! - prepended to the global event queue and to the actioner's actions
//! - prepended to each subject's lifecycle through an `EventLink` vertex,
//!   so a subject's latest event is one hop away and its history a chain
//!
//! Versions are dependent-only snapshots of an entity's state before an
//! update or delete, chained newest first off the entity and tied to the
//! event that produced them.

pub mod chain;
pub mod context;

pub use context::EventContext;

use crate::bundle::Bundle;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::graph::{Direction, GraphStore, Label, NodeId};
use crate::index::{Entity, EntityIndex};
use crate::persistence::serializer::ordered_children;
use crate::schema::{RelationSchema, SchemaRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const QUEUE_LABEL: &str = "SystemEventQueue";
pub const LINK_LABEL: &str = "EventLink";

pub const LATEST_GLOBAL_EVENT: &str = "latestGlobalEvent";
pub const PRIOR_GLOBAL_EVENT: &str = "priorGlobalEvent";
pub const HAS_ACTIONER: &str = "hasActioner";
pub const LATEST_ACTION: &str = "latestAction";
pub const PRIOR_ACTION: &str = "priorAction";
pub const HAS_EVENT_SCOPE: &str = "hasEventScope";
pub const HAS_SUBJECT: &str = "hasSubject";
pub const LIFECYCLE_EVENT: &str = "lifecycleEvent";
pub const PRIOR_EVENT_LINK: &str = "priorEventLink";
pub const HAS_EVENT: &str = "hasEvent";
pub const LIFECYCLE_VERSION: &str = "lifecycleVersion";
pub const PRIOR_VERSION: &str = "priorVersion";
pub const TRIGGERED_BY_EVENT: &str = "triggeredByEvent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    Creation,
    Modification,
    Deletion,
    Link,
    Annotation,
    SetGlobalPermissions,
    SetItemPermissions,
    SetVisibility,
    AddGroup,
    RemoveGroup,
    Promotion,
    Demotion,
    Ingest,
}

impl EventType {
    pub const ALL: [EventType; 13] = [
        EventType::Creation,
        EventType::Modification,
        EventType::Deletion,
        EventType::Link,
        EventType::Annotation,
        EventType::SetGlobalPermissions,
        EventType::SetItemPermissions,
        EventType::SetVisibility,
        EventType::AddGroup,
        EventType::RemoveGroup,
        EventType::Promotion,
        EventType::Demotion,
        EventType::Ingest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Creation => "creation",
            EventType::Modification => "modification",
            EventType::Deletion => "deletion",
            EventType::Link => "link",
            EventType::Annotation => "annotation",
            EventType::SetGlobalPermissions => "setGlobalPermissions",
            EventType::SetItemPermissions => "setItemPermissions",
            EventType::SetVisibility => "setVisibility",
            EventType::AddGroup => "addGroup",
            EventType::RemoveGroup => "removeGroup",
            EventType::Promotion => "promotion",
            EventType::Demotion => "demotion",
            EventType::Ingest => "ingest",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EngineError::Serialization(format!("unknown event type '{}'", s)))
    }
}

/// A committed audit record
#[derive(Debug, Clone, PartialEq)]
pub struct SystemEvent {
    pub entity: Entity,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub log_message: Option<String>,
}

impl SystemEvent {
    pub fn load(store: &GraphStore, entity: Entity) -> EngineResult<Self> {
        let node = store
            .get_node(entity.node)
            .ok_or_else(|| EngineError::not_found(entity.id.as_str()))?;
        let timestamp = node
            .get_str("timestamp")
            .ok_or_else(|| EngineError::Serialization(format!("event {} has no timestamp", entity.id)))?;
        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| EngineError::Serialization(format!("event {}: {}", entity.id, e)))?
            .with_timezone(&Utc);
        let event_type = node
            .get_str("eventType")
            .ok_or_else(|| EngineError::Serialization(format!("event {} has no type", entity.id)))?
            .parse()?;
        let log_message = node.get_str("logMessage").map(str::to_string);
        Ok(SystemEvent {
            entity,
            timestamp,
            event_type,
            log_message,
        })
    }

    pub fn id(&self) -> &str {
        &self.entity.id
    }
}

/// A stored prior-state snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Version {
    pub entity: Entity,
    pub entity_id: String,
    pub entity_type: String,
    pub data: Bundle,
}

impl Version {
    pub fn load(store: &GraphStore, entity: Entity) -> EngineResult<Self> {
        let node = store
            .get_node(entity.node)
            .ok_or_else(|| EngineError::not_found(entity.id.as_str()))?;
        let field = |key: &str| {
            node.get_str(key)
                .map(str::to_string)
                .ok_or_else(|| EngineError::Serialization(format!("version {} has no {}", entity.id, key)))
        };
        let entity_id = field("entityId")?;
        let entity_type = field("entityType")?;
        let data = Bundle::from_json(&field("entityData")?)?;
        Ok(Version {
            entity,
            entity_id,
            entity_type,
            data,
        })
    }
}

/// Opens event contexts and reads the event graph
pub struct ActionManager<'a> {
    registry: &'a SchemaRegistry,
    config: &'a EngineConfig,
    scope: Option<Entity>,
}

impl<'a> ActionManager<'a> {
    pub fn new(registry: &'a SchemaRegistry, config: &'a EngineConfig) -> Self {
        ActionManager {
            registry,
            config,
            scope: None,
        }
    }

    /// Record `scope` on every event this manager produces
    pub fn with_scope(mut self, scope: Entity) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn scope(&self) -> Option<&Entity> {
        self.scope.as_ref()
    }

    /// Start an event with `subject` as its first subject
    pub fn new_event_context(
        &self,
        subject: &Entity,
        actioner: &Entity,
        event_type: EventType,
        log_message: Option<&str>,
    ) -> EventContext<'a> {
        let mut context = EventContext::new(
            self.registry,
            self.config,
            actioner.clone(),
            event_type,
            log_message.map(str::to_string),
            self.scope.clone(),
        );
        context.add_subjects([subject]);
        context
    }

    /// Every event, newest first
    pub fn latest_global_events(&self, store: &GraphStore, limit: Option<usize>) -> EngineResult<Vec<SystemEvent>> {
        match queue(store) {
            Some(queue) => load_events(
                store,
                chain::walk(store, queue, LATEST_GLOBAL_EVENT, PRIOR_GLOBAL_EVENT, limit),
            ),
            None => Ok(Vec::new()),
        }
    }

    pub fn latest_event(&self, store: &GraphStore, entity: &Entity) -> EngineResult<Option<SystemEvent>> {
        let link = match store.neighbour(entity.node, LIFECYCLE_EVENT, Direction::Out) {
            Some(link) => link,
            None => return Ok(None),
        };
        load_events(store, store.neighbour(link, HAS_EVENT, Direction::Out))
            .map(|events| events.into_iter().next())
    }

    /// Events that had `entity` as a subject, newest first
    pub fn subject_history(&self, store: &GraphStore, entity: &Entity) -> EngineResult<Vec<SystemEvent>> {
        let links = chain::walk(store, entity.node, LIFECYCLE_EVENT, PRIOR_EVENT_LINK, None);
        load_events(
            store,
            links
                .into_iter()
                .filter_map(|link| store.neighbour(link, HAS_EVENT, Direction::Out)),
        )
    }

    /// Events performed by `actioner`, newest first
    pub fn actions(&self, store: &GraphStore, actioner: &Entity) -> EngineResult<Vec<SystemEvent>> {
        load_events(
            store,
            chain::walk(store, actioner.node, LATEST_ACTION, PRIOR_ACTION, None),
        )
    }

    /// Subjects of an event in the order they were added; deleted subjects
    /// are gone from the list
    pub fn subjects(&self, store: &GraphStore, event: &SystemEvent) -> Vec<Entity> {
        let relation = RelationSchema::dependent(HAS_SUBJECT, Direction::Out);
        ordered_children(store, event.entity.node, &relation)
            .into_iter()
            .filter_map(|(_, node)| store.entity_for_node(node))
            .collect()
    }

    pub fn actioner(&self, store: &GraphStore, event: &SystemEvent) -> Option<Entity> {
        store
            .neighbour(event.entity.node, HAS_ACTIONER, Direction::Out)
            .and_then(|node| store.entity_for_node(node))
    }

    pub fn event_scope(&self, store: &GraphStore, event: &SystemEvent) -> Option<Entity> {
        store
            .neighbour(event.entity.node, HAS_EVENT_SCOPE, Direction::Out)
            .and_then(|node| store.entity_for_node(node))
    }

    /// Prior states of `entity`, newest first
    pub fn versions(&self, store: &GraphStore, entity: &Entity) -> EngineResult<Vec<Version>> {
        chain::walk(store, entity.node, LIFECYCLE_VERSION, PRIOR_VERSION, None)
            .into_iter()
            .filter_map(|node| store.entity_for_node(node))
            .map(|version| Version::load(store, version))
            .collect()
    }

    /// Versions written by one event, including those whose owner has
    /// since been deleted
    pub fn event_versions(&self, store: &GraphStore, event: &SystemEvent) -> EngineResult<Vec<Version>> {
        store
            .neighbours(event.entity.node, TRIGGERED_BY_EVENT, Direction::In)
            .into_iter()
            .filter_map(|(_, node)| store.entity_for_node(node))
            .map(|version| Version::load(store, version))
            .collect()
    }

    /// Same type, message, scope, first subject and actioner
    pub fn same_as(&self, store: &GraphStore, a: &SystemEvent, b: &SystemEvent) -> bool {
        a.event_type == b.event_type
            && a.log_message == b.log_message
            && self.event_scope(store, a) == self.event_scope(store, b)
            && self.subjects(store, a).first() == self.subjects(store, b).first()
            && self.actioner(store, a) == self.actioner(store, b)
    }

    /// `same_as`, and no more than `window_secs` apart
    pub fn can_aggregate(&self, store: &GraphStore, a: &SystemEvent, b: &SystemEvent, window_secs: i64) -> bool {
        (a.timestamp - b.timestamp).num_seconds().abs() <= window_secs && self.same_as(store, a, b)
    }
}

fn queue(store: &GraphStore) -> Option<NodeId> {
    store
        .get_nodes_by_label(&Label::new(QUEUE_LABEL))
        .first()
        .map(|node| node.id)
}

/// The event queue vertex, created on first use
pub(crate) fn queue_or_create(store: &mut GraphStore) -> NodeId {
    match queue(store) {
        Some(queue) => queue,
        None => {
            debug!("creating system event queue");
            store.create_node(QUEUE_LABEL)
        }
    }
}

fn load_events(store: &GraphStore, nodes: impl IntoIterator<Item = NodeId>) -> EngineResult<Vec<SystemEvent>> {
    nodes
        .into_iter()
        .filter_map(|node| store.entity_for_node(node))
        .map(|entity| SystemEvent::load(store, entity))
        .collect()
}

/// Remove an entity's event links ahead of deleting it. Events stay in the
/// global queue and its versions stay reachable from the events that
/// wrote them.
pub fn purge_history(store: &mut GraphStore, entity: &Entity) -> EngineResult<()> {
    let links = chain::walk(store, entity.node, LIFECYCLE_EVENT, PRIOR_EVENT_LINK, None);
    for link in &links {
        store.delete_node(*link)?;
    }
    if !links.is_empty() {
        debug!("purged {} event links of {}", links.len(), entity);
    }
    Ok(())
}
