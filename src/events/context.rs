//! Event under construction
//!
//! Subjects and version snapshots are collected first; nothing touches the
//! graph until [`EventContext::commit`]. A snapshot is taken when
//! `create_version` is called, so the usual order is: open the context,
//! snapshot, mutate, commit.

use super::chain;
use super::{
    queue_or_create, EventType, SystemEvent, HAS_ACTIONER, HAS_EVENT, HAS_EVENT_SCOPE, HAS_SUBJECT,
    LATEST_ACTION, LATEST_GLOBAL_EVENT, LIFECYCLE_EVENT, LIFECYCLE_VERSION, LINK_LABEL, PRIOR_ACTION,
    PRIOR_EVENT_LINK, PRIOR_GLOBAL_EVENT, PRIOR_VERSION, TRIGGERED_BY_EVENT,
};
use crate::bundle::Bundle;
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::graph::{GraphStore, PropertyMap, PropertyValue};
use crate::index::{Entity, EntityIndex};
use crate::persistence::{Serializer, ORDER_KEY};
use crate::schema::defaults::{SYSTEM_EVENT, VERSION};
use crate::schema::SchemaRegistry;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use tracing::{debug, warn};
use uuid::Uuid;

struct PendingVersion {
    owner: Entity,
    bundle: Bundle,
}

pub struct EventContext<'a> {
    registry: &'a SchemaRegistry,
    config: &'a EngineConfig,
    actioner: Entity,
    event_type: EventType,
    log_message: Option<String>,
    scope: Option<Entity>,
    timestamp: Option<DateTime<Utc>>,
    subjects: IndexSet<Entity>,
    versions: Vec<PendingVersion>,
}

impl<'a> EventContext<'a> {
    pub(crate) fn new(
        registry: &'a SchemaRegistry,
        config: &'a EngineConfig,
        actioner: Entity,
        event_type: EventType,
        log_message: Option<String>,
        scope: Option<Entity>,
    ) -> Self {
        EventContext {
            registry,
            config,
            actioner,
            event_type,
            log_message,
            scope,
            timestamp: None,
            subjects: IndexSet::new(),
            versions: Vec::new(),
        }
    }

    /// Stamp the event with a fixed time instead of the commit time, e.g.
    /// when replaying an ingest
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Add subjects; repeats are ignored and order is kept
    pub fn add_subjects<'e>(&mut self, entities: impl IntoIterator<Item = &'e Entity>) -> &mut Self {
        for entity in entities {
            self.subjects.insert(entity.clone());
        }
        self
    }

    pub fn subjects(&self) -> impl Iterator<Item = &Entity> {
        self.subjects.iter()
    }

    pub fn actioner(&self) -> &Entity {
        &self.actioner
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn log_message(&self) -> Option<&str> {
        self.log_message.as_deref()
    }

    /// Snapshot the current dependent state of `entity` as a version
    pub fn create_version(&mut self, store: &GraphStore, entity: &Entity) -> EngineResult<&mut Self> {
        let bundle = Serializer::new(self.registry, self.config)
            .dependent_only()
            .to_bundle(store, entity)?;
        Ok(self.create_version_from(entity, bundle))
    }

    /// Record a version from an already captured prior state, such as the
    /// one an update's [`Mutation`](crate::persistence::Mutation) returns
    pub fn create_version_from(&mut self, entity: &Entity, prior: Bundle) -> &mut Self {
        self.versions.push(PendingVersion {
            owner: entity.clone(),
            bundle: prior,
        });
        self
    }

    /// Write the event. Subjects deleted since they were added are skipped;
    /// when none is left the event is discarded and `None` returned.
    pub fn commit(self, store: &mut GraphStore) -> EngineResult<Option<SystemEvent>> {
        let subjects: Vec<&Entity> = self.subjects.iter().filter(|s| is_live(store, s)).collect();
        if subjects.len() < self.subjects.len() {
            warn!(
                "{} of {} subjects of {} event no longer exist",
                self.subjects.len() - subjects.len(),
                self.subjects.len(),
                self.event_type
            );
        }
        if subjects.is_empty() {
            warn!("discarding {} event without subjects", self.event_type);
            return Ok(None);
        }

        let timestamp = self.timestamp.unwrap_or_else(Utc::now);
        let mut props = PropertyMap::new();
        props.insert("timestamp".into(), PropertyValue::from(timestamp.to_rfc3339()));
        props.insert("eventType".into(), PropertyValue::from(self.event_type.as_str()));
        if let Some(message) = &self.log_message {
            props.insert("logMessage".into(), PropertyValue::from(message.as_str()));
        }
        let event = store.create_entity(&Uuid::new_v4().to_string(), SYSTEM_EVENT, props)?;

        let queue = queue_or_create(store);
        chain::prepend(store, queue, LATEST_GLOBAL_EVENT, PRIOR_GLOBAL_EVENT, event.node)?;

        if is_live(store, &self.actioner) {
            store.create_edge(event.node, self.actioner.node, HAS_ACTIONER)?;
            chain::prepend(store, self.actioner.node, LATEST_ACTION, PRIOR_ACTION, event.node)?;
        } else {
            warn!("actioner {} no longer exists", self.actioner);
        }

        if let Some(scope) = self.scope.as_ref().filter(|s| is_live(store, s)) {
            store.create_edge(event.node, scope.node, HAS_EVENT_SCOPE)?;
        }

        let mut linked: usize = 0;
        for subject in subjects {
            let mut order = PropertyMap::new();
            order.insert(ORDER_KEY.to_string(), PropertyValue::from(linked));
            store.create_edge_with_properties(event.node, subject.node, HAS_SUBJECT, order)?;

            let link = store.create_node(LINK_LABEL);
            store.create_edge(link, event.node, HAS_EVENT)?;
            chain::prepend(store, subject.node, LIFECYCLE_EVENT, PRIOR_EVENT_LINK, link)?;
            linked += 1;
        }

        for pending in &self.versions {
            let mut props = PropertyMap::new();
            props.insert("entityId".into(), PropertyValue::from(pending.owner.id.as_str()));
            props.insert("entityType".into(), PropertyValue::from(pending.owner.entity_type.as_str()));
            props.insert("entityData".into(), PropertyValue::from(pending.bundle.to_json()?));
            let version = store.create_entity(&Uuid::new_v4().to_string(), VERSION, props)?;
            store.create_edge(version.node, event.node, TRIGGERED_BY_EVENT)?;
            if is_live(store, &pending.owner) {
                chain::prepend(store, pending.owner.node, LIFECYCLE_VERSION, PRIOR_VERSION, version.node)?;
            }
        }

        debug!(
            "committed {} event {} ({} subjects, {} versions)",
            self.event_type,
            event.id,
            linked,
            self.versions.len()
        );
        SystemEvent::load(store, event).map(Some)
    }
}

/// The handle still names the vertex it was taken from
fn is_live(store: &GraphStore, entity: &Entity) -> bool {
    store
        .entity_for_node(entity.node)
        .map_or(false, |current| current.id == entity.id)
}
