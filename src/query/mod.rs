//! Listing entities
//!
//! [`Query`] is an immutable descriptor: every builder method returns a new
//! query and leaves the receiver untouched, so a base query can be shared
//! and refined per request. Running it composes, in order:
//! - the accessor's visibility filter (group closure resolved once per run)
//! - the property filters
//! - a stable multi-key sort, nulls last
//! - the offset/limit slice
//!
//! Eager pages materialize the matches once to report a total. Streaming
//! pages are lazy and uncounted; when sorting is requested they still have
//! to collect the matches before the first item can be produced.

pub mod filter;
pub mod page;

pub use filter::{Filter, FilterPredicate, Sort, SortOrder};
pub use page::Page;

use crate::acl::{Accessor, AclManager};
use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::graph::{GraphStore, PropertyValue};
use crate::index::{Entity, EntityIndex};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Query {
    offset: usize,
    limit: i64,
    streaming: bool,
    sorts: Vec<Sort>,
    default_sorts: Vec<Sort>,
    filters: Vec<Filter>,
}

impl Default for Query {
    fn default() -> Self {
        Query::new(&EngineConfig::default())
    }
}

impl Query {
    pub fn new(config: &EngineConfig) -> Self {
        Query {
            offset: 0,
            limit: config.default_limit,
            streaming: false,
            sorts: Vec::new(),
            default_sorts: Vec::new(),
            filters: Vec::new(),
        }
    }

    // ========== Builders ==========

    pub fn with_offset(&self, offset: usize) -> Self {
        let mut q = self.clone();
        q.offset = offset;
        q
    }

    /// Negative means no limit; zero yields an empty (but still counted) page
    pub fn with_limit(&self, limit: i64) -> Self {
        let mut q = self.clone();
        q.limit = limit;
        q
    }

    pub fn with_streaming(&self, streaming: bool) -> Self {
        let mut q = self.clone();
        q.streaming = streaming;
        q
    }

    /// Add a sort key after any already declared
    pub fn order_by(&self, property: impl Into<String>, order: SortOrder) -> Self {
        let mut q = self.clone();
        q.sorts.push(Sort::new(property, order));
        q
    }

    /// Sort used only while no explicit ordering is set
    pub fn default_order_by(&self, property: impl Into<String>, order: SortOrder) -> Self {
        let mut q = self.clone();
        q.default_sorts.push(Sort::new(property, order));
        q
    }

    pub fn filter(
        &self,
        property: impl Into<String>,
        predicate: FilterPredicate,
        value: impl Into<PropertyValue>,
    ) -> EngineResult<Self> {
        let filter = Filter::new(property, predicate, value)?;
        let mut q = self.clone();
        q.filters.push(filter);
        Ok(q)
    }

    /// Add filters written as `prop__PRED:value`
    pub fn filter_specs<S: AsRef<str>>(&self, specs: &[S]) -> EngineResult<Self> {
        let mut q = self.clone();
        for spec in specs {
            q.filters.push(Filter::parse(spec.as_ref())?);
        }
        Ok(q)
    }

    /// Add sort keys written as `prop` or `prop__DESC`
    pub fn order_specs<S: AsRef<str>>(&self, specs: &[S]) -> EngineResult<Self> {
        let mut q = self.clone();
        for spec in specs {
            q.sorts.push(Sort::parse(spec.as_ref())?);
        }
        Ok(q)
    }

    pub fn clear_filters(&self) -> Self {
        let mut q = self.clone();
        q.filters.clear();
        q
    }

    pub fn clear_ordering(&self) -> Self {
        let mut q = self.clone();
        q.sorts.clear();
        q
    }

    // ========== Accessors ==========

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// The sort keys a run would apply
    pub fn sorts(&self) -> &[Sort] {
        if self.sorts.is_empty() {
            &self.default_sorts
        } else {
            &self.sorts
        }
    }

    // ========== Execution ==========

    /// List visible entities of one type
    pub fn page<'s>(
        &self,
        store: &'s GraphStore,
        acl: &AclManager,
        entity_type: &str,
        accessor: &Accessor,
    ) -> Page<'s, Entity> {
        self.page_entities(store, acl, store.entities_of_type(entity_type), accessor)
    }

    /// List visible entities of one type whose `key` equals `value`, using
    /// the secondary index when there is one
    pub fn page_by_key<'s>(
        &self,
        store: &'s GraphStore,
        acl: &AclManager,
        entity_type: &str,
        key: &str,
        value: &PropertyValue,
        accessor: &Accessor,
    ) -> Page<'s, Entity> {
        self.page_entities(store, acl, store.find(key, value, entity_type), accessor)
    }

    /// Run over an arbitrary candidate set, e.g. an entity's children
    pub fn page_entities<'s, I>(
        &self,
        store: &'s GraphStore,
        acl: &AclManager,
        candidates: I,
        accessor: &Accessor,
    ) -> Page<'s, Entity>
    where
        I: IntoIterator<Item = Entity>,
        I::IntoIter: 's,
    {
        let visible = acl.acl_filter(store, accessor);
        let filters = self.filters.clone();
        let matched = candidates
            .into_iter()
            .filter(move |entity| visible(entity) && matches_all(store, &filters, entity));
        let sorts = self.sorts();

        if self.streaming && sorts.is_empty() {
            debug!("streaming page offset={} limit={}", self.offset, self.limit);
            return Page::new(page::slice(matched, self.offset, self.limit), self.offset, self.limit, None);
        }

        let sorted = sort_entities(store, matched.collect(), sorts);
        let total = if self.streaming { None } else { Some(sorted.len()) };
        debug!(
            "page offset={} limit={} total={:?} accessor={}",
            self.offset, self.limit, total, accessor
        );
        Page::new(
            page::slice(sorted.into_iter(), self.offset, self.limit),
            self.offset,
            self.limit,
            total,
        )
    }

    /// Number of entities of a type passing the filters, without any
    /// visibility check
    pub fn count(&self, store: &GraphStore, entity_type: &str) -> usize {
        store
            .entities_of_type(entity_type)
            .iter()
            .filter(|entity| matches_all(store, &self.filters, entity))
            .count()
    }
}

/// Sortable and filterable value of an entity; `id` and `type` address the
/// managed keys
fn property_of(store: &GraphStore, entity: &Entity, key: &str) -> Option<PropertyValue> {
    match key {
        "id" => Some(PropertyValue::from(entity.id.as_str())),
        "type" => Some(PropertyValue::from(entity.entity_type.as_str())),
        _ => store.get_node(entity.node)?.get_property(key).cloned(),
    }
}

fn matches_all(store: &GraphStore, filters: &[Filter], entity: &Entity) -> bool {
    filters
        .iter()
        .all(|f| f.test(property_of(store, entity, &f.property).as_ref()))
}

fn sort_entities(store: &GraphStore, entities: Vec<Entity>, sorts: &[Sort]) -> Vec<Entity> {
    if sorts.is_empty() {
        return entities;
    }
    let mut keyed: Vec<(Vec<Option<PropertyValue>>, Entity)> = entities
        .into_iter()
        .map(|entity| {
            let keys = sorts.iter().map(|s| property_of(store, &entity, &s.property)).collect();
            (keys, entity)
        })
        .collect();
    keyed.sort_by(|(a, _), (b, _)| {
        sorts
            .iter()
            .zip(a.iter().zip(b.iter()))
            .map(|(sort, (x, y))| sort.compare(x.as_ref(), y.as_ref()))
            .find(|ord| ord.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    keyed.into_iter().map(|(_, entity)| entity).collect()
}
