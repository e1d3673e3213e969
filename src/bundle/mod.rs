//! Tree-shaped document model
//!
//! A [`Bundle`] is one entity's data plus its nested relations, the unit of
//! persistence I/O. Bundles are values: every `with_*` method returns a new
//! bundle and leaves the receiver untouched.
//!
//! Text form:
//!
//! ```json
//! {"id": "us-c1", "type": "Unit", "data": {"identifier": "c1"},
//!  "relationships": {"describes": [{"type": "UnitDescription", "data": {...}}]}}
//! ```

pub mod error_set;
pub mod path;

pub use error_set::ErrorSet;
pub use path::{BundlePath, PathError};

use crate::error::EngineResult;
use crate::graph::PropertyValue;
use crate::persistence::idgen;
use crate::schema::{SchemaRegistry, TypeSchema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use tracing::warn;

/// Data keys starting with this prefix are engine-managed and ignored when
/// bundles are compared
pub const MANAGED_PREFIX: &str = "_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(default)]
    data: BTreeMap<String, PropertyValue>,
    #[serde(default, rename = "relationships", skip_serializing_if = "BTreeMap::is_empty")]
    relations: BTreeMap<String, Vec<Bundle>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    meta: BTreeMap<String, serde_json::Value>,
}

impl Bundle {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Bundle {
            entity_type: entity_type.into(),
            ..Bundle::default()
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn data(&self) -> &BTreeMap<String, PropertyValue> {
        &self.data
    }

    pub fn value(&self, key: &str) -> Option<&PropertyValue> {
        self.data.get(key)
    }

    pub fn relations(&self) -> &BTreeMap<String, Vec<Bundle>> {
        &self.relations
    }

    /// Nested bundles of one relation; empty if absent
    pub fn relation(&self, name: &str) -> &[Bundle] {
        self.relations.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn meta(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.meta
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn without_id(mut self) -> Self {
        self.id = None;
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn without_value(mut self, key: &str) -> Self {
        self.data.remove(key);
        self
    }

    pub fn with_data(mut self, data: BTreeMap<String, PropertyValue>) -> Self {
        self.data = data;
        self
    }

    /// Replace one relation's nested bundles
    pub fn with_relation(mut self, name: impl Into<String>, bundles: Vec<Bundle>) -> Self {
        self.relations.insert(name.into(), bundles);
        self
    }

    /// Append one nested bundle to a relation
    pub fn with_relation_item(mut self, name: impl Into<String>, bundle: Bundle) -> Self {
        self.relations.entry(name.into()).or_default().push(bundle);
        self
    }

    pub fn without_relation(mut self, name: &str) -> Self {
        self.relations.remove(name);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Data without managed keys or null values
    pub fn user_data(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.data
            .iter()
            .filter(|(key, value)| !key.starts_with(MANAGED_PREFIX) && !value.is_null())
    }

    /// Nested bundles on the schema's dependent relations, with the
    /// relation each hangs from
    pub fn dependents_only<'s>(&'s self, schema: &'s TypeSchema) -> impl Iterator<Item = (&'s str, &'s Bundle)> + 's {
        schema.dependents().flat_map(move |relation| {
            self.relation(&relation.name)
                .iter()
                .map(move |child| (relation.name.as_str(), child))
        })
    }

    /// Nesting depth: 0 for a bundle without nested bundles
    pub fn depth(&self) -> usize {
        self.relations
            .values()
            .flatten()
            .map(|child| child.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Number of bundles in the tree, this one included
    pub fn count(&self) -> usize {
        1 + self
            .relations
            .values()
            .flatten()
            .map(Bundle::count)
            .sum::<usize>()
    }

    /// PATCH-style merge: `patch` values overwrite, null values delete,
    /// nested bundles are merged into the child with the same ID.
    pub fn merge_data_with(&self, patch: &Bundle) -> Bundle {
        let mut merged = self.clone();
        for (key, value) in &patch.data {
            if value.is_null() {
                merged.data.remove(key);
            } else {
                merged.data.insert(key.clone(), value.clone());
            }
        }
        for (relation, patches) in &patch.relations {
            for child_patch in patches {
                let target = merged
                    .relations
                    .get_mut(relation)
                    .and_then(|children| {
                        children
                            .iter_mut()
                            .find(|c| c.id.is_some() && c.id == child_patch.id)
                    });
                match target {
                    Some(child) => *child = child.merge_data_with(child_patch),
                    None => warn!(
                        "ignoring patch for unknown nested bundle {:?} in '{}'",
                        child_patch.id, relation
                    ),
                }
            }
        }
        merged
    }

    /// Remove, at any depth, every nested bundle for which `predicate`
    /// returns true
    pub fn filter_relations<F>(&self, predicate: F) -> Bundle
    where
        F: Fn(&str, &Bundle) -> bool,
    {
        self.filter_with(&predicate)
    }

    fn filter_with(&self, predicate: &dyn Fn(&str, &Bundle) -> bool) -> Bundle {
        let mut out = self.clone();
        for (relation, children) in out.relations.iter_mut() {
            *children = children
                .iter()
                .filter(|child| !predicate(relation.as_str(), *child))
                .map(|child| child.filter_with(predicate))
                .collect();
        }
        out.relations.retain(|_, children| !children.is_empty());
        out
    }

    /// Fill in missing IDs through each type's ID policy. `scopes` is the
    /// identifier path of the containing permission scopes; every nested
    /// bundle is generated under its parent's ID.
    pub fn generate_ids(&self, registry: &SchemaRegistry, scopes: &[String]) -> Bundle {
        let mut out = self.clone();
        if out.id.is_none() {
            out.id = idgen::generate_id(registry, &out, scopes);
        }
        let mut child_scopes = scopes.to_vec();
        if let Some(id) = &out.id {
            child_scopes.push(id.clone());
        }

        let schema = registry.get(&out.entity_type);
        for (relation, children) in out.relations.iter_mut() {
            let dependent = schema
                .and_then(|s| s.relation_named(relation))
                .map_or(false, |r| r.is_dependent());
            if dependent {
                for child in children.iter_mut() {
                    *child = child.generate_ids(registry, &child_scopes);
                }
            }
        }
        out
    }

    pub fn from_json(text: &str) -> EngineResult<Bundle> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_value(value: serde_json::Value) -> EngineResult<Bundle> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a JSON array of bundles
    pub fn list_from_reader<R: Read>(reader: R) -> EngineResult<Vec<Bundle>> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Lazily read whitespace- or newline-separated bundle objects
    pub fn stream<R: Read>(reader: R) -> impl Iterator<Item = EngineResult<Bundle>> {
        serde_json::Deserializer::from_reader(reader)
            .into_iter::<Bundle>()
            .map(|item| item.map_err(Into::into))
    }
}

/// Structural equality used for mutation detection: IDs, meta, managed
/// keys and null values are ignored, nested bundles compare in order.
impl PartialEq for Bundle {
    fn eq(&self, other: &Self) -> bool {
        self.entity_type == other.entity_type
            && self.user_data().eq(other.user_data())
            && self
                .relations
                .iter()
                .filter(|(_, children)| !children.is_empty())
                .eq(other.relations.iter().filter(|(_, children)| !children.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Bundle {
        Bundle::new("Unit").with_value("identifier", "c1").with_relation(
            "describes",
            vec![Bundle::new("UnitDescription")
                .with_value("languageCode", "en")
                .with_value("title", "Test")],
        )
    }

    #[test]
    fn test_builders_leave_original_untouched() {
        let a = unit();
        let b = a.clone().with_value("identifier", "c2");
        assert_eq!(a.value("identifier"), Some(&PropertyValue::from("c1")));
        assert_eq!(b.value("identifier"), Some(&PropertyValue::from("c2")));
        assert_ne!(a, b);
    }

    #[test]
    fn test_equality_ignores_ids_and_managed_keys() {
        let a = unit();
        let b = unit().with_id("us-c1").with_value("_lastSeen", "yesterday");
        assert_eq!(a, b);

        let c = unit().with_relation("hasDate", vec![]);
        assert_eq!(a, c);

        let d = unit().with_value("note", PropertyValue::Null);
        assert_eq!(a, d);
    }

    #[test]
    fn test_child_order_matters() {
        let d1 = Bundle::new("UnitDescription").with_value("languageCode", "en");
        let d2 = Bundle::new("UnitDescription").with_value("languageCode", "fr");
        let a = Bundle::new("Unit").with_relation("describes", vec![d1.clone(), d2.clone()]);
        let b = Bundle::new("Unit").with_relation("describes", vec![d2, d1]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_json_round_trip_shape() {
        let text = r#"{"type":"Unit","data":{"identifier":"c1"},"relationships":{"describes":[{"type":"UnitDescription","data":{"languageCode":"en","title":"Test"}}]}}"#;
        let bundle = Bundle::from_json(text).unwrap();
        assert_eq!(bundle, unit());
        assert_eq!(bundle.to_json().unwrap(), text);
        assert!(Bundle::from_json("{\"data\":{}}").is_err());
    }

    #[test]
    fn test_depth_and_count() {
        let date = Bundle::new("DatePeriod").with_value("startDate", "1939");
        let desc = Bundle::new("UnitDescription").with_relation_item("hasDate", date);
        let root = Bundle::new("Unit").with_relation_item("describes", desc);
        assert_eq!(root.depth(), 2);
        assert_eq!(root.count(), 3);
        assert_eq!(Bundle::new("Unit").depth(), 0);
    }

    #[test]
    fn test_dependents_only_skips_references() {
        let registry = SchemaRegistry::archival();
        let schema = registry.get("Unit").unwrap();
        let root = Bundle::new("Unit")
            .with_relation_item("describes", Bundle::new("UnitDescription"))
            .with_relation_item("heldBy", Bundle::new("Repository").with_id("r1"));
        let found: Vec<(&str, &str)> = root
            .dependents_only(schema)
            .map(|(relation, child)| (relation, child.entity_type()))
            .collect();
        assert_eq!(found, vec![("describes", "UnitDescription")]);
    }

    #[test]
    fn test_merge_data_with_patch() {
        let base = unit()
            .with_id("us-c1")
            .with_relation(
                "describes",
                vec![Bundle::new("UnitDescription")
                    .with_id("us-c1.en")
                    .with_value("title", "Old")
                    .with_value("scope", "x")],
            );
        let patch = Bundle::new("Unit")
            .with_value("identifier", PropertyValue::Null)
            .with_value("extent", "3 boxes")
            .with_relation(
                "describes",
                vec![
                    Bundle::new("UnitDescription")
                        .with_id("us-c1.en")
                        .with_value("title", "New"),
                    Bundle::new("UnitDescription").with_id("elsewhere"),
                ],
            );

        let merged = base.merge_data_with(&patch);
        assert!(merged.value("identifier").is_none());
        assert_eq!(merged.value("extent"), Some(&PropertyValue::from("3 boxes")));
        let desc = &merged.relation("describes")[0];
        assert_eq!(desc.value("title"), Some(&PropertyValue::from("New")));
        assert_eq!(desc.value("scope"), Some(&PropertyValue::from("x")));
        assert_eq!(merged.relation("describes").len(), 1);
    }

    #[test]
    fn test_filter_relations() {
        let filtered = unit().filter_relations(|_, child| child.value("languageCode") == Some(&PropertyValue::from("en")));
        assert!(filtered.relations().is_empty());
        assert_eq!(filtered.value("identifier"), Some(&PropertyValue::from("c1")));
    }

    #[test]
    fn test_generate_ids_threads_scopes() {
        let registry = SchemaRegistry::archival();
        let scopes = vec!["us".to_string(), "r1".to_string()];
        let bundle = unit().generate_ids(&registry, &scopes);
        assert_eq!(bundle.id(), Some("us-r1-c1"));
        assert_eq!(bundle.relation("describes")[0].id(), Some("us-r1-c1.en"));

        let kept = unit().with_id("fixed").generate_ids(&registry, &scopes);
        assert_eq!(kept.id(), Some("fixed"));
        assert_eq!(kept.relation("describes")[0].id(), Some("fixed.en"));
    }

    #[test]
    fn test_stream_reads_concatenated_objects() {
        let text = r#"{"type":"Unit","data":{"identifier":"a"}}
{"type":"Unit","data":{"identifier":"b"}}"#;
        let bundles: Vec<Bundle> = Bundle::stream(text.as_bytes())
            .collect::<EngineResult<Vec<_>>>()
            .unwrap();
        assert_eq!(bundles.len(), 2);

        let list = Bundle::list_from_reader("[{\"type\":\"Country\"}]".as_bytes()).unwrap();
        assert_eq!(list[0].entity_type(), "Country");
    }
}
