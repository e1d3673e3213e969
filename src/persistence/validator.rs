//! Schema validation of whole bundle trees
//!
//! Validation never stops at the first problem: every violation in the
//! tree is collected into an [`ErrorSet`] shaped like the bundle.

use crate::bundle::{Bundle, ErrorSet};
use crate::graph::{GraphStore, PropertyValue};
use crate::index::EntityIndex;
use crate::schema::{Cardinality, SchemaRegistry, TypeSchema};
use std::collections::HashMap;

const MISSING: &str = "is required";
const NOT_UNIQUE: &str = "must be unique";

pub struct BundleValidator<'a> {
    registry: &'a SchemaRegistry,
    store: &'a GraphStore,
}

impl<'a> BundleValidator<'a> {
    pub fn new(registry: &'a SchemaRegistry, store: &'a GraphStore) -> Self {
        BundleValidator { registry, store }
    }

    /// Errors that block creating `bundle`. IDs are expected to have been
    /// generated already.
    pub fn validate_for_create(&self, bundle: &Bundle) -> ErrorSet {
        let mut errors = self.validate(bundle);
        if bundle.id().is_none() && self.registry.get(bundle.entity_type()).is_some() {
            errors.add_error("id", "could not be generated");
        }
        errors
    }

    /// Errors that block updating `bundle`; the root must carry its ID
    pub fn validate_for_update(&self, bundle: &Bundle) -> ErrorSet {
        let mut errors = self.validate(bundle);
        if bundle.id().is_none() {
            errors.add_error("id", "is required for an update");
        }
        errors
    }

    fn validate(&self, bundle: &Bundle) -> ErrorSet {
        let mut seen = HashMap::new();
        self.count_ids(bundle, &mut seen);
        self.check(bundle, &seen, true)
    }

    fn check(&self, bundle: &Bundle, ids: &HashMap<String, usize>, root: bool) -> ErrorSet {
        let mut errors = ErrorSet::new();
        let schema = match self.registry.get(bundle.entity_type()) {
            Some(schema) => schema,
            None => {
                errors.add_error("type", format!("unknown entity type '{}'", bundle.entity_type()));
                return errors;
            }
        };

        match bundle.id() {
            Some(id) if ids.get(id).copied().unwrap_or(0) > 1 => {
                errors.add_error("id", format!("duplicate id '{}' in bundle", id));
            }
            None if !root => errors.add_error("id", "could not be generated"),
            _ => {}
        }

        self.check_data(bundle, schema, &mut errors);

        for (name, children) in bundle.relations() {
            let relation = match schema.relation_named(name) {
                Some(relation) => relation,
                None => {
                    errors.add_error(name, format!("unknown relation for {}", schema.name));
                    continue;
                }
            };
            if relation.cardinality == Cardinality::One && children.len() > 1 {
                errors.add_error(name, format!("allows one item, found {}", children.len()));
            }
            let child_errors: Vec<ErrorSet> = if relation.is_dependent() {
                children.iter().map(|child| self.check(child, ids, false)).collect()
            } else {
                children.iter().map(check_reference).collect()
            };
            errors.add_relation(name, child_errors);
        }
        errors
    }

    /// Occurrences of each ID among the root and its dependents. References
    /// may repeat a target and are not counted.
    fn count_ids(&self, bundle: &Bundle, seen: &mut HashMap<String, usize>) {
        if let Some(id) = bundle.id() {
            *seen.entry(id.to_string()).or_insert(0) += 1;
        }
        let schema = match self.registry.get(bundle.entity_type()) {
            Some(schema) => schema,
            None => return,
        };
        for (_, child) in bundle.dependents_only(schema) {
            self.count_ids(child, seen);
        }
    }

    fn check_data(&self, bundle: &Bundle, schema: &TypeSchema, errors: &mut ErrorSet) {
        for key in &schema.mandatory {
            if bundle.value(key).map_or(true, PropertyValue::is_blank) {
                errors.add_error(key, MISSING);
            }
        }

        for (key, allowed) in &schema.enums {
            let values: Vec<&PropertyValue> = match bundle.value(key) {
                Some(PropertyValue::Array(items)) => items.iter().collect(),
                Some(PropertyValue::Null) | None => Vec::new(),
                Some(value) => vec![value],
            };
            for value in values {
                let text = value.to_text();
                if !allowed.contains(&text) {
                    errors.add_error(key, format!("'{}' is not one of {}", text, allowed.join(", ")));
                }
            }
        }

        for key in &schema.unique {
            let value = match bundle.value(key) {
                Some(value) if !value.is_blank() => value,
                _ => continue,
            };
            let clash = self
                .store
                .find(key, value, &schema.name)
                .into_iter()
                .any(|other| Some(other.id.as_str()) != bundle.id());
            if clash {
                errors.add_error(key, NOT_UNIQUE);
            }
        }
    }
}

fn check_reference(target: &Bundle) -> ErrorSet {
    let mut errors = ErrorSet::new();
    if target.id().is_none() {
        errors.add_error("id", "a reference needs the target's id");
    }
    errors
}
