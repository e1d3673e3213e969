//! Stable ID generation
//!
//! IDs are namespaced by the permission-scope path so the same local
//! identifier can recur under different parents:
//! - `Identifier`: `us-r1-c1` for identifier `c1` under scopes `us`, `r1`
//! - `Description`: `us-r1-c1.en` for a description in `en` of `us-r1-c1`
//! - `Generated`: a random UUID

use crate::bundle::Bundle;
use crate::graph::PropertyValue;
use crate::schema::{IdPolicy, SchemaRegistry};

pub const SCOPE_SEPARATOR: char = '-';
pub const DESCRIPTION_SEPARATOR: char = '.';

/// Normalise a free-text identifier into an ID segment
pub fn slug(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Join scope segments (already normalised) and a local identifier into a
/// hierarchical ID
pub fn join_path(scopes: &[String], identifier: &str) -> String {
    let mut parts = scopes.to_vec();
    parts.push(slug(identifier));
    parts.join(&SCOPE_SEPARATOR.to_string())
}

fn non_blank<'a>(bundle: &'a Bundle, key: &str) -> Option<&'a str> {
    bundle
        .value(key)
        .and_then(PropertyValue::as_string)
        .filter(|s| !s.trim().is_empty())
}

/// ID for `bundle` under `scopes`, or `None` when the data needed by the
/// type's policy is missing (validation reports that separately)
pub fn generate_id(registry: &SchemaRegistry, bundle: &Bundle, scopes: &[String]) -> Option<String> {
    let policy = registry
        .get(bundle.entity_type())
        .map_or(IdPolicy::Generated, |schema| schema.id_policy);

    match policy {
        IdPolicy::Identifier => non_blank(bundle, "identifier").map(|ident| join_path(scopes, ident)),
        IdPolicy::Description => {
            let lang = non_blank(bundle, "languageCode")?;
            let mut id = match scopes.last() {
                Some(parent) => format!("{}{}{}", parent, DESCRIPTION_SEPARATOR, slug(lang)),
                None => slug(lang),
            };
            if let Some(ident) = non_blank(bundle, "identifier") {
                id.push(SCOPE_SEPARATOR);
                id.push_str(&slug(ident));
            }
            Some(id)
        }
        IdPolicy::Generated => Some(uuid::Uuid::new_v4().to_string()),
    }
}
