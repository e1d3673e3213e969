//! Validation errors shaped like the bundle tree they describe

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Property-level messages for one bundle plus one child set per nested
/// bundle, positionally aligned with the bundle's relation lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorSet {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    errors: BTreeMap<String, Vec<String>>,
    #[serde(default, rename = "relationships", skip_serializing_if = "BTreeMap::is_empty")]
    relations: BTreeMap<String, Vec<ErrorSet>>,
}

impl ErrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, key: &str, message: impl Into<String>) {
        self.errors
            .entry(key.to_string())
            .or_default()
            .push(message.into());
    }

    /// Attach child sets for a relation; dropped if none of them has errors
    pub fn add_relation(&mut self, relation: &str, children: Vec<ErrorSet>) {
        if children.iter().any(|c| !c.is_empty()) {
            self.relations.insert(relation.to_string(), children);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.relations.values().flatten().all(ErrorSet::is_empty)
    }

    pub fn errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    pub fn errors_for(&self, key: &str) -> &[String] {
        self.errors.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn relations(&self) -> &BTreeMap<String, Vec<ErrorSet>> {
        &self.relations
    }

    /// Child set for the nested bundle at `relation[index]`
    pub fn child(&self, relation: &str, index: usize) -> Option<&ErrorSet> {
        self.relations.get(relation).and_then(|sets| sets.get(index))
    }

    /// Total number of messages in the whole tree
    pub fn error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum::<usize>()
            + self
                .relations
                .values()
                .flatten()
                .map(ErrorSet::error_count)
                .sum::<usize>()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    fn describe(&self, path: &str, out: &mut Vec<String>) {
        for (key, messages) in &self.errors {
            for message in messages {
                if path.is_empty() {
                    out.push(format!("{}: {}", key, message));
                } else {
                    out.push(format!("{}/{}: {}", path, key, message));
                }
            }
        }
        for (relation, children) in &self.relations {
            for (i, child) in children.iter().enumerate() {
                let child_path = if path.is_empty() {
                    format!("{}[{}]", relation, i)
                } else {
                    format!("{}/{}[{}]", path, relation, i)
                };
                child.describe(&child_path, out);
            }
        }
    }
}

impl fmt::Display for ErrorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::new();
        self.describe("", &mut lines);
        write!(f, "{}", lines.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_errors() {
        let mut child = ErrorSet::new();
        child.add_error("title", "is required");

        let mut root = ErrorSet::new();
        assert!(root.is_empty());
        root.add_relation("describes", vec![ErrorSet::new(), child]);
        root.add_error("identifier", "is required");

        assert!(!root.is_empty());
        assert_eq!(root.error_count(), 2);
        assert_eq!(root.child("describes", 1).unwrap().errors_for("title"), ["is required"]);
        assert_eq!(
            root.to_string(),
            "identifier: is required; describes[1]/title: is required"
        );
    }

    #[test]
    fn test_clean_children_are_dropped() {
        let mut root = ErrorSet::new();
        root.add_relation("describes", vec![ErrorSet::new(), ErrorSet::new()]);
        assert!(root.is_empty());
        assert_eq!(root.to_json(), "{}");
    }

    #[test]
    fn test_json_shape() {
        let mut child = ErrorSet::new();
        child.add_error("languageCode", "is required");
        let mut root = ErrorSet::new();
        root.add_relation("describes", vec![child]);
        assert_eq!(
            root.to_json(),
            r#"{"relationships":{"describes":[{"errors":{"languageCode":["is required"]}}]}}"#
        );
    }
}
