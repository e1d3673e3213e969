//! Property values stored on vertices, edges and bundles
//!
//! Values serialize untagged, so a property map reads as plain JSON:
//! `{"identifier": "c1", "extent": 3, "languages": ["en", "fr"]}`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Scalar or list-of-scalar property value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<PropertyValue>),
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<PropertyValue>> {
        match self {
            PropertyValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// True for null, whitespace-only strings and empty arrays.
    pub fn is_blank(&self) -> bool {
        match self {
            PropertyValue::Null => true,
            PropertyValue::String(s) => s.trim().is_empty(),
            PropertyValue::Array(arr) => arr.iter().all(PropertyValue::is_blank),
            _ => false,
        }
    }

    /// Plain-text rendering used by textual predicates: strings unquoted.
    pub fn to_text(&self) -> String {
        match self {
            PropertyValue::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "Null",
            PropertyValue::Boolean(_) => "Boolean",
            PropertyValue::Integer(_) => "Integer",
            PropertyValue::Float(_) => "Float",
            PropertyValue::String(_) => "String",
            PropertyValue::Array(_) => "Array",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            PropertyValue::Null => 0,
            PropertyValue::Boolean(_) => 1,
            PropertyValue::Integer(_) => 2,
            PropertyValue::Float(_) => 3,
            PropertyValue::String(_) => 4,
            PropertyValue::Array(_) => 5,
        }
    }

    /// Ordering for sorting user data: integers and floats compare numerically,
    /// other mixed kinds fall back to the total order.
    pub fn compare_loose(&self, other: &PropertyValue) -> Ordering {
        match (self, other) {
            (PropertyValue::Integer(a), PropertyValue::Float(b)) => (*a as f64).total_cmp(b),
            (PropertyValue::Float(a), PropertyValue::Integer(b)) => a.total_cmp(&(*b as f64)),
            _ => self.cmp(other),
        }
    }
}

// Total order so values can key the BTreeMap property indices.
impl Ord for PropertyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (PropertyValue::Null, PropertyValue::Null) => Ordering::Equal,
            (PropertyValue::Boolean(a), PropertyValue::Boolean(b)) => a.cmp(b),
            (PropertyValue::Integer(a), PropertyValue::Integer(b)) => a.cmp(b),
            (PropertyValue::Float(a), PropertyValue::Float(b)) => a.total_cmp(b),
            (PropertyValue::String(a), PropertyValue::String(b)) => a.cmp(b),
            (PropertyValue::Array(a), PropertyValue::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for PropertyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PropertyValue {}

impl Hash for PropertyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            PropertyValue::Null => {}
            PropertyValue::Boolean(b) => b.hash(state),
            PropertyValue::Integer(i) => i.hash(state),
            PropertyValue::Float(f) => f.to_bits().hash(state),
            PropertyValue::String(s) => s.hash(state),
            PropertyValue::Array(arr) => arr.hash(state),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => write!(f, "null"),
            PropertyValue::Boolean(b) => write!(f, "{}", b),
            PropertyValue::Integer(i) => write!(f, "{}", i),
            PropertyValue::Float(fl) => write!(f, "{}", fl),
            PropertyValue::String(s) => write!(f, "\"{}\"", s),
            PropertyValue::Array(arr) => {
                write!(f, "[")?;
                for (i, val) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", val)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Integer(i)
    }
}

impl From<i32> for PropertyValue {
    fn from(i: i32) -> Self {
        PropertyValue::Integer(i as i64)
    }
}

impl From<usize> for PropertyValue {
    fn from(i: usize) -> Self {
        PropertyValue::Integer(i as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(f: f64) -> Self {
        PropertyValue::Float(f)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Boolean(b)
    }
}

impl From<Vec<PropertyValue>> for PropertyValue {
    fn from(arr: Vec<PropertyValue>) -> Self {
        PropertyValue::Array(arr)
    }
}

impl From<Vec<&str>> for PropertyValue {
    fn from(arr: Vec<&str>) -> Self {
        PropertyValue::Array(arr.into_iter().map(PropertyValue::from).collect())
    }
}

/// Property map for vertices and edges
pub type PropertyMap = HashMap<String, PropertyValue>;
