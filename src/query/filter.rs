//! Property filters and sort keys
//!
//! Filters are built from a property name, a [`FilterPredicate`] and a
//! value, or parsed from the textual form `prop__PRED:value`. Sort keys
//! parse from `prop` or `prop__DESC`.

use crate::error::{EngineError, EngineResult};
use crate::graph::PropertyValue;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Separates a property name from its predicate or sort direction
const SPEC_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterPredicate {
    Equals,
    IEquals,
    StartsWith,
    EndsWith,
    Contains,
    IContains,
    Matches,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterPredicate {
    pub const ALL: [FilterPredicate; 11] = [
        FilterPredicate::Equals,
        FilterPredicate::IEquals,
        FilterPredicate::StartsWith,
        FilterPredicate::EndsWith,
        FilterPredicate::Contains,
        FilterPredicate::IContains,
        FilterPredicate::Matches,
        FilterPredicate::Gt,
        FilterPredicate::Gte,
        FilterPredicate::Lt,
        FilterPredicate::Lte,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterPredicate::Equals => "EQUALS",
            FilterPredicate::IEquals => "IEQUALS",
            FilterPredicate::StartsWith => "STARTSWITH",
            FilterPredicate::EndsWith => "ENDSWITH",
            FilterPredicate::Contains => "CONTAINS",
            FilterPredicate::IContains => "ICONTAINS",
            FilterPredicate::Matches => "MATCHES",
            FilterPredicate::Gt => "GT",
            FilterPredicate::Gte => "GTE",
            FilterPredicate::Lt => "LT",
            FilterPredicate::Lte => "LTE",
        }
    }
}

impl fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterPredicate {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        FilterPredicate::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EngineError::InvalidQuery(format!("unknown predicate '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        if s.eq_ignore_ascii_case("ASC") {
            Ok(SortOrder::Asc)
        } else if s.eq_ignore_ascii_case("DESC") {
            Ok(SortOrder::Desc)
        } else {
            Err(EngineError::InvalidQuery(format!("unknown sort order '{}'", s)))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub property: String,
    pub order: SortOrder,
}

impl Sort {
    pub fn new(property: impl Into<String>, order: SortOrder) -> Self {
        Sort {
            property: property.into(),
            order,
        }
    }

    /// `title` sorts ascending, `title__DESC` descending
    pub fn parse(spec: &str) -> EngineResult<Self> {
        let (property, order) = match spec.rsplit_once(SPEC_SEPARATOR) {
            Some((property, order)) => (property, order.parse()?),
            None => (spec, SortOrder::Asc),
        };
        if property.is_empty() {
            return Err(EngineError::InvalidQuery(format!("missing property in sort '{}'", spec)));
        }
        Ok(Sort::new(property, order))
    }

    /// Nulls sort last in either direction
    pub fn compare(&self, a: Option<&PropertyValue>, b: Option<&PropertyValue>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => {
                let ord = a.compare_loose(b);
                match self.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub property: String,
    pub predicate: FilterPredicate,
    pub value: PropertyValue,
    regex: Option<Regex>,
}

impl Filter {
    /// Regex patterns are compiled here, once per filter
    pub fn new(property: impl Into<String>, predicate: FilterPredicate, value: impl Into<PropertyValue>) -> EngineResult<Self> {
        let value = value.into();
        let regex = match predicate {
            FilterPredicate::Matches => Some(
                Regex::new(&value.to_text())
                    .map_err(|e| EngineError::InvalidQuery(format!("bad pattern '{}': {}", value, e)))?,
            ),
            _ => None,
        };
        Ok(Filter {
            property: property.into(),
            predicate,
            value,
            regex,
        })
    }

    /// Parse `prop__PRED:value`; without a predicate the filter is EQUALS.
    /// The value is kept as a string and compared numerically when both
    /// sides read as numbers.
    pub fn parse(spec: &str) -> EngineResult<Self> {
        let (lhs, value) = spec
            .split_once(':')
            .ok_or_else(|| EngineError::InvalidQuery(format!("filter '{}' has no value", spec)))?;
        let (property, predicate) = match lhs.rsplit_once(SPEC_SEPARATOR) {
            Some((property, pred)) => match pred.parse::<FilterPredicate>() {
                Ok(predicate) => (property, predicate),
                Err(_) => (lhs, FilterPredicate::Equals),
            },
            None => (lhs, FilterPredicate::Equals),
        };
        if property.is_empty() {
            return Err(EngineError::InvalidQuery(format!("missing property in filter '{}'", spec)));
        }
        Filter::new(property, predicate, value)
    }

    /// Missing values never match; arrays match if any element does
    pub fn test(&self, candidate: Option<&PropertyValue>) -> bool {
        match candidate {
            None | Some(PropertyValue::Null) => false,
            Some(PropertyValue::Array(items)) => items.iter().any(|v| self.test_scalar(v)),
            Some(value) => self.test_scalar(value),
        }
    }

    fn test_scalar(&self, candidate: &PropertyValue) -> bool {
        let text = || candidate.to_text();
        let wanted = || self.value.to_text();
        match self.predicate {
            FilterPredicate::Equals => compare(candidate, &self.value) == Ordering::Equal,
            FilterPredicate::IEquals => text().to_lowercase() == wanted().to_lowercase(),
            FilterPredicate::StartsWith => text().starts_with(&wanted()),
            FilterPredicate::EndsWith => text().ends_with(&wanted()),
            FilterPredicate::Contains => text().contains(&wanted()),
            FilterPredicate::IContains => text().to_lowercase().contains(&wanted().to_lowercase()),
            FilterPredicate::Matches => self.regex.as_ref().map_or(false, |re| re.is_match(&text())),
            FilterPredicate::Gt => compare(candidate, &self.value) == Ordering::Greater,
            FilterPredicate::Gte => compare(candidate, &self.value) != Ordering::Less,
            FilterPredicate::Lt => compare(candidate, &self.value) == Ordering::Less,
            FilterPredicate::Lte => compare(candidate, &self.value) != Ordering::Greater,
        }
    }
}

/// Numbers numerically (including numeric strings), everything else as text
fn compare(a: &PropertyValue, b: &PropertyValue) -> Ordering {
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        _ => a.to_text().cmp(&b.to_text()),
    }
}

fn numeric(value: &PropertyValue) -> Option<f64> {
    match value {
        PropertyValue::String(s) => s.trim().parse().ok(),
        PropertyValue::Boolean(_) => None,
        other => other.as_float(),
    }
}
