//! Path addressing inside a bundle tree
//!
//! Syntax: `relation[index]/relation[index]/...`, optionally ending in a bare
//! name which addresses a data key (`describes[0]/title`) or a whole
//! relation list (`describes[0]/hasDate`). Index `-1` means "append" when
//! setting and is out of bounds everywhere else.

use super::Bundle;
use crate::graph::PropertyValue;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error("Malformed path '{0}'")]
    Syntax(String),

    #[error("No relation '{relation}' at '{path}'")]
    MissingSegment { path: String, relation: String },

    #[error("Index {index} out of bounds for '{relation}' ({len} items)")]
    Index { relation: String, index: i64, len: usize },
}

pub type PathResult<T> = Result<T, PathError>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    relation: String,
    index: i64,
}

impl Segment {
    /// Position of an existing item; -1 and overflow are index errors
    fn position(&self, len: usize) -> PathResult<usize> {
        if self.index >= 0 && (self.index as usize) < len {
            Ok(self.index as usize)
        } else {
            Err(PathError::Index {
                relation: self.relation.clone(),
                index: self.index,
                len,
            })
        }
    }
}

/// A parsed bundle path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePath {
    segments: Vec<Segment>,
    terminal: Option<String>,
    text: String,
}

impl FromStr for BundlePath {
    type Err = PathError;

    fn from_str(text: &str) -> PathResult<Self> {
        let mut segments = Vec::new();
        let mut terminal = None;
        let trimmed = text.trim_matches('/');
        if !trimmed.is_empty() {
            let parts: Vec<&str> = trimmed.split('/').collect();
            for (i, part) in parts.iter().enumerate() {
                match part.find('[') {
                    Some(open) if part.ends_with(']') => {
                        let relation = &part[..open];
                        let index: i64 = part[open + 1..part.len() - 1]
                            .trim()
                            .parse()
                            .map_err(|_| PathError::Syntax(text.to_string()))?;
                        if relation.is_empty() || index < -1 {
                            return Err(PathError::Syntax(text.to_string()));
                        }
                        segments.push(Segment {
                            relation: relation.to_string(),
                            index,
                        });
                    }
                    None if i == parts.len() - 1 && !part.is_empty() => {
                        terminal = Some(part.to_string());
                    }
                    _ => return Err(PathError::Syntax(text.to_string())),
                }
            }
        }
        Ok(BundlePath {
            segments,
            terminal,
            text: text.to_string(),
        })
    }
}

impl fmt::Display for BundlePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl BundlePath {
    fn no_terminal(&self) -> PathResult<()> {
        match self.terminal {
            Some(_) => Err(PathError::Syntax(self.text.clone())),
            None => Ok(()),
        }
    }

    fn terminal(&self) -> PathResult<&str> {
        self.terminal
            .as_deref()
            .ok_or_else(|| PathError::Syntax(self.text.clone()))
    }

    fn split_last(&self) -> PathResult<(&[Segment], &Segment)> {
        self.segments
            .split_last()
            .map(|(last, parents)| (parents, last))
            .ok_or_else(|| PathError::Syntax(self.text.clone()))
    }
}

fn navigate<'b>(mut bundle: &'b Bundle, segments: &[Segment], text: &str) -> PathResult<&'b Bundle> {
    for segment in segments {
        let children = bundle
            .relations
            .get(&segment.relation)
            .ok_or_else(|| PathError::MissingSegment {
                path: text.to_string(),
                relation: segment.relation.clone(),
            })?;
        bundle = &children[segment.position(children.len())?];
    }
    Ok(bundle)
}

/// Copy of `bundle` with `edit` applied to the bundle at `segments`
fn rewrite<F>(bundle: &Bundle, segments: &[Segment], text: &str, edit: F) -> PathResult<Bundle>
where
    F: FnOnce(&mut Bundle) -> PathResult<()>,
{
    let mut out = bundle.clone();
    match segments.split_first() {
        None => edit(&mut out)?,
        Some((segment, rest)) => {
            let children = out
                .relations
                .get_mut(&segment.relation)
                .ok_or_else(|| PathError::MissingSegment {
                    path: text.to_string(),
                    relation: segment.relation.clone(),
                })?;
            let pos = segment.position(children.len())?;
            children[pos] = rewrite(&children[pos], rest, text, edit)?;
        }
    }
    Ok(out)
}

impl Bundle {
    /// The nested bundle at `path`; the empty path is the bundle itself
    pub fn get_bundle(&self, path: &str) -> PathResult<&Bundle> {
        let path: BundlePath = path.parse()?;
        path.no_terminal()?;
        navigate(self, &path.segments, &path.text)
    }

    /// Replace the nested bundle at `path`, or append with index -1
    pub fn set_bundle(&self, path: &str, bundle: Bundle) -> PathResult<Bundle> {
        let path: BundlePath = path.parse()?;
        path.no_terminal()?;
        let (parents, last) = path.split_last()?;
        rewrite(self, parents, &path.text, |parent| {
            let children = parent.relations.entry(last.relation.clone()).or_default();
            if last.index == -1 {
                children.push(bundle);
            } else {
                let pos = last.position(children.len())?;
                children[pos] = bundle;
            }
            Ok(())
        })
    }

    /// Remove the nested bundle (and its subtree) at `path`
    pub fn delete_bundle(&self, path: &str) -> PathResult<Bundle> {
        let path: BundlePath = path.parse()?;
        path.no_terminal()?;
        let (parents, last) = path.split_last()?;
        rewrite(self, parents, &path.text, |parent| {
            let children = parent
                .relations
                .get_mut(&last.relation)
                .ok_or_else(|| PathError::MissingSegment {
                    path: path.text.clone(),
                    relation: last.relation.clone(),
                })?;
            let pos = last.position(children.len())?;
            children.remove(pos);
            if children.is_empty() {
                parent.relations.remove(&last.relation);
            }
            Ok(())
        })
    }

    /// The relation list named by the path's final bare segment
    pub fn get_relations(&self, path: &str) -> PathResult<&[Bundle]> {
        let path: BundlePath = path.parse()?;
        let relation = path.terminal()?;
        let owner = navigate(self, &path.segments, &path.text)?;
        owner
            .relations
            .get(relation)
            .map(Vec::as_slice)
            .ok_or_else(|| PathError::MissingSegment {
                path: path.text.clone(),
                relation: relation.to_string(),
            })
    }

    /// The data value named by the path's final bare segment
    pub fn get_value(&self, path: &str) -> PathResult<Option<&PropertyValue>> {
        let path: BundlePath = path.parse()?;
        let key = path.terminal()?;
        Ok(navigate(self, &path.segments, &path.text)?.data.get(key))
    }

    pub fn set_value(&self, path: &str, value: impl Into<PropertyValue>) -> PathResult<Bundle> {
        let path: BundlePath = path.parse()?;
        let key = path.terminal()?.to_string();
        let value = value.into();
        rewrite(self, &path.segments, &path.text, |target| {
            target.data.insert(key, value);
            Ok(())
        })
    }

    pub fn delete_value(&self, path: &str) -> PathResult<Bundle> {
        let path: BundlePath = path.parse()?;
        let key = path.terminal()?.to_string();
        rewrite(self, &path.segments, &path.text, |target| {
            target.data.remove(&key);
            Ok(())
        })
    }
}
