//! Dotted-path access into untyped JSON documents
//!
//! A path like `Services.0.Listen` is split on `.`; segments made only of
//! ASCII digits address array elements, everything else addresses object
//! keys. Resolution never creates structure: `assign` may insert a new leaf
//! key into an existing object but fails on any missing intermediate node.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

/// Errors produced while walking a document along a path
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    #[error("Invalid array index '{index}' in path: {path}")]
    InvalidIndex { index: String, path: String },

    #[error("Cannot set a value at path: {path}")]
    InvalidTarget { path: String },
}

/// One step of a [`ConfigPath`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            // Digit strings beyond usize can never be in bounds
            Segment::Index(raw.parse().unwrap_or(usize::MAX))
        } else {
            Segment::Field(raw.to_string())
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => f.write_str(name),
            Segment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// A parsed dotted path. The empty string is the empty path (the root).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigPath {
    raw: String,
    segments: Vec<Segment>,
}

impl ConfigPath {
    pub fn parse(raw: &str) -> Self {
        let segments = if raw.is_empty() {
            Vec::new()
        } else {
            raw.split('.').map(Segment::parse).collect()
        };
        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn not_found(&self) -> PathError {
        PathError::PathNotFound {
            path: self.raw.clone(),
        }
    }

    fn invalid_index(&self, segment: &Segment) -> PathError {
        PathError::InvalidIndex {
            index: segment.to_string(),
            path: self.raw.clone(),
        }
    }

    fn invalid_target(&self) -> PathError {
        PathError::InvalidTarget {
            path: self.raw.clone(),
        }
    }
}

impl FromStr for ConfigPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ConfigPath::parse(s))
    }
}

impl From<&str> for ConfigPath {
    fn from(s: &str) -> Self {
        ConfigPath::parse(s)
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Descend one segment from `node`.
fn step<'a>(node: &'a Value, segment: &Segment, path: &ConfigPath) -> Result<&'a Value, PathError> {
    match (segment, node) {
        (Segment::Index(i), Value::Array(items)) => {
            items.get(*i).ok_or_else(|| path.invalid_index(segment))
        }
        (Segment::Index(_), _) => Err(path.invalid_index(segment)),
        (Segment::Field(key), Value::Object(map)) => {
            map.get(key).ok_or_else(|| path.not_found())
        }
        (Segment::Field(_), _) => Err(path.not_found()),
    }
}

fn step_mut<'a>(
    node: &'a mut Value,
    segment: &Segment,
    path: &ConfigPath,
) -> Result<&'a mut Value, PathError> {
    match (segment, node) {
        (Segment::Index(i), Value::Array(items)) => {
            items.get_mut(*i).ok_or_else(|| path.invalid_index(segment))
        }
        (Segment::Index(_), _) => Err(path.invalid_index(segment)),
        (Segment::Field(key), Value::Object(map)) => {
            map.get_mut(key).ok_or_else(|| path.not_found())
        }
        (Segment::Field(_), _) => Err(path.not_found()),
    }
}

/// Return the value at `path`. The empty path yields the document itself.
pub fn resolve<'a>(document: &'a Value, path: &ConfigPath) -> Result<&'a Value, PathError> {
    path.segments()
        .iter()
        .try_fold(document, |node, segment| step(node, segment, path))
}

/// Set the value at `path`, inserting the final key if the parent object
/// lacks it. Array targets must already exist; missing intermediate nodes
/// are an error.
pub fn assign(document: &mut Value, path: &ConfigPath, value: Value) -> Result<(), PathError> {
    let Some((last, parents)) = path.segments().split_last() else {
        return Err(path.invalid_target());
    };

    let mut parent = document;
    for segment in parents {
        parent = step_mut(parent, segment, path)?;
    }

    match (last, parent) {
        (Segment::Index(i), Value::Array(items)) => match items.get_mut(*i) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(path.invalid_index(last)),
        },
        (Segment::Index(_), _) => Err(path.invalid_index(last)),
        (Segment::Field(key), Value::Object(map)) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        (Segment::Field(_), _) => Err(path.invalid_target()),
    }
}
