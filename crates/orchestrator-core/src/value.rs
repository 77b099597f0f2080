//! Small interpreter over a tagged value type for deep property navigation.
//!
//! Built directly on `serde_json::Value` — the engine already treats JSON as
//! its canonical tagged-value type for block outputs, so no parallel `Null |
//! Bool | Number | String | Array | Object` type is introduced.

use serde::{Deserialize, Serialize};

/// One segment of a parsed property path: either a named field or a
/// bracketed numeric index. `data.rows[0][1]` parses to
/// `[Key("data"), Key("rows"), Index(0), Index(1)]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("cannot index non-array value with [{index}]")]
    NotAnArray { index: usize },
    #[error("property {key:?} does not exist")]
    MissingProperty { key: String },
    #[error("cannot navigate into a scalar with property {key:?}")]
    NotAnObject { key: String },
}

/// Parses a dotted/bracketed path like `rows[0][1].name` into segments.
/// The leading segment, if not bracketed, is a bare key.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut chars = path.chars().peekable();
    let mut current = String::new();

    let flush = |current: &mut String, segments: &mut Vec<PathSegment>| {
        if !current.is_empty() {
            segments.push(PathSegment::Key(std::mem::take(current)));
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '.' => flush(&mut current, &mut segments),
            '[' => {
                flush(&mut current, &mut segments);
                let mut idx = String::new();
                for d in chars.by_ref() {
                    if d == ']' {
                        break;
                    }
                    idx.push(d);
                }
                if let Ok(n) = idx.trim().parse::<usize>() {
                    segments.push(PathSegment::Index(n));
                }
            }
            _ => current.push(c),
        }
    }
    flush(&mut current, &mut segments);
    segments
}

/// Resolves a property path against a `serde_json::Value`, producing typed
/// errors for out-of-bounds indices, indexing a non-array, and missing keys.
pub fn resolve_property_path<'a>(
    value: &'a serde_json::Value,
    segments: &[PathSegment],
) -> Result<&'a serde_json::Value, PathError> {
    let mut current = value;
    for segment in segments {
        current = match segment {
            PathSegment::Key(key) => match current {
                serde_json::Value::Object(map) => {
                    map.get(key).ok_or_else(|| PathError::MissingProperty { key: key.clone() })?
                }
                serde_json::Value::Null => {
                    return Err(PathError::MissingProperty { key: key.clone() });
                }
                _ => return Err(PathError::NotAnObject { key: key.clone() }),
            },
            PathSegment::Index(idx) => match current {
                serde_json::Value::Array(items) => {
                    items.get(*idx).ok_or(PathError::IndexOutOfBounds {
                        index: *idx,
                        len: items.len(),
                    })?
                }
                _ => return Err(PathError::NotAnArray { index: *idx }),
            },
        };
    }
    Ok(current)
}

/// Convenience entry point: parses `path` and resolves it in one call.
pub fn resolve_path_str<'a>(
    value: &'a serde_json::Value,
    path: &str,
) -> Result<&'a serde_json::Value, PathError> {
    if path.is_empty() {
        return Ok(value);
    }
    resolve_property_path(value, &parse_path(path))
}
