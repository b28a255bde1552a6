//! Record flattening: structured documents become `(path, token)` pairs.
//!
//! Paths are the colon-joined field names leading to a leaf, always ending in
//! `:`. Joining a path with one of its tokens yields a prefix, the unit the
//! [`PrefixIndex`](crate::prefix_index::PrefixIndex) is keyed by.

use serde_json::{Map, Value};

use crate::text_util::tokenize;

pub const PATH_SEPARATOR: char = ':';

/// One `(path, token)` pair emitted for a record leaf.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlatEntry {
    /// Field path including the trailing separator, e.g. `addresses:city:`.
    pub path: String,
    /// Case-folded value token.
    pub token: String,
}

impl FlatEntry {
    pub fn prefix(&self) -> String {
        format!("{}{}", self.path, self.token)
    }

    /// The path as stored in the field registry, without its trailing
    /// separator.
    pub fn field_path(&self) -> &str {
        self.path
            .strip_suffix(PATH_SEPARATOR)
            .unwrap_or(&self.path)
    }
}

/// Flatten a record into the pairs it contributes to the index.
///
/// Only object roots are flattened; any other document yields nothing.
/// Falsy leaves (`null`, `false`, `0`, empty strings and containers) are
/// skipped.
pub fn flatten(record: &Value) -> Vec<FlatEntry> {
    let mut out = Vec::new();
    if let Value::Object(map) = record {
        flatten_object("", map, &mut out);
    }
    out
}

fn flatten_object(path: &str, map: &Map<String, Value>, out: &mut Vec<FlatEntry>) {
    for (key, value) in map {
        let field_path = format!("{path}{key}{PATH_SEPARATOR}");
        match value {
            Value::Object(inner) => flatten_object(&field_path, inner, out),
            Value::Array(items) => flatten_array(&field_path, items, out),
            scalar => push_scalar(&field_path, scalar, out),
        }
    }
}

fn flatten_array(path: &str, items: &[Value], out: &mut Vec<FlatEntry>) {
    for item in items {
        match item {
            // Objects inside a list share the list's path.
            Value::Object(inner) => flatten_object(path, inner, out),
            Value::Array(nested) => {
                let nested_path = format!("{path}{PATH_SEPARATOR}");
                flatten_array(&nested_path, nested, out);
            }
            scalar => push_scalar(path, scalar, out),
        }
    }
}

fn push_scalar(path: &str, value: &Value, out: &mut Vec<FlatEntry>) {
    let push = |out: &mut Vec<FlatEntry>, token: String| {
        out.push(FlatEntry {
            path: path.to_string(),
            token,
        });
    };

    match value {
        Value::String(text) => {
            for word in tokenize(text) {
                push(out, word);
            }
        }
        Value::Number(n) if n.as_f64() != Some(0.0) => {
            push(out, n.to_string().to_lowercase());
        }
        Value::Bool(true) => push(out, "true".to_string()),
        _ => {}
    }
}
