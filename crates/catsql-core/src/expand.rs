//! Expansion of `@file` condition values into value sets

use crate::error::{Error, Result};
use crate::value::Value;
use std::fs;
use std::path::Path;

/// Prefix marking a condition value as a reference to a JSON file
pub const EXPANSION_PREFIX: char = '@';

/// The file named by a condition value, if it is an `@file` reference
pub fn expansion_path(value: &Value) -> Option<&str> {
    value
        .as_str()
        .and_then(|s| s.strip_prefix(EXPANSION_PREFIX))
}

/// Collect every value stored under `key`, at any depth
///
/// A matching key's value is collected as-is and not searched further.
pub fn recursive_find<'a>(data: &'a serde_json::Value, key: &str) -> Vec<&'a serde_json::Value> {
    let mut found = Vec::new();
    collect(data, key, &mut found);
    found
}

fn collect<'a>(data: &'a serde_json::Value, key: &str, found: &mut Vec<&'a serde_json::Value>) {
    match data {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                if k == key {
                    found.push(v);
                } else {
                    collect(v, key, found);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect(item, key, found);
            }
        }
        _ => {}
    }
}

/// Load a JSON file and return the distinct values found under `key`
///
/// Values keep first-seen order.
pub fn expand_file<P: AsRef<Path>>(path: P, key: &str) -> Result<Vec<Value>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let data: serde_json::Value = serde_json::from_str(&content)?;

    let mut values: Vec<Value> = Vec::new();
    for found in recursive_find(&data, key) {
        let value = Value::from(found);
        if !values.contains(&value) {
            values.push(value);
        }
    }

    tracing::debug!(path = %path.display(), key, values = values.len(), "expanded condition");
    Ok(values)
}
