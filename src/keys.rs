//! Key casing for outgoing documents.
//!
//! Keys become lower camel case identifiers: alphanumeric only, starting
//! with a lowercase letter and ending with a letter. Keys that cannot meet
//! that shape are padded with `x` on the offending side.

use serde_json::{Map, Value};

/// Camelize one key.
///
/// `first_name` and `first-name` become `firstName`; `2fa` becomes `x2fa`;
/// `page1` becomes `page1x`.
pub fn camelize(key: &str) -> String {
    let studly: String = key
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();

    let mut chars = studly.chars();
    let camel: String = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    };

    let mut out: String = camel.chars().filter(char::is_ascii_alphanumeric).collect();

    if !out.starts_with(|c: char| c.is_ascii_lowercase()) {
        out.insert(0, 'x');
    }
    if !out.ends_with(|c: char| c.is_ascii_lowercase()) {
        out.push('x');
    }
    out
}

/// Return a copy of `value` with object keys camelized.
///
/// With `recursive`, nested objects and objects inside arrays are
/// rewritten too; otherwise only the top-level keys change. Values are
/// never altered.
pub fn transform_keys(value: &Value, recursive: bool) -> Value {
    match value {
        Value::Object(map) => Value::Object(transform_map(map, recursive)),
        Value::Array(items) if recursive => Value::Array(
            items
                .iter()
                .map(|item| transform_keys(item, true))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn transform_map(map: &Map<String, Value>, recursive: bool) -> Map<String, Value> {
    map.iter()
        .map(|(key, child)| {
            let child = if recursive {
                transform_keys(child, true)
            } else {
                child.clone()
            };
            (camelize(key), child)
        })
        .collect()
}
