//! Core types shared across document assembly and query application.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Media type for JSON:API documents.
pub const CONTENT_TYPE: &str = "application/vnd.api+json";

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a scalar JSON value as an identifier string.
///
/// Returns `None` for null, empty strings and structured values.
pub fn scalar_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Sort direction issued against a query surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Split a client sort entry into field and direction.
    ///
    /// A leading `-` means descending; anything else is ascending.
    pub fn parse_entry(entry: &str) -> (&str, Self) {
        match entry.strip_prefix('-') {
            Some(field) => (field, SortDirection::Desc),
            None => (entry, SortDirection::Asc),
        }
    }

    /// Lowercase keyword for this direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Cardinality of a declared relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::One => "one",
            Cardinality::Many => "many",
        }
    }
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
