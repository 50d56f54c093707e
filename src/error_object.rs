//! JSON:API error objects: construction, validation errors and defaulting.

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::config::ErrorDefaults;

/// Title given to field validation errors unless the caller picks one.
pub const VALIDATION_TITLE: &str = "Validation Error";
/// Code given to field validation errors unless the caller picks one.
pub const VALIDATION_CODE: &str = "VALIDATION_ERROR";
/// Status of field validation errors unless the caller picks one.
pub const VALIDATION_STATUS: u16 = 422;

/// Builder for a single error object.
///
/// Only `status` and `title` are required; optional members are emitted
/// only when set.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorObject {
    id: Option<String>,
    status: String,
    title: String,
    detail: Option<String>,
    code: Option<String>,
    source: Option<Value>,
    links: Option<Value>,
    meta: Map<String, Value>,
}

impl ErrorObject {
    pub fn new(status: impl ToString, title: impl Into<String>) -> Self {
        Self {
            id: None,
            status: status.to_string(),
            title: title.into(),
            detail: None,
            code: None,
            source: None,
            links: None,
            meta: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Where the error originated, e.g. `{"pointer": "/data/attributes/name"}`.
    pub fn with_source(mut self, source: Value) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_links(mut self, links: Value) -> Self {
        self.links = Some(links);
        self
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta.extend(meta);
        self
    }

    pub fn to_value(&self) -> Value {
        let mut error = Map::new();
        if let Some(id) = &self.id {
            error.insert("id".to_string(), json!(id));
        }
        error.insert("status".to_string(), json!(self.status));
        error.insert("title".to_string(), json!(self.title));
        if let Some(detail) = &self.detail {
            error.insert("detail".to_string(), json!(detail));
        }
        if let Some(code) = &self.code {
            error.insert("code".to_string(), json!(code));
        }
        if let Some(source) = &self.source {
            error.insert("source".to_string(), source.clone());
        }
        if let Some(links) = &self.links {
            error.insert("links".to_string(), links.clone());
        }
        if !self.meta.is_empty() {
            error.insert("meta".to_string(), Value::Object(self.meta.clone()));
        }
        Value::Object(error)
    }
}

impl From<ErrorObject> for Value {
    fn from(error: ErrorObject) -> Self {
        error.to_value()
    }
}

/// One error object per message in a field-keyed message collection.
///
/// Each field maps to a message or a list of messages. Every error points
/// at `/data/attributes/<field>` and tags the field in `meta.field`.
/// Messages that are not strings produce an error without `detail`.
pub fn validation_errors(
    errors: &Map<String, Value>,
    title: &str,
    code: &str,
    status: u16,
) -> Vec<Value> {
    let mut result = Vec::new();
    for (field, messages) in errors {
        let messages: Vec<&Value> = match messages {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };
        for message in messages {
            let mut meta = Map::new();
            meta.insert("field".to_string(), json!(field));

            let mut error = ErrorObject::new(status, title)
                .with_code(code)
                .with_source(json!({ "pointer": format!("/data/attributes/{}", field) }))
                .with_meta(meta);
            if let Some(detail) = message.as_str() {
                error = error.with_detail(detail);
            }
            result.push(error.to_value());
        }
    }
    result
}

/// Backfill error objects from configured defaults.
///
/// With `include_all_members` off the errors are returned untouched.
/// Otherwise a blank `id` gets a fresh UUID, a blank `status` or `title`
/// takes the default, `status` is always rendered as a string, and absent
/// `code`, `detail`, `links`, `source` and `meta` take their defaults.
/// Entries that are not objects pass through unchanged.
pub fn normalize_errors(errors: Vec<Value>, defaults: &ErrorDefaults) -> Vec<Value> {
    if !defaults.include_all_members {
        return errors;
    }
    errors
        .into_iter()
        .map(|error| match error {
            Value::Object(map) => Value::Object(normalize_one(map, defaults)),
            other => other,
        })
        .collect()
}

fn normalize_one(mut error: Map<String, Value>, defaults: &ErrorDefaults) -> Map<String, Value> {
    if is_blank(error.get("id")) {
        error.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
    }

    let status = match error.get("status") {
        Some(status) if !is_blank(Some(status)) => stringify(status),
        _ => defaults.default_status.clone(),
    };
    error.insert("status".to_string(), json!(status));

    if is_blank(error.get("title")) {
        error.insert("title".to_string(), json!(defaults.default_title));
    }

    for (member, default) in [
        ("code", &defaults.default_code),
        ("detail", &defaults.default_detail),
        ("links", &defaults.default_links),
        ("source", &defaults.default_source),
        ("meta", &defaults.default_meta),
    ] {
        if !error.contains_key(member) {
            error.insert(member.to_string(), default.clone());
        }
    }
    error
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
