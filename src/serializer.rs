//! Resource serialization: one domain object to one JSON:API resource.

use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use crate::config::JsonApiConfig;
use crate::keys::transform_keys;
use crate::model::Model;

/// Irregular plurals the suffix rules get wrong.
const IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
    ("goose", "geese"),
    ("leaf", "leaves"),
    ("loaf", "loaves"),
    ("thief", "thieves"),
];

/// Nouns that are the same in singular and plural.
const UNCOUNTABLE: &[&str] = &["equipment", "information", "media", "metadata", "series", "news"];

/// Dash-case a kind name: `BlogPost` becomes `blog-post`.
///
/// Only the last `::` or `\` separated segment is used. Whitespace-separated
/// words are joined as if capitalized; underscores are kept.
pub fn kebab(kind: &str) -> String {
    let base = kind
        .rsplit(|c: char| c == ':' || c == '\\')
        .next()
        .unwrap_or(kind);

    let mut out = String::with_capacity(base.len() + 4);
    for word in base.split_whitespace() {
        for (i, c) in word.chars().enumerate() {
            let upper = c.is_uppercase() || (i == 0 && c.is_lowercase());
            if upper && !out.is_empty() && !out.ends_with('-') {
                out.push('-');
            }
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Pluralize the last word of an English noun phrase.
pub fn pluralize(word: &str) -> String {
    let (head, last) = match word.rfind('-') {
        Some(i) => word.split_at(i + 1),
        None => ("", word),
    };
    let lower = last.to_lowercase();

    if lower.is_empty() || UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR_PLURALS.iter().find(|(single, _)| *single == lower) {
        return format!("{}{}", head, plural);
    }

    let plural = if let Some(stem) = lower.strip_suffix('y').filter(|stem| {
        stem.chars()
            .last()
            .is_some_and(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
    }) {
        format!("{}ies", stem)
    } else if let Some(stem) = lower
        .strip_suffix("fe")
        .filter(|stem| !stem.ends_with('f'))
    {
        format!("{}ves", stem)
    } else if lower.ends_with("lf") || lower.ends_with("rf") {
        format!("{}ves", &lower[..lower.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| lower.ends_with(s)) {
        format!("{}es", lower)
    } else {
        format!("{}s", lower)
    };
    format!("{}{}", head, plural)
}

/// Resource type derived from a kind: pluralized and dash-cased.
pub fn infer_type(kind: &str) -> String {
    pluralize(&kebab(kind))
}

/// Render a timestamp attribute as ISO-8601 (`2024-05-01T10:00:00+00:00`).
///
/// RFC 3339 strings, `YYYY-MM-DD HH:MM:SS` (taken as UTC), bare dates and
/// unix-second numbers are recognized. Null and empty strings become null;
/// anything unparseable is returned unchanged.
pub fn format_date(value: &Value) -> Value {
    let parsed = match value {
        Value::Null => return Value::Null,
        Value::String(s) if s.trim().is_empty() => return Value::Null,
        Value::String(s) => parse_datetime(s.trim()),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok()),
        _ => None,
    };

    let iso = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]"
    );
    match parsed.and_then(|dt| dt.format(&iso).ok()) {
        Some(formatted) => Value::String(formatted),
        None => value.clone(),
    }
}

fn parse_datetime(s: &str) -> Option<OffsetDateTime> {
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(dt);
    }
    let spaced = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let local = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    if let Ok(dt) = PrimitiveDateTime::parse(s, &spaced)
        .or_else(|_| PrimitiveDateTime::parse(s, &local))
    {
        return Some(dt.assume_utc());
    }
    let date_only = format_description!("[year]-[month]-[day]");
    Date::parse(s, &date_only)
        .ok()
        .map(|date| date.midnight().assume_utc())
}

/// Builds resources, identifiers and links under one configuration.
#[derive(Debug, Clone, Copy)]
pub struct ResourceSerializer<'c> {
    config: &'c JsonApiConfig,
}

impl<'c> ResourceSerializer<'c> {
    pub fn new(config: &'c JsonApiConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &'c JsonApiConfig {
        self.config
    }

    /// Resource type for a model: the explicit type, or one inferred from
    /// its kind.
    pub fn type_of(&self, model: &dyn Model, explicit: Option<&str>) -> String {
        match explicit {
            Some(ty) => ty.to_string(),
            None => infer_type(model.kind()),
        }
    }

    /// Serialize a model into a resource object.
    ///
    /// Without explicit attributes the model's own fields are used. Either
    /// way the primary key and any literal `id` are dropped and timestamp
    /// fields are rendered as ISO-8601.
    pub fn from_model(
        &self,
        model: &dyn Model,
        explicit_type: Option<&str>,
        explicit_attributes: Option<Map<String, Value>>,
        relationships: Map<String, Value>,
        links: Map<String, Value>,
    ) -> Value {
        let ty = self.type_of(model, explicit_type);
        let id = model.key();

        let key_name = model.key_name();
        let mut attributes: Map<String, Value> = explicit_attributes
            .unwrap_or_else(|| model.attributes())
            .into_iter()
            .filter(|(field, _)| field != key_name && field != "id")
            .collect();
        for field in &self.config.timestamp_fields {
            if let Some(value) = attributes.get_mut(field) {
                *value = format_date(value);
            }
        }

        self.resource(&ty, id.as_deref(), attributes, relationships, links)
    }

    /// Assemble a resource object from its parts.
    ///
    /// Relationship values that are not already relationship objects are
    /// wrapped as `{"data": value}`. Keys are transformed last when the
    /// configuration asks for it.
    pub fn resource(
        &self,
        ty: &str,
        id: Option<&str>,
        attributes: Map<String, Value>,
        relationships: Map<String, Value>,
        links: Map<String, Value>,
    ) -> Value {
        let mut resource = Map::new();
        resource.insert("type".to_string(), Value::String(ty.to_string()));
        if let Some(id) = id {
            resource.insert("id".to_string(), Value::String(id.to_string()));
        }
        resource.insert("attributes".to_string(), Value::Object(attributes));

        let mut resource_links = Map::new();
        if let (true, Some(id)) = (self.config.resource_links, id) {
            resource_links.insert("self".to_string(), Value::String(self.resource_url(ty, id)));
        }
        resource_links.extend(links);
        if !resource_links.is_empty() {
            resource.insert("links".to_string(), Value::Object(resource_links));
        }

        if !relationships.is_empty() {
            let relationships = relationships
                .into_iter()
                .map(|(name, payload)| {
                    let relation = self.relationship_object(ty, id, &name, payload);
                    (name, relation)
                })
                .collect();
            resource.insert("relationships".to_string(), Value::Object(relationships));
        }

        self.transform_if_needed(Value::Object(resource))
    }

    fn relationship_object(&self, ty: &str, id: Option<&str>, name: &str, payload: Value) -> Value {
        let mut relation = match payload {
            Value::Object(map)
                if ["data", "links", "meta"].iter().any(|k| map.contains_key(*k)) =>
            {
                map
            }
            other => {
                let mut map = Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };

        if let (true, Some(id)) = (self.config.relationship_links, id) {
            let mut links = self.relationship_links(ty, id, name);
            if let Some(Value::Object(existing)) = relation.remove("links") {
                links.extend(existing);
            }
            relation.insert("links".to_string(), Value::Object(links));
        }
        Value::Object(relation)
    }

    /// Minimal `{type, id}` reference to a model.
    ///
    /// Returns `None` for unsaved models, which have no identity to link.
    pub fn identifier(&self, model: &dyn Model) -> Option<Value> {
        let id = model.key()?;
        let mut identifier = Map::new();
        identifier.insert("type".to_string(), Value::String(infer_type(model.kind())));
        identifier.insert("id".to_string(), Value::String(id));
        Some(Value::Object(identifier))
    }

    /// `<base>/<dash-cased type>/<id>`.
    pub fn resource_url(&self, ty: &str, id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            kebab(ty),
            id
        )
    }

    /// `self` and `related` links for one relationship.
    pub fn relationship_links(&self, ty: &str, id: &str, name: &str) -> Map<String, Value> {
        let base = self.resource_url(ty, id);
        let mut links = Map::new();
        links.insert(
            "self".to_string(),
            Value::String(format!("{}/relationships/{}", base, name)),
        );
        links.insert(
            "related".to_string(),
            Value::String(format!("{}/{}", base, name)),
        );
        links
    }

    /// Apply the configured key transform to a finished value.
    pub fn transform_if_needed(&self, value: Value) -> Value {
        if self.config.transform_keys {
            transform_keys(&value, self.config.transform_recursive)
        } else {
            value
        }
    }
}
