//! Domain objects as seen by the document engine.
//!
//! The engine never fetches anything. A [`Model`] exposes its kind, key,
//! scalar attributes and the relations that are already materialized on
//! it. Which relations a kind *could* produce is declared up front in a
//! [`Registry`] rather than discovered by probing objects at runtime.
//!
//! [`Entity`] is an owned object graph implementing [`Model`], read from
//! JSON of the form:
//!
//! ```json
//! {
//!   "kind": "Post",
//!   "attributes": { "id": 1, "title": "Hello" },
//!   "relations": {
//!     "author": { "kind": "User", "attributes": { "id": 9 } },
//!     "comments": []
//!   }
//! }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::AllowLists;
use crate::error::{ConfigError, GraphError};
use crate::types::{json_type_name, scalar_to_id, Cardinality};

/// A related object or objects already materialized on a model.
pub enum Related<'a> {
    /// To-one relation; `None` when the related object is absent.
    One(Option<&'a dyn Model>),
    /// To-many relation, in stored order.
    Many(Vec<&'a dyn Model>),
}

impl<'a> Related<'a> {
    /// Related objects, truncated to `limit` for to-many relations.
    pub fn items(&self, limit: Option<usize>) -> Vec<&'a dyn Model> {
        match self {
            Related::One(one) => one.iter().copied().collect(),
            Related::Many(many) => {
                let take = limit.unwrap_or(many.len());
                many.iter().take(take).copied().collect()
            }
        }
    }
}

/// A domain object that can be serialized into a resource.
pub trait Model {
    /// Concrete kind name, e.g. `BlogPost`.
    fn kind(&self) -> &str;

    /// Name of the primary-key attribute.
    fn key_name(&self) -> &str {
        "id"
    }

    /// Primary key rendered as a string; `None` when not yet persisted.
    fn key(&self) -> Option<String>;

    /// Snapshot of the object's own scalar fields.
    fn attributes(&self) -> Map<String, Value>;

    /// Relations materialized on this object, in declaration order.
    fn relations(&self) -> Vec<(&str, Related<'_>)>;

    /// Look up one materialized relation by name.
    fn relation(&self, name: &str) -> Option<Related<'_>> {
        self.relations()
            .into_iter()
            .find(|(relation, _)| *relation == name)
            .map(|(_, related)| related)
    }

    /// Materialize any of the dotted relation paths not yet loaded.
    ///
    /// Called once before serialization when automatic eager loading is
    /// enabled. The default does nothing.
    fn load_missing(&mut self, _paths: &[String]) {}
}

/// Materialized relation on an [`Entity`].
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    One(Option<Box<Entity>>),
    Many(Vec<Entity>),
}

/// Owned in-memory domain object.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub kind: String,
    pub key_name: String,
    pub attributes: Map<String, Value>,
    pub relations: Vec<(String, Relation)>,
}

impl Entity {
    /// Create an entity with no relations.
    pub fn new(kind: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            key_name: "id".to_string(),
            attributes,
            relations: Vec::new(),
        }
    }

    /// Use a primary-key attribute other than `id`.
    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = key_name.into();
        self
    }

    /// Attach a to-one relation.
    pub fn with_one(mut self, name: impl Into<String>, related: Option<Entity>) -> Self {
        self.relations
            .push((name.into(), Relation::One(related.map(Box::new))));
        self
    }

    /// Attach a to-many relation.
    pub fn with_many(mut self, name: impl Into<String>, related: Vec<Entity>) -> Self {
        self.relations.push((name.into(), Relation::Many(related)));
        self
    }

    /// Read an entity from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns `GraphError` if the value or any nested relation is not a
    /// well-formed entity.
    pub fn from_value(value: &Value) -> Result<Self, GraphError> {
        entity_from_value(value, "")
    }

    /// Read a list of entities from a JSON array (or a single entity).
    ///
    /// # Errors
    ///
    /// Returns `GraphError` if any element is not a well-formed entity.
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>, GraphError> {
        match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| entity_from_value(item, &format!("/{}", i)))
                .collect(),
            other => Ok(vec![entity_from_value(other, "")?]),
        }
    }
}

impl Model for Entity {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn key_name(&self) -> &str {
        &self.key_name
    }

    fn key(&self) -> Option<String> {
        self.attributes.get(&self.key_name).and_then(scalar_to_id)
    }

    fn attributes(&self) -> Map<String, Value> {
        self.attributes.clone()
    }

    fn relations(&self) -> Vec<(&str, Related<'_>)> {
        self.relations
            .iter()
            .map(|(name, relation)| {
                let related = match relation {
                    Relation::One(one) => Related::One(one.as_deref().map(|e| e as &dyn Model)),
                    Relation::Many(many) => {
                        Related::Many(many.iter().map(|e| e as &dyn Model).collect())
                    }
                };
                (name.as_str(), related)
            })
            .collect()
    }
}

fn entity_from_value(value: &Value, path: &str) -> Result<Entity, GraphError> {
    let Some(object) = value.as_object() else {
        return Err(GraphError::NotAnObject {
            path: path.to_string(),
            actual: json_type_name(value).to_string(),
        });
    };

    let kind = object
        .get("kind")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| GraphError::MissingKind {
            path: path.to_string(),
        })?;

    let key_name = match object.get("key_name") {
        None => "id".to_string(),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(other) => {
            return Err(GraphError::InvalidField {
                path: format!("{}/key_name", path),
                message: format!("expected non-empty string, got {}", json_type_name(other)),
            })
        }
    };

    let attributes = match object.get("attributes") {
        None => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(GraphError::InvalidField {
                path: format!("{}/attributes", path),
                message: format!("expected object, got {}", json_type_name(other)),
            })
        }
    };

    let mut relations = Vec::new();
    match object.get("relations") {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (name, related) in map {
                let rel_path = format!("{}/relations/{}", path, name);
                let relation = match related {
                    Value::Null => Relation::One(None),
                    Value::Object(_) => {
                        Relation::One(Some(Box::new(entity_from_value(related, &rel_path)?)))
                    }
                    Value::Array(items) => Relation::Many(
                        items
                            .iter()
                            .enumerate()
                            .map(|(i, item)| entity_from_value(item, &format!("{}/{}", rel_path, i)))
                            .collect::<Result<_, _>>()?,
                    ),
                    other => {
                        return Err(GraphError::InvalidRelation {
                            path: path.to_string(),
                            name: name.clone(),
                            actual: json_type_name(other).to_string(),
                        })
                    }
                };
                relations.push((name.clone(), relation));
            }
        }
        Some(other) => {
            return Err(GraphError::InvalidField {
                path: format!("{}/relations", path),
                message: format!("expected object, got {}", json_type_name(other)),
            })
        }
    }

    Ok(Entity {
        kind: kind.to_string(),
        key_name,
        attributes,
        relations,
    })
}

/// Declared relation of a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    pub cardinality: Cardinality,
    /// Kind of the related objects.
    pub target: String,
}

/// Timestamp column names for kinds that use them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampColumns {
    pub created_at: String,
    pub updated_at: String,
}

impl Default for TimestampColumns {
    fn default() -> Self {
        Self {
            created_at: "created_at".to_string(),
            updated_at: "updated_at".to_string(),
        }
    }
}

/// Declared schema of one domain kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSchema {
    pub key_name: String,
    /// Persisted columns.
    pub columns: Vec<String>,
    pub hidden: Vec<String>,
    /// `None` when the kind does not keep timestamps.
    pub timestamps: Option<TimestampColumns>,
    pub relations: Vec<(String, RelationDescriptor)>,
}

impl Default for ModelSchema {
    fn default() -> Self {
        Self {
            key_name: "id".to_string(),
            columns: Vec::new(),
            hidden: Vec::new(),
            timestamps: None,
            relations: Vec::new(),
        }
    }
}

impl ModelSchema {
    /// Whether the kind declares a relation with this name.
    pub fn has_relation(&self, name: &str) -> bool {
        self.relation(name).is_some()
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations
            .iter()
            .find(|(relation, _)| relation == name)
            .map(|(_, descriptor)| descriptor)
    }

    /// Columns clients may sort, filter or select on.
    ///
    /// Persisted columns plus the primary key plus timestamp columns (when
    /// the kind uses them), minus hidden columns, without duplicates.
    pub fn visible_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        let timestamps = self
            .timestamps
            .iter()
            .flat_map(|t| [t.created_at.clone(), t.updated_at.clone()]);

        for column in self
            .columns
            .iter()
            .cloned()
            .chain(std::iter::once(self.key_name.clone()))
            .chain(timestamps)
        {
            if column.is_empty() || self.hidden.contains(&column) || columns.contains(&column) {
                continue;
            }
            columns.push(column);
        }
        columns
    }

    /// Allow-lists derived from this schema.
    pub fn allow_lists(&self) -> AllowLists {
        let columns = self.visible_columns();
        AllowLists {
            allowed_sorts: columns.clone(),
            allowed_filters: columns.clone(),
            allowed_fields: columns,
            allowed_includes: self.relations.iter().map(|(name, _)| name.clone()).collect(),
        }
    }
}

/// Declared schemas keyed by kind, populated once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    schemas: HashMap<String, ModelSchema>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the schema for a kind.
    pub fn register(&mut self, kind: impl Into<String>, schema: ModelSchema) -> &mut Self {
        self.schemas.insert(kind.into(), schema);
        self
    }

    pub fn get(&self, kind: &str) -> Option<&ModelSchema> {
        self.schemas.get(kind)
    }

    /// Whether `kind` declares a relation named `name`.
    pub fn declares(&self, kind: &str, name: &str) -> bool {
        self.relation(kind, name).is_some()
    }

    /// Declared relation `name` of `kind`.
    pub fn relation(&self, kind: &str, name: &str) -> Option<&RelationDescriptor> {
        self.get(kind)?.relation(name)
    }

    /// Read a registry from JSON.
    ///
    /// The JSON form maps each kind to a schema whose `relations` is an
    /// object of `name -> {cardinality, target}`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the value does not match.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let raw: HashMap<String, RawSchema> =
            serde_json::from_value(value).map_err(|source| ConfigError::Invalid {
                what: "model registry",
                source,
            })?;

        let schemas = raw
            .into_iter()
            .map(|(kind, schema)| Ok((kind, schema.into_schema()?)))
            .collect::<Result<_, serde_json::Error>>()
            .map_err(|source| ConfigError::Invalid {
                what: "model registry",
                source,
            })?;
        Ok(Self { schemas })
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct RawSchema {
    key_name: String,
    columns: Vec<String>,
    hidden: Vec<String>,
    timestamps: bool,
    created_at: Option<String>,
    updated_at: Option<String>,
    relations: serde_json::Map<String, Value>,
}

impl Default for RawSchema {
    fn default() -> Self {
        Self {
            key_name: "id".to_string(),
            columns: Vec::new(),
            hidden: Vec::new(),
            timestamps: false,
            created_at: None,
            updated_at: None,
            relations: Map::new(),
        }
    }
}

impl RawSchema {
    fn into_schema(self) -> Result<ModelSchema, serde_json::Error> {
        let timestamps = self.timestamps.then(|| {
            let defaults = TimestampColumns::default();
            TimestampColumns {
                created_at: self.created_at.unwrap_or(defaults.created_at),
                updated_at: self.updated_at.unwrap_or(defaults.updated_at),
            }
        });

        let relations = self
            .relations
            .into_iter()
            .map(|(name, descriptor)| Ok((name, serde_json::from_value(descriptor)?)))
            .collect::<Result<_, serde_json::Error>>()?;

        Ok(ModelSchema {
            key_name: self.key_name,
            columns: self.columns,
            hidden: self.hidden,
            timestamps,
            relations,
        })
    }
}
