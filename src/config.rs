//! Immutable configuration for document assembly and query application.
//!
//! A [`JsonApiConfig`] is built once (from defaults or a JSON file) and
//! passed by reference into every component. Every section deserializes
//! with defaults, so a partial file only needs the keys it changes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ConfigError;
use crate::loader::load_json_auto;
use crate::types::CONTENT_TYPE;

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonApiConfig {
    pub content_type: String,
    /// Base URL resource and relationship links are built from.
    pub base_url: String,
    pub include_jsonapi: bool,
    pub include_compound_documents: bool,
    pub jsonapi: JsonApiObject,
    pub transform_keys: bool,
    pub transform_recursive: bool,
    pub resource_links: bool,
    pub relationship_links: bool,
    /// Attributes rendered as ISO-8601 timestamps.
    pub timestamp_fields: Vec<String>,
    pub method_override: MethodOverrideConfig,
    pub errors: ErrorDefaults,
    pub pagination: PaginationConfig,
    pub query: QueryConfig,
    pub relationships: RelationshipsConfig,
    /// Ask models to load requested includes before serialization.
    pub eager_load_includes: bool,
}

impl Default for JsonApiConfig {
    fn default() -> Self {
        Self {
            content_type: CONTENT_TYPE.to_string(),
            base_url: "http://localhost".to_string(),
            include_jsonapi: false,
            include_compound_documents: true,
            jsonapi: JsonApiObject::default(),
            transform_keys: true,
            transform_recursive: true,
            resource_links: true,
            relationship_links: true,
            timestamp_fields: vec!["created_at".to_string(), "updated_at".to_string()],
            method_override: MethodOverrideConfig::default(),
            errors: ErrorDefaults::default(),
            pagination: PaginationConfig::default(),
            query: QueryConfig::default(),
            relationships: RelationshipsConfig::default(),
            eager_load_includes: true,
        }
    }
}

impl JsonApiConfig {
    /// Parse configuration from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the value does not match the
    /// configuration shape.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|source| ConfigError::Invalid {
            what: "configuration",
            source,
        })
    }

    /// Load configuration from a file path or URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if the source cannot be read, or
    /// `ConfigError::Invalid` if it does not deserialize.
    pub fn load(source: &str) -> Result<Self, ConfigError> {
        let value = load_json_auto(source)?;
        Self::from_value(value)
    }
}

/// The top-level `jsonapi` member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonApiObject {
    pub version: String,
    pub meta: Map<String, Value>,
}

impl Default for JsonApiObject {
    fn default() -> Self {
        Self {
            version: "1.1".to_string(),
            meta: Map::new(),
        }
    }
}

impl JsonApiObject {
    /// Render as a document member; `meta` is emitted only when non-empty.
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("version".to_string(), Value::String(self.version.clone()));
        if !self.meta.is_empty() {
            object.insert("meta".to_string(), Value::Object(self.meta.clone()));
        }
        Value::Object(object)
    }
}

/// Method override applied before routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodOverrideConfig {
    pub enabled: bool,
    pub header: String,
    pub from: String,
    pub to: String,
    pub apply_to_groups: Vec<String>,
}

impl Default for MethodOverrideConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            header: "X-HTTP-Method-Override".to_string(),
            from: "POST".to_string(),
            to: "PATCH".to_string(),
            apply_to_groups: vec!["api".to_string()],
        }
    }
}

/// Defaults used when error objects are backfilled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorDefaults {
    /// Strict defaulting: populate every member of every error object.
    pub include_all_members: bool,
    pub default_status: String,
    pub default_title: String,
    pub default_code: Value,
    pub default_detail: Value,
    pub default_links: Value,
    pub default_source: Value,
    pub default_meta: Value,
}

impl Default for ErrorDefaults {
    fn default() -> Self {
        Self {
            include_all_members: true,
            default_status: "500".to_string(),
            default_title: "Error".to_string(),
            default_code: json!("ERROR"),
            default_detail: Value::Null,
            default_links: json!({ "about": null, "type": null }),
            default_source: json!({ "pointer": "/data" }),
            default_meta: json!({}),
        }
    }
}

/// Pagination rendering and page-size policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub meta_key: String,
    pub include_total: bool,
    pub include_last_page: bool,
    /// Query parameter carrying the page number in generated links.
    pub page_name: String,
    pub default_per_page: u64,
    pub max_per_page: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            meta_key: "page".to_string(),
            include_total: true,
            include_last_page: true,
            page_name: "page".to_string(),
            default_per_page: 15,
            max_per_page: 100,
        }
    }
}

/// Query parameter names, allow-all switches and allow-lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub sort_param: String,
    pub filter_param: String,
    pub include_param: String,
    pub fields_param: String,
    pub max_include_param: String,
    /// Fallback include cap when the client sends none.
    pub max_include: Value,
    pub allow_all_sorts: bool,
    pub allow_all_filters: bool,
    pub allow_all_includes: bool,
    pub allow_all_fields: bool,
    #[serde(flatten)]
    pub allowed: AllowLists,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            sort_param: "sort".to_string(),
            filter_param: "filter".to_string(),
            include_param: "include".to_string(),
            fields_param: "fields".to_string(),
            max_include_param: "max_include".to_string(),
            max_include: Value::Null,
            allow_all_sorts: false,
            allow_all_filters: true,
            allow_all_includes: false,
            allow_all_fields: false,
            allowed: AllowLists::default(),
        }
    }
}

impl QueryConfig {
    /// Return a copy with every non-`None` override replacing its allow-list.
    pub fn with_overrides(&self, overrides: &AllowListOverrides) -> Self {
        let mut config = self.clone();
        if let Some(sorts) = &overrides.sorts {
            config.allowed.allowed_sorts = sorts.clone();
        }
        if let Some(filters) = &overrides.filters {
            config.allowed.allowed_filters = filters.clone();
        }
        if let Some(includes) = &overrides.includes {
            config.allowed.allowed_includes = includes.clone();
        }
        if let Some(fields) = &overrides.fields {
            config.allowed.allowed_fields = fields.clone();
        }
        config
    }
}

/// Per-dimension allow-lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowLists {
    pub allowed_sorts: Vec<String>,
    pub allowed_filters: Vec<String>,
    pub allowed_includes: Vec<String>,
    pub allowed_fields: Vec<String>,
}

/// Caller-supplied replacements for individual allow-lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowListOverrides {
    pub sorts: Option<Vec<String>>,
    pub filters: Option<Vec<String>>,
    pub includes: Option<Vec<String>>,
    pub fields: Option<Vec<String>>,
}

impl From<AllowLists> for AllowListOverrides {
    fn from(lists: AllowLists) -> Self {
        Self {
            sorts: Some(lists.allowed_sorts),
            filters: Some(lists.allowed_filters),
            includes: Some(lists.allowed_includes),
            fields: Some(lists.allowed_fields),
        }
    }
}

/// How the document's include tree relates to the include allow-list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeShaping {
    /// Shape the document from exactly what the client requested.
    #[default]
    AsRequested,
    /// Shape the document only from includes the allow-list admits.
    Allowed,
}

/// Relationship emission policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipsConfig {
    /// Emit links-only relationships for requested but unloaded relations.
    pub links_for_includes: bool,
    pub include_shaping: IncludeShaping,
}

impl Default for RelationshipsConfig {
    fn default() -> Self {
        Self {
            links_for_includes: true,
            include_shaping: IncludeShaping::AsRequested,
        }
    }
}
