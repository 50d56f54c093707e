//! JSON:API Document Assembly
//!
//! Turns in-memory object graphs into JSON:API documents, and applies
//! client query directives to a data source before fetching.
//!
//! A request's `include` list is parsed into an include tree. Primary
//! resources get relationship linkage from the relations already loaded on
//! each model, and the same tree drives a deduplicated `included` section.
//! Pagination links and meta, error objects and key casing are applied on
//! the way out.
//!
//! # Example
//!
//! ```
//! use jsonapi_document::{Entity, JsonApi, JsonApiConfig, Payload, Request};
//! use serde_json::json;
//!
//! let graph = json!({
//!     "kind": "Post",
//!     "attributes": { "id": 1, "title": "Hello" },
//!     "relations": {
//!         "author": { "kind": "User", "attributes": { "id": 9, "first_name": "Ada" } }
//!     }
//! });
//! let mut post = Entity::from_value(&graph).unwrap();
//!
//! let config = JsonApiConfig::default();
//! let request = Request::from_url("https://api.test/posts/1?include=author").unwrap();
//! let document = JsonApi::new(&config).document(Payload::resource(&mut post), None, Some(&request));
//!
//! assert_eq!(document["data"]["relationships"]["author"]["data"]["id"], "9");
//! assert_eq!(document["included"][0]["type"], "users");
//! assert_eq!(document["included"][0]["attributes"]["firstName"], "Ada");
//! ```
//!
//! # Query Application
//!
//! | Parameter | Effect | Empty allow-list |
//! |-----------|--------|------------------|
//! | `sort=-a,b` | `order_by` per allowed field | nothing allowed |
//! | `filter[f]=v` | `where_eq`, or `where_in` for lists | nothing allowed |
//! | `include=a.b` | `eager_load` of allowed paths | unrestricted |
//! | `fields[t]=a,b` | `select`, primary key always added | unrestricted |
//!
//! Each dimension also has an allow-all switch. Disallowed entries are
//! dropped silently.

mod compound;
mod config;
mod document;
mod error;
mod error_object;
mod include;
mod keys;
mod loader;
mod method_override;
mod model;
mod pagination;
mod query;
mod relationships;
mod serializer;
mod types;
mod validator;

pub use compound::CompoundAssembler;
pub use config::{
    AllowListOverrides, AllowLists, ErrorDefaults, IncludeShaping, JsonApiConfig, JsonApiObject,
    MethodOverrideConfig, PaginationConfig, QueryConfig, RelationshipsConfig,
};
pub use document::{Document, JsonApi, Payload, Response};
pub use error::{ConfigError, DocumentViolation, GraphError, LoadError, ValidateError};
pub use error_object::{
    normalize_errors, validation_errors, ErrorObject, VALIDATION_CODE, VALIDATION_STATUS,
    VALIDATION_TITLE,
};
pub use include::{join_path, normalize_limit, IncludeLimits, IncludeNode};
pub use keys::{camelize, transform_keys};
pub use loader::{is_url, load_json, load_json_auto, load_json_str};
pub use method_override::MethodOverride;
pub use model::{
    Entity, Model, ModelSchema, Registry, Related, Relation, RelationDescriptor, TimestampColumns,
};
pub use pagination::{build as pagination_members, PageInfo, PaginationMembers};
pub use query::{
    allowed_includes, apply_model_query, apply_query, page_size, paginate_query, QueryCall,
    QueryParams, QuerySurface, RecordingQuery, Request,
};
pub use relationships::RelationshipResolver;
pub use serializer::{format_date, infer_type, kebab, pluralize, ResourceSerializer};
pub use types::{json_type_name, split_list, Cardinality, SortDirection, CONTENT_TYPE};
pub use validator::{document_schema, validate_document};

#[cfg(feature = "remote")]
pub use loader::load_json_url;
