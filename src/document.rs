//! Top-level documents and the responses that carry them.
//!
//! [`Document`] is the low-level builder. [`JsonApi`] turns models,
//! collections, pages or raw JSON into finished documents, wiring
//! serialization, relationship linkage, compound inclusion, pagination and
//! key transformation together for one request.

use serde_json::{json, Map, Value};

use crate::compound::CompoundAssembler;
use crate::config::{IncludeShaping, JsonApiConfig, PaginationConfig};
use crate::error_object::{
    normalize_errors, validation_errors, VALIDATION_CODE, VALIDATION_TITLE,
};
use crate::include::{IncludeLimits, IncludeNode};
use crate::keys::transform_keys;
use crate::model::{Model, Registry};
use crate::pagination::{self, PageInfo};
use crate::query::{allowed_includes, Request};
use crate::relationships::RelationshipResolver;
use crate::serializer::ResourceSerializer;
use crate::types::split_list;

/// Members that mark a raw JSON object as an already-built document.
const DOCUMENT_MARKERS: &[&str] = &["data", "errors", "meta", "links", "jsonapi"];

/// A JSON:API top-level document under construction.
///
/// `data` and `errors` are mutually exclusive: setting one removes the
/// other. `meta` and `links` merge across calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    members: Map<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.remove("errors");
        self.members.insert("data".to_string(), data);
        self
    }

    pub fn with_errors(mut self, errors: Vec<Value>) -> Self {
        self.remove("data");
        self.members.insert("errors".to_string(), Value::Array(errors));
        self
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.merge("meta", meta);
        self
    }

    pub fn with_links(mut self, links: Map<String, Value>) -> Self {
        self.merge("links", links);
        self
    }

    pub fn with_included(mut self, included: Vec<Value>) -> Self {
        self.members.insert("included".to_string(), Value::Array(included));
        self
    }

    /// Set an explicit `jsonapi` member instead of the configured one.
    pub fn with_jsonapi(mut self, jsonapi: Value) -> Self {
        self.members.insert("jsonapi".to_string(), jsonapi);
        self
    }

    /// Merge pagination links and meta for `page`.
    pub fn with_pagination(self, page: &PageInfo, options: &PaginationConfig) -> Self {
        let members = pagination::build(page, options);
        self.with_links(members.links).with_meta(members.meta)
    }

    pub fn get(&self, member: &str) -> Option<&Value> {
        self.members.get(member)
    }

    /// Finish the document.
    ///
    /// The configured `jsonapi` object is added when enabled and not set
    /// explicitly, and any `jsonapi` member is dropped when disabled. Keys
    /// are transformed last.
    pub fn into_value(mut self, config: &JsonApiConfig) -> Value {
        if config.include_jsonapi {
            if !self.members.contains_key("jsonapi") {
                self.members
                    .insert("jsonapi".to_string(), config.jsonapi.to_value());
            }
        } else {
            self.remove("jsonapi");
        }

        let document = Value::Object(self.members);
        if config.transform_keys {
            transform_keys(&document, config.transform_recursive)
        } else {
            document
        }
    }

    fn merge(&mut self, member: &str, values: Map<String, Value>) {
        let slot = self
            .members
            .entry(member.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match slot {
            Value::Object(existing) => existing.extend(values),
            other => *other = Value::Object(values),
        }
    }

    fn remove(&mut self, member: &str) {
        if self.members.contains_key(member) {
            self.members = std::mem::take(&mut self.members)
                .into_iter()
                .filter(|(key, _)| key != member)
                .collect();
        }
    }
}

/// What a document is built from.
pub enum Payload<'m> {
    /// A single model; links to itself.
    Resource(&'m mut dyn Model),
    /// An unpaginated list of models.
    Collection(Vec<&'m mut dyn Model>),
    /// One page of models.
    Page {
        items: Vec<&'m mut dyn Model>,
        page: PageInfo,
    },
    /// Pre-built JSON. Documents pass through, arrays and objects become
    /// `data`, and scalars are wrapped bare.
    Raw(Value),
}

impl<'m> Payload<'m> {
    pub fn resource<M: Model>(model: &'m mut M) -> Self {
        Payload::Resource(model)
    }

    pub fn collection<M: Model>(models: &'m mut [M]) -> Self {
        Payload::Collection(models.iter_mut().map(|m| m as &mut dyn Model).collect())
    }

    pub fn page<M: Model>(models: &'m mut [M], page: PageInfo) -> Self {
        Payload::Page {
            items: models.iter_mut().map(|m| m as &mut dyn Model).collect(),
            page,
        }
    }
}

/// An HTTP response carrying a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    /// `None` for responses without content.
    pub body: Option<Value>,
}

impl Response {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: String) {
    match headers
        .iter_mut()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
    {
        Some(slot) => slot.1 = value,
        None => headers.push((name.to_string(), value)),
    }
}

/// Include tree and limits derived from one request.
struct Shape {
    tree: IncludeNode,
    limits: IncludeLimits,
}

/// Document assembly for one configuration.
#[derive(Debug, Clone, Copy)]
pub struct JsonApi<'c> {
    config: &'c JsonApiConfig,
    registry: Option<&'c Registry>,
}

impl<'c> JsonApi<'c> {
    pub fn new(config: &'c JsonApiConfig) -> Self {
        Self {
            config,
            registry: None,
        }
    }

    /// Use declared schemas for links-only relationship stubs.
    pub fn with_registry(mut self, registry: &'c Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &'c JsonApiConfig {
        self.config
    }

    /// Build the document for `payload`.
    ///
    /// `ty` overrides the inferred resource type of primary resources.
    /// The request supplies `include`, `max_include` and the URLs used for
    /// `self` and pagination links.
    pub fn document(&self, payload: Payload<'_>, ty: Option<&str>, request: Option<&Request>) -> Value {
        match payload {
            Payload::Resource(model) => {
                let self_link = self.resource_self_link(&*model, ty, request);
                let mut models = vec![model];
                let (mut data, included) = self.render(&mut models, ty, request);
                let resource = data.pop().unwrap_or(Value::Null);
                self.finish(
                    Document::new().with_data(resource).with_links(self_links(self_link)),
                    included,
                )
            }
            Payload::Collection(mut models) => {
                let (data, included) = self.render(&mut models, ty, request);
                self.finish(
                    Document::new()
                        .with_data(Value::Array(data))
                        .with_links(self_links(self.request_url(request))),
                    included,
                )
            }
            Payload::Page { mut items, page } => {
                let (data, included) = self.render(&mut items, ty, request);
                let page = self.page_for(page, request);
                self.finish(
                    Document::new()
                        .with_data(Value::Array(data))
                        .with_pagination(&page, &self.config.pagination)
                        .with_links(self_links(self.request_url(request))),
                    included,
                )
            }
            Payload::Raw(value) => self.raw_document(value, request),
        }
    }

    /// Build a response for `payload`.
    ///
    /// `204` yields no body at all. `201` for a single model adds a
    /// `Location` header pointing at the resource unless one is given.
    /// The configured content type is set unless `headers` overrides it.
    pub fn response(
        &self,
        payload: Payload<'_>,
        ty: Option<&str>,
        request: Option<&Request>,
        status: u16,
        headers: Vec<(String, String)>,
    ) -> Response {
        if status == 204 {
            return Response {
                status,
                headers: Vec::new(),
                body: None,
            };
        }

        let mut extra = headers;
        if let (201, Payload::Resource(model)) = (status, &payload) {
            if !extra.iter().any(|(k, _)| k.eq_ignore_ascii_case("Location")) {
                let location = self.resource_self_link(&**model, ty, None);
                extra.push(("Location".to_string(), location));
            }
        }

        let body = self.document(payload, ty, request);
        self.with_body(status, extra, body)
    }

    /// Response carrying normalized error objects.
    pub fn error_response(
        &self,
        errors: Vec<Value>,
        status: u16,
        headers: Vec<(String, String)>,
    ) -> Response {
        let errors = normalize_errors(errors, &self.config.errors);
        let body = Document::new().with_errors(errors).into_value(self.config);
        self.with_body(status, headers, body)
    }

    /// Response for field-keyed validation messages.
    pub fn validation_response(&self, errors: &Map<String, Value>, status: u16) -> Response {
        let errors = validation_errors(errors, VALIDATION_TITLE, VALIDATION_CODE, status);
        self.error_response(errors, status, Vec::new())
    }

    fn with_body(&self, status: u16, headers: Vec<(String, String)>, body: Value) -> Response {
        let mut all = vec![("Content-Type".to_string(), self.config.content_type.clone())];
        for (name, value) in headers {
            set_header(&mut all, &name, value);
        }
        Response {
            status,
            headers: all,
            body: Some(body),
        }
    }

    fn shape(&self, request: Option<&Request>) -> Shape {
        let query = &self.config.query;
        let Some(request) = request else {
            return Shape {
                tree: IncludeNode::new(),
                limits: IncludeLimits::new(None, query.max_include.clone()),
            };
        };

        let raw = request.params.get_str(&query.include_param).unwrap_or("");
        let paths = match self.config.relationships.include_shaping {
            IncludeShaping::AsRequested => split_list(raw),
            IncludeShaping::Allowed => allowed_includes(raw, query),
        };
        Shape {
            tree: IncludeNode::from_paths(&paths),
            limits: IncludeLimits::new(
                request.params.get(&query.max_include_param).cloned(),
                query.max_include.clone(),
            ),
        }
    }

    /// Primary resources and included resources for `models`.
    fn render(
        &self,
        models: &mut [&mut dyn Model],
        ty: Option<&str>,
        request: Option<&Request>,
    ) -> (Vec<Value>, Vec<Value>) {
        let shape = self.shape(request);

        if self.config.eager_load_includes && !shape.tree.is_empty() {
            let paths = shape.tree.paths();
            for model in models.iter_mut() {
                tracing::trace!(kind = model.kind(), includes = ?paths, "eager loading");
                model.load_missing(&paths);
            }
        }

        let shared: Vec<&dyn Model> = models.iter().map(|m| &**m).collect();
        let serializer = ResourceSerializer::new(self.config);
        let resolver = RelationshipResolver::new(serializer, self.registry, &shape.limits);

        let data = shared
            .iter()
            .map(|model| {
                let relationships = resolver.resolve(*model, ty, &shape.tree, "");
                serializer.from_model(*model, ty, None, relationships, Map::new())
            })
            .collect();

        let included = if self.config.include_compound_documents {
            CompoundAssembler::new(serializer, resolver, &shape.limits).assemble(&shared, ty, &shape.tree)
        } else {
            Vec::new()
        };
        (data, included)
    }

    fn finish(&self, document: Document, included: Vec<Value>) -> Value {
        let document = if included.is_empty() {
            document
        } else {
            document.with_included(included)
        };
        document.into_value(self.config)
    }

    fn raw_document(&self, value: Value, request: Option<&Request>) -> Value {
        match value {
            Value::Object(map) if DOCUMENT_MARKERS.iter().any(|k| map.contains_key(*k)) => {
                Value::Object(map)
            }
            value @ (Value::Array(_) | Value::Object(_)) => Document::new()
                .with_data(value)
                .with_links(self_links(self.request_url(request)))
                .into_value(self.config),
            scalar => json!({ "data": scalar }),
        }
    }

    fn page_for(&self, page: PageInfo, request: Option<&Request>) -> PageInfo {
        let mut page = page.with_page_name(self.config.pagination.page_name.clone());
        match request {
            Some(request) => {
                if page.path.is_empty() {
                    page.path = request.path();
                }
                page.append_query(request.params.pairs().iter().cloned())
            }
            None => {
                if page.path.is_empty() {
                    page.path = self.config.base_url.clone();
                }
                page
            }
        }
    }

    fn request_url(&self, request: Option<&Request>) -> String {
        match request {
            Some(request) => request.full_url(),
            None => self.config.base_url.clone(),
        }
    }

    /// The request URL when there is one, otherwise the resource URL.
    fn resource_self_link(&self, model: &dyn Model, ty: Option<&str>, request: Option<&Request>) -> String {
        if let Some(request) = request {
            return request.full_url();
        }
        let serializer = ResourceSerializer::new(self.config);
        match model.key() {
            Some(id) => serializer.resource_url(&serializer.type_of(model, ty), &id),
            None => self.config.base_url.clone(),
        }
    }
}

fn self_links(url: String) -> Map<String, Value> {
    let mut links = Map::new();
    links.insert("self".to_string(), Value::String(url));
    links
}
