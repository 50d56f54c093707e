//! Client query parameters and their application to a data source.
//!
//! Sort, filter, include and field-selection requests are checked against
//! allow-lists and turned into calls on a [`QuerySurface`]. Anything not
//! allowed is dropped silently; an over-broad request is never an error.

use serde::Serialize;
use serde_json::{Map, Value};
use url::{form_urlencoded, Url};

use crate::config::{AllowListOverrides, PaginationConfig, QueryConfig};
use crate::model::ModelSchema;
use crate::types::{split_list, SortDirection};

/// Query parameters with bracket nesting resolved.
///
/// `filter[status]=a` becomes `{"filter": {"status": "a"}}` and repeated
/// `ids[]=` entries collect into an array. The raw pairs are kept in
/// arrival order for rebuilding links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    values: Map<String, Value>,
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string, with or without the leading `?`.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(form_urlencoded::parse(query.as_bytes()).into_owned())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            params.push(key.into(), value.into());
        }
        params
    }

    fn push(&mut self, key: String, value: String) {
        if key.is_empty() {
            return;
        }
        let segments = split_brackets(&key);
        insert_nested(&mut self.values, &segments, Value::String(value.clone()));
        self.pairs.push((key, value));
    }

    /// Top-level parameter by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Top-level parameter, when it is a plain string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Nested parameter addressed by a dotted path, e.g. `page.size`.
    pub fn input(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.values.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Raw `(key, value)` pairs in arrival order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

/// Split `a[b][]` into `["a", "b", ""]`.
///
/// Keys that are not well-formed bracket expressions are kept whole.
fn split_brackets(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    if open == 0 {
        return vec![key.to_string()];
    }

    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while !rest.is_empty() {
        let Some(inner) = rest.strip_prefix('[') else {
            return vec![key.to_string()];
        };
        let Some(close) = inner.find(']') else {
            return vec![key.to_string()];
        };
        segments.push(inner[..close].to_string());
        rest = &inner[close + 1..];
    }
    segments
}

fn insert_nested(target: &mut Map<String, Value>, segments: &[String], value: Value) {
    let Some((head, tail)) = segments.split_first() else {
        return;
    };
    if tail.is_empty() {
        target.insert(head.clone(), value);
        return;
    }

    let slot = target.entry(head.clone()).or_insert(Value::Null);
    if tail[0].is_empty() {
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            if tail.len() == 1 {
                items.push(value);
            } else {
                let mut child = Map::new();
                insert_nested(&mut child, &tail[1..], value);
                items.push(Value::Object(child));
            }
        }
        return;
    }

    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(child) = slot {
        insert_nested(child, tail, value);
    }
}

/// The request a document is rendered for.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    url: Url,
    pub params: QueryParams,
}

impl Request {
    /// Build a request from its full URL, query string included.
    ///
    /// # Errors
    ///
    /// Returns `url::ParseError` if `url` is not an absolute URL.
    pub fn from_url(url: &str) -> Result<Self, url::ParseError> {
        let url = Url::parse(url)?;
        let params = QueryParams::parse(url.query().unwrap_or(""));
        Ok(Self { url, params })
    }

    /// Full URL including the query string.
    pub fn full_url(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.to_string()
    }

    /// URL without query string or fragment.
    pub fn path(&self) -> String {
        let mut url = self.url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.to_string()
    }
}

/// Data-fetching capability that query directives are issued against.
pub trait QuerySurface {
    /// Result of a paginated fetch.
    type Paginated;

    /// Primary key column, force-selected by field selection.
    fn key_name(&self) -> &str;

    fn order_by(&mut self, field: &str, direction: SortDirection);

    fn where_eq(&mut self, field: &str, value: &Value);

    fn where_in(&mut self, field: &str, values: &[Value]);

    /// Load these relations alongside the primary rows.
    fn eager_load(&mut self, relations: &[String]);

    fn select(&mut self, columns: &[String]);

    fn paginate(&mut self, per_page: u64) -> Self::Paginated;
}

/// One call issued against a [`RecordingQuery`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum QueryCall {
    OrderBy {
        field: String,
        direction: SortDirection,
    },
    Where {
        field: String,
        value: Value,
    },
    WhereIn {
        field: String,
        values: Vec<Value>,
    },
    EagerLoad {
        relations: Vec<String>,
    },
    Select {
        columns: Vec<String>,
    },
    Paginate {
        per_page: u64,
    },
}

/// A query surface that records what it is asked to do.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingQuery {
    key_name: String,
    calls: Vec<QueryCall>,
}

impl Default for RecordingQuery {
    fn default() -> Self {
        Self::new("id")
    }
}

impl RecordingQuery {
    pub fn new(key_name: impl Into<String>) -> Self {
        Self {
            key_name: key_name.into(),
            calls: Vec::new(),
        }
    }

    pub fn calls(&self) -> &[QueryCall] {
        &self.calls
    }

    pub fn into_calls(self) -> Vec<QueryCall> {
        self.calls
    }
}

impl QuerySurface for RecordingQuery {
    type Paginated = u64;

    fn key_name(&self) -> &str {
        &self.key_name
    }

    fn order_by(&mut self, field: &str, direction: SortDirection) {
        self.calls.push(QueryCall::OrderBy {
            field: field.to_string(),
            direction,
        });
    }

    fn where_eq(&mut self, field: &str, value: &Value) {
        self.calls.push(QueryCall::Where {
            field: field.to_string(),
            value: value.clone(),
        });
    }

    fn where_in(&mut self, field: &str, values: &[Value]) {
        self.calls.push(QueryCall::WhereIn {
            field: field.to_string(),
            values: values.to_vec(),
        });
    }

    fn eager_load(&mut self, relations: &[String]) {
        self.calls.push(QueryCall::EagerLoad {
            relations: relations.to_vec(),
        });
    }

    fn select(&mut self, columns: &[String]) {
        self.calls.push(QueryCall::Select {
            columns: columns.to_vec(),
        });
    }

    fn paginate(&mut self, per_page: u64) -> u64 {
        self.calls.push(QueryCall::Paginate { per_page });
        per_page
    }
}

/// Apply sort, filter, include and field selection to `surface`.
///
/// `ty` names the resource type whose `fields[ty]` entry applies; without
/// it field selection is skipped.
pub fn apply_query<'q, Q: QuerySurface + ?Sized>(
    surface: &'q mut Q,
    params: &QueryParams,
    ty: Option<&str>,
    config: &QueryConfig,
) -> &'q mut Q {
    apply_sorts(surface, params, config);
    apply_filters(surface, params, config);
    apply_includes(surface, params, config);
    apply_fields(surface, params, ty, config);
    surface
}

/// [`apply_query`] with allow-lists derived from a model schema.
///
/// Schema-derived lists replace the configured ones, and `overrides`
/// replace those in turn.
pub fn apply_model_query<'q, Q: QuerySurface + ?Sized>(
    surface: &'q mut Q,
    params: &QueryParams,
    ty: Option<&str>,
    schema: &ModelSchema,
    overrides: &AllowListOverrides,
    config: &QueryConfig,
) -> &'q mut Q {
    let derived = AllowListOverrides::from(schema.allow_lists());
    let config = config.with_overrides(&derived).with_overrides(overrides);
    apply_query(surface, params, ty, &config)
}

/// Page size from `page[size]`, bounded to `1..=max_per_page`.
///
/// A missing or non-numeric size falls back to the configured default.
pub fn page_size(params: &QueryParams, config: &PaginationConfig) -> u64 {
    let requested = params.input("page.size").and_then(|value| match value {
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    });
    let per_page = match requested {
        Some(size) => u64::try_from(size).unwrap_or(0),
        None => config.default_per_page,
    };
    per_page.clamp(1, config.max_per_page.max(1))
}

/// Paginate `surface` using the client's requested page size.
pub fn paginate_query<Q: QuerySurface + ?Sized>(
    surface: &mut Q,
    params: &QueryParams,
    config: &PaginationConfig,
) -> Q::Paginated {
    let per_page = page_size(params, config);
    tracing::trace!(per_page, "paginating query");
    surface.paginate(per_page)
}

/// Requested include paths the include allow-list admits.
///
/// An empty allow-list leaves the request unrestricted.
pub fn allowed_includes(raw: &str, config: &QueryConfig) -> Vec<String> {
    restrict(
        split_list(raw),
        config.allow_all_includes,
        &config.allowed.allowed_includes,
        "include",
    )
}

fn restrict(items: Vec<String>, allow_all: bool, allowed: &[String], dimension: &str) -> Vec<String> {
    if allow_all || allowed.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| {
            let keep = allowed.contains(item);
            if !keep {
                tracing::debug!(dimension, field = %item, "dropping disallowed entry");
            }
            keep
        })
        .collect()
}

/// Sorts and filters are closed by default: an empty allow-list admits nothing.
fn admits(field: &str, allow_all: bool, allowed: &[String], dimension: &str) -> bool {
    let keep = allow_all || allowed.iter().any(|a| a == field);
    if !keep {
        tracing::debug!(dimension, field, "dropping disallowed entry");
    }
    keep
}

fn apply_sorts<Q: QuerySurface + ?Sized>(surface: &mut Q, params: &QueryParams, config: &QueryConfig) {
    let Some(raw) = params.get_str(&config.sort_param) else {
        return;
    };
    for entry in split_list(raw) {
        let (field, direction) = SortDirection::parse_entry(&entry);
        if field.is_empty()
            || !admits(field, config.allow_all_sorts, &config.allowed.allowed_sorts, "sort")
        {
            continue;
        }
        surface.order_by(field, direction);
    }
}

fn apply_filters<Q: QuerySurface + ?Sized>(surface: &mut Q, params: &QueryParams, config: &QueryConfig) {
    let Some(Value::Object(filters)) = params.get(&config.filter_param) else {
        return;
    };
    for (field, value) in filters {
        if !admits(field, config.allow_all_filters, &config.allowed.allowed_filters, "filter") {
            continue;
        }
        match value {
            Value::Array(items) => surface.where_in(field, items),
            Value::Object(map) => {
                let values: Vec<Value> = map.values().cloned().collect();
                surface.where_in(field, &values);
            }
            Value::String(s) if s.contains(',') => {
                let values: Vec<Value> = s
                    .split(',')
                    .map(|part| Value::String(part.trim().to_string()))
                    .collect();
                surface.where_in(field, &values);
            }
            scalar => surface.where_eq(field, scalar),
        }
    }
}

fn apply_includes<Q: QuerySurface + ?Sized>(surface: &mut Q, params: &QueryParams, config: &QueryConfig) {
    let Some(raw) = params.get_str(&config.include_param) else {
        return;
    };
    let includes = allowed_includes(raw, config);
    if !includes.is_empty() {
        surface.eager_load(&includes);
    }
}

fn apply_fields<Q: QuerySurface + ?Sized>(
    surface: &mut Q,
    params: &QueryParams,
    ty: Option<&str>,
    config: &QueryConfig,
) {
    let Some(ty) = ty else {
        return;
    };
    let Some(raw) = params
        .get(&config.fields_param)
        .and_then(|fields| fields.get(ty))
        .and_then(Value::as_str)
    else {
        return;
    };

    let mut columns = restrict(
        split_list(raw),
        config.allow_all_fields,
        &config.allowed.allowed_fields,
        "fields",
    );
    if columns.is_empty() {
        return;
    }
    let key_name = surface.key_name().to_string();
    if !columns.contains(&key_name) {
        columns.push(key_name);
    }
    surface.select(&columns);
}
