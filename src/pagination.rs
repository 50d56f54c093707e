//! Pagination `links` and `meta` for paged result sets.
//!
//! A page either knows the total row count (offset pagination) or only
//! whether more rows follow (simple or cursor pagination). Members that
//! depend on the total are omitted when it is unknown.

use serde_json::{json, Map, Value};
use url::form_urlencoded;

use crate::config::PaginationConfig;

/// Position of one page within a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub current_page: u64,
    pub per_page: u64,
    /// Number of items on this page.
    pub count: u64,
    /// Total items across all pages, when the source can count them.
    pub total: Option<u64>,
    /// Whether another page follows; only consulted without a total.
    pub has_more: bool,
    /// URL path page links are built on.
    pub path: String,
    /// Query parameters repeated on every page link.
    pub query: Vec<(String, String)>,
    pub page_name: String,
}

impl PageInfo {
    pub fn new(current_page: u64, per_page: u64, count: u64) -> Self {
        Self {
            current_page: current_page.max(1),
            per_page: per_page.max(1),
            count,
            total: None,
            has_more: false,
            path: String::new(),
            query: Vec::new(),
            page_name: "page".to_string(),
        }
    }

    /// Page of a result set whose size is known.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Page of a result set whose size is unknown.
    pub fn with_more(mut self, has_more: bool) -> Self {
        self.has_more = has_more;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_page_name(mut self, page_name: impl Into<String>) -> Self {
        self.page_name = page_name.into();
        self
    }

    /// Carry extra query parameters on every generated link.
    ///
    /// A parameter already present keeps its position and takes the new
    /// value.
    pub fn append_query<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in pairs {
            let (key, value) = (key.into(), value.into());
            match self.query.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = value,
                None => self.query.push((key, value)),
            }
        }
        self
    }

    /// 1-based index of the first item on this page.
    pub fn first_item(&self) -> Option<u64> {
        (self.count > 0).then(|| {
            self.current_page
                .saturating_sub(1)
                .saturating_mul(self.per_page)
                .saturating_add(1)
        })
    }

    /// 1-based index of the last item on this page.
    pub fn last_item(&self) -> Option<u64> {
        self.first_item()
            .map(|first| first.saturating_add(self.count - 1))
    }

    /// Last page number, when the total is known.
    pub fn last_page(&self) -> Option<u64> {
        let per_page = self.per_page.max(1);
        self.total.map(|total| {
            let pages = total / per_page + u64::from(total % per_page != 0);
            pages.max(1)
        })
    }

    pub fn has_more_pages(&self) -> bool {
        match self.last_page() {
            Some(last) => self.current_page < last,
            None => self.has_more,
        }
    }

    /// Link to a page, carrying the appended query parameters.
    pub fn url(&self, page: u64) -> String {
        let page = page.max(1).to_string();
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        let mut page_written = false;
        for (key, value) in &self.query {
            if *key == self.page_name {
                serializer.append_pair(key, &page);
                page_written = true;
            } else {
                serializer.append_pair(key, value);
            }
        }
        if !page_written {
            serializer.append_pair(&self.page_name, &page);
        }

        let separator = if self.path.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.path, separator, serializer.finish())
    }

    pub fn previous_page_url(&self) -> Option<String> {
        (self.current_page > 1).then(|| self.url(self.current_page - 1))
    }

    pub fn next_page_url(&self) -> Option<String> {
        let next = self.current_page.checked_add(1)?;
        self.has_more_pages().then(|| self.url(next))
    }
}

/// Pagination document members.
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationMembers {
    pub links: Map<String, Value>,
    pub meta: Map<String, Value>,
}

/// Build pagination `links` and `meta` for a page.
///
/// `links` always has `self`, `first`, `prev` and `next`, with `last` only
/// when the total is known. `meta` nests `current`, `from`, `to` and
/// `per_page` under the configured key, plus `total` and `last_page` when
/// enabled and known.
pub fn build(page: &PageInfo, options: &PaginationConfig) -> PaginationMembers {
    let mut links = Map::new();
    links.insert("self".to_string(), json!(page.url(page.current_page)));
    links.insert("first".to_string(), json!(page.url(1)));
    links.insert("prev".to_string(), json!(page.previous_page_url()));
    links.insert("next".to_string(), json!(page.next_page_url()));
    if let Some(last) = page.last_page() {
        links.insert("last".to_string(), json!(page.url(last)));
    }

    let mut inner = Map::new();
    inner.insert("current".to_string(), json!(page.current_page));
    inner.insert("from".to_string(), json!(page.first_item()));
    inner.insert("to".to_string(), json!(page.last_item()));
    inner.insert("per_page".to_string(), json!(page.per_page));
    if let (true, Some(total)) = (options.include_total, page.total) {
        inner.insert("total".to_string(), json!(total));
    }
    if let (true, Some(last)) = (options.include_last_page, page.last_page()) {
        inner.insert("last_page".to_string(), json!(last));
    }

    let mut meta = Map::new();
    meta.insert(options.meta_key.clone(), Value::Object(inner));

    PaginationMembers { links, meta }
}
