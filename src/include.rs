//! Include paths: parsing `author.company,comments` into a tree, and
//! resolving per-path fan-out caps from `max_include`.

use serde_json::Value;

/// One node of an include tree, keyed by relation name in its parent.
///
/// The root node has one child per top-level requested relation. Children
/// keep first-request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeNode {
    children: Vec<(String, IncludeNode)>,
}

impl IncludeNode {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw include expression.
    ///
    /// Entries are comma-separated, segments dot-separated. Whitespace and
    /// empty segments are dropped, so `"a..b,"` is the same as `"a.b"`;
    /// repeated paths merge.
    pub fn parse(raw: &str) -> Self {
        let mut root = Self::new();
        for entry in raw.split(',') {
            root.insert_path(entry);
        }
        root
    }

    /// Build a tree from already-split dotted paths.
    pub fn from_paths<S: AsRef<str>>(paths: &[S]) -> Self {
        let mut root = Self::new();
        for path in paths {
            root.insert_path(path.as_ref());
        }
        root
    }

    /// Merge one dotted path into the tree.
    pub fn insert_path(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split('.').map(str::trim).filter(|s| !s.is_empty()) {
            node = node.child_or_insert(segment);
        }
    }

    fn child_or_insert(&mut self, name: &str) -> &mut IncludeNode {
        let index = match self.children.iter().position(|(child, _)| child == name) {
            Some(index) => index,
            None => {
                self.children.push((name.to_string(), IncludeNode::new()));
                self.children.len() - 1
            }
        };
        &mut self.children[index].1
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Direct children, in request order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &IncludeNode)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn child(&self, name: &str) -> Option<&IncludeNode> {
        self.children
            .iter()
            .find(|(child, _)| child == name)
            .map(|(_, node)| node)
    }

    /// Names of the direct children.
    pub fn roots(&self) -> Vec<&str> {
        self.children.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn contains_root(&self, name: &str) -> bool {
        self.child(name).is_some()
    }

    /// Every complete dotted path (root to leaf), depth first.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths("", &mut out);
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, node) in &self.children {
            let path = join_path(prefix, name);
            if node.is_empty() {
                out.push(path);
            } else {
                node.collect_paths(&path, out);
            }
        }
    }

    /// Depth of the tree; an empty tree has depth zero.
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|(_, node)| 1 + node.depth())
            .max()
            .unwrap_or(0)
    }

    /// Total number of nodes below this one.
    pub fn len(&self) -> usize {
        self.children.iter().map(|(_, node)| 1 + node.len()).sum()
    }
}

/// Join a parent path and a relation name with a dot.
pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Per-path caps on how many related items are included.
///
/// The client value is either a scalar applying everywhere, or a map keyed
/// by dotted path, by nested path segments, or by leaf relation name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncludeLimits {
    client: Option<Value>,
    default: Value,
}

impl IncludeLimits {
    /// Limits from the client's `max_include` value and a configured default.
    pub fn new(client: Option<Value>, default: Value) -> Self {
        Self { client, default }
    }

    /// No caps anywhere.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Effective cap for one dotted include path; `None` means no limit.
    ///
    /// Lookup order: exact dotted key, nested segment walk, leaf name,
    /// then the configured default. Only scalar hits count; a hit that is
    /// not a positive number yields no limit.
    pub fn resolve(&self, path: &str) -> Option<usize> {
        let raw = match &self.client {
            None | Some(Value::Null) => &self.default,
            Some(Value::Object(map)) => {
                let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
                let exact = map.get(path).filter(|v| is_scalar(v));
                let walked = || {
                    let mut current = map.get(*segments.first()?)?;
                    for segment in segments.iter().skip(1) {
                        current = current.as_object()?.get(*segment)?;
                    }
                    Some(current).filter(|v| is_scalar(v))
                };
                let leaf = || {
                    segments
                        .last()
                        .and_then(|leaf| map.get(*leaf))
                        .filter(|v| is_scalar(v))
                };
                match exact.or_else(walked).or_else(leaf) {
                    Some(hit) => hit,
                    None => &self.default,
                }
            }
            Some(Value::Array(_)) => &self.default,
            Some(scalar) => scalar,
        };
        normalize_limit(raw)
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

/// Normalize a raw limit: positive integers pass, everything else is `None`.
pub fn normalize_limit(value: &Value) -> Option<usize> {
    let number = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
        }
        _ => None,
    }?;

    usize::try_from(number).ok().filter(|n| *n > 0)
}
