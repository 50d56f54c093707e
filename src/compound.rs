//! Compound documents: walking the include tree to build `included`.
//!
//! The walk follows the include tree, not the object graph, so it stops
//! at the requested depth even when the graph has cycles.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::include::{join_path, IncludeLimits, IncludeNode};
use crate::model::Model;
use crate::relationships::RelationshipResolver;
use crate::serializer::ResourceSerializer;

/// Builds the `included` section for a set of primary resources.
#[derive(Debug, Clone, Copy)]
pub struct CompoundAssembler<'a> {
    serializer: ResourceSerializer<'a>,
    resolver: RelationshipResolver<'a>,
    limits: &'a IncludeLimits,
}

impl<'a> CompoundAssembler<'a> {
    pub fn new(
        serializer: ResourceSerializer<'a>,
        resolver: RelationshipResolver<'a>,
        limits: &'a IncludeLimits,
    ) -> Self {
        Self {
            serializer,
            resolver,
            limits,
        }
    }

    /// Included resources for `primaries` under `tree`.
    ///
    /// Every `(type, id)` pair appears at most once; a later serialization
    /// of the same pair replaces the earlier one in place. Resources that
    /// are themselves primary data, or lack a type or id, are left out.
    pub fn assemble(
        &self,
        primaries: &[&dyn Model],
        primary_type: Option<&str>,
        tree: &IncludeNode,
    ) -> Vec<Value> {
        if tree.is_empty() {
            return Vec::new();
        }
        let mut included = IncludedSet::default();

        for primary in primaries {
            if let Some(id) = primary.key() {
                let ty = self.serializer.type_of(*primary, primary_type);
                included.exclude(&ty, &id);
            }
        }

        for primary in primaries {
            self.walk(*primary, tree, "", &mut included);
        }

        tracing::debug!(
            primaries = primaries.len(),
            include_nodes = tree.len(),
            depth = tree.depth(),
            included = included.len(),
            "assembled included resources"
        );
        included.into_values()
    }

    fn walk(&self, model: &dyn Model, node: &IncludeNode, prefix: &str, out: &mut IncludedSet) {
        for (name, child) in node.children() {
            let Some(related) = model.relation(name) else {
                continue;
            };
            let path = join_path(prefix, name);
            let limit = self.limits.resolve(&path);

            for item in related.items(limit) {
                let relationships = self.resolver.resolve(item, None, child, &path);
                let resource = self
                    .serializer
                    .from_model(item, None, None, relationships, Map::new());
                out.insert(resource);
                self.walk(item, child, &path, out);
            }
        }
    }
}

/// Request-scoped dedup map from `type:id` to resource.
#[derive(Debug, Default)]
struct IncludedSet {
    positions: HashMap<String, usize>,
    resources: Vec<Value>,
    excluded: HashSet<String>,
}

impl IncludedSet {
    fn identity(resource: &Value) -> Option<String> {
        let ty = resource.get("type")?.as_str()?;
        let id = resource.get("id")?.as_str()?;
        Some(format!("{}:{}", ty, id))
    }

    fn exclude(&mut self, ty: &str, id: &str) {
        self.excluded.insert(format!("{}:{}", ty, id));
    }

    fn insert(&mut self, resource: Value) {
        let Some(identity) = Self::identity(&resource) else {
            return;
        };
        if self.excluded.contains(&identity) {
            return;
        }
        match self.positions.get(&identity) {
            Some(&index) => self.resources[index] = resource,
            None => {
                self.positions.insert(identity, self.resources.len());
                self.resources.push(resource);
            }
        }
    }

    fn len(&self) -> usize {
        self.resources.len()
    }

    fn into_values(self) -> Vec<Value> {
        self.resources
    }
}
