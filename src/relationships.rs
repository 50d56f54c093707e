//! Relationship linkage from relations already materialized on a model.
//!
//! Nothing here fetches. A relation that is not materialized is either
//! skipped or, when the client asked for it and the kind declares it,
//! emitted as a stub with links and the declared target type in `meta`.

use serde_json::{Map, Value};

use crate::include::{join_path, IncludeLimits, IncludeNode};
use crate::model::{Model, Registry, Related};
use crate::serializer::{infer_type, ResourceSerializer};

/// Resolves the `relationships` member of a resource.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipResolver<'a> {
    serializer: ResourceSerializer<'a>,
    registry: Option<&'a Registry>,
    limits: &'a IncludeLimits,
}

impl<'a> RelationshipResolver<'a> {
    pub fn new(
        serializer: ResourceSerializer<'a>,
        registry: Option<&'a Registry>,
        limits: &'a IncludeLimits,
    ) -> Self {
        Self {
            serializer,
            registry,
            limits,
        }
    }

    /// Relationship objects for `model`.
    ///
    /// `include` is the include subtree positioned at `model` and `prefix`
    /// the dotted path leading to it (empty for primary resources). Only
    /// to-many relations whose name is requested at this level are capped
    /// by the include limit for `prefix.name`.
    pub fn resolve(
        &self,
        model: &dyn Model,
        explicit_type: Option<&str>,
        include: &IncludeNode,
        prefix: &str,
    ) -> Map<String, Value> {
        let relations = model.relations();
        let mut result = Map::new();
        if relations.is_empty() && include.is_empty() {
            return result;
        }

        let config = self.serializer.config();
        let ty = self.serializer.type_of(model, explicit_type);
        let id = model.key();

        for (name, related) in &relations {
            let limit = if include.contains_root(name) {
                self.limits.resolve(&join_path(prefix, name))
            } else {
                None
            };

            let mut relation = Map::new();
            relation.insert("data".to_string(), self.linkage(related, limit));
            if let (true, Some(id)) = (config.relationship_links, id.as_deref()) {
                relation.insert(
                    "links".to_string(),
                    Value::Object(self.serializer.relationship_links(&ty, id, name)),
                );
            }
            result.insert(name.to_string(), Value::Object(relation));
        }

        let stubs_enabled = config.relationships.links_for_includes && config.relationship_links;
        if let (true, Some(registry), Some(id)) = (stubs_enabled, self.registry, id.as_deref()) {
            for name in include.roots() {
                if result.contains_key(name) {
                    continue;
                }
                let Some(descriptor) = registry.relation(model.kind(), name) else {
                    continue;
                };
                tracing::trace!(kind = model.kind(), relation = name, "links-only relationship");
                let mut meta = Map::new();
                meta.insert("type".to_string(), Value::String(infer_type(&descriptor.target)));
                meta.insert(
                    "cardinality".to_string(),
                    Value::String(descriptor.cardinality.as_str().to_string()),
                );

                let mut relation = Map::new();
                relation.insert(
                    "links".to_string(),
                    Value::Object(self.serializer.relationship_links(&ty, id, name)),
                );
                relation.insert("meta".to_string(), Value::Object(meta));
                result.insert(name.to_string(), Value::Object(relation));
            }
        }

        result
    }

    /// Resource linkage: an identifier, `null`, or an ordered identifier list.
    fn linkage(&self, related: &Related<'_>, limit: Option<usize>) -> Value {
        match related {
            Related::One(one) => one
                .and_then(|model| self.serializer.identifier(model))
                .unwrap_or(Value::Null),
            Related::Many(_) => Value::Array(
                related
                    .items(limit)
                    .into_iter()
                    .filter_map(|model| self.serializer.identifier(model))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JsonApiConfig;
    use crate::model::{Entity, ModelSchema, RelationDescriptor};
    use crate::types::Cardinality;
    use serde_json::json;

    fn entity(kind: &str, id: u64) -> Entity {
        Entity::new(kind, json!({ "id": id }).as_object().cloned().unwrap())
    }

    fn post() -> Entity {
        entity("Post", 1)
            .with_one("author", Some(entity("User", 9)))
            .with_one("editor", None)
            .with_many(
                "comments",
                vec![entity("Comment", 3), entity("Comment", 4), entity("Comment", 5)],
            )
    }

    fn config() -> JsonApiConfig {
        JsonApiConfig {
            transform_keys: false,
            ..Default::default()
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(
            "Post",
            ModelSchema {
                relations: vec![
                    (
                        "tags".to_string(),
                        RelationDescriptor {
                            cardinality: Cardinality::Many,
                            target: "Tag".to_string(),
                        },
                    ),
                    (
                        "author".to_string(),
                        RelationDescriptor {
                            cardinality: Cardinality::One,
                            target: "User".to_string(),
                        },
                    ),
                ],
                ..Default::default()
            },
        );
        registry
    }

    #[test]
    fn linkage_for_each_materialized_relation() {
        let config = config();
        let limits = IncludeLimits::unlimited();
        let resolver = RelationshipResolver::new(ResourceSerializer::new(&config), None, &limits);

        let result = resolver.resolve(&post(), None, &IncludeNode::new(), "");
        assert_eq!(result["author"]["data"], json!({ "type": "users", "id": "9" }));
        assert_eq!(result["editor"]["data"], Value::Null);
        assert_eq!(result["comments"]["data"].as_array().unwrap().len(), 3);
        assert_eq!(
            result["comments"]["links"],
            json!({
                "self": "http://localhost/posts/1/relationships/comments",
                "related": "http://localhost/posts/1/comments"
            })
        );
    }

    #[test]
    fn limit_applies_only_to_requested_relations() {
        let config = config();
        let limits = IncludeLimits::new(Some(json!(1)), Value::Null);
        let resolver = RelationshipResolver::new(ResourceSerializer::new(&config), None, &limits);

        let requested = resolver.resolve(&post(), None, &IncludeNode::parse("comments"), "");
        assert_eq!(
            requested["comments"]["data"],
            json!([{ "type": "comments", "id": "3" }])
        );

        let unrequested = resolver.resolve(&post(), None, &IncludeNode::parse("author"), "");
        assert_eq!(unrequested["comments"]["data"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn nested_prefix_selects_limit() {
        let config = config();
        let limits = IncludeLimits::new(Some(json!({ "post.comments": 2 })), Value::Null);
        let resolver = RelationshipResolver::new(ResourceSerializer::new(&config), None, &limits);

        let nested = resolver.resolve(&post(), None, &IncludeNode::parse("comments"), "post");
        assert_eq!(nested["comments"]["data"].as_array().unwrap().len(), 2);

        let top = resolver.resolve(&post(), None, &IncludeNode::parse("comments"), "");
        assert_eq!(top["comments"]["data"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn stub_for_declared_but_unloaded_relation() {
        let config = config();
        let limits = IncludeLimits::unlimited();
        let registry = registry();
        let resolver =
            RelationshipResolver::new(ResourceSerializer::new(&config), Some(&registry), &limits);

        let result = resolver.resolve(&post(), None, &IncludeNode::parse("tags,likes"), "");
        assert_eq!(
            result["tags"],
            json!({
                "links": {
                    "self": "http://localhost/posts/1/relationships/tags",
                    "related": "http://localhost/posts/1/tags"
                },
                "meta": { "type": "tags", "cardinality": "many" }
            })
        );
        assert!(result["tags"].get("data").is_none());
        // Not declared on the kind: no entry at all.
        assert!(result.get("likes").is_none());
    }

    #[test]
    fn stubs_respect_configuration() {
        let mut config = config();
        config.relationships.links_for_includes = false;
        let limits = IncludeLimits::unlimited();
        let registry = registry();
        let resolver =
            RelationshipResolver::new(ResourceSerializer::new(&config), Some(&registry), &limits);

        let result = resolver.resolve(&post(), None, &IncludeNode::parse("tags"), "");
        assert!(result.get("tags").is_none());
    }

    #[test]
    fn no_relations_and_no_includes_is_empty() {
        let config = config();
        let limits = IncludeLimits::unlimited();
        let resolver = RelationshipResolver::new(ResourceSerializer::new(&config), None, &limits);

        assert!(resolver
            .resolve(&entity("Tag", 1), None, &IncludeNode::new(), "")
            .is_empty());
    }

    #[test]
    fn unsaved_related_models_are_not_linked() {
        let config = config();
        let limits = IncludeLimits::unlimited();
        let resolver = RelationshipResolver::new(ResourceSerializer::new(&config), None, &limits);
        let draft = Entity::new("Comment", json!({ "body": "x" }).as_object().cloned().unwrap());
        let model = entity("Post", 1)
            .with_one("pinned", Some(draft.clone()))
            .with_many("comments", vec![entity("Comment", 3), draft]);

        let result = resolver.resolve(&model, None, &IncludeNode::new(), "");
        assert_eq!(result["pinned"]["data"], Value::Null);
        assert_eq!(
            result["comments"]["data"],
            json!([{ "type": "comments", "id": "3" }])
        );
    }
}
