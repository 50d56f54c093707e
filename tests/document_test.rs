//! Integration tests for document assembly.

use std::cell::OnceCell;
use std::collections::HashSet;
use std::rc::Rc;

use jsonapi_document::{
    validate_document, Cardinality, Entity, IncludeShaping, JsonApi, JsonApiConfig, Model,
    ModelSchema, PageInfo, Payload, Registry, Related, RelationDescriptor, Request,
};
use serde_json::{json, Map, Value};

fn attrs(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn entity(kind: &str, id: u64) -> Entity {
    Entity::new(kind, attrs(json!({ "id": id })))
}

fn plain_config() -> JsonApiConfig {
    JsonApiConfig {
        transform_keys: false,
        ..Default::default()
    }
}

fn request(url: &str) -> Request {
    Request::from_url(url).unwrap()
}

fn identities(document: &Value) -> Vec<String> {
    document["included"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|r| format!("{}:{}", r["type"].as_str().unwrap(), r["id"].as_str().unwrap()))
                .collect()
        })
        .unwrap_or_default()
}

/// Post 1 with author 9 (company 4) and comments 1..=3.
fn blog_post() -> Entity {
    entity("Post", 1)
        .with_one(
            "author",
            Some(entity("User", 9).with_one("company", Some(entity("Company", 4)))),
        )
        .with_many(
            "comments",
            vec![entity("Comment", 1), entity("Comment", 2), entity("Comment", 3)],
        )
}

mod compound_documents {
    use super::*;

    #[test]
    fn nested_includes_with_limits() {
        let config = plain_config();
        let api = JsonApi::new(&config);
        let mut post = blog_post();
        let req = request(
            "https://api.test/posts/1?include=author.company,comments&max_include[comments]=1",
        );

        let doc = api.document(Payload::resource(&mut post), None, Some(&req));

        assert_eq!(
            doc["data"]["relationships"]["comments"]["data"],
            json!([{ "type": "comments", "id": "1" }])
        );
        assert_eq!(
            doc["data"]["relationships"]["author"]["data"],
            json!({ "type": "users", "id": "9" })
        );
        assert_eq!(
            identities(&doc),
            vec!["users:9", "companies:4", "comments:1"]
        );
        assert_eq!(
            doc["links"]["self"],
            "https://api.test/posts/1?include=author.company,comments&max_include[comments]=1"
        );
        assert!(validate_document(&doc).is_ok());
    }

    #[test]
    fn included_resources_have_full_shape() {
        let config = plain_config();
        let api = JsonApi::new(&config);
        let mut post = blog_post();
        let req = request("https://api.test/posts/1?include=author.company");

        let doc = api.document(Payload::resource(&mut post), None, Some(&req));
        let author = &doc["included"][0];
        assert_eq!(author["links"]["self"], "http://localhost/users/9");
        assert_eq!(
            author["relationships"]["company"]["data"],
            json!({ "type": "companies", "id": "4" })
        );
        assert_eq!(
            author["relationships"]["company"]["links"]["related"],
            "http://localhost/users/9/company"
        );
    }

    #[test]
    fn collection_shares_one_dedup_map() {
        let config = plain_config();
        let api = JsonApi::new(&config);
        let author = entity("User", 9);
        let mut posts = vec![
            entity("Post", 1).with_one("author", Some(author.clone())),
            entity("Post", 2).with_one("author", Some(author)),
            entity("Post", 3).with_one("author", None),
        ];
        let req = request("https://api.test/posts?include=author");

        let doc = api.document(Payload::collection(&mut posts), None, Some(&req));
        assert_eq!(doc["data"].as_array().unwrap().len(), 3);
        assert_eq!(doc["data"][2]["relationships"]["author"]["data"], Value::Null);
        assert_eq!(identities(&doc), vec!["users:9"]);
        assert_eq!(doc["links"]["self"], "https://api.test/posts?include=author");
    }

    #[test]
    fn no_include_means_no_included_member() {
        let config = plain_config();
        let api = JsonApi::new(&config);
        let mut post = blog_post();
        let req = request("https://api.test/posts/1");

        let doc = api.document(Payload::resource(&mut post), None, Some(&req));
        assert!(doc.get("included").is_none());
        // Loaded relations still get linkage.
        assert_eq!(doc["data"]["relationships"]["comments"]["data"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn compound_documents_can_be_disabled() {
        let config = JsonApiConfig {
            include_compound_documents: false,
            ..plain_config()
        };
        let api = JsonApi::new(&config);
        let mut post = blog_post();
        let req = request("https://api.test/posts/1?include=author");

        let doc = api.document(Payload::resource(&mut post), None, Some(&req));
        assert!(doc.get("included").is_none());
        assert_eq!(doc["data"]["relationships"]["author"]["data"]["id"], "9");
    }

    #[test]
    fn explicit_primary_type() {
        let config = plain_config();
        let api = JsonApi::new(&config);
        let mut post = blog_post();

        let doc = api.document(Payload::resource(&mut post), Some("articles"), None);
        assert_eq!(doc["data"]["type"], "articles");
        assert_eq!(doc["links"]["self"], "http://localhost/articles/1");
        assert_eq!(
            doc["data"]["relationships"]["author"]["links"]["self"],
            "http://localhost/articles/1/relationships/author"
        );
    }
}

mod cyclic_graphs {
    use super::*;

    /// A person whose friends may point back at each other.
    struct Person {
        id: u64,
        friends: OnceCell<Vec<Rc<Person>>>,
    }

    impl Person {
        fn new(id: u64) -> Self {
            Self {
                id,
                friends: OnceCell::new(),
            }
        }
    }

    impl Model for Person {
        fn kind(&self) -> &str {
            "Person"
        }

        fn key(&self) -> Option<String> {
            Some(self.id.to_string())
        }

        fn attributes(&self) -> Map<String, Value> {
            attrs(json!({ "id": self.id, "name": format!("person {}", self.id) }))
        }

        fn relations(&self) -> Vec<(&str, Related<'_>)> {
            match self.friends.get() {
                Some(friends) => vec![(
                    "friends",
                    Related::Many(friends.iter().map(|f| f.as_ref() as &dyn Model).collect()),
                )],
                None => Vec::new(),
            }
        }
    }

    #[test]
    fn walk_stops_at_requested_depth() {
        let b = Rc::new(Person::new(2));
        let c = Rc::new(Person::new(3));
        b.friends.set(vec![c.clone()]).ok().unwrap();
        c.friends.set(vec![b.clone()]).ok().unwrap();

        let mut root = Person::new(1);
        root.friends.set(vec![b.clone(), c.clone()]).ok().unwrap();

        let config = plain_config();
        let api = JsonApi::new(&config);
        let req = request(
            "https://api.test/people/1?include=friends.friends.friends.friends.friends.friends",
        );
        let doc = api.document(Payload::resource(&mut root), None, Some(&req));

        let ids = identities(&doc);
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(ids.len(), unique.len());
        assert_eq!(ids, vec!["people:2", "people:3"]);
        assert!(validate_document(&doc).is_ok());
    }

    #[test]
    fn primary_cycle_is_not_repeated_in_included() {
        let friend = Rc::new(Person::new(2));
        let back = Rc::new(Person::new(1));
        friend.friends.set(vec![back]).ok().unwrap();

        let mut root = Person::new(1);
        root.friends.set(vec![friend]).ok().unwrap();

        let config = plain_config();
        let api = JsonApi::new(&config);
        let req = request("https://api.test/people/1?include=friends.friends");
        let doc = api.document(Payload::resource(&mut root), None, Some(&req));

        assert_eq!(identities(&doc), vec!["people:2"]);
    }
}

mod eager_loading {
    use super::*;

    /// Records what it was asked to load, then materializes `author`.
    struct LazyPost {
        loaded: Vec<String>,
        author: Option<Entity>,
    }

    impl Model for LazyPost {
        fn kind(&self) -> &str {
            "Post"
        }

        fn key(&self) -> Option<String> {
            Some("1".to_string())
        }

        fn attributes(&self) -> Map<String, Value> {
            Map::new()
        }

        fn relations(&self) -> Vec<(&str, Related<'_>)> {
            match &self.author {
                Some(author) => vec![("author", Related::One(Some(author as &dyn Model)))],
                None => Vec::new(),
            }
        }

        fn load_missing(&mut self, paths: &[String]) {
            self.loaded.extend(paths.iter().cloned());
            if paths.iter().any(|p| p == "author" || p.starts_with("author.")) {
                self.author = Some(entity("User", 9));
            }
        }
    }

    #[test]
    fn requested_includes_are_loaded_before_serialization() {
        let config = plain_config();
        let api = JsonApi::new(&config);
        let mut post = LazyPost {
            loaded: Vec::new(),
            author: None,
        };
        let req = request("https://api.test/posts/1?include=author,comments.author");

        let doc = api.document(Payload::resource(&mut post), None, Some(&req));
        assert_eq!(post.loaded, vec!["author", "comments.author"]);
        assert_eq!(identities(&doc), vec!["users:9"]);
    }

    #[test]
    fn eager_loading_can_be_disabled() {
        let config = JsonApiConfig {
            eager_load_includes: false,
            ..plain_config()
        };
        let api = JsonApi::new(&config);
        let mut post = LazyPost {
            loaded: Vec::new(),
            author: None,
        };
        let req = request("https://api.test/posts/1?include=author");

        let doc = api.document(Payload::resource(&mut post), None, Some(&req));
        assert!(post.loaded.is_empty());
        assert!(doc.get("included").is_none());
    }
}

mod relationship_stubs {
    use super::*;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(
            "Post",
            ModelSchema {
                relations: vec![(
                    "tags".to_string(),
                    RelationDescriptor {
                        cardinality: Cardinality::Many,
                        target: "Tag".to_string(),
                    },
                )],
                ..Default::default()
            },
        );
        registry
    }

    #[test]
    fn declared_but_unloaded_relation_gets_links_only() {
        let config = plain_config();
        let registry = registry();
        let api = JsonApi::new(&config).with_registry(&registry);
        let mut post = entity("Post", 1);
        let req = request("https://api.test/posts/1?include=tags,ghosts");

        let doc = api.document(Payload::resource(&mut post), None, Some(&req));
        let relationships = &doc["data"]["relationships"];
        assert_eq!(
            relationships["tags"],
            json!({
                "links": {
                    "self": "http://localhost/posts/1/relationships/tags",
                    "related": "http://localhost/posts/1/tags"
                },
                "meta": { "type": "tags", "cardinality": "many" }
            })
        );
        assert!(relationships.get("ghosts").is_none());
        assert!(doc.get("included").is_none());
    }

    #[test]
    fn without_registry_no_stub() {
        let config = plain_config();
        let api = JsonApi::new(&config);
        let mut post = entity("Post", 1);
        let req = request("https://api.test/posts/1?include=tags");

        let doc = api.document(Payload::resource(&mut post), None, Some(&req));
        assert!(doc["data"].get("relationships").is_none());
    }
}

mod include_shaping {
    use super::*;

    fn config(shaping: IncludeShaping) -> JsonApiConfig {
        let mut config = plain_config();
        config.relationships.include_shaping = shaping;
        config.query.allowed.allowed_includes = vec!["author".to_string()];
        config
    }

    #[test]
    fn as_requested_shapes_from_client_list() {
        let config = config(IncludeShaping::AsRequested);
        let api = JsonApi::new(&config);
        let mut post = blog_post();
        let req = request("https://api.test/posts/1?include=author,comments");

        let doc = api.document(Payload::resource(&mut post), None, Some(&req));
        assert_eq!(identities(&doc).len(), 4);
    }

    #[test]
    fn allowed_shapes_from_allow_list() {
        let config = config(IncludeShaping::Allowed);
        let api = JsonApi::new(&config);
        let mut post = blog_post();
        let req = request("https://api.test/posts/1?include=author,comments&max_include=1");

        let doc = api.document(Payload::resource(&mut post), None, Some(&req));
        assert_eq!(identities(&doc), vec!["users:9"]);
        // Unrequested relations keep their full linkage.
        assert_eq!(
            doc["data"]["relationships"]["comments"]["data"].as_array().unwrap().len(),
            3
        );
    }
}

mod pagination {
    use super::*;

    #[test]
    fn page_document_links_and_meta() {
        let config = plain_config();
        let api = JsonApi::new(&config);
        let mut posts = vec![entity("Post", 3), entity("Post", 4)];
        let req = request("https://api.test/posts?page=2&sort=title");
        let info = PageInfo::new(2, 2, 2).with_total(5);

        let doc = api.document(Payload::page(&mut posts, info), None, Some(&req));
        assert_eq!(doc["links"]["self"], "https://api.test/posts?page=2&sort=title");
        assert_eq!(doc["links"]["first"], "https://api.test/posts?page=1&sort=title");
        assert_eq!(doc["links"]["prev"], "https://api.test/posts?page=1&sort=title");
        assert_eq!(doc["links"]["next"], "https://api.test/posts?page=3&sort=title");
        assert_eq!(doc["links"]["last"], "https://api.test/posts?page=3&sort=title");
        assert_eq!(
            doc["meta"],
            json!({
                "page": {
                    "current": 2,
                    "from": 3,
                    "to": 4,
                    "per_page": 2,
                    "total": 5,
                    "last_page": 3
                }
            })
        );
    }

    #[test]
    fn cursor_style_page_omits_total() {
        let config = JsonApiConfig::default();
        let api = JsonApi::new(&config);
        let mut posts = vec![entity("Post", 1)];
        let info = PageInfo::new(1, 1, 1).with_more(true);

        let doc = api.document(Payload::page(&mut posts, info), None, None);
        let meta = &doc["meta"]["page"];
        assert!(meta.get("total").is_none());
        assert!(meta.get("lastPage").is_none());
        assert_eq!(meta["perPage"], 1);
        assert!(doc["links"].get("last").is_none());
        assert_eq!(doc["links"]["next"], "http://localhost?page=2");
    }
}

mod responses {
    use super::*;

    #[test]
    fn no_content_ignores_payload() {
        let config = plain_config();
        let api = JsonApi::new(&config);
        let mut post = blog_post();
        let req = request("https://api.test/posts/1?include=author");

        let response = api.response(Payload::resource(&mut post), None, Some(&req), 204, Vec::new());
        assert!(response.body.is_none());

        let response = api.response(Payload::Raw(json!({ "errors": [] })), None, None, 204, Vec::new());
        assert!(response.body.is_none());
    }

    #[test]
    fn created_links_to_new_resource() {
        let config = plain_config();
        let api = JsonApi::new(&config);
        let mut post = entity("Post", 12);
        let req = request("https://api.test/posts");

        let response = api.response(Payload::resource(&mut post), None, Some(&req), 201, Vec::new());
        assert_eq!(response.status, 201);
        assert_eq!(response.header("Location"), Some("http://localhost/posts/12"));
        assert_eq!(response.body.unwrap()["data"]["id"], "12");
    }

    #[test]
    fn content_type_follows_config_and_can_be_overridden() {
        let config = JsonApiConfig {
            content_type: "application/json".to_string(),
            ..plain_config()
        };
        let api = JsonApi::new(&config);
        let response = api.response(Payload::Raw(json!([])), None, None, 200, Vec::new());
        assert_eq!(response.header("content-type"), Some("application/json"));

        let response = api.response(
            Payload::Raw(json!([])),
            None,
            None,
            200,
            vec![("Content-Type".to_string(), "text/plain".to_string())],
        );
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
        assert_eq!(response.headers.len(), 1);
    }
}

mod key_transform {
    use super::*;

    #[test]
    fn whole_document_is_camelized() {
        let config = JsonApiConfig {
            include_jsonapi: true,
            ..Default::default()
        };
        let api = JsonApi::new(&config);
        let mut user = Entity::new(
            "User",
            attrs(json!({ "id": 1, "first_name": "Ada", "created_at": "2024-01-02 03:04:05" })),
        )
        .with_one(
            "home_town",
            Some(Entity::new("City", attrs(json!({ "id": 5, "zip_code": "1000" })))),
        );
        let req = request("https://api.test/users/1?include=home_town");

        let doc = api.document(Payload::resource(&mut user), None, Some(&req));
        assert_eq!(doc["data"]["attributes"]["firstName"], "Ada");
        assert_eq!(doc["data"]["attributes"]["createdAt"], "2024-01-02T03:04:05+00:00");
        assert!(doc["data"]["relationships"].get("homeTown").is_some());
        assert_eq!(doc["included"][0]["attributes"]["zipCode"], "1000");
        assert_eq!(doc["jsonapi"], json!({ "version": "1.1" }));
    }
}
