//! CLI integration tests for the jsonapi-document binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("jsonapi-document"))
}

// Helper to create a temp input file
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

const POST_GRAPH: &str = r#"{
    "kind": "Post",
    "attributes": { "id": 1, "title": "Hello", "created_at": "2024-05-01 10:30:00" },
    "relations": {
        "author": {
            "kind": "User",
            "attributes": { "id": 9, "first_name": "Ada" },
            "relations": {
                "company": { "kind": "Company", "attributes": { "id": 4 } }
            }
        },
        "comments": [
            { "kind": "Comment", "attributes": { "id": 1 } },
            { "kind": "Comment", "attributes": { "id": 2 } },
            { "kind": "Comment", "attributes": { "id": 3 } }
        ]
    }
}"#;

mod render_command {
    use super::*;

    #[test]
    fn renders_compound_document() {
        let dir = TempDir::new().unwrap();
        let graph = write_temp_file(&dir, "post.json", POST_GRAPH);

        let output = cmd()
            .args([
                "render",
                graph.to_str().unwrap(),
                "--query",
                "include=author.company,comments&max_include[comments]=1",
                "--url",
                "https://api.test/posts/1",
            ])
            .output()
            .unwrap();
        assert!(output.status.success());

        let doc = stdout_json(&output);
        assert_eq!(doc["data"]["type"], "posts");
        assert_eq!(doc["data"]["attributes"]["createdAt"], "2024-05-01T10:30:00+00:00");
        assert_eq!(
            doc["data"]["relationships"]["comments"]["data"],
            json!([{ "type": "comments", "id": "1" }])
        );
        let included: Vec<String> = doc["included"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| format!("{}:{}", r["type"].as_str().unwrap(), r["id"].as_str().unwrap()))
            .collect();
        assert_eq!(included, vec!["users:9", "companies:4", "comments:1"]);
        assert_eq!(doc["included"][0]["attributes"]["firstName"], "Ada");
    }

    #[test]
    fn renders_page_with_links() {
        let dir = TempDir::new().unwrap();
        let graph = write_temp_file(
            &dir,
            "posts.json",
            r#"[
                { "kind": "Post", "attributes": { "id": 3 } },
                { "kind": "Post", "attributes": { "id": 4 } }
            ]"#,
        );

        let output = cmd()
            .args([
                "render",
                graph.to_str().unwrap(),
                "--url",
                "https://api.test/posts?page=2",
                "--page",
                "2",
                "--per-page",
                "2",
                "--total",
                "5",
            ])
            .output()
            .unwrap();
        assert!(output.status.success());

        let doc = stdout_json(&output);
        assert_eq!(doc["data"].as_array().unwrap().len(), 2);
        assert_eq!(doc["links"]["next"], "https://api.test/posts?page=3");
        assert_eq!(doc["links"]["last"], "https://api.test/posts?page=3");
        assert_eq!(doc["meta"]["page"]["lastPage"], 3);
    }

    #[test]
    fn custom_config_disables_key_transform() {
        let dir = TempDir::new().unwrap();
        let graph = write_temp_file(&dir, "post.json", POST_GRAPH);
        let config = write_temp_file(
            &dir,
            "config.json",
            r#"{ "transform_keys": false, "base_url": "https://api.test", "include_jsonapi": true }"#,
        );

        let output = cmd()
            .args([
                "render",
                graph.to_str().unwrap(),
                "--config",
                config.to_str().unwrap(),
                "--query",
                "include=author",
            ])
            .output()
            .unwrap();
        assert!(output.status.success());

        let doc = stdout_json(&output);
        assert_eq!(doc["included"][0]["attributes"]["first_name"], "Ada");
        assert_eq!(doc["included"][0]["links"]["self"], "https://api.test/users/9");
        assert_eq!(doc["jsonapi"]["version"], "1.1");
    }

    #[test]
    fn registry_adds_links_only_relationships() {
        let dir = TempDir::new().unwrap();
        let graph = write_temp_file(
            &dir,
            "post.json",
            r#"{ "kind": "Post", "attributes": { "id": 1 } }"#,
        );
        let registry = write_temp_file(
            &dir,
            "registry.json",
            r#"{ "Post": { "relations": { "tags": { "cardinality": "many", "target": "Tag" } } } }"#,
        );

        let output = cmd()
            .args([
                "render",
                graph.to_str().unwrap(),
                "--registry",
                registry.to_str().unwrap(),
                "--query",
                "include=tags",
            ])
            .output()
            .unwrap();
        assert!(output.status.success());

        let doc = stdout_json(&output);
        let tags = &doc["data"]["relationships"]["tags"];
        assert!(tags.get("data").is_none());
        assert_eq!(tags["links"]["related"], "http://localhost/posts/1/tags");
    }

    #[test]
    fn no_content_prints_nothing() {
        let dir = TempDir::new().unwrap();
        let graph = write_temp_file(&dir, "post.json", POST_GRAPH);

        cmd()
            .args(["render", graph.to_str().unwrap(), "--status", "204"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }

    #[test]
    fn pretty_output() {
        let dir = TempDir::new().unwrap();
        let graph = write_temp_file(
            &dir,
            "post.json",
            r#"{ "kind": "Post", "attributes": { "id": 1 } }"#,
        );

        cmd()
            .args(["render", graph.to_str().unwrap(), "--pretty"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\n  \"data\""));
    }

    #[test]
    fn malformed_graph_exits_2() {
        let dir = TempDir::new().unwrap();
        let graph = write_temp_file(&dir, "bad.json", r#"{ "attributes": {} }"#);

        cmd()
            .args(["render", graph.to_str().unwrap()])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("kind"));
    }

    #[test]
    fn invalid_json_exits_2() {
        let dir = TempDir::new().unwrap();
        let graph = write_temp_file(&dir, "bad.json", "{ not json");

        cmd()
            .args(["render", graph.to_str().unwrap()])
            .assert()
            .code(2);
    }

    #[test]
    fn missing_file_exits_3() {
        cmd()
            .args(["render", "/nonexistent/graph.json"])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("Error"));
    }

    #[test]
    fn invalid_config_exits_2() {
        let dir = TempDir::new().unwrap();
        let graph = write_temp_file(&dir, "post.json", POST_GRAPH);
        let config = write_temp_file(&dir, "config.json", r#"{ "transform_keys": "yes" }"#);

        cmd()
            .args([
                "render",
                graph.to_str().unwrap(),
                "--config",
                config.to_str().unwrap(),
            ])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("invalid configuration"));
    }
}

mod plan_command {
    use super::*;

    #[test]
    fn plans_filters_and_includes() {
        let output = cmd()
            .args(["plan", "filter[status]=open,draft&include=author&sort=title"])
            .output()
            .unwrap();
        assert!(output.status.success());

        assert_eq!(
            stdout_json(&output),
            json!([
                { "call": "where_in", "field": "status", "values": ["open", "draft"] },
                { "call": "eager_load", "relations": ["author"] }
            ])
        );
    }

    #[test]
    fn registry_kind_supplies_allow_lists() {
        let dir = TempDir::new().unwrap();
        let registry = write_temp_file(
            &dir,
            "registry.json",
            r#"{
                "Post": {
                    "columns": ["title", "secret"],
                    "hidden": ["secret"],
                    "relations": { "author": { "cardinality": "one", "target": "User" } }
                }
            }"#,
        );

        let output = cmd()
            .args([
                "plan",
                "sort=-title,secret&include=author,tags&fields[posts]=title",
                "--type",
                "posts",
                "--registry",
                registry.to_str().unwrap(),
                "--kind",
                "Post",
                "--paginate",
            ])
            .output()
            .unwrap();
        assert!(output.status.success());

        assert_eq!(
            stdout_json(&output),
            json!([
                { "call": "order_by", "field": "title", "direction": "desc" },
                { "call": "eager_load", "relations": ["author"] },
                { "call": "select", "columns": ["title", "id"] },
                { "call": "paginate", "per_page": 15 }
            ])
        );
    }

    #[test]
    fn unknown_kind_exits_2() {
        let dir = TempDir::new().unwrap();
        let registry = write_temp_file(&dir, "registry.json", r#"{ "Post": {} }"#);

        cmd()
            .args([
                "plan",
                "sort=title",
                "--registry",
                registry.to_str().unwrap(),
                "--kind",
                "Comment",
            ])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("not declared"));
    }
}

mod errors_command {
    use super::*;

    #[test]
    fn normalizes_error_list() {
        let dir = TempDir::new().unwrap();
        let errors = write_temp_file(
            &dir,
            "errors.json",
            r#"[{ "status": 404, "title": "Not Found" }]"#,
        );

        let output = cmd()
            .args(["errors", errors.to_str().unwrap(), "--status", "404"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let doc = stdout_json(&output);
        let error = &doc["errors"][0];
        assert_eq!(error["status"], "404");
        assert_eq!(error["title"], "Not Found");
        assert!(error["id"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(doc.get("data").is_none());
    }

    #[test]
    fn field_messages_become_validation_errors() {
        let dir = TempDir::new().unwrap();
        let errors = write_temp_file(
            &dir,
            "fields.json",
            r#"{ "title": ["is required", "is too short"] }"#,
        );

        let output = cmd()
            .args(["errors", errors.to_str().unwrap(), "--status", "422"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let doc = stdout_json(&output);
        let errors = doc["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0]["source"]["pointer"], "/data/attributes/title");
        assert_eq!(errors[1]["detail"], "is too short");
        assert_eq!(errors[0]["status"], "422");
    }

    #[test]
    fn scalar_input_exits_2() {
        let dir = TempDir::new().unwrap();
        let errors = write_temp_file(&dir, "errors.json", "42");

        cmd()
            .args(["errors", errors.to_str().unwrap()])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("got number"));
    }
}

mod validate_command {
    use super::*;

    #[test]
    fn valid_document() {
        let dir = TempDir::new().unwrap();
        let doc = write_temp_file(
            &dir,
            "doc.json",
            r#"{ "data": { "type": "posts", "id": "1", "attributes": { "title": "Hello" } } }"#,
        );

        cmd()
            .args(["validate", doc.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Valid"));
    }

    #[test]
    fn invalid_document_exits_1() {
        let dir = TempDir::new().unwrap();
        let doc = write_temp_file(&dir, "doc.json", r#"{ "data": null, "errors": [] }"#);

        cmd()
            .args(["validate", doc.to_str().unwrap()])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Validation failed"));
    }

    #[test]
    fn json_output() {
        let dir = TempDir::new().unwrap();
        let doc = write_temp_file(
            &dir,
            "doc.json",
            r#"{
                "data": [{ "type": "posts", "id": "1" }],
                "included": [{ "type": "posts", "id": "1" }]
            }"#,
        );

        let output = cmd()
            .args(["validate", doc.to_str().unwrap(), "--json"])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(1));

        let result = stdout_json(&output);
        assert_eq!(result["valid"], false);
        assert_eq!(result["errors"][0]["path"], "/included/0");
    }

    #[test]
    fn missing_document_exits_3() {
        cmd()
            .args(["validate", "/nonexistent/doc.json", "--json"])
            .assert()
            .code(3)
            .stdout(predicate::str::contains(r#""valid":false"#));
    }
}

mod cli_surface {
    use super::*;

    #[test]
    fn help_lists_commands() {
        cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("render"))
            .stdout(predicate::str::contains("plan"))
            .stdout(predicate::str::contains("errors"))
            .stdout(predicate::str::contains("validate"));
    }

    #[test]
    fn version() {
        cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("jsonapi-document"));
    }

    #[test]
    fn page_requires_per_page() {
        cmd()
            .args(["render", "graph.json", "--page", "2"])
            .assert()
            .failure();
    }
}
