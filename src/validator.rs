//! Structural validation of JSON:API top-level documents.
//!
//! The top-level shape is checked with a JSON Schema. Rules a schema cannot
//! express, such as unique resource identities across `data` and
//! `included`, are checked afterwards.

use std::collections::HashSet;

use serde_json::{json, Value};

use crate::error::{DocumentViolation, ValidateError};

/// JSON Schema for a JSON:API top-level document.
pub fn document_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "anyOf": [
            { "required": ["data"] },
            { "required": ["errors"] },
            { "required": ["meta"] }
        ],
        "not": { "required": ["data", "errors"] },
        "dependentRequired": { "included": ["data"] },
        "properties": {
            "data": {
                "oneOf": [
                    { "type": "null" },
                    { "$ref": "#/$defs/resource" },
                    { "type": "array", "items": { "$ref": "#/$defs/resource" } }
                ]
            },
            "included": {
                "type": "array",
                "items": {
                    "allOf": [
                        { "$ref": "#/$defs/resource" },
                        { "required": ["id"] }
                    ]
                }
            },
            "errors": {
                "type": "array",
                "items": { "$ref": "#/$defs/error" }
            },
            "meta": { "type": "object" },
            "links": { "$ref": "#/$defs/links" },
            "jsonapi": {
                "type": "object",
                "properties": {
                    "version": { "type": "string" },
                    "meta": { "type": "object" }
                }
            }
        },
        "additionalProperties": false,
        "$defs": {
            "identifier": {
                "type": "object",
                "required": ["type", "id"],
                "properties": {
                    "type": { "type": "string", "minLength": 1 },
                    "id": { "type": "string" },
                    "meta": { "type": "object" }
                }
            },
            "resource": {
                "type": "object",
                "required": ["type"],
                "properties": {
                    "type": { "type": "string", "minLength": 1 },
                    "id": { "type": "string" },
                    "attributes": {
                        "type": "object",
                        "not": {
                            "anyOf": [
                                { "required": ["id"] },
                                { "required": ["type"] }
                            ]
                        }
                    },
                    "relationships": {
                        "type": "object",
                        "additionalProperties": { "$ref": "#/$defs/relationship" }
                    },
                    "links": { "$ref": "#/$defs/links" },
                    "meta": { "type": "object" }
                }
            },
            "relationship": {
                "type": "object",
                "anyOf": [
                    { "required": ["data"] },
                    { "required": ["links"] },
                    { "required": ["meta"] }
                ],
                "properties": {
                    "data": {
                        "oneOf": [
                            { "type": "null" },
                            { "$ref": "#/$defs/identifier" },
                            { "type": "array", "items": { "$ref": "#/$defs/identifier" } }
                        ]
                    },
                    "links": { "$ref": "#/$defs/links" },
                    "meta": { "type": "object" }
                }
            },
            "links": {
                "type": "object",
                "additionalProperties": {
                    "oneOf": [
                        { "type": "null" },
                        { "type": "string" },
                        {
                            "type": "object",
                            "required": ["href"],
                            "properties": { "href": { "type": "string" } }
                        }
                    ]
                }
            },
            "error": {
                "type": "object",
                "properties": {
                    "id": { "type": ["string", "null"] },
                    "status": { "type": ["string", "null"] },
                    "code": { "type": ["string", "null"] },
                    "title": { "type": ["string", "null"] },
                    "detail": { "type": ["string", "null"] },
                    "source": { "type": ["object", "null"] },
                    "links": { "type": ["object", "null"] },
                    "meta": { "type": ["object", "null"] }
                }
            }
        }
    })
}

/// Validate a document's top-level structure.
///
/// # Errors
///
/// Returns `ValidateError::Invalid` listing every violation found, or
/// `ValidateError::Schema` if the built-in schema fails to compile.
pub fn validate_document(document: &Value) -> Result<(), ValidateError> {
    let schema = document_schema();
    let validator = jsonschema::validator_for(&schema).map_err(|e| ValidateError::Schema {
        message: e.to_string(),
    })?;

    let mut errors: Vec<DocumentViolation> = validator
        .iter_errors(document)
        .map(|e| DocumentViolation {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    // Identity checks only make sense on a structurally sound document.
    if errors.is_empty() {
        errors.extend(identity_violations(document));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidateError::Invalid { errors })
    }
}

/// Duplicate `(type, id)` pairs in `included`, or repeats of primary data.
fn identity_violations(document: &Value) -> Vec<DocumentViolation> {
    let mut seen = HashSet::new();
    match document.get("data") {
        Some(Value::Array(resources)) => seen.extend(resources.iter().filter_map(identity)),
        Some(resource) => seen.extend(identity(resource)),
        None => {}
    }

    let Some(Value::Array(included)) = document.get("included") else {
        return Vec::new();
    };
    included
        .iter()
        .enumerate()
        .filter_map(|(index, resource)| {
            let key = identity(resource)?;
            if seen.insert(key.clone()) {
                return None;
            }
            Some(DocumentViolation {
                path: format!("/included/{}", index),
                message: format!("resource {} appears more than once", key),
            })
        })
        .collect()
}

fn identity(resource: &Value) -> Option<String> {
    let ty = resource.get("type")?.as_str()?;
    let id = resource.get("id")?.as_str()?;
    Some(format!("{}:{}", ty, id))
}
