//! Error types for loading inputs and validating documents.
//!
//! Document assembly itself is total and has no error type; failures only
//! occur at the edges where JSON is read or checked.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while loading JSON from files, strings or URLs.
#[derive(Debug, Error)]
pub enum LoadError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadError::FileNotFound { .. } | LoadError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            LoadError::NetworkError { .. } => 3,
            LoadError::InvalidJson { .. } => 2,
        }
    }
}

/// Errors while reading an object graph from JSON.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid entity at {path}: expected object, got {actual}")]
    NotAnObject { path: String, actual: String },

    #[error("invalid entity at {path}: missing string field \"kind\"")]
    MissingKind { path: String },

    #[error("invalid entity at {path}: {message}")]
    InvalidField { path: String, message: String },

    #[error("invalid relation \"{name}\" at {path}: expected null, object or array, got {actual}")]
    InvalidRelation {
        path: String,
        name: String,
        actual: String,
    },
}

impl GraphError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors while reading configuration or a model registry.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("invalid {what}: {source}")]
    Invalid {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::Load(e) => e.exit_code(),
            ConfigError::Invalid { .. } => 2,
        }
    }
}

/// Errors during document validation.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("invalid document schema: {message}")]
    Schema { message: String },

    #[error("document is not valid JSON:API: {} violation(s)", errors.len())]
    Invalid { errors: Vec<DocumentViolation> },
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::Load(e) => e.exit_code(),
            ValidateError::Schema { .. } => 2,
            ValidateError::Invalid { .. } => 1,
        }
    }
}

/// Single structural violation with path context.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DocumentViolation {
    /// JSON Pointer (RFC 6901) to the offending member.
    pub path: String,
    /// Human-readable error message.
    pub message: String,
}

impl std::fmt::Display for DocumentViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
