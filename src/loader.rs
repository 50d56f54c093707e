//! JSON loading from files, strings, and HTTP URLs.
//!
//! Object graphs, configuration, registries and documents all enter the
//! crate through here.

use std::path::Path;

use serde_json::Value;

use crate::error::LoadError;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load JSON from a file path.
///
/// # Errors
///
/// Returns `LoadError::FileNotFound` if the file doesn't exist,
/// or `LoadError::InvalidJson` if the file isn't valid JSON.
pub fn load_json(path: &Path) -> Result<Value, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| LoadError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::trace!(path = %path.display(), bytes = content.len(), "loaded file");
    load_json_str(&content)
}

/// Load JSON from a string.
///
/// # Errors
///
/// Returns `LoadError::InvalidJson` if the string isn't valid JSON.
pub fn load_json_str(content: &str) -> Result<Value, LoadError> {
    serde_json::from_str(content).map_err(|source| LoadError::InvalidJson { source })
}

/// Load JSON from an HTTP/HTTPS URL.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `LoadError::NetworkError` if the request fails or the response
/// isn't valid JSON.
#[cfg(feature = "remote")]
pub fn load_json_url(url: &str) -> Result<Value, LoadError> {
    let network = |source: reqwest::Error| LoadError::NetworkError {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(network)?;

    tracing::debug!(url, "fetching JSON");
    client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .and_then(reqwest::blocking::Response::json::<Value>)
        .map_err(network)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load JSON from a file path or URL.
///
/// Automatically detects whether the source is a URL or file path.
/// URL loading requires the `remote` feature.
///
/// # Errors
///
/// Returns appropriate errors based on the source type.
pub fn load_json_auto(source: &str) -> Result<Value, LoadError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_json_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(LoadError::FileNotFound {
                path: std::path::PathBuf::from(source),
            })
        }
    } else {
        load_json(Path::new(source))
    }
}
