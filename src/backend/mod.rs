//! Clients for the backend processing services
//!
//! - Job manager: job-status store used for repeat indirection and
//!   consistency polling
//! - Uuidgen: job id generation

pub mod job_status;
pub mod uuidgen;

pub use job_status::{JobManagerClient, JobStatusStore};
pub use uuidgen::{IdGenerator, UuidGenClient};

use crate::error::{AppError, Result};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;

/// Build a reqwest client bounded by a request timeout
pub(crate) fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create HTTP client: {}", e)))
}

/// `base` extended with `segments`, each appended as one percent-encoded path segment
pub(crate) fn backend_url(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid backend URL '{}': {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Backend URL '{}' cannot carry a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// `{base}/{collection}/{id}` for a caller-supplied resource id
pub(crate) fn resource_url(base: &str, collection: &str, id: &str) -> Result<Url> {
    validate_resource_id(id)?;
    backend_url(base, &[collection, id])
}

/// Resource ids are opaque single path segments.
///
/// Anything that could climb out of the segment or change the request
/// target once decoded by a backend is refused.
pub fn validate_resource_id(id: &str) -> Result<()> {
    let forbidden =
        |c: char| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_control() || c.is_whitespace();

    if id.is_empty() || id == "." || id == ".." || id.contains(forbidden) {
        return Err(AppError::BadRequest(format!("Invalid resource id '{}'", id.escape_default())));
    }
    Ok(())
}

/// Error body declared by the backends: `{"type":"error","message":..,"origin":..}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BackendError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub origin: Option<String>,
}

impl BackendError {
    /// Parse a backend body, returning `Some` only when it is an error envelope
    pub fn from_body(body: &serde_json::Value) -> Option<Self> {
        if body.get("type").and_then(|t| t.as_str()) != Some("error") {
            return None;
        }
        Some(serde_json::from_value(body.clone()).unwrap_or(BackendError {
            message: String::new(),
            origin: None,
        }))
    }
}
