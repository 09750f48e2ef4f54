//! Derivation of the capability a request requires

use crate::backend::JobStatusStore;
use crate::domain::{Capability, JobRequest, JobType};
use axum::http::Method;
use thiserror::Error;

/// Routes whose capability is fixed by path prefix: (method, prefix, capability)
const STATIC_CAPABILITIES: &[(Option<&str>, &str, &str)] = &[
    (None, "/admin", "admin"),
    (None, "/file", "access"),
    (Some("GET"), "/job", "status"),
];

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("request carries no job request")]
    MissingJobRequest,

    #[error("request body is not a valid job request: {0}")]
    InvalidJobRequest(String),

    #[error("repeat job does not name the job to repeat")]
    MissingRepeatTarget,

    #[error("job {job_id} to repeat could not be resolved: {reason}")]
    LookupFailed { job_id: String, reason: String },

    #[error("job {0} to repeat is itself a repeat job")]
    NestedRepeat(String),
}

/// The parts of a request classification looks at
#[derive(Debug, Clone, Copy)]
pub struct RequestTarget<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    /// JSON job request carried by the body, if any
    pub job_body: Option<&'a [u8]>,
}

impl<'a> RequestTarget<'a> {
    pub fn new(method: &'a Method, path: &'a str, job_body: Option<&'a [u8]>) -> Self {
        Self {
            method,
            path,
            job_body,
        }
    }
}

/// `prefix` matched on whole path segments: `/file` covers `/file/x` but not `/files`
fn matches_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn static_capability(method: &Method, path: &str) -> Option<Capability> {
    STATIC_CAPABILITIES
        .iter()
        .find(|(route_method, prefix, _)| {
            route_method.map_or(true, |m| m == method.as_str()) && matches_prefix(path, prefix)
        })
        .map(|(_, _, capability)| Capability::new(*capability))
}

/// Derive the capability a request requires.
///
/// Static path prefixes win; otherwise the job request's type tag is the
/// capability, with repeat jobs resolved to the type of the job they repeat.
pub async fn classify(
    target: &RequestTarget<'_>,
    store: &dyn JobStatusStore,
) -> Result<Capability, ClassificationError> {
    if let Some(capability) = static_capability(target.method, target.path) {
        return Ok(capability);
    }

    let body = target.job_body.ok_or(ClassificationError::MissingJobRequest)?;
    let request: JobRequest = serde_json::from_slice(body)
        .map_err(|e| ClassificationError::InvalidJobRequest(e.to_string()))?;

    resolve_job_capability(&request, store).await
}

/// Capability of a parsed job request.
///
/// A repeat is dereferenced exactly one level: the original job must not
/// itself be a repeat.
pub async fn resolve_job_capability(
    request: &JobRequest,
    store: &dyn JobStatusStore,
) -> Result<Capability, ClassificationError> {
    if request.job_type != JobType::Repeat {
        return Ok(Capability::new(request.job_type.as_str()));
    }

    let job_id = request
        .referenced_job_id()
        .ok_or(ClassificationError::MissingRepeatTarget)?;

    let original = store
        .get_job(job_id)
        .await
        .map_err(|e| ClassificationError::LookupFailed {
            job_id: job_id.to_string(),
            reason: e.to_string(),
        })?;

    if original.job_type == JobType::Repeat {
        return Err(ClassificationError::NestedRepeat(job_id.to_string()));
    }

    Ok(Capability::new(original.job_type.as_str()))
}
