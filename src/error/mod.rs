//! Unified error handling for the job gateway

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types
///
/// Every variant is a per-request failure; nothing here is fatal to the process.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Upstream service unavailable: {0}")]
    Upstream(String),

    #[error("Job id generation failed: {0}")]
    IdGeneration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Broker delivery failed: {0}")]
    BrokerDelivery(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    /// Failure raised after a job id was minted; the id travels with the
    /// error so the caller can correlate it.
    #[error("Job {job_id} failed: {source}")]
    Job {
        job_id: String,
        #[source]
        source: Box<AppError>,
    },
}

impl AppError {
    /// Attach an already-minted job id to this error.
    pub fn with_job_id(self, job_id: impl Into<String>) -> Self {
        // Keep the first id; a job error is never re-tagged
        if matches!(self, AppError::Job { .. }) {
            return self;
        }
        AppError::Job {
            job_id: job_id.into(),
            source: Box::new(self),
        }
    }

    /// Job id carried by this error, if one was minted before the failure.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            AppError::Job { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    /// The underlying error kind, skipping the job-id decoration.
    pub fn kind(&self) -> &AppError {
        match self {
            AppError::Job { source, .. } => source.kind(),
            other => other,
        }
    }

    /// Name of the component that detected the failure.
    pub fn origin(&self) -> &'static str {
        match self.kind() {
            AppError::Authentication(_) => "identity",
            AppError::Forbidden(_) => "authorization",
            AppError::BadRequest(_) => "dispatcher",
            AppError::NotFound(_) | AppError::PayloadTooLarge(_) => "gateway",
            AppError::Upstream(_) => "proxy",
            AppError::IdGeneration(_) => "uuidgen",
            AppError::Storage(_) => "blob-store",
            AppError::BrokerDelivery(_) => "broker",
            AppError::Serialization(_) => "dispatcher",
            AppError::Internal(_) | AppError::Job { .. } => "gateway",
        }
    }

    /// HTTP status returned to the caller.
    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::IdGeneration(_) | AppError::BrokerDelivery(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Storage(_)
            | AppError::Serialization(_)
            | AppError::Internal(_)
            | AppError::Job { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self.kind() {
            AppError::Authentication(msg)
            | AppError::Forbidden(msg)
            | AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::Upstream(msg)
            | AppError::IdGeneration(msg)
            | AppError::Storage(msg)
            | AppError::BrokerDelivery(msg) => msg.clone(),
            AppError::Serialization(e) => format!("Failed to serialize job: {}", e),
            AppError::Internal(_) | AppError::Job { .. } => {
                "An internal error occurred".to_string()
            }
        }
    }
}

/// Uniform error envelope returned by every gateway route
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "jobId", skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub message: String,
    pub origin: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            kind: "error",
            job_id: None,
            message: message.into(),
            origin: origin.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let AppError::Internal(e) = self.kind() {
            tracing::error!("Internal error: {:?}", e);
        }

        let body = Json(ErrorResponse {
            kind: "error",
            job_id: self.job_id().map(str::to_string),
            message: self.public_message(),
            origin: self.origin().to_string(),
        });

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upstream(err.to_string())
    }
}
