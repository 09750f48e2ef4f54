//! Synchronous proxy to the backend services
//!
//! Lookups are forwarded as GET keyed by job or resource id, searches as
//! POST carrying the query. A backend body declaring `"type":"error"` is
//! reshaped into the gateway error envelope and returned with a server
//! error status; any other body passes through byte for byte.

use crate::backend::{backend_url, build_http_client, resource_url, BackendError};
use crate::config::BackendConfig;
use crate::domain::{JobRequest, JobType};
use crate::error::{AppError, ErrorResponse, Result};
use axum::{
    body::{Body, Bytes},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use metrics::counter;
use reqwest::{Client, Method, Url};
use serde_json::Value;

/// Backend reply as returned to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub content_type: HeaderValue,
    pub body: Bytes,
}

impl ProxyResponse {
    /// The body as JSON. Backend bodies reaching a caller are always JSON.
    pub fn json(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.body)
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

struct BackendCall {
    method: Method,
    url: Url,
    body: Option<Value>,
}

pub struct SynchronousProxy {
    http_client: Client,
    job_manager_url: String,
    access_url: String,
    search_url: String,
}

impl SynchronousProxy {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            http_client: build_http_client(config.timeout_secs)?,
            job_manager_url: config.job_manager_url.trim_end_matches('/').to_string(),
            access_url: config.access_url.trim_end_matches('/').to_string(),
            search_url: config.search_url.trim_end_matches('/').to_string(),
        })
    }

    /// Forward a synchronous job request to its backend
    pub async fn forward(&self, job: &JobRequest) -> Result<ProxyResponse> {
        let call = self.route(job)?;
        let result = self.execute(job.job_type.as_str(), call).await;

        let outcome = match &result {
            Ok(response) if response.status.is_success() => "success",
            Ok(_) => "backend_error",
            Err(_) => "unavailable",
        };
        counter!(
            "jobgate_proxy_requests_total",
            "job_type" => job.job_type.as_str().to_string(),
            "result" => outcome
        )
        .increment(1);

        result
    }

    /// Job manager statistics for the administrative surface
    pub async fn admin_stats(&self) -> Result<ProxyResponse> {
        let call = BackendCall {
            method: Method::GET,
            url: backend_url(&self.job_manager_url, &["admin", "stats"])?,
            body: None,
        };
        self.execute("admin", call).await
    }

    /// Stream a hosted file from the access backend
    pub async fn fetch_file(&self, data_id: &str) -> Result<Response> {
        let url = resource_url(&self.access_url, "file", data_id)?;

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to reach access backend: {}", e)))?;

        if !response.status().is_success() {
            let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
            let bytes = response.bytes().await.map_err(|e| {
                AppError::Upstream(format!("Failed to read access backend response: {}", e))
            })?;
            return reshape("access", content_type, bytes).map(IntoResponse::into_response);
        }

        let mut builder = Response::builder().status(StatusCode::OK);
        for name in [
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::CONTENT_DISPOSITION,
        ] {
            if let Some(value) = response.headers().get(&name) {
                builder = builder.header(name, value.clone());
            }
        }

        builder
            .body(Body::from_stream(response.bytes_stream()))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build file response: {}", e)))
    }

    fn route(&self, job: &JobRequest) -> Result<BackendCall> {
        let call = match &job.job_type {
            JobType::Status => BackendCall {
                method: Method::GET,
                url: resource_url(
                    &self.job_manager_url,
                    "job",
                    required(job.referenced_job_id(), "jobId")?,
                )?,
                body: None,
            },
            JobType::Access => BackendCall {
                method: Method::GET,
                url: resource_url(&self.access_url, "data", required(job.data_id(), "dataId")?)?,
                body: None,
            },
            JobType::SearchData => BackendCall {
                method: Method::POST,
                url: backend_url(&self.search_url, &["api", "v1", "data", "query"])?,
                body: Some(search_body(job)),
            },
            JobType::SearchService => BackendCall {
                method: Method::POST,
                url: backend_url(&self.search_url, &["api", "v1", "service", "query"])?,
                body: Some(search_body(job)),
            },
            other => {
                return Err(AppError::BadRequest(format!(
                    "Job type '{}' is not served synchronously",
                    other
                )))
            }
        };
        Ok(call)
    }

    async fn execute(&self, tag: &str, call: BackendCall) -> Result<ProxyResponse> {
        let mut request = self.http_client.request(call.method, call.url);
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!(action = "proxy", job_type = %tag, error = %e, "Backend unreachable");
            AppError::Upstream(format!("Failed to reach {} backend: {}", tag, e))
        })?;

        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let bytes = response.bytes().await.map_err(|e| {
            AppError::Upstream(format!("Failed to read {} backend response: {}", tag, e))
        })?;

        reshape(tag, content_type, bytes)
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    value.ok_or_else(|| AppError::BadRequest(format!("Missing required field '{}'", field)))
}

/// Search backends take the `query` document, or the whole payload when absent
fn search_body(job: &JobRequest) -> Value {
    match job.query() {
        Some(query) => query.clone(),
        None => Value::Object(job.payload.clone()),
    }
}

/// Decide the caller-facing status from the backend's declared envelope type.
///
/// The body is only inspected; a passthrough returns the backend's bytes.
fn reshape(tag: &str, content_type: Option<HeaderValue>, bytes: Bytes) -> Result<ProxyResponse> {
    let body: Value = serde_json::from_slice(&bytes).map_err(|e| {
        AppError::Upstream(format!("{} backend returned a non-JSON body: {}", tag, e))
    })?;

    match BackendError::from_body(&body) {
        Some(err) => {
            tracing::warn!(
                action = "proxy",
                job_type = %tag,
                backend_message = %err.message,
                "Backend reported an error"
            );
            let origin = err.origin.unwrap_or_else(|| tag.to_string());
            let envelope = ErrorResponse::new(err.message, origin);
            Ok(ProxyResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                content_type: json_content_type(),
                body: Bytes::from(serde_json::to_vec(&envelope)?),
            })
        }
        None => Ok(ProxyResponse {
            status: StatusCode::OK,
            content_type: content_type.unwrap_or_else(json_content_type),
            body: bytes,
        }),
    }
}

fn json_content_type() -> HeaderValue {
    HeaderValue::from_static("application/json")
}
