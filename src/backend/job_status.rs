//! Job-status store client (job manager)

use super::{build_http_client, resource_url};
use crate::config::BackendConfig;
use crate::domain::JobStatus;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};

/// Read access to the store that indexes jobs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    /// Fetch a job record. Unknown ids are `AppError::NotFound`.
    async fn get_job(&self, job_id: &str) -> Result<JobStatus>;
}

/// HTTP client for the job manager
#[derive(Clone)]
pub struct JobManagerClient {
    base_url: String,
    http_client: Client,
}

impl JobManagerClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.job_manager_url.trim_end_matches('/').to_string(),
            http_client: build_http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl JobStatusStore for JobManagerClient {
    async fn get_job(&self, job_id: &str) -> Result<JobStatus> {
        let url = resource_url(&self.base_url, "job", job_id)?;

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to get job status: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("Job {} not found", job_id)));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Failed to get job status: {} - {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse job status: {}", e)))
    }
}
