//! Job id generation client

use super::build_http_client;
use crate::config::BackendConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

/// Source of globally unique job ids
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdGenerator: Send + Sync {
    async fn next_id(&self) -> Result<String>;
}

#[derive(Deserialize)]
struct UuidResponse {
    data: Vec<String>,
}

/// HTTP client for the uuidgen service
#[derive(Clone)]
pub struct UuidGenClient {
    base_url: String,
    http_client: Client,
}

impl UuidGenClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.uuidgen_url.trim_end_matches('/').to_string(),
            http_client: build_http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl IdGenerator for UuidGenClient {
    async fn next_id(&self) -> Result<String> {
        let url = format!("{}/uuids", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .query(&[("count", "1")])
            .send()
            .await
            .map_err(|e| AppError::IdGeneration(format!("Uuidgen unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::IdGeneration(format!(
                "Uuidgen returned {}",
                response.status()
            )));
        }

        let body: UuidResponse = response
            .json()
            .await
            .map_err(|e| AppError::IdGeneration(format!("Failed to parse uuidgen response: {}", e)))?;

        body.data
            .into_iter()
            .find(|id| !id.is_empty())
            .ok_or_else(|| AppError::IdGeneration("Uuidgen returned no id".to_string()))
    }
}
