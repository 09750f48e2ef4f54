//! Message broker publisher for job envelopes
//!
//! Envelopes go to a NATS JetStream stream. A publish only succeeds once
//! JetStream acknowledges that the message is stored; the job id is sent as
//! the `Nats-Msg-Id` header so the stream can key and deduplicate on it.

use crate::config::BrokerConfig;
use crate::error::{AppError, Result};
use async_nats::jetstream::{self, stream::Config as StreamConfig};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

/// Publishes serialized envelopes and waits for delivery confirmation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Publish `payload` on `topic` keyed by `key`; returns once the broker acknowledged it
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<()>;

    /// Flush buffered messages before shutdown
    async fn flush(&self) -> Result<()>;
}

/// NATS JetStream publisher
#[derive(Clone)]
pub struct NatsPublisher {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsPublisher {
    /// Connect and make sure the job stream exists
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        let client = async_nats::connect(&config.url).await.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Failed to connect to NATS: {}", e))
        })?;
        let jetstream = jetstream::new(client.clone());

        jetstream
            .get_or_create_stream(StreamConfig {
                name: config.stream.clone(),
                subjects: vec![config.topic.clone(), format!("{}.>", config.topic)],
                ..Default::default()
            })
            .await
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!(
                    "Failed to create stream {}: {}",
                    config.stream,
                    e
                ))
            })?;

        info!(stream = %config.stream, topic = %config.topic, "Connected to NATS JetStream");

        Ok(Self { client, jetstream })
    }
}

#[async_trait]
impl JobPublisher for NatsPublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<()> {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert(async_nats::header::NATS_MESSAGE_ID, key);

        let ack = self
            .jetstream
            .publish_with_headers(topic.to_string(), headers, payload)
            .await
            .map_err(|e| AppError::BrokerDelivery(format!("Failed to send job {}: {}", key, e)))?;

        ack.await.map_err(|e| {
            AppError::BrokerDelivery(format!("Job {} was not acknowledged: {}", key, e))
        })?;

        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| AppError::BrokerDelivery(format!("Failed to flush NATS client: {}", e)))
    }
}
