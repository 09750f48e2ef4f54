//! Blob store for staged uploads
//!
//! The production store is S3 (or any S3-compatible service such as MinIO
//! when an endpoint URL is configured). Credentials come from the standard
//! AWS chain: environment, shared credentials file, instance profile.

use crate::config::BlobStoreConfig;
use crate::domain::FileLocation;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3Builder;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;

/// Durable storage for uploaded files
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `content` under `key` and return where it landed
    async fn put(&self, key: &str, content: Bytes, length: u64) -> Result<FileLocation>;
}

/// S3-backed blob store
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    domain: String,
}

impl S3BlobStore {
    /// Build the store, loading credentials through the AWS SDK chain
    pub async fn new(config: &BlobStoreConfig) -> Self {
        let region = aws_sdk_s3::config::Region::new(config.region.clone());
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;

        let mut builder = S3Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            domain: config.domain.clone(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, content: Bytes, length: u64) -> Result<FileLocation> {
        let content_length = i64::try_from(length)
            .map_err(|_| AppError::Storage(format!("File '{}' is too large to stage", key)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(content_length)
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|err| match err {
                SdkError::ServiceError(service) => {
                    let inner = service.err();
                    AppError::Storage(format!(
                        "S3 rejected upload of '{}': {} ({})",
                        key,
                        inner.message().unwrap_or("no message"),
                        inner.code().unwrap_or("unknown")
                    ))
                }
                other => AppError::Storage(format!(
                    "S3 upload of '{}' failed: {}",
                    key,
                    DisplayErrorContext(&other)
                )),
            })?;

        Ok(FileLocation::S3 {
            bucket_name: self.bucket.clone(),
            file_name: key.to_string(),
            file_size: length,
            domain_name: self.domain.clone(),
        })
    }
}
