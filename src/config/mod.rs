//! Configuration management for the job gateway

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Default bound on a request body. Uploads are held in memory until staged.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Default number of uploads buffered at once
pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 4;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Upper bound for a buffered request body (uploads included)
    pub max_upload_bytes: usize,
    /// Uploads buffered at once; worst-case upload memory is this times `max_upload_bytes`
    pub max_concurrent_uploads: usize,
    /// Identity service configuration
    pub identity: IdentityConfig,
    /// Backend service endpoints
    pub backends: BackendConfig,
    /// Blob store configuration
    pub blob_store: BlobStoreConfig,
    /// Message broker configuration
    pub broker: BrokerConfig,
    /// Post-dispatch visibility polling
    pub consistency: ConsistencyConfig,
    /// Telemetry configuration
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub url: String,
    pub timeout_secs: u64,
    /// Header carrying a certificate-derived principal, set by the TLS terminator
    pub cert_header: String,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Job manager: job-status store and admin statistics
    pub job_manager_url: String,
    /// Access service: resource lookup and hosted file download
    pub access_url: String,
    pub search_url: String,
    pub uuidgen_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct BlobStoreConfig {
    pub region: String,
    pub bucket: String,
    /// Custom endpoint (MinIO, LocalStack). Enables path-style addressing.
    pub endpoint_url: Option<String>,
    /// Domain recorded in staged file locations
    pub domain: String,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub url: String,
    pub stream: String,
    pub topic: String,
    /// Deployment space tag; empty means unqualified topics
    pub space: String,
    pub send_timeout_secs: u64,
}

impl BrokerConfig {
    /// Topic jobs are published on, qualified by the space tag when one is set
    pub fn job_topic(&self) -> String {
        if self.space.is_empty() {
            self.topic.clone()
        } else {
            format!("{}.{}", self.topic, self.space)
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct ConsistencyConfig {
    pub enabled: bool,
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            attempts: 3,
            delay_ms: 250,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub metrics_enabled: bool,
    pub tracing_enabled: bool,
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
    /// "json" or "pretty"
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            tracing_enabled: false,
            otlp_endpoint: None,
            service_name: "jobgate-core".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|s| s.to_lowercase() == "true")
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| DEFAULT_MAX_UPLOAD_BYTES.to_string())
                .parse()
                .context("Invalid MAX_UPLOAD_BYTES")?,
            max_concurrent_uploads: env::var("MAX_CONCURRENT_UPLOADS")
                .unwrap_or_else(|_| DEFAULT_MAX_CONCURRENT_UPLOADS.to_string())
                .parse::<usize>()
                .context("Invalid MAX_CONCURRENT_UPLOADS")?
                .max(1),
            identity: IdentityConfig {
                url: env::var("IDENTITY_URL").context("IDENTITY_URL is required")?,
                timeout_secs: env::var("IDENTITY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                cert_header: env::var("IDENTITY_CERT_HEADER")
                    .unwrap_or_else(|_| "x-client-certificate-dn".to_string()),
            },
            backends: BackendConfig {
                job_manager_url: env::var("JOB_MANAGER_URL")
                    .context("JOB_MANAGER_URL is required")?,
                access_url: env::var("ACCESS_URL").context("ACCESS_URL is required")?,
                search_url: env::var("SEARCH_URL").context("SEARCH_URL is required")?,
                uuidgen_url: env::var("UUIDGEN_URL").context("UUIDGEN_URL is required")?,
                timeout_secs: env::var("BACKEND_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
            blob_store: BlobStoreConfig {
                region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                bucket: env::var("S3_BUCKET").context("S3_BUCKET is required")?,
                endpoint_url: env::var("S3_ENDPOINT_URL").ok(),
                domain: env::var("S3_DOMAIN").unwrap_or_else(|_| "s3.amazonaws.com".to_string()),
            },
            broker: BrokerConfig {
                url: env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
                stream: env::var("NATS_STREAM").unwrap_or_else(|_| "JOBS".to_string()),
                topic: env::var("JOB_TOPIC").unwrap_or_else(|_| "jobs.request".to_string()),
                space: env::var("SPACE").unwrap_or_default(),
                send_timeout_secs: env::var("BROKER_SEND_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            consistency: ConsistencyConfig {
                enabled: env_flag("CONSISTENCY_WAIT_ENABLED", true),
                attempts: env::var("CONSISTENCY_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                delay_ms: env::var("CONSISTENCY_DELAY_MS")
                    .unwrap_or_else(|_| "250".to_string())
                    .parse()
                    .unwrap_or(250),
            },
            telemetry: TelemetryConfig {
                metrics_enabled: env_flag("METRICS_ENABLED", false),
                tracing_enabled: env_flag("OTEL_TRACING_ENABLED", false),
                otlp_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
                service_name: env::var("OTEL_SERVICE_NAME")
                    .unwrap_or_else(|_| "jobgate-core".to_string()),
                log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            },
        })
    }

    /// Get HTTP server address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
