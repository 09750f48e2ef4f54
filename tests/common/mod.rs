//! Shared test infrastructure
//!
//! In-memory collaborators standing in for the identity service, job
//! manager, uuidgen, blob store and broker, plus helpers to drive the
//! production router with `oneshot`.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use jobgate_core::backend::{IdGenerator, JobStatusStore};
use jobgate_core::broker::JobPublisher;
use jobgate_core::config::{
    BackendConfig, BlobStoreConfig, BrokerConfig, Config, ConsistencyConfig, IdentityConfig,
    TelemetryConfig,
};
use jobgate_core::domain::{Credential, FileLocation, Identity, JobStatus, JobType};
use jobgate_core::error::{AppError, Result};
use jobgate_core::identity::IdentityProvider;
use jobgate_core::server::{build_router, AppState, Collaborators};
use jobgate_core::storage::BlobStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const CERT_HEADER: &str = "x-client-certificate-dn";
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:9";

// ============================================================================
// Test Configuration
// ============================================================================

pub fn create_test_config(backend_url: &str) -> Config {
    Config {
        http_host: "127.0.0.1".to_string(),
        http_port: 8080,
        max_upload_bytes: 1024 * 1024,
        max_concurrent_uploads: 2,
        identity: IdentityConfig {
            url: UNREACHABLE_URL.to_string(),
            timeout_secs: 5,
            cert_header: CERT_HEADER.to_string(),
        },
        backends: BackendConfig {
            job_manager_url: backend_url.to_string(),
            access_url: backend_url.to_string(),
            search_url: backend_url.to_string(),
            uuidgen_url: backend_url.to_string(),
            timeout_secs: 5,
        },
        blob_store: BlobStoreConfig {
            region: "us-east-1".to_string(),
            bucket: "hosted-files".to_string(),
            endpoint_url: None,
            domain: "s3.amazonaws.com".to_string(),
        },
        broker: BrokerConfig {
            url: "nats://127.0.0.1:4222".to_string(),
            stream: "JOBS".to_string(),
            topic: "jobs.request".to_string(),
            space: "int".to_string(),
            send_timeout_secs: 10,
        },
        consistency: ConsistencyConfig {
            enabled: false,
            ..ConsistencyConfig::default()
        },
        telemetry: TelemetryConfig::default(),
    }
}

// ============================================================================
// Fake collaborators
// ============================================================================

/// Identity service keyed by API key or certificate principal
#[derive(Default)]
pub struct FakeIdentity {
    grants: Mutex<HashMap<String, Identity>>,
    calls: AtomicUsize,
}

impl FakeIdentity {
    pub fn grant(&self, credential: &str, dn: &str, capabilities: &[&str]) {
        self.grants.lock().unwrap().insert(
            credential.to_string(),
            Identity::new(dn, capabilities.iter().copied()),
        );
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn resolve(&self, credential: &Credential) -> Result<Identity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = match credential {
            Credential::ApiKey(key) => key,
            Credential::Certificate(dn) => dn,
        };
        self.grants
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::Authentication("Credential rejected".to_string()))
    }
}

/// Job-status store backed by a map
#[derive(Default)]
pub struct FakeJobStore {
    jobs: Mutex<HashMap<String, JobStatus>>,
    lookups: AtomicUsize,
}

impl FakeJobStore {
    pub fn insert(&self, job_id: &str, job_type: JobType) {
        self.jobs.lock().unwrap().insert(
            job_id.to_string(),
            JobStatus {
                job_id: job_id.to_string(),
                status: "Success".to_string(),
                job_type,
            },
        );
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobStatusStore for FakeJobStore {
    async fn get_job(&self, job_id: &str) -> Result<JobStatus> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.jobs
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))
    }
}

/// Sequential id generator: job-1, job-2, ...
#[derive(Default)]
pub struct FakeIds {
    minted: AtomicUsize,
    unavailable: bool,
}

impl FakeIds {
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn minted(&self) -> usize {
        self.minted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdGenerator for FakeIds {
    async fn next_id(&self) -> Result<String> {
        if self.unavailable {
            return Err(AppError::IdGeneration("uuidgen unreachable".to_string()));
        }
        let n = self.minted.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("job-{}", n))
    }
}

#[derive(Debug, Clone)]
pub struct StagedObject {
    pub key: String,
    pub length: u64,
    pub content: Bytes,
}

#[derive(Default)]
pub struct FakeBlobStore {
    objects: Mutex<Vec<StagedObject>>,
    failing: bool,
}

impl FakeBlobStore {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn objects(&self) -> Vec<StagedObject> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn put(&self, key: &str, content: Bytes, length: u64) -> Result<FileLocation> {
        if self.failing {
            return Err(AppError::Storage(format!(
                "S3 rejected upload of '{}': Access Denied (AccessDenied)",
                key
            )));
        }
        self.objects.lock().unwrap().push(StagedObject {
            key: key.to_string(),
            length,
            content,
        });
        Ok(FileLocation::S3 {
            bucket_name: "hosted-files".to_string(),
            file_name: key.to_string(),
            file_size: length,
            domain_name: "s3.amazonaws.com".to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerMode {
    Ack,
    /// Acknowledgement never arrives
    Stall,
    Reject,
}

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub envelope: Value,
}

pub struct FakePublisher {
    mode: BrokerMode,
    published: Mutex<Vec<PublishedMessage>>,
    attempts: AtomicUsize,
    /// Published jobs become visible here, as the real indexer would make them
    store: Option<Arc<FakeJobStore>>,
}

impl FakePublisher {
    pub fn new(mode: BrokerMode) -> Self {
        Self {
            mode,
            published: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            store: None,
        }
    }

    pub fn indexing_into(mut self, store: Arc<FakeJobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobPublisher for FakePublisher {
    async fn publish(&self, topic: &str, key: &str, payload: Bytes) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            BrokerMode::Stall => {
                std::future::pending::<()>().await;
                Ok(())
            }
            BrokerMode::Reject => Err(AppError::BrokerDelivery(
                "stream JOBS unavailable".to_string(),
            )),
            BrokerMode::Ack => {
                let envelope: Value = serde_json::from_slice(&payload)?;
                if let Some(store) = &self.store {
                    let job_type = envelope["jobType"].as_str().unwrap_or_default();
                    store.insert(key, JobType::from(job_type));
                }
                self.published.lock().unwrap().push(PublishedMessage {
                    topic: topic.to_string(),
                    key: key.to_string(),
                    envelope,
                });
                Ok(())
            }
        }
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Test application
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub identity: Arc<FakeIdentity>,
    pub store: Arc<FakeJobStore>,
    pub ids: Arc<FakeIds>,
    pub blobs: Arc<FakeBlobStore>,
    pub publisher: Arc<FakePublisher>,
}

pub struct TestAppBuilder {
    config: Config,
    ids: FakeIds,
    blobs: FakeBlobStore,
    broker: BrokerMode,
}

impl TestAppBuilder {
    pub fn new(backend_url: &str) -> Self {
        Self {
            config: create_test_config(backend_url),
            ids: FakeIds::default(),
            blobs: FakeBlobStore::default(),
            broker: BrokerMode::Ack,
        }
    }

    pub fn ids(mut self, ids: FakeIds) -> Self {
        self.ids = ids;
        self
    }

    pub fn blobs(mut self, blobs: FakeBlobStore) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn broker(mut self, mode: BrokerMode) -> Self {
        self.broker = mode;
        self
    }

    pub fn consistency_wait(mut self, enabled: bool) -> Self {
        self.config.consistency.enabled = enabled;
        self
    }

    pub fn build(self) -> TestApp {
        let identity = Arc::new(FakeIdentity::default());
        let store = Arc::new(FakeJobStore::default());
        let ids = Arc::new(self.ids);
        let blobs = Arc::new(self.blobs);
        let publisher = Arc::new(FakePublisher::new(self.broker).indexing_into(store.clone()));

        let collaborators = Collaborators {
            identity: identity.clone(),
            job_status: store.clone(),
            ids: ids.clone(),
            blobs: blobs.clone(),
            publisher: publisher.clone(),
        };

        let state = AppState::new(&self.config, collaborators, None).unwrap();

        TestApp {
            router: build_router(state),
            identity,
            store,
            ids,
            blobs,
            publisher,
        }
    }
}

impl TestApp {
    pub fn new() -> Self {
        TestAppBuilder::new(UNREACHABLE_URL).build()
    }

    /// No id minted, no blob staged, nothing sent to the broker
    pub fn assert_no_dispatch(&self) {
        assert_eq!(self.ids.minted(), 0, "no job id may be minted");
        assert!(self.blobs.objects().is_empty(), "no file may be staged");
        assert_eq!(self.publisher.attempts(), 0, "nothing may be published");
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    /// Status, headers and the exact body bytes
    pub async fn send_raw(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
        (parts.status, parts.headers, bytes)
    }
}

// ============================================================================
// Request helpers
// ============================================================================

pub fn bearer(api_key: &str) -> String {
    format!("Bearer {}", api_key)
}

pub fn post_job(api_key: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/job")
        .header("content-type", "application/json")
        .header("authorization", bearer(api_key))
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_with_key(api_key: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("authorization", bearer(api_key))
        .body(Body::empty())
        .unwrap()
}

pub const BOUNDARY: &str = "jobgate-test-boundary";

/// One multipart part carrying the JSON job request
pub fn data_part(job: &Value) -> Vec<u8> {
    format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"data\"\r\n\
         Content-Type: application/json\r\n\r\n{job}\r\n"
    )
    .into_bytes()
}

/// One multipart part carrying an upload
pub fn file_part(name: &str, content: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    part.extend_from_slice(content);
    part.extend_from_slice(b"\r\n");
    part
}

/// Parts in the given order, closed by the final boundary
pub fn multipart_of(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut body = parts.concat();
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Multipart body with a `data` part and an optional `file` part
pub fn multipart_body(job: &Value, file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut parts = vec![data_part(job)];
    if let Some((name, content)) = file {
        parts.push(file_part(name, content));
    }
    multipart_of(&parts)
}

pub fn post_multipart(api_key: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/data/file")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header("authorization", bearer(api_key))
        .body(Body::from(body))
        .unwrap()
}

pub fn post_data_file(api_key: &str, job: &Value, file: Option<(&str, &[u8])>) -> Request<Body> {
    post_multipart(api_key, multipart_body(job, file))
}
