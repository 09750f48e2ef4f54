//! Server initialization and routing

use crate::api;
use crate::backend::{IdGenerator, JobManagerClient, JobStatusStore, UuidGenClient};
use crate::broker::{JobPublisher, NatsPublisher};
use crate::config::Config;
use crate::identity::{IdentityClient, IdentityProvider};
use crate::middleware::{
    authenticate_middleware, authorize_middleware, normalize_error_response, AuthorizationState,
    ObservabilityLayer,
};
use crate::service::{ConsistencyWaiter, JobDispatcher, SynchronousProxy};
use crate::storage::{BlobStore, S3BlobStore};
use crate::telemetry;
use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// External collaborators, built once by the composition root
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub job_status: Arc<dyn JobStatusStore>,
    pub ids: Arc<dyn IdGenerator>,
    pub blobs: Arc<dyn BlobStore>,
    pub publisher: Arc<dyn JobPublisher>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<JobDispatcher>,
    pub proxy: Arc<SynchronousProxy>,
    pub consistency: Option<Arc<ConsistencyWaiter>>,
    pub authorization: AuthorizationState,
    pub prometheus: Arc<Option<PrometheusHandle>>,
    pub max_upload_bytes: usize,
    /// Bounds how many uploads are held in memory at once
    pub upload_slots: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        config: &Config,
        collaborators: Collaborators,
        prometheus: Option<PrometheusHandle>,
    ) -> crate::error::Result<Self> {
        let dispatcher = JobDispatcher::new(
            collaborators.ids,
            collaborators.blobs,
            collaborators.publisher,
            &config.broker,
        );

        let consistency = config.consistency.enabled.then(|| {
            Arc::new(ConsistencyWaiter::new(
                collaborators.job_status.clone(),
                &config.consistency,
            ))
        });

        let authorization = AuthorizationState::new(
            collaborators.identity,
            collaborators.job_status,
            config.identity.cert_header.clone(),
            config.max_upload_bytes,
        );

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            proxy: Arc::new(SynchronousProxy::new(&config.backends)?),
            consistency,
            authorization,
            prometheus: Arc::new(prometheus),
            max_upload_bytes: config.max_upload_bytes,
            upload_slots: Arc::new(Semaphore::new(config.max_concurrent_uploads)),
        })
    }

    /// Give a freshly dispatched job a chance to become queryable
    pub async fn await_visibility(&self, job_id: &str, user: &str) {
        if let Some(waiter) = &self.consistency {
            waiter.wait_for(job_id, user).await;
        }
    }
}

/// Run the server
pub async fn run(config: Config, prometheus: Option<PrometheusHandle>) -> Result<()> {
    let publisher = Arc::new(NatsPublisher::connect(&config.broker).await?);

    let collaborators = Collaborators {
        identity: Arc::new(IdentityClient::new(&config.identity)?),
        job_status: Arc::new(JobManagerClient::new(&config.backends)?),
        ids: Arc::new(UuidGenClient::new(&config.backends)?),
        blobs: Arc::new(S3BlobStore::new(&config.blob_store).await),
        publisher: publisher.clone(),
    };

    let state = AppState::new(&config, collaborators, prometheus)?;
    let app = build_router(state);

    let http_addr = config.http_addr();
    let listener = TcpListener::bind(&http_addr).await?;
    info!("HTTP server started on {}", http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, flushing broker publisher");
    if let Err(e) = publisher.flush().await {
        tracing::warn!(error = %e, "Failed to flush broker publisher");
    }
    telemetry::shutdown();

    Ok(())
}

/// Build the HTTP router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Routes behind authentication and the capability gate
    let gated = Router::new()
        .route("/job", post(api::job::submit))
        .route("/job/{job_id}", get(api::job::status))
        .route("/file/{data_id}", get(api::file::download))
        .route("/admin/stats", get(api::admin::stats))
        .route_layer(axum::middleware::from_fn_with_state(
            state.authorization.clone(),
            authorize_middleware,
        ));

    // Uploads stream to the handler, which authorizes the leading job part
    let uploads = Router::new()
        .route("/data/file", post(api::data::ingest_file))
        .route_layer(axum::middleware::from_fn_with_state(
            state.authorization.clone(),
            authenticate_middleware,
        ));

    Router::new()
        .route("/health", get(api::health::health))
        .route("/metrics", get(api::metrics::metrics_handler))
        .merge(gated)
        .merge(uploads)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(ObservabilityLayer)
        .layer(axum::middleware::from_fn(normalize_error_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
