//! Authentication and authorization enforcement
//!
//! Runs before every gated route: resolves the caller's identity, derives
//! the capability the request requires and checks it against the granted
//! set. The body is buffered once so the job request can be classified and
//! is then handed on untouched. The resolved [`Identity`] and [`Capability`]
//! are stored in the request extensions.
//!
//! Multipart uploads take [`authenticate_middleware`] instead: the body is
//! left streaming and the handler authorizes the leading job part with
//! [`AuthorizationState::authorize`] before it reads the file.

use crate::backend::JobStatusStore;
use crate::domain::{Capability, Identity};
use crate::error::{AppError, Result};
use crate::identity::{extract_credential, IdentityProvider};
use crate::policy::{self, RequestTarget};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Shared state for the authorization middleware
#[derive(Clone)]
pub struct AuthorizationState {
    identity: Arc<dyn IdentityProvider>,
    job_status: Arc<dyn JobStatusStore>,
    cert_header: String,
    body_limit: usize,
}

impl AuthorizationState {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        job_status: Arc<dyn JobStatusStore>,
        cert_header: impl Into<String>,
        body_limit: usize,
    ) -> Self {
        Self {
            identity,
            job_status,
            cert_header: cert_header.into(),
            body_limit,
        }
    }

    /// Classify a request and check the result against the caller's grants
    pub async fn authorize(
        &self,
        identity: &Identity,
        target: &RequestTarget<'_>,
    ) -> Result<Capability> {
        policy::enforce(identity, target, self.job_status.as_ref()).await
    }

    async fn authenticate(&self, headers: &HeaderMap) -> std::result::Result<Identity, Response> {
        let credential = extract_credential(headers, &self.cert_header).map_err(|e| {
            tracing::warn!(user = "anonymous", action = "authenticate", error = %e, "Rejected request");
            e.into_response()
        })?;

        self.identity.resolve(&credential).await.map_err(|e| {
            tracing::warn!(
                user = %credential.fingerprint(),
                action = "authenticate",
                error = %e,
                "Identity resolution failed"
            );
            as_authentication_failure(e).into_response()
        })
    }
}

pub async fn authorize_middleware(
    State(state): State<AuthorizationState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let identity = match state.authenticate(request.headers()).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    let (mut parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(
                user = %identity.distinguished_name(),
                action = "read-body",
                error = %e,
                "Request body rejected"
            );
            return AppError::PayloadTooLarge(format!(
                "Request body exceeds {} bytes",
                state.body_limit
            ))
            .into_response();
        }
    };

    let job_body = (!bytes.is_empty()).then_some(&bytes[..]);
    let target = RequestTarget::new(&parts.method, parts.uri.path(), job_body);

    let capability = match state.authorize(&identity, &target).await {
        Ok(capability) => capability,
        Err(e) => return e.into_response(),
    };

    tracing::debug!(
        user = %identity.distinguished_name(),
        capability = %capability,
        "Request authorized"
    );

    parts.extensions.insert::<Identity>(identity);
    parts.extensions.insert(capability);
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Identity only. The handler must authorize before any side effect.
pub async fn authenticate_middleware(
    State(state): State<AuthorizationState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match state.authenticate(request.headers()).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(response) => response,
    }
}

/// Every identity failure is reported as an authentication failure
fn as_authentication_failure(err: AppError) -> AppError {
    match err.kind() {
        AppError::Authentication(_) => err,
        _ => AppError::Authentication(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::job_status::MockJobStatusStore;
    use crate::domain::Credential;
    use crate::identity::MockIdentityProvider;
    use axum::{body::Bytes, http::StatusCode, routing::post, Extension, Router};
    use tower::ServiceExt;

    async fn echo_capability(
        Extension(identity): Extension<Identity>,
        Extension(capability): Extension<Capability>,
        body: Bytes,
    ) -> String {
        format!(
            "{}|{}|{}",
            identity.distinguished_name(),
            capability,
            String::from_utf8_lossy(&body)
        )
    }

    fn app(identity: MockIdentityProvider) -> Router {
        let mut store = MockJobStatusStore::new();
        store.expect_get_job().never();

        let state = AuthorizationState::new(
            Arc::new(identity),
            Arc::new(store),
            "x-client-certificate-dn",
            1024,
        );

        Router::new()
            .route("/job", post(echo_capability))
            .layer(axum::middleware::from_fn_with_state(state, authorize_middleware))
    }

    fn granting(capabilities: &'static [&'static str]) -> MockIdentityProvider {
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_resolve()
            .returning(move |_| Ok(Identity::new("CN=alice", capabilities.iter().copied())));
        identity
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_credential_returns_401() {
        let mut identity = MockIdentityProvider::new();
        identity.expect_resolve().never();

        let request = Request::builder()
            .method("POST")
            .uri("/job")
            .body(Body::from(r#"{"type":"ingest"}"#))
            .unwrap();

        let response = app(identity).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_identity_service_failure_returns_401() {
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_resolve()
            .withf(|credential| matches!(credential, Credential::ApiKey(key) if key == "k1"))
            .returning(|_| Err(AppError::Upstream("connection refused".to_string())));

        let request = Request::builder()
            .method("POST")
            .uri("/job")
            .header("Authorization", "Bearer k1")
            .body(Body::from(r#"{"type":"ingest"}"#))
            .unwrap();

        let response = app(identity).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_capability_returns_403() {
        let request = Request::builder()
            .method("POST")
            .uri("/job")
            .header("x-client-certificate-dn", "CN=alice")
            .body(Body::from(r#"{"type":"ingest"}"#))
            .unwrap();

        let response = app(granting(&["access"])).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_authorized_request_keeps_body_and_extensions() {
        let request = Request::builder()
            .method("POST")
            .uri("/job")
            .header("Authorization", "Bearer k1")
            .body(Body::from(r#"{"type":"ingest"}"#))
            .unwrap();

        let response = app(granting(&["ingest"])).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            r#"CN=alice|ingest|{"type":"ingest"}"#
        );
    }

    #[tokio::test]
    async fn test_multipart_body_on_job_route_is_denied() {
        let request = Request::builder()
            .method("POST")
            .uri("/job")
            .header("Authorization", "Bearer k1")
            .header("content-type", "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(
                "--XBOUNDARY\r\nContent-Disposition: form-data; name=\"data\"\r\n\r\n\
                 {\"type\":\"ingest\"}\r\n--XBOUNDARY--\r\n",
            ))
            .unwrap();

        let response = app(granting(&["ingest"])).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_authenticate_only_leaves_body_streaming() {
        let state = AuthorizationState::new(
            Arc::new(granting(&[])),
            Arc::new(MockJobStatusStore::new()),
            "x-client-certificate-dn",
            4,
        );
        let app = Router::new()
            .route(
                "/data/file",
                post(|Extension(identity): Extension<Identity>, body: Bytes| async move {
                    format!("{}|{}", identity.distinguished_name(), body.len())
                }),
            )
            .layer(axum::middleware::from_fn_with_state(state, authenticate_middleware));

        let request = Request::builder()
            .method("POST")
            .uri("/data/file")
            .header("Authorization", "Bearer k1")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "CN=alice|64");
    }

    #[tokio::test]
    async fn test_authenticate_only_still_rejects_missing_credential() {
        let mut identity = MockIdentityProvider::new();
        identity.expect_resolve().never();
        let state = AuthorizationState::new(
            Arc::new(identity),
            Arc::new(MockJobStatusStore::new()),
            "x-client-certificate-dn",
            4,
        );
        let app = Router::new()
            .route("/data/file", post(|| async { "reached" }))
            .layer(axum::middleware::from_fn_with_state(state, authenticate_middleware));

        let request = Request::builder()
            .method("POST")
            .uri("/data/file")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_oversized_body_returns_413() {
        let request = Request::builder()
            .method("POST")
            .uri("/job")
            .header("Authorization", "Bearer k1")
            .body(Body::from(vec![b'x'; 2048]))
            .unwrap();

        let response = app(granting(&["ingest"])).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
