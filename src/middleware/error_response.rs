//! Error response normalization middleware
//!
//! Framework-level rejections (route misses, wrong method, malformed
//! extractor input) come back as text/plain. They are rewritten into the
//! gateway error envelope so every error a caller sees has one shape.

use crate::error::ErrorResponse;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub async fn normalize_error_response(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    let status = response.status();

    // Liveness answers with its own plain text
    if path == "/health" {
        return response;
    }

    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));

    if is_json {
        return response;
    }

    generic_error_response(status)
}

fn generic_error_response(status: StatusCode) -> Response {
    let message = match status {
        StatusCode::BAD_REQUEST => "Malformed job request",
        StatusCode::UNAUTHORIZED => "Missing or rejected credential",
        StatusCode::FORBIDDEN => "Capability not granted",
        StatusCode::NOT_FOUND => "No such gateway route",
        StatusCode::METHOD_NOT_ALLOWED => "Method not supported on this route",
        StatusCode::PAYLOAD_TOO_LARGE => "Upload exceeds the gateway limit",
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::UNSUPPORTED_MEDIA_TYPE => {
            "Job request could not be read"
        }
        _ if status.is_client_error() => "Request rejected by gateway",
        _ => "Gateway failure",
    };

    (status, axum::Json(ErrorResponse::new(message, "gateway"))).into_response()
}
