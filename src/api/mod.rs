//! REST handlers and shared response types

pub mod admin;
pub mod data;
pub mod file;
pub mod health;
pub mod job;
pub mod metrics;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Success envelope for an accepted asynchronous job
#[derive(Debug, Serialize)]
pub struct JobCreated {
    #[serde(rename = "type")]
    kind: &'static str,
    data: JobCreatedData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobCreatedData {
    job_id: String,
}

impl JobCreated {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            kind: "job",
            data: JobCreatedData {
                job_id: job_id.into(),
            },
        }
    }
}

impl IntoResponse for JobCreated {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self)).into_response()
    }
}
