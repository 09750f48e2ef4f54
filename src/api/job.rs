//! Job submission and status lookup

use super::JobCreated;
use crate::domain::{Identity, JobRequest, JobType};
use crate::error::{AppError, Result};
use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Response},
    Extension,
};

/// POST /job
///
/// Synchronous tags are answered by their backend; every other tag is
/// dispatched and answered with 201 and the new job id.
pub async fn submit(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<Response> {
    let job: JobRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid job request: {}", e)))?;

    if job.job_type.is_synchronous() {
        return Ok(state.proxy.forward(&job).await?.into_response());
    }

    let job_id = state.dispatcher.dispatch(&identity, job, None).await?;
    state.await_visibility(&job_id, identity.distinguished_name()).await;

    Ok(JobCreated::new(job_id).into_response())
}

/// GET /job/{job_id}
pub async fn status(State(state): State<AppState>, Path(job_id): Path<String>) -> Result<Response> {
    let job = JobRequest::new(JobType::Status).with_field("jobId", job_id);
    Ok(state.proxy.forward(&job).await?.into_response())
}
