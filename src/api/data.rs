//! Multipart ingest with an attached file
//!
//! The route is only authenticated by middleware. The `data` part must come
//! first: it is authorized before the file part is read, and it is the job
//! that gets dispatched.

use super::JobCreated;
use crate::domain::{Identity, JobRequest, UploadedFile};
use crate::error::{AppError, Result};
use crate::policy::RequestTarget;
use crate::server::AppState;
use axum::{
    extract::{
        multipart::{Field, MultipartError},
        Multipart, State,
    },
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Extension,
};

/// Multipart part carrying the JSON job request
pub const JOB_PART: &str = "data";

/// Multipart part carrying the upload
pub const FILE_PART: &str = "file";

/// Body-limit overruns keep their 413; every other multipart failure is the caller's
fn multipart_error(context: &str, err: MultipartError) -> AppError {
    let message = format!("{}: {}", context, err.body_text());
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(message)
    } else {
        AppError::BadRequest(message)
    }
}

async fn next_part(multipart: &mut Multipart) -> Result<Option<Field<'_>>> {
    multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Invalid multipart body", e))
}

/// POST /data/file
pub async fn ingest_file(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    method: Method,
    uri: Uri,
    mut multipart: Multipart,
) -> Result<Response> {
    let job_body = match next_part(&mut multipart).await? {
        Some(field) if field.name() == Some(JOB_PART) => field
            .bytes()
            .await
            .map_err(|e| multipart_error("Failed to read job request", e))?,
        _ => {
            return Err(AppError::BadRequest(format!(
                "The first part must be '{}' carrying the job request",
                JOB_PART
            )))
        }
    };

    let target = RequestTarget::new(&method, uri.path(), Some(&job_body[..]));
    state.authorization.authorize(&identity, &target).await?;

    let job: JobRequest = serde_json::from_slice(&job_body)
        .map_err(|e| AppError::BadRequest(format!("Invalid job request: {}", e)))?;

    // Held until the upload is staged
    let _upload_slot = state
        .upload_slots
        .acquire()
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Upload slots closed: {}", e)))?;

    let mut file: Option<UploadedFile> = None;
    while let Some(field) = next_part(&mut multipart).await? {
        match field.name() {
            Some(JOB_PART) => {
                return Err(AppError::BadRequest(format!(
                    "Only one '{}' part is allowed",
                    JOB_PART
                )))
            }
            Some(FILE_PART) if file.is_some() => {
                return Err(AppError::BadRequest(format!(
                    "Only one '{}' part is allowed",
                    FILE_PART
                )))
            }
            Some(FILE_PART) => file = Some(read_file(field).await?),
            _ => {}
        }
    }

    let job_id = state.dispatcher.dispatch(&identity, job, file).await?;
    state.await_visibility(&job_id, identity.distinguished_name()).await;

    Ok(JobCreated::new(job_id).into_response())
}

async fn read_file(field: Field<'_>) -> Result<UploadedFile> {
    let name = field
        .file_name()
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::BadRequest("Uploaded file has no name".to_string()))?;
    let content = field
        .bytes()
        .await
        .map_err(|e| multipart_error("Failed to read file", e))?;
    Ok(UploadedFile::new(name, content))
}
