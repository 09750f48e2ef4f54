//! Asynchronous job dispatch
//!
//! A dispatch mints one job id, stages the attached file (if any), wraps the
//! job into an envelope and publishes it, returning only once the broker has
//! acknowledged the message. Every failure after minting carries the job id.

use crate::backend::IdGenerator;
use crate::broker::JobPublisher;
use crate::config::BrokerConfig;
use crate::domain::{supports_file_attachment, Identity, JobEnvelope, JobRequest, JobType, UploadedFile};
use crate::error::{AppError, Result};
use crate::storage::BlobStore;
use metrics::counter;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

pub struct JobDispatcher {
    ids: Arc<dyn IdGenerator>,
    blobs: Arc<dyn BlobStore>,
    publisher: Arc<dyn JobPublisher>,
    topic: String,
    space: String,
    send_timeout: Duration,
}

impl JobDispatcher {
    pub fn new(
        ids: Arc<dyn IdGenerator>,
        blobs: Arc<dyn BlobStore>,
        publisher: Arc<dyn JobPublisher>,
        config: &BrokerConfig,
    ) -> Self {
        Self {
            ids,
            blobs,
            publisher,
            topic: config.job_topic(),
            space: config.space.clone(),
            send_timeout: config.send_timeout(),
        }
    }

    /// Dispatch an asynchronous job and return its id once delivery is confirmed
    pub async fn dispatch(
        &self,
        identity: &Identity,
        job: JobRequest,
        file: Option<UploadedFile>,
    ) -> Result<String> {
        let user = identity.distinguished_name();
        let job_type = job.job_type.clone();

        let result = self.run(user, job, file).await;

        let outcome = if result.is_ok() { "success" } else { "failure" };
        counter!(
            "jobgate_jobs_dispatched_total",
            "job_type" => job_type.as_str().to_string(),
            "result" => outcome
        )
        .increment(1);

        match &result {
            Ok(job_id) => tracing::info!(
                user = %user,
                action = "dispatch",
                job_id = %job_id,
                job_type = %job_type,
                "Job dispatched"
            ),
            Err(e) => tracing::warn!(
                user = %user,
                action = "dispatch",
                job_id = e.job_id().unwrap_or("-"),
                job_type = %job_type,
                error = %e,
                "Job dispatch failed"
            ),
        }

        result
    }

    async fn run(&self, user: &str, mut job: JobRequest, file: Option<UploadedFile>) -> Result<String> {
        // Rejected combinations never consume a job id
        validate_attachment(&job, file.as_ref())?;

        let job_id = self.ids.next_id().await?;

        if let Some(file) = file {
            self.stage(&job_id, &mut job, file)
                .await
                .map_err(|e| e.with_job_id(&job_id))?;
        }

        let message = JobEnvelope::new(&job_id, job, user, &self.space)
            .into_message()
            .map_err(|e| AppError::from(e).with_job_id(&job_id))?;

        match timeout(
            self.send_timeout,
            self.publisher.publish(&self.topic, &message.key, message.payload),
        )
        .await
        {
            Ok(Ok(())) => Ok(job_id),
            Ok(Err(e)) => Err(AppError::BrokerDelivery(format!(
                "Job {} was not confirmed forwarded to the broker: {}",
                job_id, e
            ))
            .with_job_id(&job_id)),
            Err(_) => Err(AppError::BrokerDelivery(format!(
                "Job {} was not confirmed forwarded to the broker within {}s",
                job_id,
                self.send_timeout.as_secs()
            ))
            .with_job_id(&job_id)),
        }
    }

    async fn stage(&self, job_id: &str, job: &mut JobRequest, file: UploadedFile) -> Result<()> {
        let key = file.staging_key(job_id);
        let length = file.len();

        let location = match self.blobs.put(&key, file.into_content(), length).await {
            Ok(location) => {
                counter!("jobgate_blob_uploads_total", "result" => "success").increment(1);
                location
            }
            Err(e) => {
                counter!("jobgate_blob_uploads_total", "result" => "failure").increment(1);
                return Err(e);
            }
        };

        tracing::debug!(job_id = %job_id, key = %key, size = length, "File staged");

        job.set_file_location(&location)?;
        Ok(())
    }
}

/// Reject file attachments the job cannot carry
fn validate_attachment(job: &JobRequest, file: Option<&UploadedFile>) -> Result<()> {
    if job.job_type.is_synchronous() {
        return Err(AppError::BadRequest(format!(
            "Job type '{}' is served synchronously",
            job.job_type
        )));
    }

    let hosted = match job.job_type {
        JobType::Ingest => job.hosted().map_err(|value| {
            AppError::BadRequest(format!("'host' must be a boolean, got {}", value))
        })?,
        _ => true,
    };

    let Some(file) = file else {
        return Ok(());
    };

    if job.job_type != JobType::Ingest {
        return Err(AppError::BadRequest(format!(
            "Job type '{}' does not accept a file",
            job.job_type
        )));
    }

    if !hosted {
        return Err(AppError::BadRequest(format!(
            "File '{}' was attached but hosting is disabled",
            file.original_name()
        )));
    }

    match job.data_type() {
        Some(data_type) if supports_file_attachment(data_type) => Ok(()),
        Some(data_type) => Err(AppError::BadRequest(format!(
            "Data type '{}' does not support a file attachment",
            data_type
        ))),
        None => Err(AppError::BadRequest(
            "Ingest with a file requires data.dataType.type".to_string(),
        )),
    }
}
