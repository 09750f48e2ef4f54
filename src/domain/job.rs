//! Job request, envelope and staging models

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Data types whose ingest may carry an uploaded file
pub const FILE_DATA_TYPES: &[&str] = &["raster", "shapefile", "geojson", "pointcloud"];

/// Whether a data type accepts a hosted file attachment
pub fn supports_file_attachment(data_type: &str) -> bool {
    FILE_DATA_TYPES.contains(&data_type)
}

/// Job type tag. The tag doubles as the capability name required to submit it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    /// Job status lookup
    Status,
    /// Resource (data) lookup
    Access,
    /// Data catalog search
    SearchData,
    /// Service registry search
    SearchService,
    Ingest,
    /// Re-run of an earlier job
    Repeat,
    Other(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::Status => "status",
            JobType::Access => "access",
            JobType::SearchData => "search-data",
            JobType::SearchService => "search-service",
            JobType::Ingest => "ingest",
            JobType::Repeat => "repeat",
            JobType::Other(tag) => tag,
        }
    }

    /// Synchronous tags are proxied to a backend; all others are dispatched to the broker.
    pub fn is_synchronous(&self) -> bool {
        matches!(
            self,
            JobType::Status | JobType::Access | JobType::SearchData | JobType::SearchService
        )
    }
}

impl From<String> for JobType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "status" => JobType::Status,
            "access" => JobType::Access,
            "search-data" => JobType::SearchData,
            "search-service" => JobType::SearchService,
            "ingest" => JobType::Ingest,
            "repeat" => JobType::Repeat,
            _ => JobType::Other(tag),
        }
    }
}

impl From<&str> for JobType {
    fn from(tag: &str) -> Self {
        JobType::from(tag.to_string())
    }
}

impl From<JobType> for String {
    fn from(job_type: JobType) -> Self {
        job_type.as_str().to_string()
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound job request: `{"type": <tag>, ...payload}`
///
/// The payload stays opaque apart from the few fields the gateway itself
/// routes on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl JobRequest {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            payload: Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Job referenced by status lookups and repeats
    pub fn referenced_job_id(&self) -> Option<&str> {
        self.str_field("jobId")
    }

    /// Resource referenced by access lookups
    pub fn data_id(&self) -> Option<&str> {
        self.str_field("dataId")
    }

    /// Query document for the search variants
    pub fn query(&self) -> Option<&Value> {
        self.payload.get("query").filter(|q| !q.is_null())
    }

    /// Whether an ingest asks the gateway to host its data. Absent or null
    /// means hosted; a `host` that is not a boolean comes back as `Err`.
    pub fn hosted(&self) -> Result<bool, &Value> {
        match self.payload.get("host") {
            None | Some(Value::Null) => Ok(true),
            Some(Value::Bool(host)) => Ok(*host),
            Some(other) => Err(other),
        }
    }

    /// `data.dataType.type` of an ingest payload
    pub fn data_type(&self) -> Option<&str> {
        self.payload
            .get("data")?
            .get("dataType")?
            .get("type")?
            .as_str()
    }

    /// Point `data.dataType.location` at a staged file
    pub fn set_file_location(&mut self, location: &FileLocation) -> Result<(), serde_json::Error> {
        let location = serde_json::to_value(location)?;
        let data_type = self
            .payload
            .get_mut("data")
            .and_then(|data| data.get_mut("dataType"))
            .and_then(Value::as_object_mut);

        match data_type {
            Some(data_type) => {
                data_type.insert("location".to_string(), location);
                Ok(())
            }
            None => Err(serde::ser::Error::custom(
                "ingest payload has no data.dataType object",
            )),
        }
    }
}

/// Where a staged file lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FileLocation {
    #[serde(rename = "s3", rename_all = "camelCase")]
    S3 {
        bucket_name: String,
        file_name: String,
        file_size: u64,
        domain_name: String,
    },
}

/// Uploaded file, consumed exactly once by staging
#[derive(Debug)]
pub struct UploadedFile {
    original_name: String,
    length: u64,
    content: Bytes,
}

impl UploadedFile {
    pub fn new(original_name: impl Into<String>, content: Bytes) -> Self {
        Self {
            original_name: original_name.into(),
            length: content.len() as u64,
            content,
        }
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Object key under which the file is staged for a job
    pub fn staging_key(&self, job_id: &str) -> String {
        format!("{}-{}", job_id, self.original_name)
    }

    pub fn into_content(self) -> Bytes {
        self.content
    }
}

/// Durable unit published to the broker for one asynchronous job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    job_id: String,
    job_type: JobType,
    job: JobRequest,
    submitter: String,
    space: String,
    created_at: DateTime<Utc>,
}

/// Serialized envelope ready for publishing, keyed by job id
#[derive(Debug, Clone)]
pub struct EnvelopeMessage {
    pub key: String,
    pub payload: Bytes,
}

impl JobEnvelope {
    pub fn new(
        job_id: impl Into<String>,
        job: JobRequest,
        submitter: impl Into<String>,
        space: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            job_type: job.job_type.clone(),
            job,
            submitter: submitter.into(),
            space: space.into(),
            created_at: Utc::now(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn job(&self) -> &JobRequest {
        &self.job
    }

    /// Serialize into the broker message. Consumes the envelope so it can be sent once.
    pub fn into_message(self) -> Result<EnvelopeMessage, serde_json::Error> {
        let payload = serde_json::to_vec(&self)?;
        Ok(EnvelopeMessage {
            key: self.job_id,
            payload: Bytes::from(payload),
        })
    }
}

/// Job record as held by the job-status store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: String,
    pub status: String,
    pub job_type: JobType,
}
