//! Request/response DTOs and JSON mapping helpers.

use serde::{Deserialize, Serialize};

use storyforge_core::{Job, JobId, JobStatus};

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    /// One of the closed job-kind names, e.g. `chapter_draft`.
    pub kind: String,
    /// Kind-specific parameters, passed through opaquely.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Advisory priority hint (does not reorder the FIFO queue).
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub id: JobId,
    pub status: JobStatus,
}

impl From<&Job> for SubmitJobResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub kind: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListLogsQuery {
    pub level: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SetCeilingRequest {
    pub ceiling: usize,
}

#[derive(Debug, Deserialize)]
pub struct AddCredentialRequest {
    pub secret: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetentionRequest {
    /// Keep only this many most-recently-created jobs.
    pub keep_jobs: Option<usize>,
    /// Drop log entries older than this many hours.
    pub max_log_age_hours: Option<i64>,
}
