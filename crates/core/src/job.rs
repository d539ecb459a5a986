//! The Job record: one unit of queued, potentially retried generation work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{CredentialId, JobId};

/// Kind of generation work a job carries.
///
/// Closed enumeration: the payload is opaque to the job layer, but the kind is
/// what the generation layer routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Batch of inspiration/idea fragments.
    InspirationBatch,
    /// Novel architecture (outline) synthesis.
    ArchitectureSynthesis,
    /// Draft one chapter.
    ChapterDraft,
    /// Regenerate a story world map.
    MapRegeneration,
    /// Expand a single outline node.
    NodeExpansion,
    /// Rewrite/transform a span of text.
    TextTransform,
    /// Rewrite a whole chapter.
    ChapterRewrite,
    /// Market/trend analysis.
    TrendAnalysis,
}

impl JobKind {
    pub const ALL: [JobKind; 8] = [
        JobKind::InspirationBatch,
        JobKind::ArchitectureSynthesis,
        JobKind::ChapterDraft,
        JobKind::MapRegeneration,
        JobKind::NodeExpansion,
        JobKind::TextTransform,
        JobKind::ChapterRewrite,
        JobKind::TrendAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::InspirationBatch => "inspiration_batch",
            JobKind::ArchitectureSynthesis => "architecture_synthesis",
            JobKind::ChapterDraft => "chapter_draft",
            JobKind::MapRegeneration => "map_regeneration",
            JobKind::NodeExpansion => "node_expansion",
            JobKind::TextTransform => "text_transform",
            JobKind::ChapterRewrite => "chapter_rewrite",
            JobKind::TrendAnalysis => "trend_analysis",
        }
    }
}

impl core::str::FromStr for JobKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown job kind: {s}")))
    }
}

impl core::fmt::Display for JobKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be admitted.
    Pending,
    /// Currently being executed.
    Running,
    /// Completed successfully.
    Completed,
    /// Exhausted retries.
    Failed,
    /// Cancelled while still pending.
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl core::str::FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(DomainError::validation(format!("unknown job status: {s}"))),
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued generation job.
///
/// Status moves one-way along `pending → running → {completed|failed}` or
/// `pending → cancelled`; the `mark_*` methods reject everything else, so a
/// job reaches exactly one terminal status. `result` and `error` are mutually
/// exclusive by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Advisory hint only; the queue is strict FIFO and never consults it.
    pub priority: i32,
    /// Kind-specific parameters, opaque to the job layer.
    pub payload: serde_json::Value,
    /// Present only when completed.
    pub result: Option<serde_json::Value>,
    /// Present only when failed.
    pub error: Option<String>,
    /// Credential used on the last (or successful) attempt.
    pub credential_id: Option<CredentialId>,
    /// 0–100.
    pub progress: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(kind: JobKind, payload: serde_json::Value, priority: i32) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            kind,
            status: JobStatus::Pending,
            priority,
            payload,
            result: None,
            error: None,
            credential_id: None,
            progress: 0,
            started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn check_transition(&self, from: JobStatus, to: JobStatus) -> DomainResult<()> {
        if self.status == from {
            Ok(())
        } else {
            Err(DomainError::transition(format!(
                "job {} is {}, cannot move to {}",
                self.id, self.status, to
            )))
        }
    }

    /// Transition `pending → running`. Sets `started_at` on first dispatch.
    pub fn mark_running(&mut self) -> DomainResult<()> {
        self.check_transition(JobStatus::Pending, JobStatus::Running)?;
        let now = Utc::now();
        self.status = JobStatus::Running;
        self.started_at.get_or_insert(now);
        self.updated_at = now;
        Ok(())
    }

    /// Transition `running → completed` with the attempt's result.
    pub fn mark_completed(
        &mut self,
        result: serde_json::Value,
        credential_id: CredentialId,
    ) -> DomainResult<()> {
        self.check_transition(JobStatus::Running, JobStatus::Completed)?;
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.error = None;
        self.credential_id = Some(credential_id);
        self.progress = 100;
        self.finished_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Transition `running → failed` with the final (retry-exhausted) error.
    pub fn mark_failed(
        &mut self,
        error: impl Into<String>,
        credential_id: Option<CredentialId>,
    ) -> DomainResult<()> {
        self.check_transition(JobStatus::Running, JobStatus::Failed)?;
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.result = None;
        if credential_id.is_some() {
            self.credential_id = credential_id;
        }
        self.finished_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Transition `pending → cancelled`. Running jobs are not interruptible.
    pub fn mark_cancelled(&mut self) -> DomainResult<()> {
        self.check_transition(JobStatus::Pending, JobStatus::Cancelled)?;
        let now = Utc::now();
        self.status = JobStatus::Cancelled;
        self.finished_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}
