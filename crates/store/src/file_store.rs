//! File-backed job/log store with synchronous full-file flush.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use storyforge_core::{DomainError, Job, JobId, JobKind, JobStatus, LogEntry, LogLevel};

/// Store error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Filter/pagination for job listings.
#[derive(Debug, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub kind: Option<JobKind>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            status: None,
            kind: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Aggregate job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// On-disk document. Everything the store owns, serialized as one JSON file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    jobs: Vec<Job>,
    logs: Vec<LogEntry>,
    settings: BTreeMap<String, serde_json::Value>,
}

/// Process-local durable store for jobs, their log trail, and simple settings.
///
/// Loaded once at construction; every mutating operation rewrites the file
/// synchronously (write-to-temp then rename, so a crash mid-flush never
/// leaves a torn file).
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: Mutex<StoreData>,
}

impl FileStore {
    /// Open the store at `path`, creating an empty default file if missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            StoreData::default()
        };
        info!(path = %path.display(), jobs = data.jobs.len(), "task store loaded");

        let store = Self {
            path,
            inner: Mutex::new(data),
        };
        // Materialize the default file so a fresh install has a store on disk.
        {
            let data = store.inner.lock().unwrap();
            store.flush(&data)?;
        }
        Ok(store)
    }

    fn flush(&self, data: &StoreData) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("json.tmp");
        let raw = serde_json::to_vec_pretty(data)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&raw)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Jobs ────────────────────────────────────────────────────────────

    pub fn insert_job(&self, job: Job) -> Result<(), StoreError> {
        let mut data = self.inner.lock().unwrap();
        data.jobs.push(job);
        self.flush(&data)
    }

    pub fn job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        let data = self.inner.lock().unwrap();
        Ok(data.jobs.iter().find(|j| j.id == id).cloned())
    }

    /// List jobs matching the filter, newest-first by creation time.
    pub fn jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let data = self.inner.lock().unwrap();
        let mut matched: Vec<Job> = data
            .jobs
            .iter()
            .filter(|j| filter.status.is_none_or(|s| j.status == s))
            .filter(|j| filter.kind.is_none_or(|k| j.kind == k))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect())
    }

    /// Apply a mutation to one job and flush. The closure may refuse the
    /// mutation (e.g. an illegal status transition), in which case nothing is
    /// persisted.
    pub fn update_job<F>(&self, id: JobId, f: F) -> Result<Job, StoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), DomainError>,
    {
        let mut data = self.inner.lock().unwrap();
        let job = data
            .jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(StoreError::NotFound(id))?;
        f(job)?;
        let updated = job.clone();
        self.flush(&data)?;
        Ok(updated)
    }

    /// Delete a job record and its whole log trail.
    pub fn delete_job(&self, id: JobId) -> Result<bool, StoreError> {
        let mut data = self.inner.lock().unwrap();
        let before = data.jobs.len();
        data.jobs.retain(|j| j.id != id);
        if data.jobs.len() == before {
            return Ok(false);
        }
        data.logs.retain(|l| l.job_id != id);
        self.flush(&data)?;
        Ok(true)
    }

    pub fn status_counts(&self) -> Result<StatusCounts, StoreError> {
        let data = self.inner.lock().unwrap();
        let mut counts = StatusCounts::default();
        for job in &data.jobs {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        Ok(counts)
    }

    // ── Logs ────────────────────────────────────────────────────────────

    pub fn append_log(&self, entry: LogEntry) -> Result<(), StoreError> {
        let mut data = self.inner.lock().unwrap();
        data.logs.push(entry);
        self.flush(&data)
    }

    /// Logs for one job in timestamp order, optionally filtered by severity.
    pub fn logs(
        &self,
        job_id: JobId,
        level: Option<LogLevel>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LogEntry>, StoreError> {
        let data = self.inner.lock().unwrap();
        let mut matched: Vec<LogEntry> = data
            .logs
            .iter()
            .filter(|l| l.job_id == job_id)
            .filter(|l| level.is_none_or(|lv| l.level == lv))
            .cloned()
            .collect();
        matched.sort_by(|a, b| (a.created_at, a.id.as_uuid()).cmp(&(b.created_at, b.id.as_uuid())));
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    // ── Settings ────────────────────────────────────────────────────────

    pub fn setting(&self, key: &str) -> Option<serde_json::Value> {
        let data = self.inner.lock().unwrap();
        data.settings.get(key).cloned()
    }

    pub fn set_setting(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        let mut data = self.inner.lock().unwrap();
        data.settings.insert(key.to_string(), value);
        self.flush(&data)
    }

    // ── Retention ───────────────────────────────────────────────────────

    /// Keep only the `keep` most recently created jobs; older ones are
    /// removed along with their logs. Returns the number of jobs removed.
    pub fn prune_jobs(&self, keep: usize) -> Result<usize, StoreError> {
        let mut data = self.inner.lock().unwrap();
        if data.jobs.len() <= keep {
            return Ok(0);
        }
        data.jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let removed: Vec<Job> = data.jobs.split_off(keep);
        let removed_ids: Vec<JobId> = removed.iter().map(|j| j.id).collect();
        data.logs.retain(|l| !removed_ids.contains(&l.job_id));
        self.flush(&data)?;
        debug!(removed = removed.len(), keep, "pruned old jobs");
        Ok(removed.len())
    }

    /// Remove log entries older than `max_age`. Returns the number removed.
    pub fn prune_logs(&self, max_age: Duration) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - max_age;
        let mut data = self.inner.lock().unwrap();
        let before = data.logs.len();
        data.logs.retain(|l| l.created_at >= cutoff);
        let removed = before - data.logs.len();
        if removed > 0 {
            self.flush(&data)?;
            debug!(removed, "pruned old log entries");
        }
        Ok(removed)
    }
}
