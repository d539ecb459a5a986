//! The queue controller: admission, retry/timeout execution, bookkeeping.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use storyforge_core::{CredentialId, Job, JobId, JobKind, JobStatus, LogEntry, LogLevel};
use storyforge_credentials::{CredentialPool, FailureReport, PoolError};
use storyforge_store::{FileStore, JobFilter, StoreError};

use crate::config::SchedulerConfig;
use crate::events::{QueueEvent, topics};
use crate::runner::JobRunner;

const CEILING_SETTING: &str = "queue.ceiling";
const EVENT_CAPACITY: usize = 256;

/// Scheduler error.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Snapshot of the queue, safe to poll frequently.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub running_count: usize,
    pub ceiling: usize,
    pub running_ids: Vec<JobId>,
}

#[derive(Debug)]
struct QueueState {
    queue: VecDeque<JobId>,
    running: HashSet<JobId>,
    ceiling: usize,
}

/// What one attempt left behind when it failed.
struct AttemptFailure {
    message: String,
    credential: Option<CredentialId>,
}

/// The queue controller.
///
/// Shared mutable state (the FIFO queue and the in-flight set) lives behind
/// one mutex that is never held across an await; every read-then-write
/// sequence on it completes inside a single lock scope.
pub struct Scheduler {
    store: Arc<FileStore>,
    pool: Arc<CredentialPool>,
    runner: Arc<dyn JobRunner>,
    config: SchedulerConfig,
    state: Mutex<QueueState>,
    events: broadcast::Sender<QueueEvent>,
    // Handle to ourselves for spawning executions; `Weak` so the cycle
    // cannot keep the scheduler alive.
    self_ref: Weak<Scheduler>,
}

impl Scheduler {
    /// Build a scheduler over an already-loaded store.
    ///
    /// Sweeps the store for records a previous process left behind: jobs
    /// persisted as `running` are failed (their work died with the process),
    /// and `pending` jobs re-enter the queue in creation order. A ceiling
    /// persisted by an earlier `set_ceiling` call overrides the configured
    /// default. Call [`Scheduler::pump`] once a runtime is available to start
    /// dispatching.
    pub fn new(
        store: Arc<FileStore>,
        pool: Arc<CredentialPool>,
        runner: Arc<dyn JobRunner>,
        config: SchedulerConfig,
    ) -> Result<Arc<Self>, SchedulerError> {
        let ceiling = store
            .setting(CEILING_SETTING)
            .and_then(|v| v.as_u64())
            .map(|v| (v as usize).max(1))
            .unwrap_or(config.ceiling.max(1));

        let orphaned = store.jobs(&JobFilter {
            status: Some(JobStatus::Running),
            limit: usize::MAX,
            ..Default::default()
        })?;
        for job in &orphaned {
            warn!(job_id = %job.id, "failing job orphaned by a previous process");
            store.update_job(job.id, |j| j.mark_failed("interrupted by restart", None))?;
        }

        let mut pending = store.jobs(&JobFilter {
            status: Some(JobStatus::Pending),
            limit: usize::MAX,
            ..Default::default()
        })?;
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let queue: VecDeque<JobId> = pending.iter().map(|j| j.id).collect();
        if !queue.is_empty() {
            info!(requeued = queue.len(), "pending jobs recovered from store");
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Arc::new_cyclic(|self_ref| Self {
            store,
            pool,
            runner,
            config,
            state: Mutex::new(QueueState {
                queue,
                running: HashSet::new(),
                ceiling,
            }),
            events,
            self_ref: self_ref.clone(),
        }))
    }

    /// Subscribe to live queue/credential events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Create and persist a pending job, enqueue it, and trigger the pump.
    /// Never blocks the caller on execution.
    pub fn submit(
        &self,
        kind: JobKind,
        payload: serde_json::Value,
        priority: i32,
    ) -> Result<Job, SchedulerError> {
        let job = Job::new(kind, payload, priority);
        self.store.insert_job(job.clone())?;
        self.log(
            job.id,
            LogLevel::Info,
            "queued",
            Some(json!({"kind": kind.as_str(), "priority": priority})),
        );
        {
            let mut state = self.state.lock().unwrap();
            state.queue.push_back(job.id);
        }
        self.broadcast(
            topics::JOB_QUEUED,
            json!({"id": job.id, "kind": kind.as_str(), "status": job.status.as_str()}),
        );
        info!(job_id = %job.id, kind = %kind, "job submitted");
        self.pump();
        Ok(job)
    }

    /// Admit queued jobs while capacity exists.
    ///
    /// Re-entrant safe: a job leaves the queue exactly once, inside the lock
    /// scope that also reserves its slot in the in-flight set, so overlapping
    /// pumps can never double-dispatch.
    pub fn pump(&self) {
        let admitted = {
            let mut state = self.state.lock().unwrap();
            let mut batch = Vec::new();
            while state.running.len() < state.ceiling {
                let Some(id) = state.queue.pop_front() else {
                    break;
                };
                state.running.insert(id);
                batch.push(id);
            }
            batch
        };
        for id in admitted {
            debug!(job_id = %id, "job admitted");
            // Only reachable while the scheduler is alive; the upgrade can
            // fail during teardown, in which case the job stays reserved and
            // nothing runs it.
            let Some(scheduler) = self.self_ref.upgrade() else {
                return;
            };
            tokio::spawn(async move { scheduler.execute(id).await });
        }
    }

    /// Cancel a job still in the pending queue. Running jobs are not
    /// interruptible and return `false` with their status unchanged.
    pub fn cancel(&self, id: JobId) -> Result<bool, SchedulerError> {
        {
            let mut state = self.state.lock().unwrap();
            if state.running.contains(&id) {
                return Ok(false);
            }
            let before = state.queue.len();
            state.queue.retain(|queued| *queued != id);
            if state.queue.len() == before {
                return Ok(false);
            }
        }
        self.store.update_job(id, |j| j.mark_cancelled())?;
        self.log(id, LogLevel::Info, "cancelled", None);
        self.broadcast(topics::JOB_CANCELLED, json!({"id": id, "status": "cancelled"}));
        info!(job_id = %id, "job cancelled");
        Ok(true)
    }

    /// Whether the job is currently in flight.
    pub fn is_running(&self, id: JobId) -> bool {
        self.state.lock().unwrap().running.contains(&id)
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.state.lock().unwrap();
        QueueStatus {
            queue_length: state.queue.len(),
            running_count: state.running.len(),
            ceiling: state.ceiling,
            running_ids: state.running.iter().copied().collect(),
        }
    }

    /// Update the concurrency ceiling, persist it, and use new capacity
    /// immediately.
    pub fn set_ceiling(&self, ceiling: usize) -> Result<usize, SchedulerError> {
        let ceiling = ceiling.max(1);
        {
            let mut state = self.state.lock().unwrap();
            state.ceiling = ceiling;
        }
        self.store.set_setting(CEILING_SETTING, json!(ceiling))?;
        info!(ceiling, "concurrency ceiling updated");
        self.pump();
        Ok(ceiling)
    }

    // ── Execution ───────────────────────────────────────────────────────

    async fn execute(&self, id: JobId) {
        if let Err(e) = self.run_job(id).await {
            error!(job_id = %id, error = %e, "job bookkeeping failed");
        }
        {
            let mut state = self.state.lock().unwrap();
            state.running.remove(&id);
        }
        // Chain the pump so a queued job takes the freed slot; this is what
        // keeps the ceiling saturated without a polling loop.
        self.pump();
    }

    async fn run_job(&self, id: JobId) -> Result<(), SchedulerError> {
        let job = self.store.update_job(id, |j| j.mark_running())?;
        self.log(id, LogLevel::Info, "started", None);
        self.broadcast(
            topics::JOB_STARTED,
            json!({"id": id, "kind": job.kind.as_str(), "status": "running"}),
        );

        match self.run_attempts(&job).await {
            Ok((result, credential_id)) => {
                self.store
                    .update_job(id, |j| j.mark_completed(result, credential_id))?;
                self.log(id, LogLevel::Info, "completed", None);
                self.broadcast(topics::JOB_COMPLETED, json!({"id": id, "status": "completed"}));
                info!(job_id = %id, "job completed");
            }
            Err(last) => {
                self.store
                    .update_job(id, |j| j.mark_failed(&last.message, last.credential))?;
                self.log(
                    id,
                    LogLevel::Error,
                    format!("failed: {}", last.message),
                    None,
                );
                self.broadcast(
                    topics::JOB_FAILED,
                    json!({"id": id, "status": "failed", "error": last.message}),
                );
                warn!(job_id = %id, error = %last.message, "job failed");
            }
        }
        Ok(())
    }

    /// Up to `max_retries + 1` attempts, each with a fresh credential and its
    /// own deadline, separated by a fixed delay. Attempt errors never escape
    /// this loop; only the final, retry-exhausted error does.
    async fn run_attempts(
        &self,
        job: &Job,
    ) -> Result<(serde_json::Value, CredentialId), AttemptFailure> {
        let attempts = self.config.max_retries + 1;
        let mut last = AttemptFailure {
            message: "no attempts executed".to_string(),
            credential: None,
        };
        for attempt in 1..=attempts {
            match self.run_attempt(job).await {
                Ok((value, credential_id)) => {
                    self.log(
                        job.id,
                        LogLevel::Info,
                        format!("attempt {attempt} succeeded"),
                        Some(json!({"attempt": attempt, "credential_id": credential_id})),
                    );
                    return Ok((value, credential_id));
                }
                Err(failure) => {
                    self.log(
                        job.id,
                        LogLevel::Warn,
                        format!("attempt {attempt} failed: {}", failure.message),
                        Some(json!({"attempt": attempt})),
                    );
                    warn!(
                        job_id = %job.id,
                        attempt,
                        error = %failure.message,
                        "attempt failed"
                    );
                    last = failure;
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }
        Err(last)
    }

    async fn run_attempt(
        &self,
        job: &Job,
    ) -> Result<(serde_json::Value, CredentialId), AttemptFailure> {
        // Pool exhaustion is an attempt failure, not a job-fatal error: an
        // operator may reactivate a credential before the next attempt.
        let credential = self.pool.select().map_err(|e: PoolError| AttemptFailure {
            message: e.to_string(),
            credential: None,
        })?;
        let credential_id = credential.id;

        let outcome =
            tokio::time::timeout(self.config.attempt_timeout, self.runner.run(&credential, job))
                .await;
        match outcome {
            Ok(Ok(value)) => {
                self.pool.report_success(credential_id);
                Ok((value, credential_id))
            }
            Ok(Err(e)) => {
                let message = e.to_string();
                self.fail_credential(credential_id, &message);
                Err(AttemptFailure {
                    message,
                    credential: Some(credential_id),
                })
            }
            Err(_elapsed) => {
                let message = format!(
                    "timed out after {}s",
                    self.config.attempt_timeout.as_secs()
                );
                self.fail_credential(credential_id, &message);
                Err(AttemptFailure {
                    message,
                    credential: Some(credential_id),
                })
            }
        }
    }

    fn fail_credential(&self, id: CredentialId, reason: &str) {
        if self.pool.report_failure(id, reason) == FailureReport::Disabled {
            self.broadcast(topics::CREDENTIAL_DISABLED, json!({"id": id}));
        }
    }

    // ── Bookkeeping ─────────────────────────────────────────────────────

    /// Append an audit line and mirror it to subscribers. Best-effort: a log
    /// write failure must not abort the job it describes.
    fn log(
        &self,
        job_id: JobId,
        level: LogLevel,
        message: impl Into<String>,
        detail: Option<serde_json::Value>,
    ) {
        let mut entry = LogEntry::new(job_id, level, message);
        if let Some(detail) = detail {
            entry = entry.with_detail(detail);
        }
        self.broadcast(
            topics::JOB_LOG,
            json!({
                "job_id": job_id,
                "level": entry.level.as_str(),
                "message": entry.message,
            }),
        );
        if let Err(e) = self.store.append_log(entry) {
            error!(job_id = %job_id, error = %e, "failed to persist log entry");
        }
    }

    fn broadcast(&self, topic: &'static str, payload: serde_json::Value) {
        // No receivers is fine; the channel drops the frame.
        let _ = self.events.send(QueueEvent::new(topic, payload));
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.status();
        f.debug_struct("Scheduler")
            .field("queue_length", &status.queue_length)
            .field("running_count", &status.running_count)
            .field("ceiling", &status.ceiling)
            .finish()
    }
}
