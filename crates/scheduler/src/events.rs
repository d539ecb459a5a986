//! Live events broadcast to subscribers.
//!
//! Best-effort, at-most-once, non-durable fan-out over a lossy broadcast
//! channel: a subscriber that connects after an event was sent never receives
//! it retroactively, and a lagging subscriber drops the oldest frames.

use serde::Serialize;

/// Topic names carried on [`QueueEvent`]s.
pub mod topics {
    pub const JOB_QUEUED: &str = "job.queued";
    pub const JOB_STARTED: &str = "job.started";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_FAILED: &str = "job.failed";
    pub const JOB_CANCELLED: &str = "job.cancelled";
    pub const JOB_LOG: &str = "job.log";
    pub const CREDENTIAL_DISABLED: &str = "credential.disabled";
}

/// One live update pushed to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEvent {
    pub topic: &'static str,
    pub payload: serde_json::Value,
}

impl QueueEvent {
    pub fn new(topic: &'static str, payload: serde_json::Value) -> Self {
        Self { topic, payload }
    }
}
