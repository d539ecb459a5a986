//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduler/execution-wrapper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of jobs running simultaneously.
    pub ceiling: usize,
    /// Retries after the first attempt (3 retries ⇒ 4 attempts).
    pub max_retries: u32,
    /// Per-attempt deadline. Expiry fails the attempt, not the job.
    pub attempt_timeout: Duration,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ceiling: 2,
            max_retries: 3,
            attempt_timeout: Duration::from_secs(300),
            retry_delay: Duration::from_secs(3),
        }
    }
}

impl SchedulerConfig {
    pub fn with_ceiling(mut self, ceiling: usize) -> Self {
        self.ceiling = ceiling.max(1);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}
