//! `storyforge-scheduler` — the queue controller and execution wrapper.
//!
//! Owns the pending FIFO queue and the in-flight set, admits work up to a
//! concurrency ceiling, runs each admitted job through the retry/timeout
//! wrapper with a fresh credential per attempt, persists every transition to
//! the durable store, and broadcasts live state changes.

pub mod config;
pub mod events;
pub mod runner;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use events::{QueueEvent, topics};
pub use runner::{FnRunner, JobRunner, RunnerError};
pub use scheduler::{QueueStatus, Scheduler, SchedulerError};
