//! `storyforge-core` — domain foundation for the job layer.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! strongly-typed identifiers, the domain error model, and the Job / LogEntry
//! records with their status-transition rules.

pub mod error;
pub mod id;
pub mod job;
pub mod log;

pub use error::{DomainError, DomainResult};
pub use id::{CredentialId, JobId, LogEntryId};
pub use job::{Job, JobKind, JobStatus};
pub use log::{LogEntry, LogLevel};
