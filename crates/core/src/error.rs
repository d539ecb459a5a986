//! Errors raised by the domain model itself.

use thiserror::Error;

/// Result alias for domain-rule checks.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic failures of the job-layer domain rules.
///
/// Infrastructure failures (I/O, serialization, missing records) live in the
/// store and scheduler error types; this enum covers only what the data model
/// can reject on its own.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input no domain value can be built from (unknown kind, bad level).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A status change the job lifecycle does not allow.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A string that does not parse as one of the typed identifiers.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
