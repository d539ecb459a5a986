//! `storyforge-credentials` — the managed pool of provider credentials.
//!
//! The pool tracks per-credential health/usage and exposes the selection
//! policy (highest priority tier, least-recently-used within it). Failures are
//! recorded as state, never raised: a credential that keeps failing is
//! deactivated and selection continues with the rest of the pool.

pub mod pool;

pub use pool::{
    CredentialPool, CredentialStats, CredentialUpdate, FailureReport, PoolError,
    SelectedCredential,
};
