//! The seam to the generation layer.
//!
//! The scheduler consumes prompt construction and response parsing purely as
//! "a function from (credential, payload) to result or error"; everything
//! behind that function is someone else's concern.

use async_trait::async_trait;

use storyforge_core::Job;
use storyforge_credentials::SelectedCredential;

/// Error surfaced by one execution of a job body.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RunnerError {
    /// Provider-side failure (rate limit, network fault, revoked key).
    #[error("provider error: {0}")]
    Provider(String),
    /// The payload could not be interpreted for this job kind.
    #[error("invalid payload: {0}")]
    Payload(String),
}

impl RunnerError {
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    pub fn payload(msg: impl Into<String>) -> Self {
        Self::Payload(msg.into())
    }
}

/// One attempt of a job's body against one credential.
///
/// Implementations must not retry internally; the scheduler owns the retry
/// policy and credential rotation.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(
        &self,
        credential: &SelectedCredential,
        job: &Job,
    ) -> Result<serde_json::Value, RunnerError>;
}

/// Closure adapter for simple embeddings and tests.
pub struct FnRunner<F>(F);

impl<F> FnRunner<F> {
    // Bounds stated here so closure argument types are inferred at the
    // construction site.
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(SelectedCredential, Job) -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<serde_json::Value, RunnerError>> + Send,
    {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> JobRunner for FnRunner<F>
where
    F: Fn(SelectedCredential, Job) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, RunnerError>> + Send,
{
    async fn run(
        &self,
        credential: &SelectedCredential,
        job: &Job,
    ) -> Result<serde_json::Value, RunnerError> {
        (self.0)(credential.clone(), job.clone()).await
    }
}
