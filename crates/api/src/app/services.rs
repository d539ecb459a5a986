//! Infrastructure wiring: store, credential pool, scheduler.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use storyforge_credentials::CredentialPool;
use storyforge_scheduler::{JobRunner, Scheduler, SchedulerConfig};
use storyforge_store::FileStore;

/// Service configuration, typically deserialized from the embedding
/// process's config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Path of the durable task/log store.
    pub data_file: PathBuf,
    /// Provider credentials loaded into the pool at startup.
    pub credentials: Vec<String>,
    /// Maximum concurrently running jobs.
    pub ceiling: usize,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Per-attempt deadline, seconds.
    pub attempt_timeout_secs: u64,
    /// Fixed delay between attempts, milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("storyforge-tasks.json"),
            credentials: Vec::new(),
            ceiling: 2,
            max_retries: 3,
            attempt_timeout_secs: 300,
            retry_delay_ms: 3_000,
        }
    }
}

impl ServiceConfig {
    fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_ceiling(self.ceiling)
            .with_max_retries(self.max_retries)
            .with_attempt_timeout(Duration::from_secs(self.attempt_timeout_secs))
            .with_retry_delay(Duration::from_millis(self.retry_delay_ms))
    }
}

/// Shared service handles injected into every handler.
#[derive(Debug)]
pub struct AppServices {
    pub store: Arc<FileStore>,
    pub pool: Arc<CredentialPool>,
    pub scheduler: Arc<Scheduler>,
}

/// Wire the job layer: open the store, load the pool, build the scheduler,
/// and start dispatching any work recovered from disk.
///
/// `runner` is the generation layer's entrypoint; prompt construction and
/// response parsing live behind it, out of this crate's sight.
pub fn build_services(
    config: ServiceConfig,
    runner: Arc<dyn JobRunner>,
) -> anyhow::Result<Arc<AppServices>> {
    storyforge_observability::init();

    let store = Arc::new(FileStore::open(&config.data_file)?);
    let pool = Arc::new(CredentialPool::new());
    pool.initialize(config.credentials.iter().cloned());

    let scheduler = Scheduler::new(
        store.clone(),
        pool.clone(),
        runner,
        config.scheduler_config(),
    )?;
    scheduler.pump();
    tracing::info!(data_file = %store.path().display(), "job layer wired");

    Ok(Arc::new(AppServices {
        store,
        pool,
        scheduler,
    }))
}
