//! End-to-end scheduler behavior: admission, retries, timeouts, cancellation.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use storyforge_core::{CredentialId, JobId, JobKind, JobStatus, LogLevel};
use storyforge_credentials::CredentialPool;
use storyforge_scheduler::{FnRunner, JobRunner, Scheduler, SchedulerConfig, topics};
use storyforge_store::FileStore;

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<FileStore>,
    pool: Arc<CredentialPool>,
    scheduler: Arc<Scheduler>,
}

fn harness(runner: Arc<dyn JobRunner>, config: SchedulerConfig) -> Harness {
    harness_with_credentials(runner, config, 3)
}

fn harness_with_credentials(
    runner: Arc<dyn JobRunner>,
    config: SchedulerConfig,
    credentials: usize,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path().join("tasks.json")).unwrap());
    let pool = Arc::new(CredentialPool::new());
    pool.initialize((0..credentials).map(|i| format!("sk-test-credential-{i}")));
    let scheduler = Scheduler::new(store.clone(), pool.clone(), runner, config).unwrap();
    Harness {
        _dir: dir,
        store,
        pool,
        scheduler,
    }
}

/// Fast config for tests: short delays, generous timeout.
fn quick_config() -> SchedulerConfig {
    SchedulerConfig::default()
        .with_retry_delay(Duration::from_millis(5))
        .with_attempt_timeout(Duration::from_secs(5))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}

fn job_status(store: &FileStore, id: JobId) -> JobStatus {
    store.job(id).unwrap().unwrap().status
}

#[tokio::test]
async fn ceiling_bounds_concurrent_jobs() {
    // Bodies never resolve, so admitted jobs stay running.
    let runner = Arc::new(FnRunner::new(|_cred, _job| async {
        std::future::pending::<Result<serde_json::Value, storyforge_scheduler::RunnerError>>().await
    }));
    let h = harness(runner, quick_config().with_ceiling(2));

    for _ in 0..4 {
        h.scheduler
            .submit(JobKind::ChapterDraft, json!({}), 0)
            .unwrap();
    }

    wait_until(|| h.scheduler.status().running_count == 2).await;
    let status = h.scheduler.status();
    assert_eq!(status.running_count, 2);
    assert_eq!(status.queue_length, 2);
    assert_eq!(status.ceiling, 2);
    assert_eq!(h.store.status_counts().unwrap().running, 2);
    assert_eq!(h.store.status_counts().unwrap().pending, 2);
}

#[tokio::test]
async fn ceiling_never_exceeded_under_churn() {
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let runner = {
        let current = current.clone();
        let peak = peak.clone();
        Arc::new(FnRunner::new(move |_cred, _job| {
            let current = current.clone();
            let peak = peak.clone();
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(15)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(json!({"ok": true}))
            }
        }))
    };
    let h = harness(runner, quick_config().with_ceiling(3));

    let mut ids = Vec::new();
    for _ in 0..10 {
        ids.push(
            h.scheduler
                .submit(JobKind::NodeExpansion, json!({}), 0)
                .unwrap()
                .id,
        );
    }

    let store = h.store.clone();
    wait_until(move || {
        ids.iter()
            .all(|id| job_status(&store, *id) == JobStatus::Completed)
    })
    .await;
    assert!(peak.load(Ordering::SeqCst) <= 3, "ceiling was exceeded");
}

#[tokio::test]
async fn always_failing_body_runs_exactly_four_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let runner = {
        let calls = calls.clone();
        Arc::new(FnRunner::new(move |_cred, _job| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(storyforge_scheduler::RunnerError::provider("rate limited"))
            }
        }))
    };
    let h = harness(runner, quick_config().with_max_retries(3));

    let id = h
        .scheduler
        .submit(JobKind::TrendAnalysis, json!({}), 0)
        .unwrap()
        .id;

    let store = h.store.clone();
    wait_until(move || job_status(&store, id) == JobStatus::Failed).await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let job = h.store.job(id).unwrap().unwrap();
    assert!(job.error.as_deref().unwrap().contains("rate limited"));
    assert!(job.result.is_none());
    // One warn line per failed attempt survives for diagnosis.
    let warns = h.store.logs(id, Some(LogLevel::Warn), 50, 0).unwrap();
    assert_eq!(warns.len(), 4);
}

#[tokio::test]
async fn succeeds_on_third_attempt_with_that_result() {
    let calls = Arc::new(AtomicU32::new(0));
    let runner = {
        let calls = calls.clone();
        Arc::new(FnRunner::new(move |_cred, _job| {
            let calls = calls.clone();
            async move {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(storyforge_scheduler::RunnerError::provider("flaky"))
                } else {
                    Ok(json!({"attempt": attempt}))
                }
            }
        }))
    };
    let h = harness(runner, quick_config().with_max_retries(3));

    let id = h
        .scheduler
        .submit(JobKind::ChapterRewrite, json!({}), 0)
        .unwrap()
        .id;

    let store = h.store.clone();
    wait_until(move || job_status(&store, id) == JobStatus::Completed).await;

    let job = h.store.job(id).unwrap().unwrap();
    assert_eq!(job.result.unwrap()["attempt"], 3);
    assert!(job.error.is_none());
    assert!(job.credential_id.is_some());
    assert_eq!(job.progress, 100);

    // Three attempt lines: two failures, one success.
    let logs = h.store.logs(id, None, 50, 0).unwrap();
    let attempt_lines: Vec<_> = logs
        .iter()
        .filter(|l| l.message.starts_with("attempt"))
        .collect();
    assert_eq!(attempt_lines.len(), 3);
    assert_eq!(
        h.store.logs(id, Some(LogLevel::Warn), 50, 0).unwrap().len(),
        2
    );
}

#[tokio::test]
async fn attempts_rotate_credentials() {
    let used: Arc<Mutex<Vec<CredentialId>>> = Arc::new(Mutex::new(Vec::new()));
    let runner = {
        let used = used.clone();
        Arc::new(FnRunner::new(move |cred, _job| {
            let used = used.clone();
            async move {
                used.lock().unwrap().push(cred.id);
                Err(storyforge_scheduler::RunnerError::provider("boom"))
            }
        }))
    };
    let h = harness_with_credentials(runner, quick_config().with_max_retries(2), 3);

    let id = h
        .scheduler
        .submit(JobKind::InspirationBatch, json!({}), 0)
        .unwrap()
        .id;

    let store = h.store.clone();
    wait_until(move || job_status(&store, id) == JobStatus::Failed).await;

    let used = used.lock().unwrap();
    assert_eq!(used.len(), 3);
    // Three attempts against three equal-priority credentials touch each
    // exactly once (LRU rotation).
    let mut distinct = used.clone();
    distinct.sort_by_key(|id| *id.as_uuid());
    distinct.dedup();
    assert_eq!(distinct.len(), 3);
}

#[tokio::test]
async fn attempt_timeout_fails_attempt_not_job() {
    let calls = Arc::new(AtomicU32::new(0));
    let runner = {
        let calls = calls.clone();
        Arc::new(FnRunner::new(move |_cred, _job| {
            let calls = calls.clone();
            async move {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt == 1 {
                    // First attempt hangs past the deadline.
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Ok(json!({"attempt": attempt}))
            }
        }))
    };
    let config = quick_config()
        .with_max_retries(1)
        .with_attempt_timeout(Duration::from_millis(30));
    let h = harness(runner, config);

    let id = h
        .scheduler
        .submit(JobKind::MapRegeneration, json!({}), 0)
        .unwrap()
        .id;

    let store = h.store.clone();
    wait_until(move || job_status(&store, id) == JobStatus::Completed).await;

    // The deadline failed attempt 1; attempt 2 succeeded.
    let job = h.store.job(id).unwrap().unwrap();
    assert_eq!(job.result.unwrap()["attempt"], 2);
    let warns = h.store.logs(id, Some(LogLevel::Warn), 50, 0).unwrap();
    assert_eq!(warns.len(), 1);
    assert!(warns[0].message.contains("timed out"));
}

#[tokio::test]
async fn pending_jobs_cancel_running_jobs_do_not() {
    let gate = Arc::new(tokio::sync::Notify::new());
    let runner = {
        let gate = gate.clone();
        Arc::new(FnRunner::new(move |_cred, _job| {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok(json!({}))
            }
        }))
    };
    let h = harness(runner, quick_config().with_ceiling(1));

    let running = h
        .scheduler
        .submit(JobKind::TextTransform, json!({}), 0)
        .unwrap()
        .id;
    let scheduler = h.scheduler.clone();
    wait_until(move || scheduler.is_running(running)).await;

    let queued = h
        .scheduler
        .submit(JobKind::TextTransform, json!({}), 0)
        .unwrap()
        .id;

    // Queued job: cancellable, leaves the queue, reaches `cancelled`.
    assert!(h.scheduler.cancel(queued).unwrap());
    assert_eq!(job_status(&h.store, queued), JobStatus::Cancelled);
    assert_eq!(h.scheduler.status().queue_length, 0);

    // Running job: refused, status untouched.
    assert!(!h.scheduler.cancel(running).unwrap());
    assert_eq!(job_status(&h.store, running), JobStatus::Running);

    // Unknown job: also refused.
    assert!(!h.scheduler.cancel(JobId::new()).unwrap());

    gate.notify_waiters();
    let store = h.store.clone();
    wait_until(move || job_status(&store, running) == JobStatus::Completed).await;
}

#[tokio::test]
async fn completion_pulls_next_job_from_queue() {
    let runner = Arc::new(FnRunner::new(|_cred, _job| async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(json!({}))
    }));
    let h = harness(runner, quick_config().with_ceiling(1));

    let first = h
        .scheduler
        .submit(JobKind::ChapterDraft, json!({}), 0)
        .unwrap()
        .id;
    let second = h
        .scheduler
        .submit(JobKind::ChapterDraft, json!({}), 0)
        .unwrap()
        .id;

    let store = h.store.clone();
    wait_until(move || {
        job_status(&store, first) == JobStatus::Completed
            && job_status(&store, second) == JobStatus::Completed
    })
    .await;
    assert_eq!(h.scheduler.status().queue_length, 0);
    assert_eq!(h.scheduler.status().running_count, 0);
}

#[tokio::test]
async fn raising_ceiling_admits_waiting_jobs() {
    let runner = Arc::new(FnRunner::new(|_cred, _job| async {
        std::future::pending::<Result<serde_json::Value, storyforge_scheduler::RunnerError>>().await
    }));
    let h = harness(runner, quick_config().with_ceiling(1));

    for _ in 0..3 {
        h.scheduler
            .submit(JobKind::ChapterDraft, json!({}), 0)
            .unwrap();
    }
    wait_until(|| h.scheduler.status().running_count == 1).await;
    assert_eq!(h.scheduler.status().queue_length, 2);

    h.scheduler.set_ceiling(3).unwrap();
    wait_until(|| h.scheduler.status().running_count == 3).await;
    assert_eq!(h.scheduler.status().queue_length, 0);
    // The new ceiling is durable.
    assert_eq!(h.store.setting("queue.ceiling"), Some(json!(3)));
}

#[tokio::test]
async fn pool_exhaustion_consumes_attempts_then_fails() {
    let runner = Arc::new(FnRunner::new(|_cred, _job| async { Ok(json!({})) }));
    let h = harness_with_credentials(runner, quick_config().with_max_retries(1), 0);

    let id = h
        .scheduler
        .submit(JobKind::TrendAnalysis, json!({}), 0)
        .unwrap()
        .id;

    let store = h.store.clone();
    wait_until(move || job_status(&store, id) == JobStatus::Failed).await;
    let job = h.store.job(id).unwrap().unwrap();
    assert!(job.error.as_deref().unwrap().contains("exhausted"));
}

#[tokio::test]
async fn events_trace_the_job_lifecycle() {
    let runner = Arc::new(FnRunner::new(|_cred, _job| async { Ok(json!({})) }));
    let h = harness(runner, quick_config());
    let mut rx = h.scheduler.subscribe();

    let id = h
        .scheduler
        .submit(JobKind::ArchitectureSynthesis, json!({}), 0)
        .unwrap()
        .id;

    let store = h.store.clone();
    wait_until(move || job_status(&store, id) == JobStatus::Completed).await;

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event.topic);
    }
    for topic in [topics::JOB_QUEUED, topics::JOB_STARTED, topics::JOB_COMPLETED] {
        assert!(seen.contains(&topic), "missing {topic} in {seen:?}");
    }
}

#[tokio::test]
async fn restart_recovery_requeues_pending_and_fails_orphans() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.json");

    let orphan_id;
    let pending_id;
    {
        let store = FileStore::open(&path).unwrap();
        let mut orphan = storyforge_core::Job::new(JobKind::ChapterDraft, json!({}), 0);
        orphan.mark_running().unwrap();
        orphan_id = orphan.id;
        store.insert_job(orphan).unwrap();

        let pending = storyforge_core::Job::new(JobKind::ChapterDraft, json!({}), 0);
        pending_id = pending.id;
        store.insert_job(pending).unwrap();
    }

    let store = Arc::new(FileStore::open(&path).unwrap());
    let pool = Arc::new(CredentialPool::new());
    pool.initialize(["sk-test-credential-0"]);
    let runner = Arc::new(FnRunner::new(|_cred, _job| async { Ok(json!({})) }));
    let scheduler = Scheduler::new(store.clone(), pool, runner, quick_config()).unwrap();

    // The orphaned running job is failed during the sweep, before any pump.
    let orphan = store.job(orphan_id).unwrap().unwrap();
    assert_eq!(orphan.status, JobStatus::Failed);
    assert!(orphan.error.as_deref().unwrap().contains("restart"));

    scheduler.pump();
    let store2 = store.clone();
    wait_until(move || job_status(&store2, pending_id) == JobStatus::Completed).await;
}
