//! Credential records and the priority-then-LRU selection policy.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use storyforge_core::CredentialId;

/// Consecutive failures before a credential is deactivated.
pub const DEFAULT_DISABLE_THRESHOLD: u32 = 5;

/// Pool error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("credential pool exhausted (no active credentials)")]
    Exhausted,
}

/// Outcome of a failure report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReport {
    /// Failure counted; credential still active.
    Recorded,
    /// This failure crossed the threshold and deactivated the credential.
    Disabled,
    /// The credential is no longer in the pool (e.g. removed mid-flight).
    Unknown,
}

/// One managed provider credential.
#[derive(Debug, Clone)]
struct CredentialRecord {
    id: CredentialId,
    secret: String,
    alias: Option<String>,
    tags: Vec<String>,
    priority: i32,
    last_used_at: Option<DateTime<Utc>>,
    use_count: u64,
    fail_count: u32,
    is_active: bool,
}

impl CredentialRecord {
    fn new(secret: String) -> Self {
        Self {
            id: CredentialId::new(),
            secret,
            alias: None,
            tags: Vec::new(),
            priority: 0,
            last_used_at: None,
            use_count: 0,
            fail_count: 0,
            is_active: true,
        }
    }
}

/// A credential handed out by `select()`.
///
/// The secret is deliberately not `Serialize` and is masked in `Debug` output;
/// only the execution wrapper should ever read it in full.
#[derive(Clone)]
pub struct SelectedCredential {
    pub id: CredentialId,
    secret: String,
}

impl SelectedCredential {
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for SelectedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedCredential")
            .field("id", &self.id)
            .field("secret", &mask_secret(&self.secret))
            .finish()
    }
}

/// Masked, serializable view of one credential for administrative listings.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialStats {
    pub id: CredentialId,
    pub secret_masked: String,
    pub alias: Option<String>,
    pub tags: Vec<String>,
    pub priority: i32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub use_count: u64,
    pub fail_count: u32,
    pub is_active: bool,
}

/// Administrative metadata patch. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialUpdate {
    pub alias: Option<String>,
    pub tags: Option<Vec<String>>,
    pub priority: Option<i32>,
}

/// The managed set of interchangeable provider credentials.
pub struct CredentialPool {
    disable_threshold: u32,
    inner: Mutex<Vec<CredentialRecord>>,
}

impl CredentialPool {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_DISABLE_THRESHOLD)
    }

    pub fn with_threshold(disable_threshold: u32) -> Self {
        Self {
            disable_threshold: disable_threshold.max(1),
            inner: Mutex::new(Vec::new()),
        }
    }

    /// Replace the pool contents with fresh records for `secrets`.
    /// Counters are zeroed and every credential starts active.
    pub fn initialize<I, S>(&self, secrets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut recs = self.inner.lock().unwrap();
        *recs = secrets
            .into_iter()
            .map(|s| CredentialRecord::new(s.into()))
            .collect();
        info!(count = recs.len(), "credential pool initialized");
    }

    /// Add one credential. No-op if the secret is already present; returns
    /// the id of the new record, or `None` for a duplicate.
    pub fn add(&self, secret: impl Into<String>) -> Option<CredentialId> {
        let secret = secret.into();
        let mut recs = self.inner.lock().unwrap();
        if recs.iter().any(|r| r.secret == secret) {
            return None;
        }
        let rec = CredentialRecord::new(secret);
        let id = rec.id;
        recs.push(rec);
        Some(id)
    }

    pub fn remove(&self, id: CredentialId) -> bool {
        let mut recs = self.inner.lock().unwrap();
        let before = recs.len();
        recs.retain(|r| r.id != id);
        recs.len() != before
    }

    /// Pick the credential for the next attempt: restrict to the highest
    /// priority among active records, then take the least-recently-used in
    /// that tier (a never-used credential counts as oldest).
    ///
    /// Stamps `last_used_at` at selection time; that stamp is what makes
    /// consecutive attempts rotate through the tier instead of re-picking the
    /// same record.
    pub fn select(&self) -> Result<SelectedCredential, PoolError> {
        let mut recs = self.inner.lock().unwrap();
        let top = recs
            .iter()
            .filter(|r| r.is_active)
            .map(|r| r.priority)
            .max()
            .ok_or(PoolError::Exhausted)?;
        let rec = recs
            .iter_mut()
            .filter(|r| r.is_active && r.priority == top)
            .min_by_key(|r| r.last_used_at)
            .ok_or(PoolError::Exhausted)?;
        rec.last_used_at = Some(Utc::now());
        Ok(SelectedCredential {
            id: rec.id,
            secret: rec.secret.clone(),
        })
    }

    /// Dry run of the selection policy: what `select()` would return, without
    /// mutating anything. Backs the administrative "test selection" endpoint.
    pub fn peek(&self) -> Option<CredentialStats> {
        let recs = self.inner.lock().unwrap();
        let top = recs
            .iter()
            .filter(|r| r.is_active)
            .map(|r| r.priority)
            .max()?;
        recs.iter()
            .filter(|r| r.is_active && r.priority == top)
            .min_by_key(|r| r.last_used_at)
            .map(stats_of)
    }

    /// Record a successful use: fresh `last_used_at`, bumped use count.
    /// Does not touch the failure count.
    pub fn report_success(&self, id: CredentialId) {
        let mut recs = self.inner.lock().unwrap();
        let Some(rec) = recs.iter_mut().find(|r| r.id == id) else {
            warn!(credential_id = %id, "success reported for unknown credential");
            return;
        };
        rec.last_used_at = Some(Utc::now());
        rec.use_count += 1;
    }

    /// Record a failed use. Never fails itself: the failure becomes state,
    /// and crossing the threshold deactivates the credential.
    pub fn report_failure(&self, id: CredentialId, reason: &str) -> FailureReport {
        let mut recs = self.inner.lock().unwrap();
        let Some(rec) = recs.iter_mut().find(|r| r.id == id) else {
            warn!(credential_id = %id, "failure reported for unknown credential");
            return FailureReport::Unknown;
        };
        rec.fail_count += 1;
        warn!(
            credential_id = %id,
            fail_count = rec.fail_count,
            reason,
            "credential failure recorded"
        );
        if rec.is_active && rec.fail_count >= self.disable_threshold {
            rec.is_active = false;
            warn!(credential_id = %id, "credential deactivated after repeated failures");
            FailureReport::Disabled
        } else {
            FailureReport::Recorded
        }
    }

    /// Re-enable a credential and zero its failure count. Never automatic;
    /// this is an explicit operator action.
    pub fn reactivate(&self, id: CredentialId) -> bool {
        let mut recs = self.inner.lock().unwrap();
        let Some(rec) = recs.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        rec.is_active = true;
        rec.fail_count = 0;
        info!(credential_id = %id, "credential reactivated");
        true
    }

    pub fn update_metadata(&self, id: CredentialId, update: CredentialUpdate) -> bool {
        let mut recs = self.inner.lock().unwrap();
        let Some(rec) = recs.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        if let Some(alias) = update.alias {
            rec.alias = Some(alias);
        }
        if let Some(tags) = update.tags {
            rec.tags = tags;
        }
        if let Some(priority) = update.priority {
            rec.priority = priority;
        }
        true
    }

    /// Masked listing for administration. Full secrets never leave the pool
    /// through this path.
    pub fn stats(&self) -> Vec<CredentialStats> {
        let recs = self.inner.lock().unwrap();
        recs.iter().map(stats_of).collect()
    }
}

impl Default for CredentialPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.inner.lock().map(|r| r.len()).unwrap_or(0);
        f.debug_struct("CredentialPool")
            .field("disable_threshold", &self.disable_threshold)
            .field("credentials", &count)
            .finish()
    }
}

fn stats_of(rec: &CredentialRecord) -> CredentialStats {
    CredentialStats {
        id: rec.id,
        secret_masked: mask_secret(&rec.secret),
        alias: rec.alias.clone(),
        tags: rec.tags.clone(),
        priority: rec.priority,
        last_used_at: rec.last_used_at,
        use_count: rec.use_count,
        fail_count: rec.fail_count,
        is_active: rec.is_active,
    }
}

/// Mask a secret to a prefix/suffix fragment, e.g. `sk-a…f9d2`.
fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{prefix}…{suffix}")
}
