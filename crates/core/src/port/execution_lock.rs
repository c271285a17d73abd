// Execution Lock Port
// Lease-based mutual exclusion per job (and optionally per site)

use crate::domain::{JobId, SiteId};
use crate::error::Result;
use crate::port::{IdProvider, TimeProvider};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Proof of holding a lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken {
    pub token: String,
    pub job_id: JobId,
    pub site_id: Option<SiteId>,
    pub expires_at: i64,
}

/// Why a job could not be started right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyReason {
    /// Another run of this job holds the lease
    JobLocked,
    /// Another job is running against the same site
    SiteLocked { site_id: SiteId },
    /// A previous run has not reached a terminal state
    ExecutionInFlight,
    /// A previous run is suspended waiting for validation
    AwaitingValidation,
}

impl std::fmt::Display for BusyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusyReason::JobLocked => write!(f, "job is already running"),
            BusyReason::SiteLocked { site_id } => {
                write!(f, "site {} is busy with another job", site_id)
            }
            BusyReason::ExecutionInFlight => write!(f, "previous execution still in flight"),
            BusyReason::AwaitingValidation => write!(f, "previous execution awaits validation"),
        }
    }
}

/// Result of `try_acquire`. Busy is not an error: the caller retries next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired(LeaseToken),
    Busy(BusyReason),
}

#[async_trait]
pub trait ExecutionLock: Send + Sync {
    /// Take the job lease (and the site lease when `site_id` is given)
    ///
    /// Both are taken or neither. Expired leases are reclaimed.
    async fn try_acquire(
        &self,
        job_id: JobId,
        site_id: Option<SiteId>,
        ttl_millis: i64,
    ) -> Result<LockOutcome>;

    /// Release a lease; a stale token never frees a newer holder
    async fn release(&self, lease: &LeaseToken) -> Result<()>;

    /// Drop expired leases, returning how many were removed
    async fn purge_expired(&self) -> Result<u64>;

    /// Drop every lease
    ///
    /// Only valid at startup, before any worker of this engine runs.
    async fn reset(&self) -> Result<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LockKey {
    Job(JobId),
    Site(SiteId),
}

#[derive(Debug, Clone)]
struct Lease {
    token: String,
    expires_at: i64,
}

/// Process-local lease table
///
/// Lost on restart, which is acceptable: a restart also ends every in-flight run.
pub struct InMemoryExecutionLock {
    leases: Mutex<HashMap<LockKey, Lease>>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl InMemoryExecutionLock {
    pub fn new(id_provider: Arc<dyn IdProvider>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            id_provider,
            time_provider,
        }
    }

    fn leases(&self) -> MutexGuard<'_, HashMap<LockKey, Lease>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn held_count(&self) -> usize {
        let now = self.time_provider.now_millis();
        self.leases()
            .values()
            .filter(|l| l.expires_at > now)
            .count()
    }
}

#[async_trait]
impl ExecutionLock for InMemoryExecutionLock {
    async fn try_acquire(
        &self,
        job_id: JobId,
        site_id: Option<SiteId>,
        ttl_millis: i64,
    ) -> Result<LockOutcome> {
        let now = self.time_provider.now_millis();
        let mut leases = self.leases();

        let is_held = |key: &LockKey| leases.get(key).is_some_and(|l| l.expires_at > now);

        if is_held(&LockKey::Job(job_id)) {
            return Ok(LockOutcome::Busy(BusyReason::JobLocked));
        }
        if let Some(site_id) = site_id {
            if is_held(&LockKey::Site(site_id)) {
                return Ok(LockOutcome::Busy(BusyReason::SiteLocked { site_id }));
            }
        }

        let lease = Lease {
            token: self.id_provider.generate_id(),
            expires_at: now + ttl_millis,
        };
        leases.insert(LockKey::Job(job_id), lease.clone());
        if let Some(site_id) = site_id {
            leases.insert(LockKey::Site(site_id), lease.clone());
        }

        debug!(job_id, site_id = ?site_id, expires_at = lease.expires_at, "Lease acquired");
        Ok(LockOutcome::Acquired(LeaseToken {
            token: lease.token,
            job_id,
            site_id,
            expires_at: lease.expires_at,
        }))
    }

    async fn release(&self, lease: &LeaseToken) -> Result<()> {
        let mut leases = self.leases();
        let mut keys = vec![LockKey::Job(lease.job_id)];
        if let Some(site_id) = lease.site_id {
            keys.push(LockKey::Site(site_id));
        }
        for key in keys {
            if leases.get(&key).is_some_and(|l| l.token == lease.token) {
                leases.remove(&key);
            }
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = self.time_provider.now_millis();
        let mut leases = self.leases();
        let before = leases.len();
        leases.retain(|_, l| l.expires_at > now);
        Ok((before - leases.len()) as u64)
    }

    async fn reset(&self) -> Result<u64> {
        let mut leases = self.leases();
        let count = leases.len() as u64;
        leases.clear();
        Ok(count)
    }
}
