// Worker pool - bounded admission of executions

pub mod constants;
mod panic_guard;
mod shutdown;

pub use panic_guard::{execute_guarded, PanicGuardResult};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::config::EngineConfig;
use crate::application::engine::EnginePorts;
use crate::application::executor::JobExecutor;
use crate::domain::{Execution, ExecutionId, ExecutionStatus, Job, Trigger};
use crate::error::Result;
use crate::port::{BusyReason, LeaseToken, LockOutcome};
use constants::ORPHANED_BY_EXPIRED_LEASE;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Result of offering work to the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Started(ExecutionId),
    /// Every worker slot is taken
    Saturated,
    Busy(BusyReason),
}

/// Work the dispatcher can start
#[derive(Debug, Clone)]
pub enum WorkItem {
    /// A new run of a job
    Fresh { job: Job, trigger: Trigger },
    /// Publishing step of an execution approved after validation
    ResumeValidated { job: Job, execution: Execution },
}

impl WorkItem {
    fn job(&self) -> &Job {
        match self {
            WorkItem::Fresh { job, .. } | WorkItem::ResumeValidated { job, .. } => job,
        }
    }
}

/// Bounded worker pool
///
/// Admission takes a slot, then the job lease, then checks the job has no
/// execution in flight. A refused admission leaves nothing behind.
pub struct Dispatcher {
    ports: EnginePorts,
    executor: Arc<JobExecutor>,
    permits: Arc<Semaphore>,
    max_workers: usize,
    lease_millis: i64,
    serialize_sites: bool,
    workers: Mutex<JoinSet<()>>,
}

impl Dispatcher {
    pub fn new(ports: EnginePorts, executor: Arc<JobExecutor>, config: &EngineConfig) -> Self {
        Self {
            ports,
            executor,
            permits: Arc::new(Semaphore::new(config.max_concurrent_executions)),
            max_workers: config.max_concurrent_executions,
            lease_millis: config.lease_millis(),
            serialize_sites: config.serialize_site_executions,
            workers: Mutex::new(JoinSet::new()),
        }
    }

    /// Workers currently holding a slot
    pub fn active_workers(&self) -> usize {
        self.max_workers - self.permits.available_permits()
    }

    pub fn has_capacity(&self) -> bool {
        self.permits.available_permits() > 0
    }

    /// Try to start `item` now; never queues
    pub async fn admit(&self, item: WorkItem) -> Result<Admission> {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Ok(Admission::Saturated),
        };

        let job = item.job();
        let site_id = self.serialize_sites.then_some(job.site_id);

        let lease = match self
            .ports
            .lock
            .try_acquire(job.id, site_id, self.lease_millis)
            .await?
        {
            LockOutcome::Acquired(lease) => lease,
            LockOutcome::Busy(reason) => {
                debug!(job_id = job.id, reason = %reason, "Admission refused");
                return Ok(Admission::Busy(reason));
            }
        };

        let prepared = self.prepare(&item).await;
        let execution = match prepared {
            Ok(Ok(execution)) => execution,
            Ok(Err(reason)) => {
                self.release(&lease).await;
                return Ok(Admission::Busy(reason));
            }
            Err(e) => {
                self.release(&lease).await;
                return Err(e);
            }
        };

        let execution_id = execution.id.clone();
        info!(job_id = job.id, execution_id = %execution_id, "Execution admitted");
        self.spawn(item, execution, lease, permit);
        Ok(Admission::Started(execution_id))
    }

    /// Wait until every spawned worker has finished
    pub async fn drain(&self) {
        loop {
            let mut workers = std::mem::take(&mut *self.workers());
            if workers.is_empty() {
                return;
            }
            info!(workers = workers.len(), "Draining workers");
            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "Worker supervisor failed");
                }
            }
        }
    }

    /// Resolve the execution row to run, or why the job is busy
    async fn prepare(&self, item: &WorkItem) -> Result<std::result::Result<Execution, BusyReason>> {
        let executions = &self.ports.executions;
        match item {
            WorkItem::Fresh { job, trigger } => {
                if let Some(active) = executions.find_active_for_job(job.id).await? {
                    return Ok(Err(self.busy_with(active).await?));
                }
                let now = self.ports.time.now_millis();
                let execution = Execution::new(self.ports.ids.generate_id(), job, *trigger, now);
                executions.insert(&execution).await?;
                Ok(Ok(execution))
            }
            WorkItem::ResumeValidated { execution, .. } => {
                match executions.find_by_id(&execution.id).await? {
                    Some(current) if current.status == ExecutionStatus::Validated => Ok(Ok(current)),
                    // Picked up by another admission meanwhile
                    _ => Ok(Err(BusyReason::ExecutionInFlight)),
                }
            }
        }
    }

    /// Classify an active execution found while holding the job lease
    async fn busy_with(&self, active: Execution) -> Result<BusyReason> {
        match active.status {
            ExecutionStatus::PendingValidation => Ok(BusyReason::AwaitingValidation),
            status if status.is_running() => {
                // Running state without a live lease: its worker is gone or hung
                warn!(
                    job_id = active.job_id,
                    execution_id = %active.id,
                    status = %active.status,
                    "Failing orphaned execution"
                );
                self.executor.abort(active, ORPHANED_BY_EXPIRED_LEASE).await?;
                Ok(BusyReason::ExecutionInFlight)
            }
            _ => Ok(BusyReason::ExecutionInFlight),
        }
    }

    fn spawn(
        &self,
        item: WorkItem,
        execution: Execution,
        lease: LeaseToken,
        permit: OwnedSemaphorePermit,
    ) {
        let executor = Arc::clone(&self.executor);
        let ports = self.ports.clone();
        let execution_id = execution.id.clone();

        let work = {
            let executor = Arc::clone(&executor);
            async move {
                match item {
                    WorkItem::Fresh { job, .. } => executor.run(&job, execution).await,
                    WorkItem::ResumeValidated { job, .. } => executor.resume(&job, execution).await,
                }
            }
        };

        let supervisor = async move {
            let result = execute_guarded(work).await;
            match result {
                PanicGuardResult::Success(Ok(outcome)) => {
                    debug!(execution_id = %execution_id, outcome = ?outcome, "Worker finished");
                }
                PanicGuardResult::Success(Err(e)) => {
                    error!(execution_id = %execution_id, error = %e, "Worker could not record its execution");
                }
                PanicGuardResult::Panicked(msg) => {
                    fail_after_crash(&executor, &ports, &execution_id, &format!("worker panicked: {}", msg)).await;
                }
                PanicGuardResult::Cancelled => {
                    fail_after_crash(&executor, &ports, &execution_id, "worker cancelled").await;
                }
            }

            if let Err(e) = ports.lock.release(&lease).await {
                warn!(execution_id = %execution_id, error = %e, "Lease release failed, it will expire");
            }
            drop(permit);
        };

        let mut workers = self.workers();
        while let Some(joined) = workers.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "Worker supervisor failed");
            }
        }
        workers.spawn(supervisor);
    }

    fn workers(&self) -> MutexGuard<'_, JoinSet<()>> {
        // Supervisors never panic while holding the guard
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn release(&self, lease: &LeaseToken) {
        if let Err(e) = self.ports.lock.release(lease).await {
            warn!(job_id = lease.job_id, error = %e, "Lease release failed, it will expire");
        }
    }
}

async fn fail_after_crash(
    executor: &JobExecutor,
    ports: &EnginePorts,
    execution_id: &ExecutionId,
    reason: &str,
) {
    let current = match ports.executions.find_by_id(execution_id).await {
        Ok(Some(current)) => current,
        Ok(None) => return,
        Err(e) => {
            error!(execution_id = %execution_id, error = %e, "Could not load crashed execution");
            return;
        }
    };
    // A suspended execution stays resumable
    if current.status.is_terminal() || current.status == ExecutionStatus::PendingValidation {
        return;
    }
    if let Err(e) = executor.abort(current, reason).await {
        error!(execution_id = %execution_id, error = %e, "Could not fail crashed execution");
    }
}
