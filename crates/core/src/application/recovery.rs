// Startup recovery of runs interrupted by a crash or restart
use crate::application::engine::EnginePorts;
use crate::application::executor::{JobExecutor, RunOutcome};
use crate::application::worker::constants::INTERRUPTED_BY_RESTART;
use crate::domain::ExecutionStatus;
use crate::error::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// What startup recovery cleaned up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub leases_cleared: u64,
    pub failed_executions: usize,
}

/// Crash recovery service
///
/// Runs once before the scheduler starts. No worker can be alive at that
/// point, so every lease is stale and every execution a worker was driving
/// is dead. Suspended runs (PendingValidation, Validated) survive untouched.
pub struct RecoveryService {
    ports: EnginePorts,
    executor: Arc<JobExecutor>,
}

impl RecoveryService {
    pub fn new(ports: EnginePorts, executor: Arc<JobExecutor>) -> Self {
        Self { ports, executor }
    }

    pub async fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport {
            leases_cleared: self.ports.lock.reset().await?,
            ..Default::default()
        };

        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Generating,
            ExecutionStatus::Publishing,
        ] {
            for execution in self.ports.executions.find_by_status(status).await? {
                let id = execution.id.clone();
                match self.executor.abort(execution, INTERRUPTED_BY_RESTART).await {
                    Ok(RunOutcome::Discarded) => {}
                    Ok(_) => report.failed_executions += 1,
                    Err(e) => warn!(execution_id = %id, error = %e, "Could not fail interrupted execution"),
                }
            }
        }

        info!(
            leases_cleared = report.leases_cleared,
            failed_executions = report.failed_executions,
            "Startup recovery complete"
        );
        Ok(report)
    }
}
