// Execution history retention
// Periodically prunes old terminal executions and compacts the store

use crate::application::worker::ShutdownToken;
use crate::error::Result;
use crate::port::{HistoryMaintenance, RetentionConfig, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

const DAY_MILLIS: i64 = 24 * 3600 * 1000;

/// Retention scheduler
///
/// Runs one pass immediately, then every `interval_secs` until shutdown.
pub struct RetentionScheduler {
    maintenance: Arc<dyn HistoryMaintenance>,
    time_provider: Arc<dyn TimeProvider>,
    config: RetentionConfig,
}

impl RetentionScheduler {
    pub fn new(
        maintenance: Arc<dyn HistoryMaintenance>,
        time_provider: Arc<dyn TimeProvider>,
        config: RetentionConfig,
    ) -> Self {
        Self {
            maintenance,
            time_provider,
            config,
        }
    }

    /// Retention loop; spawn it next to the scheduler
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.config.interval_secs,
            retention_days = self.config.history_retention_days,
            "Retention scheduler started"
        );

        let mut tick = interval(Duration::from_secs(self.config.interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.run_now().await {
                        error!(error = ?e, "Retention pass failed");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }
        info!("Retention scheduler stopped");
    }

    /// One retention pass; returns the number of executions deleted
    pub async fn run_now(&self) -> Result<u64> {
        let cutoff =
            self.time_provider.now_millis() - self.config.history_retention_days * DAY_MILLIS;
        let deleted = self.maintenance.prune_executions(cutoff).await?;

        if deleted > 0 {
            let reclaimed = self.maintenance.compact().await?;
            info!(deleted, reclaimed_bytes = reclaimed, "Execution history pruned");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Execution, ExecutionStatus, Job, Schedule, Trigger};
    use crate::port::execution_repository::mocks::InMemoryExecutionRepository;
    use crate::port::job_repository::mocks::InMemoryJobRepository;
    use crate::port::maintenance::mocks::RepositoryMaintenance;
    use crate::port::{ExecutionRepository, SimulatedTimeProvider};

    async fn finished(
        executions: &InMemoryExecutionRepository,
        job: &Job,
        id: &str,
        at: i64,
    ) {
        let mut execution = Execution::new(id, job, Trigger::Scheduled, at);
        executions.insert(&execution).await.unwrap();
        execution.fail("boom", at).unwrap();
        executions.update(&execution).await.unwrap();
    }

    #[tokio::test]
    async fn test_prunes_only_expired_terminal_history() {
        let now = 100 * DAY_MILLIS;
        let clock = Arc::new(SimulatedTimeProvider::new(now));
        let jobs = Arc::new(InMemoryJobRepository::new(clock.clone()));
        let executions = Arc::new(InMemoryExecutionRepository::new());
        let job = Job::new_test(1, Schedule::Manual);

        finished(&executions, &job, "old", now - 40 * DAY_MILLIS).await;
        finished(&executions, &job, "recent", now - DAY_MILLIS).await;
        let mut open = Execution::new("open", &job, Trigger::Manual, now - 40 * DAY_MILLIS);
        executions.insert(&open).await.unwrap();
        open.transition(ExecutionStatus::Generating, now - 40 * DAY_MILLIS).unwrap();
        executions.update(&open).await.unwrap();

        let scheduler = RetentionScheduler::new(
            Arc::new(RepositoryMaintenance::new(jobs, executions.clone())),
            clock,
            RetentionConfig::default(),
        );
        assert_eq!(scheduler.run_now().await.unwrap(), 1);

        let mut left: Vec<String> = executions.all().into_iter().map(|e| e.id).collect();
        left.sort();
        assert_eq!(left, vec!["open".to_string(), "recent".to_string()]);

        assert_eq!(scheduler.run_now().await.unwrap(), 0);
    }
}
