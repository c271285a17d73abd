// History maintenance port
use crate::domain::{ExecutionStatus, JobStatus};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

/// Summary of the stored state, backs the admin stats method
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub job_count: i64,
    pub jobs_by_status: BTreeMap<String, i64>,
    pub execution_count: i64,
    pub executions_by_status: BTreeMap<String, i64>,
    pub oldest_execution_at: Option<i64>,
}

impl HistoryStats {
    pub fn jobs_with(&self, status: JobStatus) -> i64 {
        self.jobs_by_status
            .get(&status.to_string())
            .copied()
            .unwrap_or(0)
    }

    pub fn executions_with(&self, status: ExecutionStatus) -> i64 {
        self.executions_by_status
            .get(&status.to_string())
            .copied()
            .unwrap_or(0)
    }
}

/// Retention settings
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Keep terminal executions finished within this many days
    pub history_retention_days: i64,

    /// Pause between retention passes (seconds)
    pub interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            history_retention_days: 30,
            interval_secs: 24 * 3600,
        }
    }
}

/// Execution history housekeeping
#[async_trait]
pub trait HistoryMaintenance: Send + Sync {
    /// Delete terminal executions finished before `cutoff_millis`
    ///
    /// Returns the number of executions deleted.
    async fn prune_executions(&self, cutoff_millis: i64) -> Result<u64>;

    /// Reclaim space after large deletions; returns bytes reclaimed
    async fn compact(&self) -> Result<i64>;

    async fn stats(&self) -> Result<HistoryStats>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::port::{ExecutionRepository, JobRepository};
    use std::sync::Arc;

    /// HistoryMaintenance over the repository ports
    pub struct RepositoryMaintenance {
        jobs: Arc<dyn JobRepository>,
        executions: Arc<dyn ExecutionRepository>,
    }

    impl RepositoryMaintenance {
        pub fn new(jobs: Arc<dyn JobRepository>, executions: Arc<dyn ExecutionRepository>) -> Self {
            Self { jobs, executions }
        }
    }

    #[async_trait]
    impl HistoryMaintenance for RepositoryMaintenance {
        async fn prune_executions(&self, cutoff_millis: i64) -> Result<u64> {
            self.executions.delete_finished_before(cutoff_millis).await
        }

        async fn compact(&self) -> Result<i64> {
            Ok(0)
        }

        async fn stats(&self) -> Result<HistoryStats> {
            let mut stats = HistoryStats::default();
            for job in self.jobs.list().await? {
                stats.job_count += 1;
                *stats.jobs_by_status.entry(job.status.to_string()).or_default() += 1;
                for execution in self.executions.list_for_job(job.id, i64::MAX).await? {
                    stats.execution_count += 1;
                    *stats
                        .executions_by_status
                        .entry(execution.status.to_string())
                        .or_default() += 1;
                    stats.oldest_execution_at = Some(
                        stats
                            .oldest_execution_at
                            .map_or(execution.created_at, |o| o.min(execution.created_at)),
                    );
                }
            }
            Ok(stats)
        }
    }
}
