// Execution Repository Port (execution history)

use crate::domain::{Execution, ExecutionId, ExecutionStatus, JobId};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn insert(&self, execution: &Execution) -> Result<()>;

    /// Overwrite a non-terminal execution
    ///
    /// Returns false when the row is gone or already terminal, so a late
    /// writer never overwrites a reclaimed run.
    async fn update(&self, execution: &Execution) -> Result<bool>;

    async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<Execution>>;

    /// The non-terminal execution of a job, if any
    async fn find_active_for_job(&self, job_id: JobId) -> Result<Option<Execution>>;

    async fn find_by_status(&self, status: ExecutionStatus) -> Result<Vec<Execution>>;

    /// Newest first
    async fn list_for_job(&self, job_id: JobId, limit: i64) -> Result<Vec<Execution>>;

    /// Delete terminal executions finished before `cutoff_millis`
    async fn delete_finished_before(&self, cutoff_millis: i64) -> Result<u64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory ExecutionRepository
    #[derive(Default)]
    pub struct InMemoryExecutionRepository {
        executions: Mutex<HashMap<ExecutionId, Execution>>,
    }

    impl InMemoryExecutionRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn all(&self) -> Vec<Execution> {
            let mut all: Vec<Execution> =
                self.executions.lock().unwrap().values().cloned().collect();
            all.sort_by_key(|e| e.created_at);
            all
        }

        /// Drop history of a deleted job (mirrors ON DELETE CASCADE)
        pub fn remove_job(&self, job_id: JobId) {
            self.executions
                .lock()
                .unwrap()
                .retain(|_, e| e.job_id != job_id);
        }
    }

    #[async_trait]
    impl ExecutionRepository for InMemoryExecutionRepository {
        async fn insert(&self, execution: &Execution) -> Result<()> {
            self.executions
                .lock()
                .unwrap()
                .insert(execution.id.clone(), execution.clone());
            Ok(())
        }

        async fn update(&self, execution: &Execution) -> Result<bool> {
            let mut executions = self.executions.lock().unwrap();
            match executions.get_mut(&execution.id) {
                Some(stored) if !stored.status.is_terminal() => {
                    *stored = execution.clone();
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<Execution>> {
            Ok(self.executions.lock().unwrap().get(id).cloned())
        }

        async fn find_active_for_job(&self, job_id: JobId) -> Result<Option<Execution>> {
            Ok(self
                .executions
                .lock()
                .unwrap()
                .values()
                .find(|e| e.job_id == job_id && !e.status.is_terminal())
                .cloned())
        }

        async fn find_by_status(&self, status: ExecutionStatus) -> Result<Vec<Execution>> {
            Ok(self
                .all()
                .into_iter()
                .filter(|e| e.status == status)
                .collect())
        }

        async fn list_for_job(&self, job_id: JobId, limit: i64) -> Result<Vec<Execution>> {
            let mut list: Vec<Execution> = self
                .all()
                .into_iter()
                .filter(|e| e.job_id == job_id)
                .collect();
            list.reverse();
            list.truncate(limit.max(0) as usize);
            Ok(list)
        }

        async fn delete_finished_before(&self, cutoff_millis: i64) -> Result<u64> {
            let mut executions = self.executions.lock().unwrap();
            let before = executions.len();
            executions.retain(|_, e| {
                !(e.status.is_terminal() && e.finished_at.is_some_and(|f| f < cutoff_millis))
            });
            Ok((before - executions.len()) as u64)
        }
    }
}
