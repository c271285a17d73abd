// Job Repository Port (Interface)

use crate::domain::{Job, JobId, JobStatus};
use crate::error::Result;
use async_trait::async_trait;

/// Outcome bookkeeping written after every terminal run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    /// When the run started (becomes `last_run_at`)
    pub run_at: i64,
    pub succeeded: bool,
    /// Freshly evaluated next fire time (ignored while paused)
    pub next_run_at: Option<i64>,
    /// Active one-shot jobs move to Completed
    pub complete_once: bool,
    /// Consecutive failures that flip an Active job to Error (0 = never)
    pub failure_threshold: u32,
}

impl RunRecord {
    /// Apply the record to an in-memory job
    ///
    /// Mirrors the single UPDATE statement used by persistent stores.
    pub fn apply_to(&self, job: &mut Job, now_millis: i64) {
        let run = &mut job.run;
        run.last_run_at = Some(self.run_at);
        run.total_executions += 1;
        if self.succeeded {
            run.last_success_at = Some(self.run_at);
            run.consecutive_failures = 0;
        } else {
            run.failed_executions += 1;
            run.consecutive_failures += 1;
        }

        if job.status == JobStatus::Active {
            if !self.succeeded
                && self.failure_threshold > 0
                && run.consecutive_failures >= i64::from(self.failure_threshold)
            {
                job.status = JobStatus::Error;
            } else if self.complete_once {
                job.status = JobStatus::Completed;
            }
        }

        run.next_run_at = match job.status {
            JobStatus::Active => self.next_run_at,
            _ => None,
        };
        job.updated_at = now_millis;
    }
}

/// Repository interface for Job persistence (the job state store)
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job, returning its assigned ID
    async fn insert(&self, job: &Job) -> Result<JobId>;

    /// Find job by ID
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>>;

    /// All jobs, ordered by ID
    async fn list(&self) -> Result<Vec<Job>>;

    /// Jobs with the given status
    async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>>;

    /// Update user-owned configuration, schedule, `next_run_at` and the
    /// round-robin cursor
    ///
    /// Run counters are never touched. Returns false if the job is gone.
    async fn update_definition(&self, job: &Job) -> Result<bool>;

    /// Delete job and its execution history
    async fn delete(&self, id: JobId) -> Result<bool>;

    /// Change status and next run time together
    async fn set_status(
        &self,
        id: JobId,
        status: JobStatus,
        next_run_at: Option<i64>,
        reset_failures: bool,
    ) -> Result<bool>;

    /// Persist a recomputed next run time
    async fn set_next_run_at(&self, id: JobId, next_run_at: Option<i64>) -> Result<()>;

    /// Atomically use and advance the round-robin cursor
    ///
    /// Returns the index to use this run (`last_category_index mod modulus`),
    /// or None if the job is gone.
    async fn advance_category_index(&self, id: JobId, modulus: i64) -> Result<Option<usize>>;

    /// Atomically apply a run outcome; None if the job was deleted meanwhile
    async fn record_run(&self, id: JobId, record: &RunRecord) -> Result<Option<Job>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::RunState;
    use crate::port::TimeProvider;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    /// In-memory JobRepository
    pub struct InMemoryJobRepository {
        jobs: Mutex<BTreeMap<JobId, Job>>,
        next_id: Mutex<JobId>,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl InMemoryJobRepository {
        pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                jobs: Mutex::new(BTreeMap::new()),
                next_id: Mutex::new(1),
                time_provider,
            }
        }
    }

    #[async_trait]
    impl JobRepository for InMemoryJobRepository {
        async fn insert(&self, job: &Job) -> Result<JobId> {
            let id = {
                let mut next = self.next_id.lock().unwrap();
                let id = *next;
                *next += 1;
                id
            };
            let mut stored = job.clone();
            stored.id = id;
            self.jobs.lock().unwrap().insert(id, stored);
            Ok(id)
        }

        async fn find_by_id(&self, id: JobId) -> Result<Option<Job>> {
            Ok(self.jobs.lock().unwrap().get(&id).cloned())
        }

        async fn list(&self) -> Result<Vec<Job>> {
            Ok(self.jobs.lock().unwrap().values().cloned().collect())
        }

        async fn find_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .values()
                .filter(|j| j.status == status)
                .cloned()
                .collect())
        }

        async fn update_definition(&self, job: &Job) -> Result<bool> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            match jobs.get_mut(&job.id) {
                Some(stored) => {
                    let run = stored.run.clone();
                    let status = stored.status;
                    let created_at = stored.created_at;
                    *stored = job.clone();
                    stored.run = RunState {
                        next_run_at: job.run.next_run_at,
                        last_category_index: job.run.last_category_index,
                        ..run
                    };
                    stored.status = status;
                    stored.created_at = created_at;
                    stored.updated_at = now;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn delete(&self, id: JobId) -> Result<bool> {
            Ok(self.jobs.lock().unwrap().remove(&id).is_some())
        }

        async fn set_status(
            &self,
            id: JobId,
            status: JobStatus,
            next_run_at: Option<i64>,
            reset_failures: bool,
        ) -> Result<bool> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            match jobs.get_mut(&id) {
                Some(job) => {
                    job.status = status;
                    job.run.next_run_at = next_run_at;
                    if reset_failures {
                        job.run.consecutive_failures = 0;
                    }
                    job.updated_at = now;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn set_next_run_at(&self, id: JobId, next_run_at: Option<i64>) -> Result<()> {
            if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
                job.run.next_run_at = next_run_at;
            }
            Ok(())
        }

        async fn advance_category_index(&self, id: JobId, modulus: i64) -> Result<Option<usize>> {
            let mut jobs = self.jobs.lock().unwrap();
            Ok(jobs.get_mut(&id).map(|job| {
                let used = job.run.last_category_index.rem_euclid(modulus);
                job.run.last_category_index = (used + 1) % modulus;
                used as usize
            }))
        }

        async fn record_run(&self, id: JobId, record: &RunRecord) -> Result<Option<Job>> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs.lock().unwrap();
            Ok(jobs.get_mut(&id).map(|job| {
                record.apply_to(job, now);
                job.clone()
            }))
        }
    }
}
