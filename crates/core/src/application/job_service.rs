//! Job service: the operations the frontend calls
//!
//! Every mutation is validated here, so nothing the scheduler reads can be
//! malformed. Manual runs and validation decisions go through the same
//! dispatcher as scheduled work.

use crate::application::engine::EnginePorts;
use crate::application::executor::JobExecutor;
use crate::application::schedule::{EvaluationReason, ScheduleEvaluator};
use crate::application::validation::validate_job;
use crate::application::worker::{Admission, Dispatcher, WorkItem};
use crate::domain::{
    CategoryId, CategoryStrategy, Execution, ExecutionId, ExecutionStatus, Job, JobId, JobStatus,
    PromptId, ProviderId, Schedule, SiteId, Topic, TopicStrategy, Trigger,
};
use crate::error::{AppError, Result};
use crate::port::BusyReason;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 500;

/// Fields of a new job
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobCreateInput {
    pub name: String,
    pub site_id: SiteId,
    pub prompt_id: PromptId,
    pub provider_id: ProviderId,
    pub schedule: Schedule,
    #[serde(default)]
    pub placeholders: BTreeMap<String, String>,
    #[serde(default)]
    pub topic_strategy: Option<TopicStrategy>,
    #[serde(default)]
    pub category_strategy: Option<CategoryStrategy>,
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
    #[serde(default)]
    pub requires_validation: bool,
    #[serde(default)]
    pub jitter_enabled: bool,
    #[serde(default)]
    pub jitter_minutes: u32,
}

/// Partial update; absent fields are left alone
///
/// For the optional strategies, an explicit `null` clears the value.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct JobUpdateInput {
    pub id: JobId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub site_id: Option<SiteId>,
    #[serde(default)]
    pub prompt_id: Option<PromptId>,
    #[serde(default)]
    pub provider_id: Option<ProviderId>,
    #[serde(default)]
    pub schedule: Option<Schedule>,
    #[serde(default)]
    pub placeholders: Option<BTreeMap<String, String>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub topic_strategy: Option<Option<TopicStrategy>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub category_strategy: Option<Option<CategoryStrategy>>,
    #[serde(default)]
    pub category_ids: Option<Vec<CategoryId>>,
    #[serde(default)]
    pub requires_validation: Option<bool>,
    #[serde(default)]
    pub jitter_enabled: Option<bool>,
    #[serde(default)]
    pub jitter_minutes: Option<u32>,
}

fn explicit_null<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Answer to a run-now request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ManualRunOutcome {
    Started { execution_id: ExecutionId },
    Busy { reason: BusyReason, message: String },
    Saturated,
}

impl From<Admission> for ManualRunOutcome {
    fn from(admission: Admission) -> Self {
        match admission {
            Admission::Started(execution_id) => ManualRunOutcome::Started { execution_id },
            Admission::Busy(reason) => ManualRunOutcome::Busy {
                message: reason.to_string(),
                reason,
            },
            Admission::Saturated => ManualRunOutcome::Saturated,
        }
    }
}

/// Reviewer decision on a PendingValidation execution
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ValidationDecision {
    /// Publish, optionally with edited title/content
    Approve {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },
    Reject {
        #[serde(default)]
        reason: Option<String>,
    },
}

pub struct JobService {
    ports: EnginePorts,
    dispatcher: Arc<Dispatcher>,
    executor: Arc<JobExecutor>,
    evaluator: ScheduleEvaluator,
}

impl JobService {
    pub fn new(
        ports: EnginePorts,
        dispatcher: Arc<Dispatcher>,
        executor: Arc<JobExecutor>,
        evaluator: ScheduleEvaluator,
    ) -> Self {
        Self {
            ports,
            dispatcher,
            executor,
            evaluator,
        }
    }

    fn now(&self) -> i64 {
        self.ports.time.now_millis()
    }

    async fn load(&self, id: JobId) -> Result<Job> {
        self.ports
            .jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::job_not_found(id))
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.ports.jobs.list().await
    }

    pub async fn get_job(&self, id: JobId) -> Result<Job> {
        self.load(id).await
    }

    pub async fn create_job(&self, input: JobCreateInput) -> Result<Job> {
        let now = self.now();
        let mut job = Job::new(
            input.name.trim(),
            input.site_id,
            input.prompt_id,
            input.provider_id,
            input.schedule,
            now,
        );
        job.placeholders = input.placeholders;
        job.topic_strategy = input.topic_strategy;
        job.category_strategy = input.category_strategy;
        job.category_ids = input.category_ids;
        job.requires_validation = input.requires_validation;
        job.jitter_enabled = input.jitter_enabled;
        job.jitter_minutes = input.jitter_minutes;
        validate_job(&job)?;

        job.run.next_run_at = self.evaluator.evaluate_job(&job, now).next_run_at;
        let id = self.ports.jobs.insert(&job).await?;
        info!(job_id = id, schedule = %job.schedule, "Job created");
        self.load(id).await
    }

    /// Apply a partial update; the run state is left untouched
    pub async fn update_job(&self, input: JobUpdateInput) -> Result<Job> {
        let mut job = self.load(input.id).await?;

        if let Some(name) = input.name {
            job.name = name.trim().to_string();
        }
        if let Some(site_id) = input.site_id {
            job.site_id = site_id;
        }
        if let Some(prompt_id) = input.prompt_id {
            job.prompt_id = prompt_id;
        }
        if let Some(provider_id) = input.provider_id {
            job.provider_id = provider_id;
        }
        if let Some(schedule) = input.schedule {
            job.schedule = schedule;
        }
        if let Some(placeholders) = input.placeholders {
            job.placeholders = placeholders;
        }
        if let Some(strategy) = input.topic_strategy {
            job.topic_strategy = strategy;
        }
        if let Some(strategy) = input.category_strategy {
            job.category_strategy = strategy;
        }
        if let Some(ids) = input.category_ids {
            if ids != job.category_ids {
                job.run.last_category_index = 0;
            }
            job.category_ids = ids;
        }
        if let Some(requires_validation) = input.requires_validation {
            job.requires_validation = requires_validation;
        }
        if let Some(enabled) = input.jitter_enabled {
            job.jitter_enabled = enabled;
        }
        if let Some(minutes) = input.jitter_minutes {
            job.jitter_minutes = minutes;
        }
        validate_job(&job)?;

        job.run.next_run_at = match job.status {
            JobStatus::Active => self.evaluator.evaluate_job(&job, self.now()).next_run_at,
            _ => None,
        };
        if !self.ports.jobs.update_definition(&job).await? {
            return Err(AppError::job_not_found(job.id));
        }
        info!(job_id = job.id, "Job updated");
        self.load(job.id).await
    }

    /// Delete a job; an in-flight run finishes and its result is dropped
    pub async fn delete_job(&self, id: JobId) -> Result<()> {
        if !self.ports.jobs.delete(id).await? {
            return Err(AppError::job_not_found(id));
        }
        info!(job_id = id, "Job deleted");
        Ok(())
    }

    /// Stop future runs; an in-flight run is not cancelled
    pub async fn pause_job(&self, id: JobId) -> Result<Job> {
        let job = self.load(id).await?;
        match job.status {
            JobStatus::Paused => return Ok(job),
            JobStatus::Active => {}
            other => {
                return Err(AppError::InvalidState(format!(
                    "job {} is {} and cannot be paused",
                    id, other
                )))
            }
        }
        self.ports
            .jobs
            .set_status(id, JobStatus::Paused, None, false)
            .await?;
        info!(job_id = id, "Job paused");
        self.load(id).await
    }

    /// Re-activate a Paused or Error job with a fresh failure streak
    pub async fn resume_job(&self, id: JobId) -> Result<Job> {
        let mut job = self.load(id).await?;
        match job.status {
            JobStatus::Active => return Ok(job),
            JobStatus::Paused | JobStatus::Error => {}
            JobStatus::Completed => {
                return Err(AppError::InvalidState(format!(
                    "job {} is completed and cannot be resumed",
                    id
                )))
            }
        }
        job.status = JobStatus::Active;
        let evaluation = self.evaluator.evaluate_job(&job, self.now());
        // A one-shot consumed by a manual run while paused has nothing left to do
        let status = if evaluation.reason == EvaluationReason::Exhausted {
            JobStatus::Completed
        } else {
            JobStatus::Active
        };
        self.ports
            .jobs
            .set_status(id, status, evaluation.next_run_at, true)
            .await?;
        info!(job_id = id, status = %status, next_run_at = ?evaluation.next_run_at, "Job resumed");
        self.load(id).await
    }

    /// Run now, whatever the schedule; refused rather than queued when busy
    pub async fn execute_manually(&self, id: JobId) -> Result<ManualRunOutcome> {
        let job = self.load(id).await?;
        let admission = self
            .dispatcher
            .admit(WorkItem::Fresh {
                job,
                trigger: Trigger::Manual,
            })
            .await?;
        info!(job_id = id, admission = ?admission, "Manual run requested");
        Ok(admission.into())
    }

    /// Advance an execution suspended in PendingValidation
    pub async fn validate_execution(
        &self,
        id: &ExecutionId,
        decision: ValidationDecision,
    ) -> Result<Execution> {
        let mut execution = self.get_execution(id).await?;
        if execution.status != ExecutionStatus::PendingValidation {
            return Err(AppError::InvalidState(format!(
                "execution {} is {}, not awaiting validation",
                id, execution.status
            )));
        }
        let now = self.now();

        match decision {
            ValidationDecision::Approve { title, content } => {
                if let Some(title) = title {
                    execution.title = Some(title);
                }
                if let Some(content) = content {
                    execution.content = Some(content);
                }
                execution.transition(ExecutionStatus::Validated, now)?;
                if !self.ports.executions.update(&execution).await? {
                    return Err(AppError::Conflict(format!(
                        "execution {} changed concurrently",
                        id
                    )));
                }
                info!(execution_id = %id, "Execution approved");

                let job = self.load(execution.job_id).await?;
                match self
                    .dispatcher
                    .admit(WorkItem::ResumeValidated {
                        job,
                        execution: execution.clone(),
                    })
                    .await
                {
                    Ok(Admission::Started(_)) => {}
                    Ok(other) => info!(
                        execution_id = %id,
                        admission = ?other,
                        "Publishing deferred to a later tick"
                    ),
                    Err(e) => warn!(execution_id = %id, error = %e, "Publishing deferred"),
                }
            }
            ValidationDecision::Reject { reason } => {
                let reason = reason.unwrap_or_else(|| "rejected by reviewer".to_string());
                execution.fail(format!("validation rejected: {}", reason), now)?;
                info!(execution_id = %id, "Execution rejected");
                self.executor.complete(execution).await?;
            }
        }
        self.get_execution(id).await
    }

    pub async fn get_execution(&self, id: &ExecutionId) -> Result<Execution> {
        self.ports
            .executions
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::execution_not_found(id))
    }

    /// Execution history of a job, newest first
    pub async fn list_executions(&self, job_id: JobId, limit: Option<i64>) -> Result<Vec<Execution>> {
        self.load(job_id).await?;
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.ports.executions.list_for_job(job_id, limit).await
    }

    /// Add topics to a site's pool, ignoring blanks and duplicates
    pub async fn add_topics(&self, site_id: SiteId, titles: Vec<String>) -> Result<Vec<Topic>> {
        if site_id <= 0 {
            return Err(AppError::Validation(format!(
                "site_id must be positive, got {}",
                site_id
            )));
        }
        let existing: BTreeSet<String> = self
            .ports
            .topics
            .list_for_site(site_id)
            .await?
            .into_iter()
            .map(|t| t.title)
            .collect();

        let mut seen = BTreeSet::new();
        let fresh: Vec<String> = titles
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty() && !existing.contains(t) && seen.insert(t.clone()))
            .collect();
        if fresh.is_empty() {
            return Err(AppError::Validation("no new topics to add".into()));
        }
        let added = self.ports.topics.add(site_id, &fresh).await?;
        info!(site_id, added = added.len(), "Topics added");
        Ok(added)
    }

    pub async fn list_topics(&self, site_id: SiteId) -> Result<Vec<Topic>> {
        self.ports.topics.list_for_site(site_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::test_support::{fast_config, Harness};
    use crate::domain::IntervalUnit;
    use crate::port::content_generator::mocks::MockContentGenerator;
    use crate::port::site_publisher::mocks::MockSitePublisher;
    use crate::port::SimulatedTimeProvider;
    use crate::port::{JobRepository, TimeProvider};
    use tokio::sync::Semaphore;

    const HOUR: i64 = 3_600_000;

    fn input(schedule: Schedule) -> JobCreateInput {
        JobCreateInput {
            name: "Daily digest".into(),
            site_id: 1,
            prompt_id: 2,
            provider_id: 3,
            schedule,
            placeholders: BTreeMap::new(),
            topic_strategy: None,
            category_strategy: None,
            category_ids: vec![],
            requires_validation: false,
            jitter_enabled: false,
            jitter_minutes: 0,
        }
    }

    fn hourly() -> Schedule {
        Schedule::Interval {
            value: 1,
            unit: IntervalUnit::Hours,
            start_at: None,
        }
    }

    fn advance(clock: &SimulatedTimeProvider, millis: i64) {
        clock.advance(millis);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_schedule() {
        let h = Harness::new();
        let result = h
            .engine
            .jobs
            .create_job(input(Schedule::Weekly {
                weekday: 9,
                hour: 9,
                minute: 0,
            }))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(h.engine.jobs.list_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_computes_next_run() {
        let h = Harness::new();
        let start = h.clock.now_millis() + HOUR;
        let job = h
            .engine
            .jobs
            .create_job(input(Schedule::Interval {
                value: 2,
                unit: IntervalUnit::Hours,
                start_at: Some(start),
            }))
            .await
            .unwrap();
        assert!(job.id > 0);
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.run.next_run_at, Some(start));
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let h = Harness::new();
        let service = &h.engine.jobs;
        let job = service.create_job(input(hourly())).await.unwrap();

        let paused = service.pause_job(job.id).await.unwrap();
        assert_eq!(paused.status, JobStatus::Paused);
        assert_eq!(paused.run.next_run_at, None);
        assert_eq!(h.engine.scheduler.tick().await.unwrap().due, 0);

        let resumed = service.resume_job(job.id).await.unwrap();
        assert_eq!(resumed.status, JobStatus::Active);
        assert!(resumed.run.next_run_at.is_some());
    }

    #[tokio::test]
    async fn test_once_run_by_hand_while_paused_completes_on_resume() {
        let h = Harness::new();
        let service = &h.engine.jobs;
        let execute_at = h.clock.now_millis() + HOUR;
        let job = service
            .create_job(input(Schedule::Once { execute_at }))
            .await
            .unwrap();
        service.pause_job(job.id).await.unwrap();

        // Paused past its fire time, then run by hand
        advance(&h.clock, 2 * HOUR);
        assert!(matches!(
            service.execute_manually(job.id).await.unwrap(),
            ManualRunOutcome::Started { .. }
        ));
        h.engine.dispatcher.drain().await;
        assert_eq!(service.get_job(job.id).await.unwrap().status, JobStatus::Paused);

        let resumed = service.resume_job(job.id).await.unwrap();
        assert_eq!(resumed.status, JobStatus::Completed);
        assert_eq!(resumed.run.next_run_at, None);
        assert_eq!(h.engine.scheduler.tick().await.unwrap().evaluated, 0);
    }

    #[tokio::test]
    async fn test_resume_from_error_resets_streak() {
        let h = Harness::new();
        let service = &h.engine.jobs;
        let job = service.create_job(input(Schedule::Manual)).await.unwrap();
        h.jobs
            .set_status(job.id, JobStatus::Error, None, false)
            .await
            .unwrap();

        let resumed = service.resume_job(job.id).await.unwrap();
        assert_eq!(resumed.status, JobStatus::Active);
        assert_eq!(resumed.run.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_update_keeps_run_state_and_recomputes_next() {
        let h = Harness::new();
        let service = &h.engine.jobs;
        let job = service.create_job(input(hourly())).await.unwrap();
        service.execute_manually(job.id).await.unwrap();
        h.engine.dispatcher.drain().await;

        let updated = service
            .update_job(JobUpdateInput {
                id: job.id,
                name: Some("Renamed".into()),
                schedule: Some(Schedule::Interval {
                    value: 3,
                    unit: IntervalUnit::Hours,
                    start_at: None,
                }),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.run.total_executions, 1);
        let last = updated.run.last_run_at.unwrap();
        assert_eq!(updated.run.next_run_at, Some(last + 3 * HOUR));
    }

    #[tokio::test]
    async fn test_update_null_clears_strategy() {
        let update: JobUpdateInput =
            serde_json::from_str(r#"{"id": 1, "topic_strategy": null}"#).unwrap();
        assert_eq!(update.topic_strategy, Some(None));
        let update: JobUpdateInput = serde_json::from_str(r#"{"id": 1}"#).unwrap();
        assert_eq!(update.topic_strategy, None);
    }

    #[tokio::test]
    async fn test_manual_run_busy_while_publishing() {
        let gate = Arc::new(Semaphore::new(0));
        let h = Harness::with(
            MockContentGenerator::new_success(),
            MockSitePublisher::new().gated(gate.clone()),
            fast_config(),
        );
        let service = &h.engine.jobs;
        let job = service.create_job(input(Schedule::Manual)).await.unwrap();

        let ManualRunOutcome::Started { execution_id } =
            service.execute_manually(job.id).await.unwrap()
        else {
            panic!("first run should start");
        };
        // Wait until the worker is blocked inside publish
        loop {
            let execution = service.get_execution(&execution_id).await.unwrap();
            if execution.status == ExecutionStatus::Publishing {
                break;
            }
            tokio::task::yield_now().await;
        }

        let second = service.execute_manually(job.id).await.unwrap();
        assert!(matches!(
            second,
            ManualRunOutcome::Busy {
                reason: BusyReason::JobLocked,
                ..
            }
        ));

        gate.add_permits(1);
        h.engine.dispatcher.drain().await;
        let history = service.list_executions(job.id, None).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ExecutionStatus::Published);
    }

    #[tokio::test]
    async fn test_validation_approve_publishes_edited_content() {
        let h = Harness::new();
        let service = &h.engine.jobs;
        let mut create = input(Schedule::Manual);
        create.requires_validation = true;
        let job = service.create_job(create).await.unwrap();

        let ManualRunOutcome::Started { execution_id } =
            service.execute_manually(job.id).await.unwrap()
        else {
            panic!("run should start");
        };
        h.engine.dispatcher.drain().await;
        assert_eq!(
            service.get_execution(&execution_id).await.unwrap().status,
            ExecutionStatus::PendingValidation
        );

        // Suspended runs block new runs of the same job
        assert!(matches!(
            service.execute_manually(job.id).await.unwrap(),
            ManualRunOutcome::Busy {
                reason: BusyReason::AwaitingValidation,
                ..
            }
        ));

        service
            .validate_execution(
                &execution_id,
                ValidationDecision::Approve {
                    title: Some("Edited".into()),
                    content: None,
                },
            )
            .await
            .unwrap();
        h.engine.dispatcher.drain().await;

        let execution = service.get_execution(&execution_id).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Published);
        assert_eq!(h.publisher.published()[0].1.title, "Edited");
    }

    #[tokio::test]
    async fn test_validation_reject_counts_as_failure() {
        let h = Harness::new();
        let service = &h.engine.jobs;
        let mut create = input(Schedule::Manual);
        create.requires_validation = true;
        let job = service.create_job(create).await.unwrap();

        let ManualRunOutcome::Started { execution_id } =
            service.execute_manually(job.id).await.unwrap()
        else {
            panic!("run should start");
        };
        h.engine.dispatcher.drain().await;
        advance(&h.clock, 1_000);

        let execution = service
            .validate_execution(&execution_id, ValidationDecision::Reject { reason: None })
            .await
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);

        let job = service.get_job(job.id).await.unwrap();
        assert_eq!(job.run.failed_executions, 1);
        assert_eq!(h.publisher.publish_count(), 0);

        // Second decision on a closed execution is refused
        let again = service
            .validate_execution(&execution_id, ValidationDecision::Reject { reason: None })
            .await;
        assert!(matches!(again, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_add_topics_skips_blanks_and_duplicates() {
        let h = Harness::new();
        let service = &h.engine.jobs;
        let added = service
            .add_topics(1, vec!["A".into(), " ".into(), "A".into(), "B ".into()])
            .await
            .unwrap();
        assert_eq!(added.len(), 2);

        let again = service.add_topics(1, vec!["A".into()]).await;
        assert!(matches!(again, Err(AppError::Validation(_))));
        assert_eq!(service.list_topics(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_job_is_not_found() {
        let h = Harness::new();
        assert!(matches!(
            h.engine.jobs.execute_manually(42).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            h.engine.jobs.delete_job(42).await,
            Err(AppError::NotFound(_))
        ));
    }
}
