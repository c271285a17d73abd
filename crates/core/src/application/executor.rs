//! Job executor
//!
//! Drives one execution through `Pending → Generating → (PendingValidation)
//! → Validated → Publishing → Published`, failing it on the first step that
//! cannot complete. The executor works on a job snapshot taken at admission,
//! but books the outcome against the job as it is stored when the run ends.

use crate::application::config::EngineConfig;
use crate::application::engine::EnginePorts;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::application::schedule::ScheduleEvaluator;
use crate::domain::{
    CategoryStrategy, Execution, ExecutionStatus, Job, Schedule, TopicStrategy, Trigger,
};
use crate::error::{AppError, Result};
use crate::port::{
    CollaboratorError, GenerationRequest, PublishRequest, RunRecord, SiteHealth, TimeProvider,
};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// How a call to the executor ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Published,
    Failed,
    /// Suspended in PendingValidation
    AwaitingValidation,
    /// The execution was reclaimed or its job deleted; nothing recorded
    Discarded,
}

/// Where the pipeline stopped
enum Progress {
    /// Execution reached Published or Failed (not yet persisted)
    Finished,
    Suspended,
    Discarded,
}

pub struct JobExecutor {
    ports: EnginePorts,
    evaluator: ScheduleEvaluator,
    generation_retry: RetryPolicy,
    publish_retry: RetryPolicy,
    generation_timeout: Duration,
    publish_timeout: Duration,
    check_site_health: bool,
    failure_threshold: u32,
}

impl JobExecutor {
    pub fn new(ports: EnginePorts, config: &EngineConfig, evaluator: ScheduleEvaluator) -> Self {
        Self {
            ports,
            evaluator,
            generation_retry: RetryPolicy::for_generation(
                config.retry_base_delay,
                config.generation_max_attempts,
            ),
            publish_retry: RetryPolicy::for_publishing(
                config.retry_base_delay,
                config.publish_max_attempts,
            ),
            generation_timeout: config.generation_timeout,
            publish_timeout: config.publish_timeout,
            check_site_health: config.check_site_health,
            failure_threshold: config.consecutive_failure_threshold,
        }
    }

    fn now(&self) -> i64 {
        self.ports.time.now_millis()
    }

    /// Run a freshly admitted Pending execution
    pub async fn run(&self, job: &Job, mut execution: Execution) -> Result<RunOutcome> {
        info!(
            job_id = job.id,
            execution_id = %execution.id,
            site_id = job.site_id,
            trigger = %execution.trigger,
            "Execution started"
        );
        let progress = self.drive(job, &mut execution).await;
        self.settle(execution, progress).await
    }

    /// Continue a Validated execution from the publishing step
    pub async fn resume(&self, job: &Job, mut execution: Execution) -> Result<RunOutcome> {
        if execution.status != ExecutionStatus::Validated {
            return Err(AppError::InvalidState(format!(
                "execution {} is {}, expected VALIDATED",
                execution.id, execution.status
            )));
        }
        info!(job_id = job.id, execution_id = %execution.id, "Resuming validated execution");
        let progress = self.publish(job, &mut execution).await;
        self.settle(execution, progress).await
    }

    /// Fail a non-terminal execution and book it against its job
    pub async fn abort(&self, mut execution: Execution, reason: &str) -> Result<RunOutcome> {
        if !execution.status.is_terminal() {
            execution.fail(reason, self.now())?;
        }
        warn!(execution_id = %execution.id, job_id = execution.job_id, reason, "Execution aborted");
        self.complete(execution).await
    }

    /// Persist a terminal execution and apply it to the job's run state
    pub async fn complete(&self, execution: Execution) -> Result<RunOutcome> {
        if !self.ports.executions.update(&execution).await? {
            info!(
                execution_id = %execution.id,
                "Execution already closed or removed, dropping result"
            );
            return Ok(RunOutcome::Discarded);
        }
        let outcome = if execution.status == ExecutionStatus::Published {
            RunOutcome::Published
        } else {
            RunOutcome::Failed
        };
        self.record(&execution).await?;
        Ok(outcome)
    }

    async fn settle(&self, mut execution: Execution, progress: Result<Progress>) -> Result<RunOutcome> {
        match progress {
            Ok(Progress::Finished) => self.complete(execution).await,
            Ok(Progress::Suspended) => {
                info!(execution_id = %execution.id, "Execution awaiting validation");
                Ok(RunOutcome::AwaitingValidation)
            }
            Ok(Progress::Discarded) => {
                info!(execution_id = %execution.id, "Execution reclaimed, dropping late result");
                Ok(RunOutcome::Discarded)
            }
            Err(e) => {
                error!(execution_id = %execution.id, error = %e, "Execution step failed");
                if !execution.status.is_terminal() {
                    execution.fail(e.to_string(), self.now())?;
                }
                self.complete(execution).await
            }
        }
    }

    async fn record(&self, execution: &Execution) -> Result<()> {
        let Some(job) = self.ports.jobs.find_by_id(execution.job_id).await? else {
            info!(
                job_id = execution.job_id,
                execution_id = %execution.id,
                "Job deleted during execution, result dropped"
            );
            return Ok(());
        };

        let run_at = execution.run_at();
        let mut after_run = job.clone();
        after_run.run.last_run_at = Some(run_at);
        let next_run_at = self.evaluator.evaluate_job(&after_run, self.now()).next_run_at;

        let record = RunRecord {
            run_at,
            succeeded: execution.status == ExecutionStatus::Published,
            next_run_at,
            complete_once: consumes_once(&job.schedule, execution.trigger, run_at),
            failure_threshold: self.failure_threshold,
        };

        match self.ports.jobs.record_run(job.id, &record).await? {
            Some(updated) => {
                if updated.status != job.status {
                    warn!(
                        job_id = job.id,
                        from = %job.status,
                        to = %updated.status,
                        consecutive_failures = updated.run.consecutive_failures,
                        "Job status changed after run"
                    );
                }
                info!(
                    job_id = job.id,
                    execution_id = %execution.id,
                    status = %execution.status,
                    next_run_at = ?updated.run.next_run_at,
                    "Execution recorded"
                );
            }
            None => info!(job_id = job.id, "Job deleted before recording, result dropped"),
        }
        Ok(())
    }

    /// Conditional write; false means the row was reclaimed or deleted
    async fn save(&self, execution: &Execution) -> Result<bool> {
        self.ports.executions.update(execution).await
    }

    async fn drive(&self, job: &Job, execution: &mut Execution) -> Result<Progress> {
        // Pending: resolve inputs
        let topic = match self.resolve_topic(job, execution).await? {
            Ok(topic) => topic,
            Err(reason) => {
                execution.fail(reason, self.now())?;
                return Ok(Progress::Finished);
            }
        };
        if let Err(reason) = self.resolve_category(job, execution).await? {
            execution.fail(reason, self.now())?;
            return Ok(Progress::Finished);
        }

        if self.check_site_health {
            if let Err(reason) = self.health_gate(job).await {
                execution.fail(reason, self.now())?;
                return Ok(Progress::Finished);
            }
        }

        // Generating
        execution.transition(ExecutionStatus::Generating, self.now())?;
        if !self.save(execution).await? {
            return Ok(Progress::Discarded);
        }

        let request = GenerationRequest {
            provider_id: job.provider_id,
            prompt_id: job.prompt_id,
            placeholders: placeholders_for(job, execution),
            variation: topic.variation,
        };
        if let Err(reason) = self.generate(&request, execution).await {
            execution.fail(reason, self.now())?;
            return Ok(Progress::Finished);
        }

        if job.requires_validation {
            execution.transition(ExecutionStatus::PendingValidation, self.now())?;
            return Ok(if self.save(execution).await? {
                Progress::Suspended
            } else {
                Progress::Discarded
            });
        }
        execution.transition(ExecutionStatus::Validated, self.now())?;

        self.publish(job, execution).await
    }

    async fn publish(&self, job: &Job, execution: &mut Execution) -> Result<Progress> {
        execution.transition(ExecutionStatus::Publishing, self.now())?;
        if !self.save(execution).await? {
            return Ok(Progress::Discarded);
        }

        let post = PublishRequest {
            title: execution.title.clone().unwrap_or_default(),
            content: execution.content.clone().unwrap_or_default(),
            category_id: execution.category_id,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            execution.publish_attempts = attempt as i32;
            let result = with_timeout(
                self.publish_timeout,
                self.ports.publisher.publish(job.site_id, &post),
            )
            .await;

            match result {
                Ok(published) => {
                    info!(
                        execution_id = %execution.id,
                        site_id = job.site_id,
                        url = %published.url,
                        attempt,
                        "Published"
                    );
                    execution.published_url = Some(published.url);
                    execution.transition(ExecutionStatus::Published, self.now())?;
                    return Ok(Progress::Finished);
                }
                Err(e) => {
                    warn!(execution_id = %execution.id, attempt, error = %e, "Publish failed");
                    match self.publish_retry.should_retry(attempt, &e, &execution.id) {
                        RetryDecision::Retry(delay) => sleep(delay).await,
                        RetryDecision::Failed => {
                            execution.fail(
                                format!("publishing failed after {} attempt(s): {}", attempt, e),
                                self.now(),
                            )?;
                            return Ok(Progress::Finished);
                        }
                    }
                }
            }
        }
    }

    /// Call the generator with bounded retries; Err carries the failure reason
    async fn generate(
        &self,
        request: &GenerationRequest,
        execution: &mut Execution,
    ) -> std::result::Result<(), String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            execution.generation_attempts = attempt as i32;
            let result = with_timeout(
                self.generation_timeout,
                self.ports.generator.generate(request),
            )
            .await;

            match result {
                Ok(content) => {
                    debug!(
                        execution_id = %execution.id,
                        attempt,
                        tokens_used = ?content.tokens_used,
                        "Content generated"
                    );
                    execution.title = Some(content.title);
                    execution.content = Some(content.content);
                    execution.tokens_used = content.tokens_used;
                    return Ok(());
                }
                Err(e) => {
                    warn!(execution_id = %execution.id, attempt, error = %e, "Generation failed");
                    match self.generation_retry.should_retry(attempt, &e, &execution.id) {
                        RetryDecision::Retry(delay) => sleep(delay).await,
                        RetryDecision::Failed => {
                            return Err(format!(
                                "generation failed after {} attempt(s): {}",
                                attempt, e
                            ))
                        }
                    }
                }
            }
        }
    }

    async fn health_gate(&self, job: &Job) -> std::result::Result<(), String> {
        match with_timeout(
            self.publish_timeout,
            self.ports.publisher.check_health(job.site_id),
        )
        .await
        {
            Ok(SiteHealth::Down) => Err(format!("site {} is down", job.site_id)),
            Ok(SiteHealth::Degraded) => {
                warn!(site_id = job.site_id, "Site degraded, continuing");
                Ok(())
            }
            Ok(SiteHealth::Healthy) => Ok(()),
            Err(e) => {
                warn!(site_id = job.site_id, error = %e, "Health check failed, continuing");
                Ok(())
            }
        }
    }

    async fn resolve_topic(
        &self,
        job: &Job,
        execution: &mut Execution,
    ) -> Result<std::result::Result<ResolvedTopic, String>> {
        let Some(strategy) = job.topic_strategy else {
            return Ok(Ok(ResolvedTopic::default()));
        };
        let topics = &self.ports.topics;

        let topic = match strategy {
            TopicStrategy::Unique => match topics.claim_unused(job.site_id).await? {
                Some(topic) => topic,
                None => {
                    return Ok(Err(format!(
                        "no unused topics left for site {}",
                        job.site_id
                    )))
                }
            },
            TopicStrategy::Random => {
                let pool = topics.list_for_site(job.site_id).await?;
                if pool.is_empty() {
                    return Ok(Err(format!("site {} has no topics", job.site_id)));
                }
                let topic = pool[self.ports.random.pick(pool.len())].clone();
                topics.mark_used(topic.id).await?;
                topic
            }
            TopicStrategy::ReuseWithVariation => {
                let pool = topics.list_for_site(job.site_id).await?;
                let Some(topic) = pool.into_iter().min_by_key(|t| (t.used_count, t.id)) else {
                    return Ok(Err(format!("site {} has no topics", job.site_id)));
                };
                topics.mark_used(topic.id).await?;
                topic
            }
        };

        debug!(
            execution_id = %execution.id,
            topic_id = topic.id,
            strategy = strategy.as_str(),
            "Topic resolved"
        );
        let variation = strategy == TopicStrategy::ReuseWithVariation && topic.used_count > 0;
        execution.topic_id = Some(topic.id);
        execution.topic_title = Some(topic.title);
        Ok(Ok(ResolvedTopic { variation }))
    }

    async fn resolve_category(
        &self,
        job: &Job,
        execution: &mut Execution,
    ) -> Result<std::result::Result<(), String>> {
        let Some(strategy) = job.category_strategy else {
            return Ok(Ok(()));
        };

        let category_id = match strategy {
            CategoryStrategy::RoundRobin => {
                let modulus = job.category_ids.len() as i64;
                if modulus == 0 {
                    return Ok(Err("round-robin strategy without categories".into()));
                }
                match self.ports.jobs.advance_category_index(job.id, modulus).await? {
                    Some(index) => job.category_ids[index],
                    None => return Ok(Err(format!("job {} no longer exists", job.id))),
                }
            }
            CategoryStrategy::Random => {
                if job.category_ids.is_empty() {
                    return Ok(Err("random strategy without categories".into()));
                }
                job.category_ids[self.ports.random.pick(job.category_ids.len())]
            }
            CategoryStrategy::RandomAll => {
                let categories = match with_timeout(
                    self.publish_timeout,
                    self.ports.publisher.list_categories(job.site_id),
                )
                .await
                {
                    Ok(categories) => categories,
                    Err(e) => return Ok(Err(format!("listing site categories failed: {}", e))),
                };
                if categories.is_empty() {
                    return Ok(Err(format!("site {} has no categories", job.site_id)));
                }
                let category = &categories[self.ports.random.pick(categories.len())];
                execution.category_id = Some(category.id);
                execution.category_name = Some(category.name.clone());
                return Ok(Ok(()));
            }
        };

        execution.category_id = Some(category_id);
        execution.category_name = self.category_name(job, category_id).await;
        debug!(
            execution_id = %execution.id,
            category_id,
            strategy = strategy.as_str(),
            "Category resolved"
        );
        Ok(Ok(()))
    }

    /// Best-effort name lookup for the `category` placeholder
    async fn category_name(&self, job: &Job, category_id: i64) -> Option<String> {
        match with_timeout(
            self.publish_timeout,
            self.ports.publisher.list_categories(job.site_id),
        )
        .await
        {
            Ok(categories) => categories
                .into_iter()
                .find(|c| c.id == category_id)
                .map(|c| c.name),
            Err(e) => {
                debug!(site_id = job.site_id, error = %e, "Category lookup failed");
                None
            }
        }
    }
}

#[derive(Debug, Default)]
struct ResolvedTopic {
    variation: bool,
}

/// User placeholders plus `title`, `topic` and `category` when not set by the user
fn placeholders_for(
    job: &Job,
    execution: &Execution,
) -> std::collections::BTreeMap<String, String> {
    let mut placeholders = job.placeholders.clone();
    if let Some(topic) = &execution.topic_title {
        placeholders
            .entry("title".to_string())
            .or_insert_with(|| topic.clone());
        placeholders
            .entry("topic".to_string())
            .or_insert_with(|| topic.clone());
    }
    let category = execution
        .category_name
        .clone()
        .or_else(|| execution.category_id.map(|id| id.to_string()));
    if let Some(category) = category {
        placeholders
            .entry("category".to_string())
            .or_insert(category);
    }
    placeholders
}

/// Does this run use up a one-shot schedule?
///
/// A manual run at or after `execute_at` counts as the fire.
fn consumes_once(schedule: &Schedule, trigger: Trigger, run_at: i64) -> bool {
    match schedule {
        Schedule::Once { execute_at } => trigger == Trigger::Scheduled || run_at >= *execute_at,
        _ => false,
    }
}

async fn with_timeout<T, F>(limit: Duration, call: F) -> std::result::Result<T, CollaboratorError>
where
    F: Future<Output = std::result::Result<T, CollaboratorError>>,
{
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout(limit.as_millis() as u64)),
    }
}
