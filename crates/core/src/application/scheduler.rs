//! Scheduler - tick loop feeding the dispatcher
//!
//! Each tick evaluates every Active job, then re-offers validated executions
//! waiting for a worker, then admits the due jobs, oldest fire time first.
//! Nothing is queued: work refused this tick is simply due again on the next
//! one.
//!
//! A jittered job becomes due at `next_run_at + jitter`. The delay is drawn
//! once per slot and kept in memory only, so it never shifts the persisted
//! schedule and is drawn again after a restart.

use crate::application::engine::EnginePorts;
use crate::application::schedule::ScheduleEvaluator;
use crate::application::worker::{Admission, Dispatcher, ShutdownToken, WorkItem};
use crate::domain::{ExecutionStatus, Job, JobId, JobStatus, Trigger};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub evaluated: usize,
    pub due: usize,
    pub started: Vec<String>,
    pub resumed: Vec<String>,
    pub busy: usize,
    /// Due work left for the next tick because the pool was full
    pub deferred: usize,
    /// Slots reached but still inside their jitter delay
    pub jittered: usize,
    pub errors: usize,
}

/// Jitter drawn for one slot of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotJitter {
    slot: i64,
    delay_millis: i64,
}

pub struct Scheduler {
    ports: EnginePorts,
    dispatcher: Arc<Dispatcher>,
    evaluator: ScheduleEvaluator,
    tick_interval: Duration,
    jitter: Mutex<HashMap<JobId, SlotJitter>>,
}

impl Scheduler {
    pub fn new(
        ports: EnginePorts,
        dispatcher: Arc<Dispatcher>,
        evaluator: ScheduleEvaluator,
        tick_interval: Duration,
    ) -> Self {
        Self {
            ports,
            dispatcher,
            evaluator,
            tick_interval,
            jitter: Mutex::new(HashMap::new()),
        }
    }

    /// Run ticks until shutdown, then wait for in-flight workers
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(
            tick_ms = self.tick_interval.as_millis() as u64,
            "Scheduler started"
        );
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if shutdown.is_shutdown() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) if !report.started.is_empty() || !report.resumed.is_empty() => {
                            info!(
                                started = report.started.len(),
                                resumed = report.resumed.len(),
                                deferred = report.deferred,
                                "Tick dispatched work"
                            );
                        }
                        Ok(report) => debug!(evaluated = report.evaluated, "Tick idle"),
                        Err(e) => error!(error = %e, "Tick failed"),
                    }
                }
                _ = shutdown.wait() => {
                    info!("Scheduler interrupted");
                    break;
                }
            }
        }

        info!(
            active_workers = self.dispatcher.active_workers(),
            "Scheduler stopping, draining workers"
        );
        self.dispatcher.drain().await;
        info!("Scheduler stopped");
    }

    /// One scheduling pass
    ///
    /// Failures on a single job are logged and counted; only a failure to
    /// list jobs or executions aborts the tick.
    pub async fn tick(&self) -> Result<TickReport> {
        let mut report = TickReport::default();
        let due = self.evaluate(&mut report).await?;
        report.due = due.len();

        if !self.resume_validated(&mut report).await? {
            report.deferred += due.len();
            return Ok(report);
        }

        for (index, (_, job)) in due.iter().enumerate() {
            let item = WorkItem::Fresh {
                job: job.clone(),
                trigger: Trigger::Scheduled,
            };
            match self.dispatcher.admit(item).await {
                Ok(Admission::Started(id)) => report.started.push(id),
                Ok(Admission::Busy(reason)) => {
                    debug!(job_id = job.id, reason = %reason, "Due job busy");
                    report.busy += 1;
                }
                Ok(Admission::Saturated) => {
                    report.deferred += report.due - index;
                    debug!(deferred = report.deferred, "Worker pool saturated");
                    break;
                }
                Err(e) => {
                    warn!(job_id = job.id, error = %e, "Admission failed");
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Evaluate every Active job, persist moved fire times, return the due
    /// ones sorted by fire time
    async fn evaluate(&self, report: &mut TickReport) -> Result<Vec<(i64, Job)>> {
        let now = self.ports.time.now_millis();
        let jobs = self.ports.jobs.find_by_status(JobStatus::Active).await?;
        let previous = self.jitter_state().clone();
        let mut jitter = HashMap::new();
        let mut due: Vec<(i64, Job)> = Vec::new();

        for job in jobs {
            report.evaluated += 1;
            let evaluation = self.evaluator.evaluate_job(&job, now);

            if evaluation.next_run_at != job.run.next_run_at {
                if let Err(e) = self
                    .ports
                    .jobs
                    .set_next_run_at(job.id, evaluation.next_run_at)
                    .await
                {
                    warn!(job_id = job.id, error = %e, "Could not persist next run time");
                    report.errors += 1;
                }
            }
            if !evaluation.due {
                continue;
            }

            let fire_at = evaluation.next_run_at.unwrap_or(now);
            let window = job.jitter_window_millis();
            if window > 0 {
                let drawn = match previous.get(&job.id) {
                    Some(kept) if kept.slot == fire_at => *kept,
                    _ => SlotJitter {
                        slot: fire_at,
                        delay_millis: self.ports.random.jitter_ms(window),
                    },
                };
                jitter.insert(job.id, drawn);
                if now < fire_at + drawn.delay_millis {
                    debug!(
                        job_id = job.id,
                        fire_at = fire_at + drawn.delay_millis,
                        "Due slot waiting out its jitter"
                    );
                    report.jittered += 1;
                    continue;
                }
            }
            due.push((fire_at, job));
        }

        *self.jitter_state() = jitter;
        due.sort_by_key(|(fire_at, job)| (*fire_at, job.id));
        Ok(due)
    }

    /// Offer Validated executions to the pool; false when the pool filled up
    async fn resume_validated(&self, report: &mut TickReport) -> Result<bool> {
        let validated = self
            .ports
            .executions
            .find_by_status(ExecutionStatus::Validated)
            .await?;

        for execution in validated {
            let job = match self.ports.jobs.find_by_id(execution.job_id).await {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(e) => {
                    warn!(execution_id = %execution.id, error = %e, "Could not load job");
                    report.errors += 1;
                    continue;
                }
            };
            match self
                .dispatcher
                .admit(WorkItem::ResumeValidated { job, execution })
                .await
            {
                Ok(Admission::Started(id)) => report.resumed.push(id),
                Ok(Admission::Busy(_)) => report.busy += 1,
                Ok(Admission::Saturated) => {
                    report.deferred += 1;
                    return Ok(false);
                }
                Err(e) => {
                    warn!(error = %e, "Resume admission failed");
                    report.errors += 1;
                }
            }
        }
        Ok(true)
    }

    fn jitter_state(&self) -> MutexGuard<'_, HashMap<JobId, SlotJitter>> {
        self.jitter.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::EngineConfig;
    use crate::application::engine::test_support::{fast_config, Harness};
    use crate::application::job_service::ManualRunOutcome;
    use crate::application::worker::shutdown_channel;
    use crate::domain::{Execution, IntervalUnit, Schedule};
    use crate::port::content_generator::mocks::MockContentGenerator;
    use crate::port::site_publisher::mocks::MockSitePublisher;
    use crate::port::{ExecutionRepository, FixedRandom, JobRepository, TimeProvider};
    use tokio::sync::Semaphore;

    const MINUTE: i64 = 60_000;
    const HOUR: i64 = 60 * MINUTE;

    async fn insert(h: &Harness, mut job: Job) -> Job {
        job.created_at = h.clock.now_millis();
        let id = h.jobs.insert(&job).await.unwrap();
        h.jobs.find_by_id(id).await.unwrap().unwrap()
    }

    fn hourly() -> Schedule {
        Schedule::Interval {
            value: 1,
            unit: IntervalUnit::Hours,
            start_at: None,
        }
    }

    #[tokio::test]
    async fn test_tick_runs_due_job_once() {
        let h = Harness::new();
        let job = insert(&h, Job::new_test(1, hourly())).await;
        let scheduler = &h.engine.scheduler;

        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.due, 1);
        assert_eq!(report.started.len(), 1);
        h.engine.dispatcher.drain().await;

        // Same instant: not due again
        let report = scheduler.tick().await.unwrap();
        assert_eq!(report.due, 0);
        let job = h.jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(job.run.total_executions, 1);
        assert_eq!(job.run.next_run_at, Some(job.run.last_run_at.unwrap() + HOUR));
    }

    #[tokio::test]
    async fn test_outage_produces_single_catch_up() {
        let h = Harness::new();
        let job = insert(&h, Job::new_test(1, hourly())).await;
        let scheduler = &h.engine.scheduler;

        scheduler.tick().await.unwrap();
        h.engine.dispatcher.drain().await;

        h.clock.advance(3 * HOUR + 60_000);
        for _ in 0..3 {
            scheduler.tick().await.unwrap();
            h.engine.dispatcher.drain().await;
        }
        let job = h.jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(job.run.total_executions, 2);
    }

    #[tokio::test]
    async fn test_paused_jobs_are_skipped() {
        let h = Harness::new();
        let mut job = Job::new_test(1, hourly());
        job.status = JobStatus::Paused;
        insert(&h, job).await;

        let report = h.engine.scheduler.tick().await.unwrap();
        assert_eq!(report.evaluated, 0);
        assert!(h.executions.all().is_empty());
    }

    #[tokio::test]
    async fn test_saturated_pool_defers_remaining_due_jobs() {
        let gate = Arc::new(Semaphore::new(0));
        let config = EngineConfig {
            max_concurrent_executions: 2,
            ..fast_config()
        };
        let h = Harness::with(
            MockContentGenerator::new_success().gated(gate.clone()),
            MockSitePublisher::new(),
            config,
        );
        for site in 1..=3 {
            insert(&h, Job::new_test(site, hourly())).await;
        }

        let report = h.engine.scheduler.tick().await.unwrap();
        assert_eq!(report.started.len(), 2);
        assert_eq!(report.deferred, 1);

        gate.add_permits(2);
        h.engine.dispatcher.drain().await;

        let report = h.engine.scheduler.tick().await.unwrap();
        assert_eq!(report.started.len(), 1);
        gate.add_permits(1);
        h.engine.dispatcher.drain().await;
        assert_eq!(h.executions.all().len(), 3);
    }

    #[tokio::test]
    async fn test_next_run_at_is_persisted_for_waiting_jobs() {
        let h = Harness::new();
        let start = h.clock.now_millis() + 2 * HOUR;
        let job = insert(
            &h,
            Job::new_test(
                1,
                Schedule::Interval {
                    value: 1,
                    unit: IntervalUnit::Hours,
                    start_at: Some(start),
                },
            ),
        )
        .await;

        let report = h.engine.scheduler.tick().await.unwrap();
        assert_eq!(report.due, 0);
        let job = h.jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(job.run.next_run_at, Some(start));
    }

    fn jittered_harness(delay_millis: i64) -> Harness {
        let config = EngineConfig {
            max_concurrent_executions: 1,
            ..fast_config()
        };
        Harness::with_random(
            MockContentGenerator::new_success(),
            MockSitePublisher::new(),
            config,
            FixedRandom::new(delay_millis),
        )
    }

    fn jittered(site_id: i64, minutes: u32) -> Job {
        let mut job = Job::new_test(site_id, hourly());
        job.jitter_enabled = true;
        job.jitter_minutes = minutes;
        job
    }

    #[tokio::test]
    async fn test_jittered_job_waits_without_holding_a_worker() {
        let h = jittered_harness(30 * MINUTE);
        let job = insert(&h, jittered(1, 60)).await;
        let other = insert(&h, Job::new_test(2, Schedule::Manual)).await;
        let slot = h.clock.now_millis();

        let report = h.engine.scheduler.tick().await.unwrap();
        assert_eq!(report.jittered, 1);
        assert_eq!(report.due, 0);
        assert!(report.started.is_empty());
        assert_eq!(h.engine.dispatcher.active_workers(), 0);

        // The single slot is free for unrelated work meanwhile
        assert!(matches!(
            h.engine.jobs.execute_manually(other.id).await.unwrap(),
            ManualRunOutcome::Started { .. }
        ));
        h.engine.dispatcher.drain().await;

        h.clock.advance(29 * MINUTE);
        assert_eq!(h.engine.scheduler.tick().await.unwrap().jittered, 1);
        let stored = h.jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.run.next_run_at, Some(slot));

        h.clock.advance(MINUTE);
        let report = h.engine.scheduler.tick().await.unwrap();
        assert_eq!(report.started.len(), 1);
        h.engine.dispatcher.drain().await;
    }

    #[tokio::test]
    async fn test_jitter_is_drawn_once_per_slot_and_not_persisted() {
        let h = jittered_harness(10 * MINUTE);
        let job = insert(&h, jittered(1, 15)).await;

        for _ in 0..3 {
            h.engine.scheduler.tick().await.unwrap();
            h.clock.advance(2 * MINUTE);
        }
        assert_eq!(h.random.jitter_draws(), 1);

        h.clock.advance(5 * MINUTE);
        assert_eq!(h.engine.scheduler.tick().await.unwrap().started.len(), 1);
        h.engine.dispatcher.drain().await;

        // The next slot counts from the actual fire, with no delay baked in
        let stored = h.jobs.find_by_id(job.id).await.unwrap().unwrap();
        let fired = stored.run.last_run_at.unwrap();
        assert_eq!(stored.run.next_run_at, Some(fired + HOUR));

        h.clock.advance(HOUR);
        let report = h.engine.scheduler.tick().await.unwrap();
        assert_eq!(report.jittered, 1);
        assert_eq!(h.random.jitter_draws(), 2);
        let stored = h.jobs.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.run.next_run_at, Some(fired + HOUR));
    }

    #[tokio::test]
    async fn test_saturated_resume_still_evaluates_jobs() {
        let gate = Arc::new(Semaphore::new(0));
        let config = EngineConfig {
            max_concurrent_executions: 1,
            ..fast_config()
        };
        let h = Harness::with(
            MockContentGenerator::new_success().gated(gate.clone()),
            MockSitePublisher::new(),
            config,
        );
        let now = h.clock.now_millis();

        // Occupy the only worker
        let busy = insert(&h, Job::new_test(1, Schedule::Manual)).await;
        h.engine.jobs.execute_manually(busy.id).await.unwrap();

        let reviewed = insert(&h, Job::new_test(2, Schedule::Manual)).await;
        let mut approved = Execution::new("approved", &reviewed, Trigger::Manual, now);
        approved.transition(ExecutionStatus::Generating, now).unwrap();
        approved.transition(ExecutionStatus::Validated, now).unwrap();
        h.executions.insert(&approved).await.unwrap();

        let start = now + 2 * HOUR;
        let waiting = insert(
            &h,
            Job::new_test(
                3,
                Schedule::Interval {
                    value: 1,
                    unit: IntervalUnit::Hours,
                    start_at: Some(start),
                },
            ),
        )
        .await;

        let report = h.engine.scheduler.tick().await.unwrap();
        assert_eq!(report.evaluated, 3);
        assert!(report.resumed.is_empty());
        assert_eq!(report.deferred, 1);
        let stored = h.jobs.find_by_id(waiting.id).await.unwrap().unwrap();
        assert_eq!(stored.run.next_run_at, Some(start));

        gate.add_permits(2);
        h.engine.dispatcher.drain().await;
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = Harness::new();
        let (tx, token) = shutdown_channel();
        let scheduler = Arc::clone(&h.engine.scheduler);
        let handle = tokio::spawn(async move { scheduler.run(token).await });
        tx.shutdown();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
