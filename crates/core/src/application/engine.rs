// Engine wiring: one place that assembles the application services

use crate::application::config::EngineConfig;
use crate::application::executor::JobExecutor;
use crate::application::job_service::JobService;
use crate::application::recovery::RecoveryService;
use crate::application::schedule::ScheduleEvaluator;
use crate::application::scheduler::Scheduler;
use crate::application::worker::Dispatcher;
use crate::error::Result;
use crate::port::{
    ContentGenerator, ExecutionLock, ExecutionRepository, IdProvider, JobRepository, RandomSource,
    SitePublisher, TimeProvider, TopicRepository,
};
use std::sync::Arc;

/// Every adapter the engine talks to
#[derive(Clone)]
pub struct EnginePorts {
    pub jobs: Arc<dyn JobRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
    pub topics: Arc<dyn TopicRepository>,
    pub lock: Arc<dyn ExecutionLock>,
    pub generator: Arc<dyn ContentGenerator>,
    pub publisher: Arc<dyn SitePublisher>,
    pub time: Arc<dyn TimeProvider>,
    pub ids: Arc<dyn IdProvider>,
    pub random: Arc<dyn RandomSource>,
}

/// Assembled engine services sharing one worker pool
pub struct Engine {
    pub executor: Arc<JobExecutor>,
    pub dispatcher: Arc<Dispatcher>,
    pub scheduler: Arc<Scheduler>,
    pub jobs: Arc<JobService>,
    pub recovery: RecoveryService,
}

impl Engine {
    pub fn new(ports: EnginePorts, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let evaluator = ScheduleEvaluator::new(config.utc_offset_minutes)?;

        let executor = Arc::new(JobExecutor::new(ports.clone(), &config, evaluator));
        let dispatcher = Arc::new(Dispatcher::new(
            ports.clone(),
            Arc::clone(&executor),
            &config,
        ));
        let scheduler = Arc::new(Scheduler::new(
            ports.clone(),
            Arc::clone(&dispatcher),
            evaluator,
            config.tick_interval,
        ));
        let jobs = Arc::new(JobService::new(
            ports.clone(),
            Arc::clone(&dispatcher),
            Arc::clone(&executor),
            evaluator,
        ));
        let recovery = RecoveryService::new(ports, Arc::clone(&executor));

        Ok(Self {
            executor,
            dispatcher,
            scheduler,
            jobs,
            recovery,
        })
    }
}
