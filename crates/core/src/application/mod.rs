// Application Layer - scheduling, execution and the service surface

pub mod config;
pub mod engine;
pub mod executor;
pub mod job_service;
pub mod maintenance;
pub mod recovery;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod validation;
pub mod worker;

// Re-exports
pub use config::EngineConfig;
pub use engine::{Engine, EnginePorts};
pub use executor::{JobExecutor, RunOutcome};
pub use job_service::{
    JobCreateInput, JobService, JobUpdateInput, ManualRunOutcome, ValidationDecision,
};
pub use maintenance::RetentionScheduler;
pub use recovery::{RecoveryReport, RecoveryService};
pub use retry::{RetryDecision, RetryPolicy};
pub use schedule::{Evaluation, EvaluationReason, ScheduleEvaluator};
pub use scheduler::{Scheduler, TickReport};
pub use validation::{validate_job, validate_schedule};
pub use worker::{
    shutdown_channel, Admission, Dispatcher, ShutdownSender, ShutdownToken, WorkItem,
};
