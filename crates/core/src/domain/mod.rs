// Domain Layer - Pure business logic and entities

pub mod error;
pub mod execution;
pub mod job;
pub mod schedule;
pub mod topic;

// Re-exports
pub use error::DomainError;
pub use execution::{Execution, ExecutionId, ExecutionStatus, Trigger};
pub use job::{
    CategoryId, CategoryStrategy, Job, JobId, JobStatus, PromptId, ProviderId, RunState, SiteId,
    TopicStrategy,
};
pub use schedule::{IntervalUnit, Schedule};
pub use topic::{Category, Topic, TopicId};
