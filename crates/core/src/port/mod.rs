// Port Layer - Interfaces for external dependencies

pub mod collaborator;
pub mod content_generator;
pub mod execution_lock;
pub mod execution_repository;
pub mod id_provider; // For deterministic testing
pub mod job_repository;
pub mod maintenance;
pub mod random;
pub mod site_publisher;
pub mod time_provider;
pub mod topic_repository;

// Re-exports
pub use collaborator::CollaboratorError;
pub use content_generator::{ContentGenerator, GeneratedContent, GenerationRequest};
pub use execution_lock::{BusyReason, ExecutionLock, InMemoryExecutionLock, LeaseToken, LockOutcome};
pub use execution_repository::ExecutionRepository;
pub use id_provider::{IdProvider, SequentialIdProvider, UuidProvider};
pub use job_repository::{JobRepository, RunRecord};
pub use maintenance::{HistoryMaintenance, HistoryStats, RetentionConfig};
pub use random::{FixedRandom, RandomSource, ThreadRandom};
pub use site_publisher::{PublishRequest, PublishedPost, SiteHealth, SitePublisher};
pub use time_provider::{SimulatedTimeProvider, SystemTimeProvider, TimeProvider};
pub use topic_repository::TopicRepository;
