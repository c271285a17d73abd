// Autopost Infrastructure - SQLite Adapter
// Implements: JobRepository, ExecutionRepository, TopicRepository, ExecutionLock, HistoryMaintenance

mod connection;
mod error;
mod execution_repository;
mod job_repository;
mod lease;
mod maintenance_impl;
mod migration;
mod topic_repository;

pub use connection::create_pool;
pub use execution_repository::SqliteExecutionRepository;
pub use job_repository::SqliteJobRepository;
pub use lease::SqliteExecutionLock;
pub use maintenance_impl::SqliteMaintenance;
pub use migration::run_migrations;
pub use topic_repository::SqliteTopicRepository;
