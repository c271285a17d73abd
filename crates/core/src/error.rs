// Engine-wide error type

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Illegal state transition or unparsable stored value
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// Rejected input; never reaches the scheduler
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation not allowed in the current job or execution state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The AI gateway or site gateway failed
    #[error("Collaborator error: {0}")]
    Collaborator(#[from] crate::port::CollaboratorError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn job_not_found(id: i64) -> Self {
        AppError::NotFound(format!("Job {} not found", id))
    }

    pub fn execution_not_found(id: &str) -> Self {
        AppError::NotFound(format!("Execution {} not found", id))
    }
}
