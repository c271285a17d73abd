// Errors returned by external collaborators (AI gateway, site gateway)

use thiserror::Error;

/// Collaborator failure, classified for retry decisions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Rate limit, overload, connection reset... worth retrying
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Auth, bad request, unknown resource... retrying cannot help
    #[error("Permanent failure: {0}")]
    Permanent(String),

    #[error("Call timed out after {0}ms")]
    Timeout(u64),
}

impl CollaboratorError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Transient(_) | CollaboratorError::Timeout(_)
        )
    }
}
