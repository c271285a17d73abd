//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use autopost_core::application::ManualRunOutcome;
use autopost_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const THROTTLED: i32 = 4003;
    pub const BUSY: i32 = 4004;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5001;
    pub const COLLABORATOR_ERROR: i32 = 5002;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let code = match &err {
        AppError::Validation(_) | AppError::Domain(_) | AppError::Serialization(_) => {
            code::VALIDATION_ERROR
        }
        AppError::NotFound(_) => code::NOT_FOUND,
        AppError::Conflict(_) | AppError::InvalidState(_) => code::CONFLICT,
        AppError::Database(_) => code::DB_ERROR,
        AppError::Collaborator(_) => code::COLLABORATOR_ERROR,
        AppError::Io(_) | AppError::Config(_) | AppError::Internal(_) => code::INTERNAL_ERROR,
    };
    let message = match err {
        AppError::Validation(msg)
        | AppError::NotFound(msg)
        | AppError::Conflict(msg)
        | AppError::InvalidState(msg)
        | AppError::Database(msg)
        | AppError::Internal(msg) => msg,
        other => other.to_string(),
    };
    ErrorObjectOwned::owned(code, message, None::<()>)
}

pub fn throttled() -> ErrorObjectOwned {
    ErrorObjectOwned::owned(
        code::THROTTLED,
        "Rate limit exceeded. Please slow down.",
        None::<()>,
    )
}

/// A run-now that could not start; the outcome travels in `data`
pub fn busy(outcome: &ManualRunOutcome) -> ErrorObjectOwned {
    let message = match outcome {
        ManualRunOutcome::Busy { message, .. } => message.clone(),
        ManualRunOutcome::Saturated => "all workers are busy".to_string(),
        ManualRunOutcome::Started { .. } => "started".to_string(),
    };
    ErrorObjectOwned::owned(code::BUSY, message, Some(outcome))
}
