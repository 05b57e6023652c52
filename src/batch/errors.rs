//! # Batch Errors

use thiserror::Error;

use crate::transfer::TransferError;

/// Result type for batch operations
pub type BatchJobResult<T> = Result<T, BatchError>;

/// Batch errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("Unknown batch job: {0}")]
    UnknownJob(String),

    #[error("Batch job already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Invalid filename pattern: {0}")]
    InvalidPattern(String),

    #[error("Could not store batch output: {0}")]
    Output(#[from] TransferError),

    #[error("Internal error: {0}")]
    Internal(String),
}
