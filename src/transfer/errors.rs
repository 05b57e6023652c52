//! # File Transfer Errors

use thiserror::Error;

/// Result type for file transfer operations
pub type TransferResult<T> = Result<T, TransferError>;

/// File transfer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    /// Nothing is stored under this reference (never produced, or disposed)
    #[error("File not found: {0}")]
    NotFound(String),

    /// Invalid file name
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    IoError(String),
}
