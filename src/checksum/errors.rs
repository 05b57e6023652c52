//! # Checksum Store Errors

use thiserror::Error;

use crate::transfer::TransferError;

/// Result type for checksum store operations
pub type ChecksumResult<T> = Result<T, ChecksumError>;

/// Checksum store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChecksumError {
    #[error("No checksum recorded for {0}")]
    NotFound(String),

    /// The entry changed since the caller read it
    #[error("Checksum of {filename} is {actual}, not the expected {expected}")]
    StaleChecksum {
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("Correction of {0} refused: wrong credentials")]
    WrongCredentials(String),

    /// Filenames may not contain the separator or line breaks
    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("Malformed catalog line {line}: {content:?}")]
    MalformedCatalog { line: usize, content: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChecksumError {
    /// I/O failure with context
    pub fn io(context: impl Into<String>, error: std::io::Error) -> Self {
        ChecksumError::Io(format!("{}: {}", context.into(), error))
    }
}
