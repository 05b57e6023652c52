//! # Bitarchive Errors

use thiserror::Error;

use crate::batch::BatchError;
use crate::transfer::TransferError;

/// Result type for bitarchive operations
pub type BitarchiveResult<T> = Result<T, BitarchiveError>;

/// Bitarchive errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitarchiveError {
    #[error("File not found in archive: {0}")]
    NotFound(String),

    /// Upload of a name already stored with other content
    #[error("File {filename} already archived with checksum {existing}")]
    AlreadyArchived { filename: String, existing: String },

    #[error("Removal of {0} refused: wrong credentials")]
    WrongCredentials(String),

    #[error("Checksum of {filename} is {actual}, not the expected {expected}")]
    StaleChecksum {
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("Offset {offset} beyond end of {filename} ({size} bytes)")]
    OffsetOutOfRange {
        filename: String,
        offset: u64,
        size: u64,
    },

    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BitarchiveError {
    /// I/O failure with context
    pub fn io(context: impl Into<String>, error: std::io::Error) -> Self {
        BitarchiveError::Io(format!("{}: {}", context.into(), error))
    }
}
