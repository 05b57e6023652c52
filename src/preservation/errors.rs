//! # Preservation Errors

use thiserror::Error;

use crate::checksum::ChecksumError;
use crate::client::ClientError;
use crate::transfer::TransferError;

/// Result type for reconciliation operations
pub type PreservationResult<T> = Result<T, PreservationError>;

/// Reconciliation and repair errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreservationError {
    /// The admin authority has no record of the file
    #[error("File {0} is unknown to the admin authority")]
    UnknownFile(String),

    /// No other replica could provide a copy matching the expected checksum
    #[error("No intact copy of {filename} available for replica {replica}")]
    NoSource { filename: String, replica: String },

    #[error("Copy of {filename} from replica {replica} has checksum {actual}, expected {expected}")]
    CorruptCopy {
        filename: String,
        replica: String,
        expected: String,
        actual: String,
    },

    #[error("Reply from replica {0} carried no output")]
    MissingOutput(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Unreadable listing: {0}")]
    Listing(#[from] ChecksumError),
}

impl PreservationError {
    /// Failures of the messaging layer itself
    pub fn is_fatal(&self) -> bool {
        matches!(self, PreservationError::Client(e) if e.is_fatal())
    }
}
