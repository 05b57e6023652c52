//! # Channel Errors

use thiserror::Error;

/// Result type for channel resolution
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Channel registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// No replica with this id is configured
    #[error("Unknown replica: {0}")]
    UnknownReplica(String),

    /// Two replicas share an id
    #[error("Duplicate replica id: {0}")]
    DuplicateReplica(String),

    /// Replica id or environment contains characters that would make channel names ambiguous
    #[error("Invalid identifier '{0}': only A-Z and 0-9 are allowed")]
    InvalidIdentifier(String),

    /// Channel name does not follow the naming scheme
    #[error("Channel name '{0}' cannot be resolved")]
    UnresolvableChannel(String),
}
