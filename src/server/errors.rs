//! # Replica Server Errors

use thiserror::Error;

use crate::channels::ChannelError;
use crate::connection::ConnectionError;

/// Result type for server lifecycle operations
pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    #[error("A server for replica {0} is already running")]
    AlreadyRunning(String),

    #[error("No server running for replica {0}")]
    NotRunning(String),

    #[error("Could not reload replica {replica}: {reason}")]
    Reload { replica: String, reason: String },

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}
