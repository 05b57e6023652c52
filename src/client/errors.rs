//! # Replica Client Errors

use thiserror::Error;

use crate::channels::{ChannelError, ReplicaType};
use crate::connection::ConnectionError;
use crate::protocol::{MessageKind, ProtocolError};
use crate::transfer::TransferError;

/// Result type for replica client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Replica client errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Refused locally by the capability matrix; nothing was sent
    #[error("{kind} is not permitted on {replica_type} replica {replica}")]
    NotPermitted {
        kind: MessageKind,
        replica_type: ReplicaType,
        replica: String,
    },

    /// The replica answered with a failed reply
    #[error("{kind} rejected by replica {replica}: {reason}")]
    Rejected {
        kind: MessageKind,
        replica: String,
        reason: String,
    },

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Transport exhaustion or a closed connection
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Connection(e) if e.is_fatal())
    }
}
