//! # Connection Errors

use thiserror::Error;

use crate::channels::ChannelError;
use crate::protocol::ProtocolError;
use crate::transport::TransportError;

/// Result type for connection operations
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Connection errors
///
/// `Transport` is the only transient variant: it is retried and never
/// escapes a retried operation. Exhaustion turns it into `Exhausted`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// Retries ran out
    #[error("{operation} failed after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: usize,
        last: TransportError,
    },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No reply to {message_id} within {timeout_ms}ms")]
    Timeout { message_id: String, timeout_ms: u64 },

    #[error("Connection closed")]
    Closed,

    #[error("Unknown listener {listener} on {channel}")]
    UnknownListener { channel: String, listener: u64 },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectionError {
    /// Worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, ConnectionError::Transport(_))
    }

    /// Retries are exhausted or the connection is gone.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConnectionError::Exhausted { .. } | ConnectionError::Closed
        )
    }
}

impl From<TransportError> for ConnectionError {
    fn from(error: TransportError) -> Self {
        ConnectionError::Transport(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let transient = ConnectionError::from(TransportError::ConnectionLost);
        assert!(transient.is_transient());
        assert!(!transient.is_fatal());

        let exhausted = ConnectionError::Exhausted {
            operation: "send".into(),
            attempts: 3,
            last: TransportError::ConnectionLost,
        };
        assert!(exhausted.is_fatal());
        assert!(!exhausted.is_transient());
        assert_eq!(exhausted.to_string(), "send failed after 3 attempts: Connection lost");

        assert!(!ConnectionError::PermissionDenied("x".into()).is_fatal());
        assert!(ConnectionError::Closed.is_fatal());
    }
}
