//! # Transport Errors

use thiserror::Error;

/// Result type for broker operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Broker-level failures. All of them are transient from the point of view
/// of the connection layer, which retries them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The broker could not be reached
    #[error("Broker unreachable: {0}")]
    Unreachable(String),

    /// The session was invalidated by the broker
    #[error("Connection lost")]
    ConnectionLost,

    /// The broker refused the operation
    #[error("Broker rejected operation: {0}")]
    Rejected(String),

    /// Internal broker failure
    #[error("Internal transport error: {0}")]
    Internal(String),
}

impl TransportError {
    /// Whether the session must be re-established before retrying.
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, TransportError::ConnectionLost)
    }
}
