//! # Protocol Errors

use thiserror::Error;

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Protocol errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame payload is not a valid envelope
    #[error("Undecodable message: {0}")]
    Undecodable(String),

    #[error("Could not encode message: {0}")]
    Encode(String),

    /// A request was expected but a reply arrived, or the other way round
    #[error("Unexpected payload: expected {expected}, got {actual}")]
    UnexpectedPayload {
        expected: &'static str,
        actual: &'static str,
    },

    /// The reply kind does not answer the request kind
    #[error("Reply kind {reply} does not match request kind {request}")]
    MismatchedReply {
        request: &'static str,
        reply: &'static str,
    },
}
