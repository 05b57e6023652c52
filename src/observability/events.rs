//! Observability events for bitvault
//!
//! Every lifecycle step that an operator may need to correlate across
//! replicas is an explicit, typed event.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Connection
    /// Broker session established
    ConnectionEstablished,
    /// Connection could not be established (FATAL)
    ConnectionFailed,
    /// Reconnect started
    ReconnectStart,
    /// Reconnect finished, listeners restored
    ReconnectComplete,
    /// Reconnect gave up, connection closed
    ReconnectFailed,
    /// Connection closed
    ConnectionClosed,

    // Messaging
    /// Message accepted by the transport
    MessageSent,
    /// Transport operation failed, will retry
    TransportRetry,
    /// Transport retries exhausted (FATAL)
    TransportExhausted,
    /// Listener registered
    ListenerAdded,
    /// Listener deregistered
    ListenerRemoved,
    /// Message delivered to a listener
    MessageReceived,
    /// Reply sent
    MessageReplied,
    /// Listener panicked or its reply could not be sent
    ListenerFailed,
    /// Frame could not be decoded, forwarded to the error channel
    MessageUndecodable,
    /// Request timed out waiting for a reply
    RequestTimeout,

    // Replica clients
    /// Request refused by the capability matrix
    CapabilityRejected,

    // Checksum store
    /// Catalog loaded from disk
    CatalogLoaded,
    /// Catalog entry inserted or overwritten
    CatalogUpdated,
    /// Catalog entry corrected
    CatalogCorrected,
    /// Request refused by a replica server
    RequestRejected,
    /// Replica server listening
    ServerStarted,
    /// Replica server stopped
    ServerStopped,
    /// Reload from disk failed, previous state kept
    ServerReloadFailed,

    // Batch
    /// Batch job started
    BatchStart,
    /// Batch job finished
    BatchComplete,
    /// Batch job aborted on timeout
    BatchTimeout,

    // Preservation
    /// Missing files detected on a replica
    MissingFilesFound,
    /// Changed files detected on a replica
    ChangedFilesFound,
    /// A repair succeeded
    RepairSucceeded,
    /// A repair failed, divergence remains
    RepairFailed,
    /// A transferred copy could not be disposed
    TransferDisposeFailed,

    // Process
    /// Configuration loaded
    ConfigLoaded,
    /// Process serving
    Serving,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConnectionEstablished => "CONNECTION_ESTABLISHED",
            Event::ConnectionFailed => "CONNECTION_FAILED",
            Event::ReconnectStart => "RECONNECT_BEGIN",
            Event::ReconnectComplete => "RECONNECT_COMPLETE",
            Event::ReconnectFailed => "RECONNECT_FAILED",
            Event::ConnectionClosed => "CONNECTION_CLOSED",

            Event::MessageSent => "MESSAGE_SENT",
            Event::TransportRetry => "TRANSPORT_RETRY",
            Event::TransportExhausted => "TRANSPORT_EXHAUSTED",
            Event::ListenerAdded => "LISTENER_ADDED",
            Event::ListenerRemoved => "LISTENER_REMOVED",
            Event::MessageReceived => "MESSAGE_RECEIVED",
            Event::MessageReplied => "MESSAGE_REPLIED",
            Event::ListenerFailed => "LISTENER_FAILED",
            Event::MessageUndecodable => "MESSAGE_UNDECODABLE",
            Event::RequestTimeout => "REQUEST_TIMEOUT",

            Event::CapabilityRejected => "CAPABILITY_REJECTED",

            Event::CatalogLoaded => "CATALOG_LOADED",
            Event::CatalogUpdated => "CATALOG_UPDATED",
            Event::CatalogCorrected => "CATALOG_CORRECTED",
            Event::RequestRejected => "REQUEST_REJECTED",
            Event::ServerStarted => "SERVER_STARTED",
            Event::ServerStopped => "SERVER_STOPPED",
            Event::ServerReloadFailed => "SERVER_RELOAD_FAILED",

            Event::BatchStart => "BATCH_BEGIN",
            Event::BatchComplete => "BATCH_COMPLETE",
            Event::BatchTimeout => "BATCH_TIMEOUT",

            Event::MissingFilesFound => "MISSING_FILES_FOUND",
            Event::ChangedFilesFound => "CHANGED_FILES_FOUND",
            Event::RepairSucceeded => "REPAIR_SUCCEEDED",
            Event::RepairFailed => "REPAIR_FAILED",
            Event::TransferDisposeFailed => "TRANSFER_DISPOSE_FAILED",

            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::Serving => "BITVAULT_SERVING",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Event::ConnectionFailed | Event::ReconnectFailed | Event::TransportExhausted
        )
    }

    /// Returns true if this event is a recoverable problem worth a warning
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::TransportRetry
                | Event::MessageUndecodable
                | Event::ListenerFailed
                | Event::RequestTimeout
                | Event::CapabilityRejected
                | Event::RequestRejected
                | Event::BatchTimeout
                | Event::MissingFilesFound
                | Event::ChangedFilesFound
                | Event::RepairFailed
                | Event::ServerReloadFailed
                | Event::TransferDisposeFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_events() {
        assert!(Event::TransportExhausted.is_fatal());
        assert!(Event::ReconnectFailed.is_fatal());
        assert!(!Event::TransportRetry.is_fatal());
        assert!(!Event::CatalogUpdated.is_fatal());
    }

    #[test]
    fn test_event_names_are_screaming_snake() {
        for event in [Event::CatalogCorrected, Event::BatchTimeout, Event::Serving] {
            let name = event.as_str();
            assert!(name.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }
}
