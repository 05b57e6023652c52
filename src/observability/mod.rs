//! Observability subsystem for bitvault
//!
//! - Structured logging (JSON lines)
//! - Typed lifecycle events
//! - Monotonic counters
//!
//! Observability is read-only: nothing here changes the outcome of an
//! operation, and a failed log write is ignored.
//!
//! ```ignore
//! use bitvault::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::CatalogUpdated, &[("filename", "a.arc")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Severity an event is logged at.
pub fn severity_of(event: Event) -> Severity {
    if event.is_fatal() {
        Severity::Fatal
    } else if event.is_warning() {
        Severity::Warn
    } else {
        Severity::Info
    }
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    Logger::log(severity_of(event), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity_of(event), event.as_str(), fields);
}

/// Log a lifecycle event at TRACE level, for per-message chatter.
pub fn trace_event(event: Event, fields: &[(&str, &str)]) {
    Logger::trace(event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_of_events() {
        assert_eq!(severity_of(Event::TransportExhausted), Severity::Fatal);
        assert_eq!(severity_of(Event::CapabilityRejected), Severity::Warn);
        assert_eq!(severity_of(Event::CatalogLoaded), Severity::Info);
    }

    #[test]
    fn test_log_event_with_fields() {
        log_event_with_fields(Event::ConfigLoaded, &[("environment", "TEST")]);
    }
}
