//! Metrics registry for bitvault
//!
//! - Counters only
//! - Monotonic increase
//! - Reset only on process start

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters shared by one process.
///
/// All counters use Relaxed ordering; readers only need eventual values.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    messages_sent: AtomicU64,
    send_retries: AtomicU64,
    transport_failures: AtomicU64,
    replies_sent: AtomicU64,
    reconnects: AtomicU64,
    capability_rejections: AtomicU64,
    catalog_uploads: AtomicU64,
    corrections: AtomicU64,
    rejected_requests: AtomicU64,
    batch_jobs: AtomicU64,
    repairs: AtomicU64,
    failed_repairs: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub send_retries: u64,
    pub transport_failures: u64,
    pub replies_sent: u64,
    pub reconnects: u64,
    pub capability_rejections: u64,
    pub catalog_uploads: u64,
    pub corrections: u64,
    pub rejected_requests: u64,
    pub batch_jobs: u64,
    pub repairs: u64,
    pub failed_repairs: u64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_messages_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_send_retries(&self) {
        self.send_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_transport_failures(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_replies_sent(&self) {
        self.replies_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_capability_rejections(&self) {
        self.capability_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_catalog_uploads(&self) {
        self.catalog_uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_corrections(&self) {
        self.corrections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected_requests(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batch_jobs(&self) {
        self.batch_jobs.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one repair attempt
    pub fn record_repair(&self, succeeded: bool) {
        if succeeded {
            self.repairs.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_repairs.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take a consistent-enough snapshot of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_retries: self.send_retries.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            replies_sent: self.replies_sent.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            capability_rejections: self.capability_rejections.load(Ordering::Relaxed),
            catalog_uploads: self.catalog_uploads.load(Ordering::Relaxed),
            corrections: self.corrections.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            batch_jobs: self.batch_jobs.load(Ordering::Relaxed),
            repairs: self.repairs.load(Ordering::Relaxed),
            failed_repairs: self.failed_repairs.load(Ordering::Relaxed),
        }
    }
}
