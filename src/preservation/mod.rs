//! # Bit Preservation
//!
//! Reconciliation of replica state against the admin authority, and the
//! repairs that shrink divergence.

mod authority;
mod errors;
mod reconciler;
mod state;

pub use authority::{AdminAuthority, InMemoryAdminAuthority};
pub use errors::{PreservationError, PreservationResult};
pub use reconciler::ActiveBitPreservation;
pub use state::{
    ChangedFilesReport, ChecksumStrategy, MissingFilesReport, PreservationState, RepairReport,
    ReplicaSummary,
};
