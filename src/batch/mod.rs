//! # Batch Jobs
//!
//! Submission and result contract for jobs run against a replica's files:
//! a descriptor goes in, per-file status plus an aggregated output
//! reference comes out.

mod errors;
mod executor;
mod job;
mod result;

pub use errors::{BatchError, BatchJobResult};
pub use executor::{BatchExecutor, TIMED_OUT_REASON};
pub use job::{BatchJob, BatchJobDescriptor, ChecksumJob, FileListJob, JobRegistry};
pub use result::{BatchResult, FailedFile};
