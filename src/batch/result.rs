//! # Batch Results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transfer::FileRef;

/// A file a batch job could not process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub filename: String,
    pub reason: String,
}

/// Outcome of one batch run on one replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Replica the job ran on
    pub replica_id: String,
    /// Job name
    pub job: String,
    /// Files processed successfully
    pub files_processed: usize,
    /// Files that failed, with the reason
    pub failed_files: Vec<FailedFile>,
    /// Aggregated output
    pub output: Option<FileRef>,
    /// Whether the job was aborted by its timeout
    pub timed_out: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchResult {
    /// No failed files and no timeout
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.failed_files.is_empty()
    }

    pub fn failed_filenames(&self) -> Vec<&str> {
        self.failed_files.iter().map(|f| f.filename.as_str()).collect()
    }
}
