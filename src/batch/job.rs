//! # Batch Jobs
//!
//! A job is a pluggable per-file function whose outputs are concatenated
//! into one aggregated output.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::errors::{BatchError, BatchJobResult};
use crate::checksum::md5_hex;

/// What to run, and on which files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJobDescriptor {
    /// Registered job name
    pub job: String,
    /// Regex every processed filename must match in full
    pub filename_pattern: String,
    /// Job specific arguments
    #[serde(default)]
    pub arguments: HashMap<String, String>,
}

impl BatchJobDescriptor {
    /// Descriptor running `job` on every file
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            filename_pattern: ".*".to_string(),
            arguments: HashMap::new(),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.filename_pattern = pattern.into();
        self
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    /// Compile the filename filter, anchored at both ends.
    pub fn filter(&self) -> BatchJobResult<Regex> {
        Regex::new(&format!("^(?:{})$", self.filename_pattern))
            .map_err(|e| BatchError::InvalidPattern(e.to_string()))
    }
}

/// Per-file function of a batch job
pub trait BatchJob: Send + Sync {
    fn name(&self) -> &str;

    /// Process one file, appending to the aggregated output.
    /// An `Err` marks the file as failed with the given reason.
    fn process_file(
        &self,
        filename: &str,
        content: &[u8],
        arguments: &HashMap<String, String>,
        output: &mut Vec<u8>,
    ) -> Result<(), String>;
}

/// Emits `filename##md5` per file.
#[derive(Debug, Default)]
pub struct ChecksumJob;

impl BatchJob for ChecksumJob {
    fn name(&self) -> &str {
        "checksum"
    }

    fn process_file(
        &self,
        filename: &str,
        content: &[u8],
        _arguments: &HashMap<String, String>,
        output: &mut Vec<u8>,
    ) -> Result<(), String> {
        output.extend_from_slice(format!("{}##{}\n", filename, md5_hex(content)).as_bytes());
        Ok(())
    }
}

/// Emits one filename per line.
#[derive(Debug, Default)]
pub struct FileListJob;

impl BatchJob for FileListJob {
    fn name(&self) -> &str {
        "filelist"
    }

    fn process_file(
        &self,
        filename: &str,
        _content: &[u8],
        _arguments: &HashMap<String, String>,
        output: &mut Vec<u8>,
    ) -> Result<(), String> {
        output.extend_from_slice(filename.as_bytes());
        output.push(b'\n');
        Ok(())
    }
}

/// Jobs by name
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<dyn BatchJob>>>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.names())
            .finish()
    }
}

impl JobRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `checksum` and `filelist` jobs
    pub fn with_builtin_jobs() -> Self {
        let mut jobs: HashMap<String, Arc<dyn BatchJob>> = HashMap::new();
        jobs.insert("checksum".to_string(), Arc::new(ChecksumJob));
        jobs.insert("filelist".to_string(), Arc::new(FileListJob));
        Self {
            jobs: RwLock::new(jobs),
        }
    }

    pub fn register(&self, job: Arc<dyn BatchJob>) -> BatchJobResult<()> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| BatchError::Internal("Lock poisoned".into()))?;
        let name = job.name().to_string();
        if jobs.contains_key(&name) {
            return Err(BatchError::AlreadyRegistered(name));
        }
        jobs.insert(name, job);
        Ok(())
    }

    pub fn get(&self, name: &str) -> BatchJobResult<Arc<dyn BatchJob>> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| BatchError::Internal("Lock poisoned".into()))?;
        jobs.get(name)
            .cloned()
            .ok_or_else(|| BatchError::UnknownJob(name.to_string()))
    }

    /// Registered job names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .jobs
            .read()
            .map(|jobs| jobs.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}
