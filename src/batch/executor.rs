//! # Batch Executor
//!
//! Runs a job over a replica's files. The timeout is enforced between
//! files: once it passes, or the cancel flag is raised, the remaining
//! files are reported failed and the job stops.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::errors::BatchJobResult;
use super::job::{BatchJobDescriptor, JobRegistry};
use super::result::{BatchResult, FailedFile};
use crate::observability::{log_event_with_fields, Event};
use crate::transfer::FileTransfer;

/// Failure reason recorded for files skipped by a timeout
pub const TIMED_OUT_REASON: &str = "batch job timed out";

/// Timeout-enforcing batch runner
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    jobs: Arc<JobRegistry>,
    timeout: Duration,
}

impl BatchExecutor {
    pub fn new(jobs: Arc<JobRegistry>, timeout: Duration) -> Self {
        Self { jobs, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    /// Run `descriptor` over `files` (filename, path) and store the
    /// aggregated output through `transfer`.
    ///
    /// Unknown jobs and bad patterns fail before any file is touched.
    pub fn run(
        &self,
        replica_id: &str,
        descriptor: &BatchJobDescriptor,
        files: &[(String, PathBuf)],
        transfer: &dyn FileTransfer,
        cancel: &AtomicBool,
    ) -> BatchJobResult<BatchResult> {
        let job = self.jobs.get(&descriptor.job)?;
        let filter = descriptor.filter()?;

        let started_at = Utc::now();
        let deadline = Instant::now() + self.timeout;
        log_event_with_fields(
            Event::BatchStart,
            &[("job", descriptor.job.as_str()), ("replica", replica_id)],
        );

        let mut output = Vec::new();
        let mut files_processed = 0;
        let mut failed_files = Vec::new();
        let mut timed_out = false;

        for (filename, path) in files.iter().filter(|(name, _)| filter.is_match(name)) {
            if !timed_out && (cancel.load(Ordering::SeqCst) || Instant::now() >= deadline) {
                timed_out = true;
                log_event_with_fields(
                    Event::BatchTimeout,
                    &[("job", descriptor.job.as_str()), ("replica", replica_id)],
                );
            }
            if timed_out {
                failed_files.push(FailedFile {
                    filename: filename.clone(),
                    reason: TIMED_OUT_REASON.to_string(),
                });
                continue;
            }

            let outcome = std::fs::read(path)
                .map_err(|e| e.to_string())
                .and_then(|content| {
                    job.process_file(filename, &content, &descriptor.arguments, &mut output)
                });
            match outcome {
                Ok(()) => files_processed += 1,
                Err(reason) => failed_files.push(FailedFile {
                    filename: filename.clone(),
                    reason,
                }),
            }
        }

        let output = transfer.put(&format!("{}-{}.batch", descriptor.job, replica_id), &output)?;

        let result = BatchResult {
            replica_id: replica_id.to_string(),
            job: descriptor.job.clone(),
            files_processed,
            failed_files,
            output: Some(output),
            timed_out,
            started_at,
            finished_at: Utc::now(),
        };

        let processed = result.files_processed.to_string();
        let failed = result.failed_files.len().to_string();
        log_event_with_fields(
            Event::BatchComplete,
            &[
                ("failed", failed.as_str()),
                ("job", descriptor.job.as_str()),
                ("processed", processed.as_str()),
                ("replica", replica_id),
            ],
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchError;
    use crate::checksum::md5_hex;
    use crate::transfer::LocalTransfer;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        files: Vec<(String, PathBuf)>,
        transfer: LocalTransfer,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let mut files = Vec::new();
        for (name, content) in [("a.arc", "alpha"), ("b.arc", "beta"), ("c.warc", "gamma")] {
            let path = temp.path().join(name);
            std::fs::write(&path, content).unwrap();
            files.push((name.to_string(), path));
        }
        let transfer = LocalTransfer::new(temp.path().join("staging"));
        Fixture {
            _temp: temp,
            files,
            transfer,
        }
    }

    fn executor(timeout: Duration) -> BatchExecutor {
        BatchExecutor::new(Arc::new(JobRegistry::with_builtin_jobs()), timeout)
    }

    #[test]
    fn test_checksum_job_over_matching_files() {
        let f = fixture();
        let descriptor = BatchJobDescriptor::new("checksum").with_pattern(r".*\.arc");
        let result = executor(Duration::from_secs(60))
            .run("ONE", &descriptor, &f.files, &f.transfer, &AtomicBool::new(false))
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.files_processed, 2);
        let output = f.transfer.fetch(result.output.as_ref().unwrap()).unwrap();
        let expected = format!("a.arc##{}\nb.arc##{}\n", md5_hex(b"alpha"), md5_hex(b"beta"));
        assert_eq!(String::from_utf8(output).unwrap(), expected);
    }

    #[test]
    fn test_timeout_fails_remaining_files() {
        let f = fixture();
        let result = executor(Duration::ZERO)
            .run(
                "ONE",
                &BatchJobDescriptor::new("filelist"),
                &f.files,
                &f.transfer,
                &AtomicBool::new(false),
            )
            .unwrap();

        assert!(result.timed_out);
        assert!(!result.is_success());
        assert_eq!(result.files_processed, 0);
        assert_eq!(result.failed_filenames(), vec!["a.arc", "b.arc", "c.warc"]);
        assert!(result.failed_files.iter().all(|f| f.reason == TIMED_OUT_REASON));
    }

    #[test]
    fn test_cancel_flag_stops_job() {
        let f = fixture();
        let result = executor(Duration::from_secs(60))
            .run(
                "ONE",
                &BatchJobDescriptor::new("filelist"),
                &f.files,
                &f.transfer,
                &AtomicBool::new(true),
            )
            .unwrap();
        assert!(result.timed_out);
        assert_eq!(result.failed_files.len(), 3);
    }

    #[test]
    fn test_unreadable_file_is_reported() {
        let mut f = fixture();
        f.files.push(("gone.arc".to_string(), PathBuf::from("/nonexistent/gone.arc")));
        let result = executor(Duration::from_secs(60))
            .run(
                "ONE",
                &BatchJobDescriptor::new("filelist"),
                &f.files,
                &f.transfer,
                &AtomicBool::new(false),
            )
            .unwrap();

        assert!(!result.timed_out);
        assert_eq!(result.files_processed, 3);
        assert_eq!(result.failed_filenames(), vec!["gone.arc"]);
    }

    #[test]
    fn test_unknown_job() {
        let f = fixture();
        let descriptor = BatchJobDescriptor {
            job: "cdx".into(),
            filename_pattern: ".*".into(),
            arguments: HashMap::new(),
        };
        let err = executor(Duration::from_secs(1))
            .run("ONE", &descriptor, &f.files, &f.transfer, &AtomicBool::new(false))
            .unwrap_err();
        assert_eq!(err, BatchError::UnknownJob("cdx".into()));
    }
}
