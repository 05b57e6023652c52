//! # Active Bit Preservation
//!
//! Compares what the admin authority expects with what replicas report,
//! and repairs divergence by copying intact files from bitarchive
//! replicas.
//!
//! Diffs and repairs are separate exchanges. A repair never relies on the
//! diff still holding: uploads are checked against the expected checksum
//! and corrections are re-validated by the replica.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;

use super::authority::AdminAuthority;
use super::errors::{PreservationError, PreservationResult};
use super::state::{
    ChangedFilesReport, ChecksumStrategy, MissingFilesReport, PreservationState, RepairReport,
    ReplicaSummary,
};
use crate::checksum::{md5_hex, parse_catalog};
use crate::client::{require_ok, ReplicaClientFactory};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::protocol::{Credentials, MessageKind};
use crate::transfer::{FileRef, FileTransfer};

pub struct ActiveBitPreservation {
    clients: Arc<ReplicaClientFactory>,
    authority: Arc<dyn AdminAuthority>,
    transfer: Arc<dyn FileTransfer>,
    strategy: ChecksumStrategy,
    summaries: Mutex<HashMap<String, ReplicaSummary>>,
}

impl std::fmt::Debug for ActiveBitPreservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveBitPreservation")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl ActiveBitPreservation {
    pub fn new(
        clients: Arc<ReplicaClientFactory>,
        authority: Arc<dyn AdminAuthority>,
        transfer: Arc<dyn FileTransfer>,
    ) -> Self {
        Self {
            clients,
            authority,
            transfer,
            strategy: ChecksumStrategy::default(),
            summaries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_strategy(mut self, strategy: ChecksumStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> ChecksumStrategy {
        self.strategy
    }

    fn metrics(&self) -> &MetricsRegistry {
        self.clients.connection().metrics()
    }

    // ==================
    // Reads
    // ==================

    /// Files the authority expects on `replica_id` that the replica does
    /// not report, plus files it reports that are not expected there.
    pub async fn find_missing_files(
        &self,
        replica_id: &str,
    ) -> PreservationResult<MissingFilesReport> {
        let expected = self.authority.expected_files(replica_id);
        let reported = self.reported_filenames(replica_id).await?;

        let report = MissingFilesReport {
            replica_id: replica_id.to_string(),
            missing: expected.difference(&reported).cloned().collect(),
            extra: reported.difference(&expected).cloned().collect(),
        };

        let missing = report.missing.len().to_string();
        let extra = report.extra.len().to_string();
        log_event_with_fields(
            Event::MissingFilesFound,
            &[
                ("extra", extra.as_str()),
                ("missing", missing.as_str()),
                ("replica", replica_id),
            ],
        );
        self.update_summary(replica_id, |summary| {
            summary.file_count = reported.len();
            summary.missing = report.missing.len();
            summary.last_missing_check = Some(Utc::now());
        });
        Ok(report)
    }

    /// Files whose reported checksum differs from the recorded one. Files
    /// the authority does not know are ignored.
    pub async fn find_changed_files(
        &self,
        replica_id: &str,
    ) -> PreservationResult<ChangedFilesReport> {
        let expected_files = self.authority.expected_files(replica_id);
        let reported = self.reported_checksums(replica_id, &expected_files).await?;

        let changed: BTreeMap<String, String> = reported
            .into_iter()
            .filter(|(filename, observed)| {
                matches!(
                    self.authority.expected_checksum(filename),
                    Some(expected) if &expected != observed
                )
            })
            .collect();

        let count = changed.len().to_string();
        log_event_with_fields(
            Event::ChangedFilesFound,
            &[("changed", count.as_str()), ("replica", replica_id)],
        );
        self.update_summary(replica_id, |summary| {
            summary.changed = changed.len();
            summary.last_changed_check = Some(Utc::now());
        });
        Ok(ChangedFilesReport {
            replica_id: replica_id.to_string(),
            changed,
        })
    }

    /// State of `filename` on every configured replica
    pub async fn preservation_state(
        &self,
        filename: &str,
    ) -> PreservationResult<PreservationState> {
        let expected_replicas = self.authority.expected_replicas(filename);
        let replica_ids: Vec<String> = self
            .clients
            .connection()
            .registry()
            .replicas()
            .map(|r| r.id.clone())
            .collect();

        let mut observed = BTreeMap::new();
        let mut missing_on = BTreeSet::new();
        for replica_id in replica_ids {
            let reply = self.clients.client(&replica_id)?.get_checksum(filename).await?;
            let checksum = if reply.status.ok { reply.checksum } else { None };
            if checksum.is_none() && expected_replicas.contains(&replica_id) {
                missing_on.insert(replica_id.clone());
            }
            observed.insert(replica_id, checksum);
        }

        Ok(PreservationState {
            filename: filename.to_string(),
            expected_checksum: self.authority.expected_checksum(filename),
            observed,
            missing_on,
            computed_at: Utc::now(),
        })
    }

    /// Counters from the latest passes over a replica
    pub fn replica_summary(&self, replica_id: &str) -> Option<ReplicaSummary> {
        self.summaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(replica_id)
            .cloned()
    }

    async fn reported_filenames(&self, replica_id: &str) -> PreservationResult<BTreeSet<String>> {
        let reply = self.clients.client(replica_id)?.get_all_filenames().await?;
        require_ok(MessageKind::GetAllFilenames, replica_id, &reply.status)?;
        let listing = self.take_output(replica_id, reply.output)?;
        Ok(listing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn reported_checksums(
        &self,
        replica_id: &str,
        expected_files: &BTreeSet<String>,
    ) -> PreservationResult<BTreeMap<String, String>> {
        let client = self.clients.client(replica_id)?;
        match self.strategy {
            ChecksumStrategy::Bulk => {
                let reply = client.get_all_checksums().await?;
                require_ok(MessageKind::GetAllChecksums, replica_id, &reply.status)?;
                let listing = self.take_output(replica_id, reply.output)?;
                Ok(parse_catalog(&listing)?)
            }
            ChecksumStrategy::PerFile => {
                let mut reported = BTreeMap::new();
                for filename in expected_files {
                    let reply = client.get_checksum(filename).await?;
                    if let (true, Some(checksum)) = (reply.status.ok, reply.checksum) {
                        reported.insert(filename.clone(), checksum);
                    }
                }
                Ok(reported)
            }
        }
    }

    fn take_output(&self, replica_id: &str, output: Option<FileRef>) -> PreservationResult<String> {
        let file = output.ok_or_else(|| PreservationError::MissingOutput(replica_id.to_string()))?;
        let bytes = self.transfer.take(&file)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn update_summary(&self, replica_id: &str, update: impl FnOnce(&mut ReplicaSummary)) {
        let mut summaries = self.summaries.lock().unwrap_or_else(PoisonError::into_inner);
        let summary = summaries
            .entry(replica_id.to_string())
            .or_insert_with(|| ReplicaSummary::new(replica_id));
        update(summary);
    }

    // ==================
    // Repairs
    // ==================

    /// Copy an intact `filename` from a bitarchive holder to `replica_id`.
    ///
    /// A failure part way leaves the target still missing the file.
    pub async fn reestablish_missing_file(
        &self,
        replica_id: &str,
        filename: &str,
    ) -> PreservationResult<()> {
        let outcome = self.try_reestablish(replica_id, filename).await;
        self.record_repair("reestablish", replica_id, filename, &outcome);
        outcome
    }

    /// Bring the entry for `filename` on `replica_id` to `new_checksum`
    /// using an intact copy with that checksum.
    pub async fn correct_checksum(
        &self,
        replica_id: &str,
        filename: &str,
        new_checksum: &str,
        credentials: Credentials,
    ) -> PreservationResult<()> {
        let outcome = self
            .try_correct(replica_id, filename, new_checksum, credentials)
            .await;
        self.record_repair("correct", replica_id, filename, &outcome);
        outcome
    }

    /// Reestablish each file, collecting failures.
    pub async fn upload_missing_files<I, S>(
        &self,
        replica_id: &str,
        filenames: I,
    ) -> PreservationResult<RepairReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = RepairReport::default();
        for filename in filenames {
            let filename = filename.as_ref();
            let outcome = self.reestablish_missing_file(replica_id, filename).await;
            collect(&mut report, filename, outcome)?;
        }
        Ok(report)
    }

    /// Correct each file to its recorded checksum, collecting failures.
    pub async fn replace_changed_files<I, S>(
        &self,
        replica_id: &str,
        filenames: I,
        credentials: &Credentials,
    ) -> PreservationResult<RepairReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = RepairReport::default();
        for filename in filenames {
            let filename = filename.as_ref();
            let outcome = match self.authority.expected_checksum(filename) {
                Some(expected) => {
                    self.correct_checksum(replica_id, filename, &expected, credentials.clone())
                        .await
                }
                None => Err(PreservationError::UnknownFile(filename.to_string())),
            };
            collect(&mut report, filename, outcome)?;
        }
        Ok(report)
    }

    /// One full pass over a replica: missing files first, then changed
    /// checksums.
    pub async fn repair(
        &self,
        replica_id: &str,
        credentials: &Credentials,
    ) -> PreservationResult<RepairReport> {
        let missing = self.find_missing_files(replica_id).await?;
        let mut report = self.upload_missing_files(replica_id, &missing.missing).await?;

        let changed = self.find_changed_files(replica_id).await?;
        report.merge(
            self.replace_changed_files(replica_id, changed.changed.keys(), credentials)
                .await?,
        );
        Ok(report)
    }

    async fn try_reestablish(&self, replica_id: &str, filename: &str) -> PreservationResult<()> {
        let expected = self
            .authority
            .expected_checksum(filename)
            .ok_or_else(|| PreservationError::UnknownFile(filename.to_string()))?;
        let copy = self.fetch_intact_copy(replica_id, filename, &expected).await?;

        let sent = self
            .clients
            .client(replica_id)?
            .upload(copy.clone(), Some(expected.clone()))
            .await;
        self.dispose_copy(&copy);

        let reply = sent?;
        require_ok(MessageKind::Upload, replica_id, &reply.status)?;
        match reply.checksum {
            Some(actual) if actual != expected => Err(PreservationError::CorruptCopy {
                filename: filename.to_string(),
                replica: replica_id.to_string(),
                expected,
                actual,
            }),
            _ => Ok(()),
        }
    }

    async fn try_correct(
        &self,
        replica_id: &str,
        filename: &str,
        new_checksum: &str,
        credentials: Credentials,
    ) -> PreservationResult<()> {
        let client = self.clients.client(replica_id)?;
        let current = client.get_checksum(filename).await?;
        require_ok(MessageKind::GetChecksum, replica_id, &current.status)?;
        let old_checksum = current
            .checksum
            .ok_or_else(|| PreservationError::MissingOutput(replica_id.to_string()))?;

        let copy = self.fetch_intact_copy(replica_id, filename, new_checksum).await?;
        let sent = client
            .correct(filename, &old_checksum, copy.clone(), credentials)
            .await;
        self.dispose_copy(&copy);

        let reply = sent?;
        require_ok(MessageKind::Correct, replica_id, &reply.status)?;
        Ok(())
    }

    /// First copy from another bitarchive replica whose content matches
    /// `expected`. The caller owns (and disposes) the returned file.
    async fn fetch_intact_copy(
        &self,
        target: &str,
        filename: &str,
        expected: &str,
    ) -> PreservationResult<FileRef> {
        let registry = self.clients.connection().registry();
        let sources: Vec<String> = self
            .authority
            .expected_replicas(filename)
            .into_iter()
            .filter(|id| id != target)
            .filter(|id| registry.replica(id).map(|r| !r.is_checksum()).unwrap_or(false))
            .collect();

        let mut last_error = None;
        for source in sources {
            match self.fetch_copy(&source, filename, expected).await {
                Ok(copy) => return Ok(copy),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| PreservationError::NoSource {
            filename: filename.to_string(),
            replica: target.to_string(),
        }))
    }

    async fn fetch_copy(
        &self,
        source: &str,
        filename: &str,
        expected: &str,
    ) -> PreservationResult<FileRef> {
        let reply = self.clients.client(source)?.get_file(filename).await?;
        require_ok(MessageKind::GetFile, source, &reply.status)?;
        let copy = reply
            .file
            .ok_or_else(|| PreservationError::MissingOutput(source.to_string()))?;

        let actual = md5_hex(&self.transfer.fetch(&copy)?);
        if actual != expected {
            self.dispose_copy(&copy);
            return Err(PreservationError::CorruptCopy {
                filename: filename.to_string(),
                replica: source.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(copy)
    }

    /// Drop a fetched copy. A copy that cannot be disposed is logged and
    /// left to the transfer's own cleanup.
    fn dispose_copy(&self, copy: &FileRef) {
        if let Err(e) = self.transfer.dispose(copy) {
            let error = e.to_string();
            let id = copy.id.to_string();
            log_event_with_fields(
                Event::TransferDisposeFailed,
                &[("error", error.as_str()), ("file", copy.name.as_str()), ("id", id.as_str())],
            );
        }
    }

    fn record_repair(
        &self,
        action: &str,
        replica_id: &str,
        filename: &str,
        outcome: &PreservationResult<()>,
    ) {
        self.metrics().record_repair(outcome.is_ok());
        match outcome {
            Ok(()) => log_event_with_fields(
                Event::RepairSucceeded,
                &[("action", action), ("filename", filename), ("replica", replica_id)],
            ),
            Err(e) => {
                let error = e.to_string();
                log_event_with_fields(
                    Event::RepairFailed,
                    &[
                        ("action", action),
                        ("error", error.as_str()),
                        ("filename", filename),
                        ("replica", replica_id),
                    ],
                );
            }
        }
    }
}

/// Fold one repair outcome into a report. Fatal errors abort the batch.
fn collect(
    report: &mut RepairReport,
    filename: &str,
    outcome: PreservationResult<()>,
) -> PreservationResult<()> {
    match outcome {
        Ok(()) => report.repaired.push(filename.to_string()),
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => report.failed.push((filename.to_string(), e.to_string())),
    }
    Ok(())
}
