//! # Bitarchive Server
//!
//! Serves a directory of archived files for one bitarchive replica. It
//! answers every request kind and is the source of good copies when the
//! reconciler repairs another replica.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

use super::errors::{BitarchiveError, BitarchiveResult};
use super::store::ArchiveStore;
use crate::batch::BatchExecutor;
use crate::channels::{Channel, ChannelRegistry, ChannelResult, Replica};
use crate::checksum::{md5_hex, ChecksumEntry};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::protocol::*;
use crate::server::{ReplicaServer, ServerError, ServerResult};
use crate::transfer::{FileRef, FileTransfer};

pub struct BitarchiveServer {
    replica: Replica,
    store: ArchiveStore,
    transfer: Arc<dyn FileTransfer>,
    executor: BatchExecutor,
    credentials: String,
    metrics: Arc<MetricsRegistry>,
    /// Serializes check-then-act mutations on the directory
    write_lock: Mutex<()>,
    cancel: AtomicBool,
}

impl std::fmt::Debug for BitarchiveServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitarchiveServer")
            .field("replica", &self.replica)
            .field("root", &self.store.root())
            .finish_non_exhaustive()
    }
}

impl BitarchiveServer {
    pub fn new(
        replica: Replica,
        root: impl Into<PathBuf>,
        transfer: Arc<dyn FileTransfer>,
        executor: BatchExecutor,
        credentials: impl Into<String>,
        metrics: Arc<MetricsRegistry>,
    ) -> BitarchiveResult<Self> {
        Ok(Self {
            replica,
            store: ArchiveStore::open(root)?,
            transfer,
            executor,
            credentials: credentials.into(),
            metrics,
            write_lock: Mutex::new(()),
            cancel: AtomicBool::new(false),
        })
    }

    pub fn store(&self) -> &ArchiveStore {
        &self.store
    }

    /// Ask a running batch job to stop after its current file.
    pub fn cancel_batch(&self) {
        self.cancel.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn lock(&self) -> BitarchiveResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| BitarchiveError::Internal("Lock poisoned".into()))
    }

    fn guard_credentials(&self, filename: &str, credentials: &Credentials) -> BitarchiveResult<()> {
        if credentials.matches(&self.credentials) {
            Ok(())
        } else {
            Err(BitarchiveError::WrongCredentials(filename.to_string()))
        }
    }

    fn guard_checksum(&self, filename: &str, expected: &str) -> BitarchiveResult<String> {
        let actual = self.store.checksum(filename)?;
        if actual != expected {
            return Err(BitarchiveError::StaleChecksum {
                filename: filename.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(actual)
    }

    fn store_upload(&self, file: &FileRef) -> BitarchiveResult<String> {
        let content = self.transfer.fetch(file)?;
        let checksum = md5_hex(&content);

        let _guard = self.lock()?;
        if self.store.contains(&file.name) {
            let existing = self.store.checksum(&file.name)?;
            if existing != checksum {
                return Err(BitarchiveError::AlreadyArchived {
                    filename: file.name.clone(),
                    existing,
                });
            }
            return Ok(existing);
        }
        self.store.write(&file.name, &content)?;
        Ok(checksum)
    }

    fn remove_file(&self, request: &RemoveAndGetFileRequest) -> BitarchiveResult<FileRef> {
        self.guard_credentials(&request.filename, &request.credentials)?;

        let _guard = self.lock()?;
        self.guard_checksum(&request.filename, &request.checksum)?;
        let content = self.store.read(&request.filename)?;
        let removed = self.transfer.put(&request.filename, &content)?;
        self.store.remove(&request.filename)?;
        Ok(removed)
    }

    fn replace_file(&self, request: &CorrectRequest) -> BitarchiveResult<(ChecksumEntry, String)> {
        self.guard_credentials(&request.filename, &request.credentials)?;
        let content = self.transfer.fetch(&request.file)?;
        let new_checksum = md5_hex(&content);

        let _guard = self.lock()?;
        let old = self.guard_checksum(&request.filename, &request.old_checksum)?;
        self.store.write(&request.filename, &content)?;
        Ok((ChecksumEntry::new(&request.filename, old), new_checksum))
    }

    fn export(
        &self,
        name: &str,
        line: impl Fn(&str) -> BitarchiveResult<String>,
    ) -> BitarchiveResult<FileRef> {
        let mut text = String::new();
        for (filename, _) in self.store.files()? {
            text.push_str(&line(&filename)?);
            text.push('\n');
        }
        Ok(self.transfer.put(name, text.as_bytes())?)
    }
}

impl ArchiveMessageHandler for BitarchiveServer {
    fn upload(&self, request: &UploadRequest) -> UploadReply {
        match self.store_upload(&request.file) {
            Ok(checksum) => UploadReply {
                status: ReplyStatus::ok(),
                filename: request.file.name.clone(),
                checksum: Some(checksum),
            },
            Err(e) => UploadReply::failure(request, e.to_string()),
        }
    }

    fn get(&self, request: &GetRequest) -> GetReply {
        let record = self
            .store
            .read_from(&request.filename, request.offset)
            .and_then(|bytes| Ok(self.transfer.put(&request.filename, &bytes)?));
        match record {
            Ok(record) => GetReply {
                status: ReplyStatus::ok(),
                filename: request.filename.clone(),
                offset: request.offset,
                record: Some(record),
            },
            Err(e) => GetReply::failure(request, e.to_string()),
        }
    }

    fn get_file(&self, request: &GetFileRequest) -> GetFileReply {
        let file = self
            .store
            .read(&request.filename)
            .and_then(|bytes| Ok(self.transfer.put(&request.filename, &bytes)?));
        match file {
            Ok(file) => GetFileReply {
                status: ReplyStatus::ok(),
                filename: request.filename.clone(),
                file: Some(file),
            },
            Err(e) => GetFileReply::failure(request, e.to_string()),
        }
    }

    fn remove_and_get_file(&self, request: &RemoveAndGetFileRequest) -> RemoveAndGetFileReply {
        match self.remove_file(request) {
            Ok(removed) => RemoveAndGetFileReply {
                status: ReplyStatus::ok(),
                filename: request.filename.clone(),
                removed: Some(removed),
            },
            Err(e) => RemoveAndGetFileReply::failure(request, e.to_string()),
        }
    }

    fn batch(&self, request: &BatchRequest) -> BatchReply {
        let files = match self.store.files() {
            Ok(files) => files,
            Err(e) => return BatchReply::failure(request, e.to_string()),
        };
        self.cancel.store(false, std::sync::atomic::Ordering::SeqCst);

        let result = self.executor.run(
            &self.replica.id,
            &request.job,
            &files,
            self.transfer.as_ref(),
            &self.cancel,
        );
        self.metrics.increment_batch_jobs();

        match result {
            Ok(result) => {
                let status = if result.timed_out {
                    ReplyStatus::failed(crate::batch::TIMED_OUT_REASON)
                } else {
                    ReplyStatus::ok()
                };
                BatchReply {
                    status,
                    job: request.job.job.clone(),
                    result: Some(result),
                }
            }
            Err(e) => BatchReply::failure(request, e.to_string()),
        }
    }

    fn get_checksum(&self, request: &GetChecksumRequest) -> GetChecksumReply {
        match self.store.checksum(&request.filename) {
            Ok(checksum) => GetChecksumReply {
                status: ReplyStatus::ok(),
                filename: request.filename.clone(),
                checksum: Some(checksum),
            },
            Err(e) => GetChecksumReply::failure(request, e.to_string()),
        }
    }

    fn get_all_checksums(&self, request: &GetAllChecksumsRequest) -> GetAllChecksumsReply {
        let name = format!("{}-checksums", self.replica.id);
        let output = self.export(&name, |filename| {
            let checksum = self.store.checksum(filename)?;
            Ok(ChecksumEntry::new(filename, checksum).to_line())
        });
        match output {
            Ok(output) => GetAllChecksumsReply {
                status: ReplyStatus::ok(),
                output: Some(output),
            },
            Err(e) => GetAllChecksumsReply::failure(request, e.to_string()),
        }
    }

    fn get_all_filenames(&self, request: &GetAllFilenamesRequest) -> GetAllFilenamesReply {
        let name = format!("{}-filenames", self.replica.id);
        match self.export(&name, |filename| Ok(filename.to_string())) {
            Ok(output) => GetAllFilenamesReply {
                status: ReplyStatus::ok(),
                output: Some(output),
            },
            Err(e) => GetAllFilenamesReply::failure(request, e.to_string()),
        }
    }

    fn correct(&self, request: &CorrectRequest) -> CorrectReply {
        match self.replace_file(request) {
            Ok((removed, new_checksum)) => {
                self.metrics.increment_corrections();
                log_event_with_fields(
                    Event::CatalogCorrected,
                    &[
                        ("filename", request.filename.as_str()),
                        ("new_checksum", new_checksum.as_str()),
                        ("old_checksum", removed.checksum.as_str()),
                        ("replica", self.replica.id.as_str()),
                    ],
                );
                CorrectReply {
                    status: ReplyStatus::ok(),
                    filename: request.filename.clone(),
                    removed_entry: Some(removed.to_line()),
                    new_checksum: Some(new_checksum),
                }
            }
            Err(e) => CorrectReply::failure(request, e.to_string()),
        }
    }
}

impl ReplicaServer for BitarchiveServer {
    fn replica(&self) -> &Replica {
        &self.replica
    }

    fn description(&self) -> &'static str {
        "bitarchive"
    }

    fn channels(&self, registry: &ChannelRegistry) -> ChannelResult<Vec<Channel>> {
        Ok(vec![
            registry.any_ba(&self.replica.id)?,
            registry.all_ba(&self.replica.id)?,
        ])
    }

    fn reload(&self) -> ServerResult<()> {
        self.store.ensure().map_err(|e| ServerError::Reload {
            replica: self.replica.id.clone(),
            reason: e.to_string(),
        })
    }
}
