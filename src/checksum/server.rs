//! # Checksum Store Server
//!
//! Serves one checksum replica's catalog. Only catalog kinds are
//! handled; kinds needing file content are refused even though the
//! replica client should never send them.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use super::catalog::ChecksumCatalog;
use super::digest::md5_hex;
use super::errors::{ChecksumError, ChecksumResult};
use crate::channels::{Channel, ChannelRegistry, ChannelResult, Replica};
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::protocol::*;
use crate::server::{ReplicaServer, ServerError, ServerResult};
use crate::transfer::FileTransfer;

#[derive(Debug, Clone, Default)]
pub struct ChecksumServerSettings {
    /// Secret guarding corrections
    pub credentials: String,
    /// Trust the uploader's checksum instead of reading the content
    pub use_precomputed_checksum: bool,
}

pub struct ChecksumServer {
    replica: Replica,
    catalog: Mutex<ChecksumCatalog>,
    transfer: Arc<dyn FileTransfer>,
    settings: ChecksumServerSettings,
    metrics: Arc<MetricsRegistry>,
}

impl std::fmt::Debug for ChecksumServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChecksumServer")
            .field("replica", &self.replica)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl ChecksumServer {
    /// Load the catalog at `catalog_path` and serve it for `replica`.
    pub fn new(
        replica: Replica,
        catalog_path: impl Into<PathBuf>,
        transfer: Arc<dyn FileTransfer>,
        settings: ChecksumServerSettings,
        metrics: Arc<MetricsRegistry>,
    ) -> ChecksumResult<Self> {
        let catalog = ChecksumCatalog::load(catalog_path)?;
        let entries = catalog.len().to_string();
        let path = catalog.path().display().to_string();
        log_event_with_fields(
            Event::CatalogLoaded,
            &[
                ("entries", entries.as_str()),
                ("path", path.as_str()),
                ("replica", replica.id.as_str()),
            ],
        );
        Ok(Self {
            replica,
            catalog: Mutex::new(catalog),
            transfer,
            settings,
            metrics,
        })
    }

    /// Current checksum of a file
    pub fn checksum(&self, filename: &str) -> Option<String> {
        self.catalog()
            .ok()
            .and_then(|catalog| catalog.get(filename).map(str::to_string))
    }

    /// Number of catalog entries
    pub fn len(&self) -> usize {
        self.catalog().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn catalog(&self) -> ChecksumResult<MutexGuard<'_, ChecksumCatalog>> {
        self.catalog
            .lock()
            .map_err(|_| ChecksumError::Internal("Lock poisoned".into()))
    }

    fn refuse(&self, kind: MessageKind) -> String {
        unsupported(kind, &format!("checksum replica {}", self.replica.id))
    }

    fn materialize(&self, name: &str, content: String) -> ChecksumResult<crate::transfer::FileRef> {
        Ok(self.transfer.put(name, content.as_bytes())?)
    }
}

impl ArchiveMessageHandler for ChecksumServer {
    fn upload(&self, request: &UploadRequest) -> UploadReply {
        let filename = request.file.name.as_str();
        let precomputed = &request.precomputed_checksum;
        let checksum = match (precomputed, self.settings.use_precomputed_checksum) {
            (Some(checksum), true) => checksum.clone(),
            _ => match self.transfer.fetch(&request.file) {
                Ok(content) => md5_hex(&content),
                Err(e) => return UploadReply::failure(request, e.to_string()),
            },
        };

        match self.catalog().and_then(|mut c| c.upsert(filename, &checksum)) {
            Ok(_) => {
                self.metrics.increment_catalog_uploads();
                log_event_with_fields(
                    Event::CatalogUpdated,
                    &[
                        ("checksum", checksum.as_str()),
                        ("filename", filename),
                        ("replica", self.replica.id.as_str()),
                    ],
                );
                UploadReply {
                    status: ReplyStatus::ok(),
                    filename: filename.to_string(),
                    checksum: Some(checksum),
                }
            }
            Err(e) => UploadReply::failure(request, e.to_string()),
        }
    }

    fn get(&self, request: &GetRequest) -> GetReply {
        GetReply::failure(request, self.refuse(MessageKind::Get))
    }

    fn get_file(&self, request: &GetFileRequest) -> GetFileReply {
        GetFileReply::failure(request, self.refuse(MessageKind::GetFile))
    }

    fn remove_and_get_file(&self, request: &RemoveAndGetFileRequest) -> RemoveAndGetFileReply {
        RemoveAndGetFileReply::failure(request, self.refuse(MessageKind::RemoveAndGetFile))
    }

    fn batch(&self, request: &BatchRequest) -> BatchReply {
        BatchReply::failure(request, self.refuse(MessageKind::Batch))
    }

    fn get_checksum(&self, request: &GetChecksumRequest) -> GetChecksumReply {
        match self.checksum(&request.filename) {
            Some(checksum) => GetChecksumReply {
                status: ReplyStatus::ok(),
                filename: request.filename.clone(),
                checksum: Some(checksum),
            },
            None => GetChecksumReply::failure(
                request,
                ChecksumError::NotFound(request.filename.clone()).to_string(),
            ),
        }
    }

    fn get_all_checksums(&self, request: &GetAllChecksumsRequest) -> GetAllChecksumsReply {
        let exported = self
            .catalog()
            .map(|c| c.export_checksums())
            .and_then(|text| self.materialize(&format!("{}-checksums", self.replica.id), text));
        match exported {
            Ok(output) => GetAllChecksumsReply {
                status: ReplyStatus::ok(),
                output: Some(output),
            },
            Err(e) => GetAllChecksumsReply::failure(request, e.to_string()),
        }
    }

    fn get_all_filenames(&self, request: &GetAllFilenamesRequest) -> GetAllFilenamesReply {
        let exported = self
            .catalog()
            .map(|c| c.export_filenames())
            .and_then(|text| self.materialize(&format!("{}-filenames", self.replica.id), text));
        match exported {
            Ok(output) => GetAllFilenamesReply {
                status: ReplyStatus::ok(),
                output: Some(output),
            },
            Err(e) => GetAllFilenamesReply::failure(request, e.to_string()),
        }
    }

    fn correct(&self, request: &CorrectRequest) -> CorrectReply {
        if !request.credentials.matches(&self.settings.credentials) {
            return CorrectReply::failure(
                request,
                ChecksumError::WrongCredentials(request.filename.clone()).to_string(),
            );
        }

        let new_checksum = match self.transfer.fetch(&request.file) {
            Ok(content) => md5_hex(&content),
            Err(e) => return CorrectReply::failure(request, e.to_string()),
        };

        let corrected = self.catalog().and_then(|mut catalog| {
            catalog.correct(&request.filename, &request.old_checksum, &new_checksum)
        });
        match corrected {
            Ok(removed) => {
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

impl ReplicaServer for ChecksumServer {
    fn replica(&self) -> &Replica {
        &self.replica
    }

    fn description(&self) -> &'static str {
        "checksum"
    }

    fn channels(&self, registry: &ChannelRegistry) -> ChannelResult<Vec<Channel>> {
        Ok(vec![registry.the_cr(&self.replica.id)?])
    }

    fn reload(&self) -> ServerResult<()> {
        let reload_error = |reason: String| ServerError::Reload {
            replica: self.replica.id.clone(),
            reason,
        };
        let mut catalog = self.catalog().map_err(|e| reload_error(e.to_string()))?;
        catalog.reload().map_err(|e| reload_error(e.to_string()))?;

        let entries = catalog.len().to_string();
        log_event_with_fields(
            Event::CatalogLoaded,
            &[("entries", entries.as_str()), ("replica", self.replica.id.as_str())],
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::LocalTransfer;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        transfer: Arc<LocalTransfer>,
        server: ChecksumServer,
    }

    fn fixture(use_precomputed_checksum: bool) -> Fixture {
        let temp = TempDir::new().unwrap();
        let catalog = temp.path().join("checksums.md5");
        std::fs::write(&catalog, "test1.arc##1234567890\ntest2.arc##0987654321\n").unwrap();
        let transfer = Arc::new(LocalTransfer::new(temp.path().join("staging")));
        let server = ChecksumServer::new(
            Replica::checksum("CS", "cs"),
            &catalog,
            transfer.clone(),
            ChecksumServerSettings {
                credentials: "42".into(),
                use_precomputed_checksum,
            },
            Arc::new(MetricsRegistry::new()),
        )
        .unwrap();
        Fixture {
            temp,
            transfer,
            server,
        }
    }

    fn lines(transfer: &LocalTransfer, output: &Option<crate::transfer::FileRef>) -> Vec<String> {
        let bytes = transfer.take(output.as_ref().unwrap()).unwrap();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_upload_then_get_checksum() {
        let f = fixture(false);
        let file = f.transfer.put("new.arc", b"content").unwrap();
        let reply = f.server.upload(&UploadRequest {
            file,
            precomputed_checksum: Some("ignored".into()),
        });
        assert!(reply.status.ok);
        assert_eq!(reply.checksum.as_deref(), Some(md5_hex(b"content").as_str()));

        let reply = f.server.get_checksum(&GetChecksumRequest {
            filename: "new.arc".into(),
            replica_id: "CS".into(),
        });
        assert_eq!(reply.checksum, Some(md5_hex(b"content")));
    }

    #[test]
    fn test_upload_uses_precomputed_when_configured() {
        let f = fixture(true);
        let file = f.transfer.put("NetarchiveSuite-test1.arc", b"anything").unwrap();
        let reply = f.server.upload(&UploadRequest {
            file,
            precomputed_checksum: Some("d87cc8068fa49f3a4926ce4d1cdf14e1".into()),
        });
        assert!(reply.status.ok);
        assert_eq!(
            f.server.checksum("NetarchiveSuite-test1.arc").as_deref(),
            Some("d87cc8068fa49f3a4926ce4d1cdf14e1")
        );
        assert_eq!(f.server.len(), 3);
    }

    #[test]
    fn test_unknown_checksum_is_not_found() {
        let f = fixture(false);
        let reply = f.server.get_checksum(&GetChecksumRequest {
            filename: "nope.arc".into(),
            replica_id: "CS".into(),
        });
        assert!(!reply.status.ok);
        assert!(reply.status.error.unwrap().contains("nope.arc"));
    }

    #[test]
    fn test_exports_are_repeatable() {
        let f = fixture(false);
        let request = GetAllFilenamesRequest {
            replica_id: "CS".into(),
        };
        let first = lines(&f.transfer, &f.server.get_all_filenames(&request).output);
        let second = lines(&f.transfer, &f.server.get_all_filenames(&request).output);
        assert_eq!(first, vec!["test1.arc", "test2.arc"]);
        assert_eq!(first, second);

        let checksums = f.server.get_all_checksums(&GetAllChecksumsRequest {
            replica_id: "CS".into(),
        });
        assert_eq!(
            lines(&f.transfer, &checksums.output),
            vec!["test1.arc##1234567890", "test2.arc##0987654321"]
        );
    }

    fn correct_request(f: &Fixture, old: &str, credentials: &str) -> CorrectRequest {
        CorrectRequest {
            filename: "test1.arc".into(),
            old_checksum: old.into(),
            file: f.transfer.put("test1.arc", b"fixed").unwrap(),
            replica_id: "CS".into(),
            credentials: Credentials::new(credentials),
        }
    }

    #[test]
    fn test_correct() {
        let f = fixture(false);
        let reply = f.server.correct(&correct_request(&f, "1234567890", "42"));
        assert!(reply.status.ok);
        assert_eq!(reply.removed_entry.as_deref(), Some("test1.arc##1234567890"));
        assert_eq!(f.server.checksum("test1.arc"), Some(md5_hex(b"fixed")));
    }

    #[test]
    fn test_correct_wrong_credentials() {
        let f = fixture(false);
        let reply = f.server.correct(&correct_request(&f, "1234567890", "41"));
        assert!(!reply.status.ok);
        assert!(reply.status.error.unwrap().contains("wrong credentials"));
        assert_eq!(f.server.checksum("test1.arc").as_deref(), Some("1234567890"));
    }

    #[test]
    fn test_correct_stale_checksum() {
        let f = fixture(false);
        let reply = f.server.correct(&correct_request(&f, "0000000000", "42"));
        assert!(!reply.status.ok);
        assert_eq!(f.server.checksum("test1.arc").as_deref(), Some("1234567890"));
    }

    #[test]
    fn test_content_kinds_refused() {
        let f = fixture(false);
        let reply = dispatch(
            &f.server,
            &Request::GetFile(GetFileRequest {
                filename: "test1.arc".into(),
                replica_id: "CS".into(),
            }),
        );
        assert!(!reply.is_ok());
        assert!(reply.error().unwrap().contains("GetFile"));
    }

    #[test]
    fn test_reload_reads_disk() {
        let f = fixture(false);
        std::fs::write(f.temp.path().join("checksums.md5"), "x.arc##1\n").unwrap();
        f.server.reload().unwrap();
        assert_eq!(f.server.len(), 1);
        assert_eq!(f.server.checksum("x.arc").as_deref(), Some("1"));
    }
}
