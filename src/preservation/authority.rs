//! # Admin Authority
//!
//! Read-only ground truth for reconciliation: which files each replica
//! should hold and what their checksums should be.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

/// Source of expected preservation state
pub trait AdminAuthority: Send + Sync {
    /// Files the replica is expected to hold
    fn expected_files(&self, replica_id: &str) -> BTreeSet<String>;

    /// Recorded checksum of a file
    fn expected_checksum(&self, filename: &str) -> Option<String>;

    /// Replicas expected to hold a file
    fn expected_replicas(&self, filename: &str) -> BTreeSet<String>;

    /// Every file the authority knows
    fn all_filenames(&self) -> BTreeSet<String>;
}

#[derive(Debug, Clone)]
struct FileRecord {
    checksum: String,
    replicas: BTreeSet<String>,
}

/// Authority kept in memory, for embedding and tests
#[derive(Debug, Default)]
pub struct InMemoryAdminAuthority {
    files: RwLock<BTreeMap<String, FileRecord>>,
}

impl InMemoryAdminAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the expected state of a file.
    pub fn record<I, S>(&self, filename: &str, checksum: &str, replicas: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let record = FileRecord {
            checksum: checksum.to_string(),
            replicas: replicas.into_iter().map(Into::into).collect(),
        };
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(filename.to_string(), record);
    }

    pub fn forget(&self, filename: &str) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(filename);
    }

    fn read<T>(&self, f: impl FnOnce(&BTreeMap<String, FileRecord>) -> T) -> T {
        f(&self.files.read().unwrap_or_else(PoisonError::into_inner))
    }
}

impl AdminAuthority for InMemoryAdminAuthority {
    fn expected_files(&self, replica_id: &str) -> BTreeSet<String> {
        self.read(|files| {
            files
                .iter()
                .filter(|(_, record)| record.replicas.contains(replica_id))
                .map(|(name, _)| name.clone())
                .collect()
        })
    }

    fn expected_checksum(&self, filename: &str) -> Option<String> {
        self.read(|files| files.get(filename).map(|r| r.checksum.clone()))
    }

    fn expected_replicas(&self, filename: &str) -> BTreeSet<String> {
        self.read(|files| {
            files
                .get(filename)
                .map(|r| r.replicas.clone())
                .unwrap_or_default()
        })
    }

    fn all_filenames(&self) -> BTreeSet<String> {
        self.read(|files| files.keys().cloned().collect())
    }
}
