//! Reconciliation reports and snapshots.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How checksums are collected from a replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumStrategy {
    /// One GetAllChecksums exchange
    #[default]
    Bulk,
    /// One GetChecksum exchange per expected file
    PerFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingFilesReport {
    pub replica_id: String,
    /// Expected by the authority, absent from the replica
    pub missing: BTreeSet<String>,
    /// Held by the replica, unknown to the authority for it
    pub extra: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFilesReport {
    pub replica_id: String,
    /// Filename to the checksum the replica reported
    pub changed: BTreeMap<String, String>,
}

impl ChangedFilesReport {
    pub fn filenames(&self) -> BTreeSet<String> {
        self.changed.keys().cloned().collect()
    }
}

/// Outcome of repairing a set of files
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub repaired: Vec<String>,
    /// (filename, reason)
    pub failed: Vec<(String, String)>,
}

impl RepairReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_filenames(&self) -> Vec<&str> {
        self.failed.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub(crate) fn merge(&mut self, other: RepairReport) {
        self.repaired.extend(other.repaired);
        self.failed.extend(other.failed);
    }
}

/// Per-replica counters from the most recent passes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSummary {
    pub replica_id: String,
    pub file_count: usize,
    pub missing: usize,
    pub changed: usize,
    pub last_missing_check: Option<DateTime<Utc>>,
    pub last_changed_check: Option<DateTime<Utc>>,
}

impl ReplicaSummary {
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            file_count: 0,
            missing: 0,
            changed: 0,
            last_missing_check: None,
            last_changed_check: None,
        }
    }
}

/// State of one file across every replica, computed on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreservationState {
    pub filename: String,
    pub expected_checksum: Option<String>,
    /// Replica id to reported checksum; `None` when the replica has no entry
    pub observed: BTreeMap<String, Option<String>>,
    /// Replicas expected to hold the file that report nothing
    pub missing_on: BTreeSet<String>,
    pub computed_at: DateTime<Utc>,
}

impl PreservationState {
    /// Replicas reporting a checksum other than the expected one
    pub fn changed_on(&self) -> BTreeSet<String> {
        let Some(expected) = &self.expected_checksum else {
            return BTreeSet::new();
        };
        self.observed
            .iter()
            .filter(|(_, observed)| matches!(observed, Some(c) if c != expected))
            .map(|(replica, _)| replica.clone())
            .collect()
    }

    pub fn is_consistent(&self) -> bool {
        self.missing_on.is_empty() && self.changed_on().is_empty()
    }
}
