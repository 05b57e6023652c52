//! # Replicas
//!
//! A replica is an independently operated copy of the holdings. Its type is
//! fixed by configuration and decides which requests it may receive.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The storage kind of a replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaType {
    /// Stores full file content, serves reads and batch jobs
    Bitarchive,
    /// Stores only (filename, checksum) entries
    Checksum,
}

impl ReplicaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicaType::Bitarchive => "bitarchive",
            ReplicaType::Checksum => "checksum",
        }
    }
}

impl fmt::Display for ReplicaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named storage target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Replica {
    /// Short id used in channel names (e.g. `ONE`, `CS`)
    pub id: String,

    /// Human readable name
    pub name: String,

    /// Immutable replica type
    #[serde(rename = "type")]
    pub replica_type: ReplicaType,
}

impl Replica {
    pub fn new(id: impl Into<String>, name: impl Into<String>, replica_type: ReplicaType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            replica_type,
        }
    }

    pub fn bitarchive(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, ReplicaType::Bitarchive)
    }

    pub fn checksum(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, ReplicaType::Checksum)
    }

    pub fn is_checksum(&self) -> bool {
        self.replica_type == ReplicaType::Checksum
    }
}

impl fmt::Display for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.id, self.name, self.replica_type)
    }
}
