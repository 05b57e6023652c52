//! # File References
//!
//! Bytes never travel inside messages; a message carries a reference that
//! the receiver resolves through a [`super::FileTransfer`].

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to bytes held by a file transfer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRef {
    /// Storage key
    pub id: Uuid,
    /// Logical file name (e.g. the archive file name)
    pub name: String,
    /// Size in bytes
    pub size: u64,
}

impl FileRef {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            size,
        }
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes, {})", self.name, self.size, self.id)
    }
}
