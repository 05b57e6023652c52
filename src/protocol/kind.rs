//! # Message Kinds

use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of request kinds. Each has exactly one reply kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    Upload,
    Get,
    GetFile,
    RemoveAndGetFile,
    Batch,
    GetChecksum,
    GetAllChecksums,
    GetAllFilenames,
    Correct,
}

impl MessageKind {
    pub const ALL: [MessageKind; 9] = [
        MessageKind::Upload,
        MessageKind::Get,
        MessageKind::GetFile,
        MessageKind::RemoveAndGetFile,
        MessageKind::Batch,
        MessageKind::GetChecksum,
        MessageKind::GetAllChecksums,
        MessageKind::GetAllFilenames,
        MessageKind::Correct,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Upload => "Upload",
            MessageKind::Get => "Get",
            MessageKind::GetFile => "GetFile",
            MessageKind::RemoveAndGetFile => "RemoveAndGetFile",
            MessageKind::Batch => "Batch",
            MessageKind::GetChecksum => "GetChecksum",
            MessageKind::GetAllChecksums => "GetAllChecksums",
            MessageKind::GetAllFilenames => "GetAllFilenames",
            MessageKind::Correct => "Correct",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
