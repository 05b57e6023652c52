//! # Replies
//!
//! Every reply carries a status: a success flag and, on failure, the
//! reason. Rejections (bad credentials, stale checksum, unknown file,
//! unsupported kind) are ordinary failed replies.

use serde::{Deserialize, Serialize};

use super::kind::MessageKind;
use super::request::*;
use crate::batch::BatchResult;
use crate::transfer::FileRef;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyStatus {
    pub ok: bool,
    pub error: Option<String>,
}

impl ReplyStatus {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReply {
    pub status: ReplyStatus,
    pub filename: String,
    /// Checksum recorded for the uploaded file
    pub checksum: Option<String>,
}

impl UploadReply {
    pub fn failure(request: &UploadRequest, error: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::failed(error),
            filename: request.file.name.clone(),
            checksum: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetReply {
    pub status: ReplyStatus,
    pub filename: String,
    pub offset: u64,
    /// Record bytes from the requested offset
    pub record: Option<FileRef>,
}

impl GetReply {
    pub fn failure(request: &GetRequest, error: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::failed(error),
            filename: request.filename.clone(),
            offset: request.offset,
            record: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFileReply {
    pub status: ReplyStatus,
    pub filename: String,
    pub file: Option<FileRef>,
}

impl GetFileReply {
    pub fn failure(request: &GetFileRequest, error: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::failed(error),
            filename: request.filename.clone(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveAndGetFileReply {
    pub status: ReplyStatus,
    pub filename: String,
    /// Content of the removed file
    pub removed: Option<FileRef>,
}

impl RemoveAndGetFileReply {
    pub fn failure(request: &RemoveAndGetFileRequest, error: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::failed(error),
            filename: request.filename.clone(),
            removed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReply {
    pub status: ReplyStatus,
    pub job: String,
    pub result: Option<BatchResult>,
}

impl BatchReply {
    pub fn failure(request: &BatchRequest, error: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::failed(error),
            job: request.job.job.clone(),
            result: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetChecksumReply {
    pub status: ReplyStatus,
    pub filename: String,
    pub checksum: Option<String>,
}

impl GetChecksumReply {
    pub fn failure(request: &GetChecksumRequest, error: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::failed(error),
            filename: request.filename.clone(),
            checksum: None,
        }
    }
}

/// Catalog-format output (`filename##checksum` lines)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAllChecksumsReply {
    pub status: ReplyStatus,
    pub output: Option<FileRef>,
}

impl GetAllChecksumsReply {
    pub fn failure(_request: &GetAllChecksumsRequest, error: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::failed(error),
            output: None,
        }
    }
}

/// One filename per line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAllFilenamesReply {
    pub status: ReplyStatus,
    pub output: Option<FileRef>,
}

impl GetAllFilenamesReply {
    pub fn failure(_request: &GetAllFilenamesRequest, error: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::failed(error),
            output: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectReply {
    pub status: ReplyStatus,
    pub filename: String,
    /// The replaced entry, in catalog format
    pub removed_entry: Option<String>,
    pub new_checksum: Option<String>,
}

impl CorrectReply {
    pub fn failure(request: &CorrectRequest, error: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::failed(error),
            filename: request.filename.clone(),
            removed_entry: None,
            new_checksum: None,
        }
    }
}

/// A reply of any kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fields")]
pub enum Reply {
    Upload(UploadReply),
    Get(GetReply),
    GetFile(GetFileReply),
    RemoveAndGetFile(RemoveAndGetFileReply),
    Batch(BatchReply),
    GetChecksum(GetChecksumReply),
    GetAllChecksums(GetAllChecksumsReply),
    GetAllFilenames(GetAllFilenamesReply),
    Correct(CorrectReply),
}

impl Reply {
    /// Kind of the request this reply answers
    pub fn kind(&self) -> MessageKind {
        match self {
            Reply::Upload(_) => MessageKind::Upload,
            Reply::Get(_) => MessageKind::Get,
            Reply::GetFile(_) => MessageKind::GetFile,
            Reply::RemoveAndGetFile(_) => MessageKind::RemoveAndGetFile,
            Reply::Batch(_) => MessageKind::Batch,
            Reply::GetChecksum(_) => MessageKind::GetChecksum,
            Reply::GetAllChecksums(_) => MessageKind::GetAllChecksums,
            Reply::GetAllFilenames(_) => MessageKind::GetAllFilenames,
            Reply::Correct(_) => MessageKind::Correct,
        }
    }

    pub fn status(&self) -> &ReplyStatus {
        match self {
            Reply::Upload(r) => &r.status,
            Reply::Get(r) => &r.status,
            Reply::GetFile(r) => &r.status,
            Reply::RemoveAndGetFile(r) => &r.status,
            Reply::Batch(r) => &r.status,
            Reply::GetChecksum(r) => &r.status,
            Reply::GetAllChecksums(r) => &r.status,
            Reply::GetAllFilenames(r) => &r.status,
            Reply::Correct(r) => &r.status,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status().ok
    }

    pub fn error(&self) -> Option<&str> {
        self.status().error.as_deref()
    }
}
