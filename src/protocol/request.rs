//! # Requests
//!
//! One payload type per message kind, with the fields that kind requires.

use serde::{Deserialize, Serialize};

use super::credentials::Credentials;
use super::kind::MessageKind;
use super::reply::*;
use crate::batch::BatchJobDescriptor;
use crate::transfer::FileRef;

/// Store a file. The file name is the name carried by the reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRequest {
    pub file: FileRef,
    pub precomputed_checksum: Option<String>,
}

/// Read a single record, starting at `offset`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    pub filename: String,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFileRequest {
    pub filename: String,
    pub replica_id: String,
}

/// Take a file out of a replica. Guarded by credentials and the checksum
/// the caller believes the file has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveAndGetFileRequest {
    pub filename: String,
    pub replica_id: String,
    pub checksum: String,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub job: BatchJobDescriptor,
    pub replica_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetChecksumRequest {
    pub filename: String,
    pub replica_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAllChecksumsRequest {
    pub replica_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAllFilenamesRequest {
    pub replica_id: String,
}

/// Replace a catalog entry whose current checksum is `old_checksum`
/// with the checksum of `file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectRequest {
    pub filename: String,
    pub old_checksum: String,
    pub file: FileRef,
    pub replica_id: String,
    pub credentials: Credentials,
}

/// A request of any kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fields")]
pub enum Request {
    Upload(UploadRequest),
    Get(GetRequest),
    GetFile(GetFileRequest),
    RemoveAndGetFile(RemoveAndGetFileRequest),
    Batch(BatchRequest),
    GetChecksum(GetChecksumRequest),
    GetAllChecksums(GetAllChecksumsRequest),
    GetAllFilenames(GetAllFilenamesRequest),
    Correct(CorrectRequest),
}

impl Request {
    pub fn kind(&self) -> MessageKind {
        match self {
            Request::Upload(_) => MessageKind::Upload,
            Request::Get(_) => MessageKind::Get,
            Request::GetFile(_) => MessageKind::GetFile,
            Request::RemoveAndGetFile(_) => MessageKind::RemoveAndGetFile,
            Request::Batch(_) => MessageKind::Batch,
            Request::GetChecksum(_) => MessageKind::GetChecksum,
            Request::GetAllChecksums(_) => MessageKind::GetAllChecksums,
            Request::GetAllFilenames(_) => MessageKind::GetAllFilenames,
            Request::Correct(_) => MessageKind::Correct,
        }
    }

    /// The file the request is about, if any
    pub fn filename(&self) -> Option<&str> {
        match self {
            Request::Upload(r) => Some(&r.file.name),
            Request::Get(r) => Some(&r.filename),
            Request::GetFile(r) => Some(&r.filename),
            Request::RemoveAndGetFile(r) => Some(&r.filename),
            Request::GetChecksum(r) => Some(&r.filename),
            Request::Correct(r) => Some(&r.filename),
            Request::Batch(_) | Request::GetAllChecksums(_) | Request::GetAllFilenames(_) => None,
        }
    }

    /// The replica the request names, if the kind carries one
    pub fn replica_id(&self) -> Option<&str> {
        match self {
            Request::Upload(_) | Request::Get(_) => None,
            Request::GetFile(r) => Some(&r.replica_id),
            Request::RemoveAndGetFile(r) => Some(&r.replica_id),
            Request::Batch(r) => Some(&r.replica_id),
            Request::GetChecksum(r) => Some(&r.replica_id),
            Request::GetAllChecksums(r) => Some(&r.replica_id),
            Request::GetAllFilenames(r) => Some(&r.replica_id),
            Request::Correct(r) => Some(&r.replica_id),
        }
    }

    /// The failed reply of the matching kind
    pub fn failure(&self, error: impl Into<String>) -> Reply {
        match self {
            Request::Upload(r) => Reply::Upload(UploadReply::failure(r, error)),
            Request::Get(r) => Reply::Get(GetReply::failure(r, error)),
            Request::GetFile(r) => Reply::GetFile(GetFileReply::failure(r, error)),
            Request::RemoveAndGetFile(r) => {
                Reply::RemoveAndGetFile(RemoveAndGetFileReply::failure(r, error))
            }
            Request::Batch(r) => Reply::Batch(BatchReply::failure(r, error)),
            Request::GetChecksum(r) => Reply::GetChecksum(GetChecksumReply::failure(r, error)),
            Request::GetAllChecksums(r) => {
                Reply::GetAllChecksums(GetAllChecksumsReply::failure(r, error))
            }
            Request::GetAllFilenames(r) => {
                Reply::GetAllFilenames(GetAllFilenamesReply::failure(r, error))
            }
            Request::Correct(r) => Reply::Correct(CorrectReply::failure(r, error)),
        }
    }
}
