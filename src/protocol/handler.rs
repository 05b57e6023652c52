//! # Handler Contract
//!
//! A server implements one operation per request kind. There are no
//! default implementations: a server that does not support a kind must
//! say so in a failed reply.

use super::kind::MessageKind;
use super::reply::*;
use super::request::*;

pub trait ArchiveMessageHandler: Send + Sync {
    fn upload(&self, request: &UploadRequest) -> UploadReply;

    fn get(&self, request: &GetRequest) -> GetReply;

    fn get_file(&self, request: &GetFileRequest) -> GetFileReply;

    fn remove_and_get_file(&self, request: &RemoveAndGetFileRequest) -> RemoveAndGetFileReply;

    fn batch(&self, request: &BatchRequest) -> BatchReply;

    fn get_checksum(&self, request: &GetChecksumRequest) -> GetChecksumReply;

    fn get_all_checksums(&self, request: &GetAllChecksumsRequest) -> GetAllChecksumsReply;

    fn get_all_filenames(&self, request: &GetAllFilenamesRequest) -> GetAllFilenamesReply;

    fn correct(&self, request: &CorrectRequest) -> CorrectReply;
}

/// Forward a request to the handler operation for its kind.
pub fn dispatch<H>(handler: &H, request: &Request) -> Reply
where
    H: ArchiveMessageHandler + ?Sized,
{
    match request {
        Request::Upload(r) => Reply::Upload(handler.upload(r)),
        Request::Get(r) => Reply::Get(handler.get(r)),
        Request::GetFile(r) => Reply::GetFile(handler.get_file(r)),
        Request::RemoveAndGetFile(r) => Reply::RemoveAndGetFile(handler.remove_and_get_file(r)),
        Request::Batch(r) => Reply::Batch(handler.batch(r)),
        Request::GetChecksum(r) => Reply::GetChecksum(handler.get_checksum(r)),
        Request::GetAllChecksums(r) => Reply::GetAllChecksums(handler.get_all_checksums(r)),
        Request::GetAllFilenames(r) => Reply::GetAllFilenames(handler.get_all_filenames(r)),
        Request::Correct(r) => Reply::Correct(handler.correct(r)),
    }
}

/// Error text for a kind a server does not handle.
pub fn unsupported(kind: MessageKind, server: &str) -> String {
    format!("{} is not supported by {}", kind, server)
}
