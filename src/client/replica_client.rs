//! # Replica Client
//!
//! Façade translating preservation verbs into protocol requests for one
//! replica. Kinds the replica type cannot serve are refused here and
//! never reach the broker.

use std::sync::Arc;
use std::time::Duration;

use super::capability::permits;
use super::errors::{ClientError, ClientResult};
use crate::batch::BatchJobDescriptor;
use crate::channels::{Channel, Replica};
use crate::connection::ConnectionManager;
use crate::observability::{log_event_with_fields, Event};
use crate::protocol::*;
use crate::transfer::FileRef;

fn mismatch(kind: MessageKind, reply: &Reply) -> ClientError {
    ProtocolError::MismatchedReply {
        request: kind.as_str(),
        reply: reply.kind().as_str(),
    }
    .into()
}

#[derive(Debug)]
pub struct ReplicaClient {
    replica: Replica,
    request_channel: Channel,
    batch_channel: Channel,
    connection: Arc<ConnectionManager>,
    timeout: Duration,
}

impl ReplicaClient {
    pub fn new(
        replica: Replica,
        connection: Arc<ConnectionManager>,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let registry = connection.registry();
        let request_channel = registry.request_channel(&replica.id)?;
        let batch_channel = registry.batch_channel(&replica.id)?;
        Ok(Self {
            replica,
            request_channel,
            batch_channel,
            connection,
            timeout,
        })
    }

    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    /// Destination of every request except batch jobs
    pub fn request_channel(&self) -> &Channel {
        &self.request_channel
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Refuse kinds the replica type cannot serve.
    pub fn check_permitted(&self, kind: MessageKind) -> ClientResult<()> {
        if permits(self.replica.replica_type, kind) {
            return Ok(());
        }
        self.connection.metrics().increment_capability_rejections();
        log_event_with_fields(
            Event::CapabilityRejected,
            &[
                ("kind", kind.as_str()),
                ("replica", self.replica.id.as_str()),
                ("replica_type", self.replica.replica_type.as_str()),
            ],
        );
        Err(ClientError::NotPermitted {
            kind,
            replica_type: self.replica.replica_type,
            replica: self.replica.id.clone(),
        })
    }

    /// Send any request and wait for its reply. Failed replies are
    /// returned as replies, not errors.
    pub async fn submit(&self, request: Request) -> ClientResult<Reply> {
        let kind = request.kind();
        self.check_permitted(kind)?;

        let to = match kind {
            MessageKind::Batch => self.batch_channel.clone(),
            _ => self.request_channel.clone(),
        };
        let mut message = Message::request(to, self.connection.reply_channel(), request);
        Ok(self.connection.request(&mut message, self.timeout).await?)
    }

    pub async fn upload(
        &self,
        file: FileRef,
        precomputed_checksum: Option<String>,
    ) -> ClientResult<UploadReply> {
        let request = Request::Upload(UploadRequest {
            file,
            precomputed_checksum,
        });
        match self.submit(request).await? {
            Reply::Upload(reply) => Ok(reply),
            other => Err(mismatch(MessageKind::Upload, &other)),
        }
    }

    pub async fn get(&self, filename: &str, offset: u64) -> ClientResult<GetReply> {
        let request = Request::Get(GetRequest {
            filename: filename.to_string(),
            offset,
        });
        match self.submit(request).await? {
            Reply::Get(reply) => Ok(reply),
            other => Err(mismatch(MessageKind::Get, &other)),
        }
    }

    pub async fn get_file(&self, filename: &str) -> ClientResult<GetFileReply> {
        let request = Request::GetFile(GetFileRequest {
            filename: filename.to_string(),
            replica_id: self.replica.id.clone(),
        });
        match self.submit(request).await? {
            Reply::GetFile(reply) => Ok(reply),
            other => Err(mismatch(MessageKind::GetFile, &other)),
        }
    }

    pub async fn remove_and_get_file(
        &self,
        filename: &str,
        checksum: &str,
        credentials: Credentials,
    ) -> ClientResult<RemoveAndGetFileReply> {
        let request = Request::RemoveAndGetFile(RemoveAndGetFileRequest {
            filename: filename.to_string(),
            replica_id: self.replica.id.clone(),
            checksum: checksum.to_string(),
            credentials,
        });
        match self.submit(request).await? {
            Reply::RemoveAndGetFile(reply) => Ok(reply),
            other => Err(mismatch(MessageKind::RemoveAndGetFile, &other)),
        }
    }

    pub async fn batch(&self, job: BatchJobDescriptor) -> ClientResult<BatchReply> {
        let request = Request::Batch(BatchRequest {
            job,
            replica_id: self.replica.id.clone(),
        });
        match self.submit(request).await? {
            Reply::Batch(reply) => Ok(reply),
            other => Err(mismatch(MessageKind::Batch, &other)),
        }
    }

    pub async fn get_checksum(&self, filename: &str) -> ClientResult<GetChecksumReply> {
        let request = Request::GetChecksum(GetChecksumRequest {
            filename: filename.to_string(),
            replica_id: self.replica.id.clone(),
        });
        match self.submit(request).await? {
            Reply::GetChecksum(reply) => Ok(reply),
            other => Err(mismatch(MessageKind::GetChecksum, &other)),
        }
    }

    pub async fn get_all_checksums(&self) -> ClientResult<GetAllChecksumsReply> {
        let request = Request::GetAllChecksums(GetAllChecksumsRequest {
            replica_id: self.replica.id.clone(),
        });
        match self.submit(request).await? {
            Reply::GetAllChecksums(reply) => Ok(reply),
            other => Err(mismatch(MessageKind::GetAllChecksums, &other)),
        }
    }

    pub async fn get_all_filenames(&self) -> ClientResult<GetAllFilenamesReply> {
        let request = Request::GetAllFilenames(GetAllFilenamesRequest {
            replica_id: self.replica.id.clone(),
        });
        match self.submit(request).await? {
            Reply::GetAllFilenames(reply) => Ok(reply),
            other => Err(mismatch(MessageKind::GetAllFilenames, &other)),
        }
    }

    pub async fn correct(
        &self,
        filename: &str,
        old_checksum: &str,
        file: FileRef,
        credentials: Credentials,
    ) -> ClientResult<CorrectReply> {
        let request = Request::Correct(CorrectRequest {
            filename: filename.to_string(),
            old_checksum: old_checksum.to_string(),
            file,
            replica_id: self.replica.id.clone(),
            credentials,
        });
        match self.submit(request).await? {
            Reply::Correct(reply) => Ok(reply),
            other => Err(mismatch(MessageKind::Correct, &other)),
        }
    }
}

/// Turn a failed reply status into [`ClientError::Rejected`].
pub fn require_ok(kind: MessageKind, replica: &str, status: &ReplyStatus) -> ClientResult<()> {
    if status.ok {
        Ok(())
    } else {
        Err(ClientError::Rejected {
            kind,
            replica: replica.to_string(),
            reason: status.error.clone().unwrap_or_default(),
        })
    }
}
