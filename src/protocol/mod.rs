//! # Message Protocol
//!
//! The closed set of request kinds, their replies, the envelope they
//! travel in and the handler contract servers implement.
//!
//! ```ignore
//! let reply = dispatch(&server, &request);
//! assert_eq!(reply.kind(), request.kind());
//! ```

mod codec;
mod credentials;
mod errors;
mod handler;
mod kind;
mod message;
mod reply;
mod request;

pub use codec::{decode, encode};
pub use credentials::Credentials;
pub use errors::{ProtocolError, ProtocolResult};
pub use handler::{dispatch, unsupported, ArchiveMessageHandler};
pub use kind::MessageKind;
pub use message::{Message, MessageId, Payload};
pub use reply::{
    BatchReply, CorrectReply, GetAllChecksumsReply, GetAllFilenamesReply, GetChecksumReply,
    GetFileReply, GetReply, RemoveAndGetFileReply, Reply, ReplyStatus, UploadReply,
};
pub use request::{
    BatchRequest, CorrectRequest, GetAllChecksumsRequest, GetAllFilenamesRequest,
    GetChecksumRequest, GetFileRequest, GetRequest, RemoveAndGetFileRequest, Request,
    UploadRequest,
};
