//! # Message Envelope
//!
//! A message's id is assigned by its first successful send and frozen
//! afterwards; resending reuses it. A reply carries the id of the
//! request it answers as its correlation id.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{ProtocolError, ProtocolResult};
use super::kind::MessageKind;
use super::reply::Reply;
use super::request::Request;
use crate::channels::Channel;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Fresh unique id
    pub fn generate() -> Self {
        Self(format!("ID:{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum Payload {
    Request(Request),
    Reply(Reply),
}

impl Payload {
    fn name(&self) -> &'static str {
        match self {
            Payload::Request(_) => "request",
            Payload::Reply(_) => "reply",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: Option<MessageId>,
    correlation_id: Option<MessageId>,
    to: Channel,
    reply_to: Channel,
    #[serde(skip)]
    sent: bool,
    payload: Payload,
}

impl Message {
    /// New, unsent request
    pub fn request(to: Channel, reply_to: Channel, request: Request) -> Self {
        Self {
            id: None,
            correlation_id: None,
            to,
            reply_to,
            sent: false,
            payload: Payload::Request(request),
        }
    }

    /// New, unsent reply to this message, addressed to its reply-to
    /// channel.
    pub fn answer(&self, reply: Reply) -> Self {
        Self {
            id: None,
            correlation_id: self.id.clone(),
            to: self.reply_to.clone(),
            reply_to: self.to.clone(),
            sent: false,
            payload: Payload::Reply(reply),
        }
    }

    pub fn id(&self) -> Option<&MessageId> {
        self.id.as_ref()
    }

    /// Id of the request a reply answers
    pub fn correlation_id(&self) -> Option<&MessageId> {
        self.correlation_id.as_ref()
    }

    pub fn to(&self) -> &Channel {
        &self.to
    }

    pub fn reply_to(&self) -> &Channel {
        &self.reply_to
    }

    /// Whether the message has been handed to the broker at least once.
    /// Received messages count as sent.
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn kind(&self) -> MessageKind {
        match &self.payload {
            Payload::Request(request) => request.kind(),
            Payload::Reply(reply) => reply.kind(),
        }
    }

    pub fn as_request(&self) -> Option<&Request> {
        match &self.payload {
            Payload::Request(request) => Some(request),
            Payload::Reply(_) => None,
        }
    }

    pub fn as_reply(&self) -> Option<&Reply> {
        match &self.payload {
            Payload::Reply(reply) => Some(reply),
            Payload::Request(_) => None,
        }
    }

    pub fn into_reply(self) -> ProtocolResult<Reply> {
        match self.payload {
            Payload::Reply(reply) => Ok(reply),
            other => Err(ProtocolError::UnexpectedPayload {
                expected: "reply",
                actual: other.name(),
            }),
        }
    }

    pub fn into_request(self) -> ProtocolResult<Request> {
        match self.payload {
            Payload::Request(request) => Ok(request),
            other => Err(ProtocolError::UnexpectedPayload {
                expected: "request",
                actual: other.name(),
            }),
        }
    }

    /// The id the next send will carry: the frozen id, or a candidate.
    pub(crate) fn outgoing_id(&self) -> MessageId {
        self.id.clone().unwrap_or_else(MessageId::generate)
    }

    /// Record a successful send. An existing id is never replaced.
    pub(crate) fn mark_sent(&mut self, id: MessageId) {
        if self.id.is_none() {
            self.id = Some(id);
        }
        self.sent = true;
    }

    /// Copy for the wire, carrying `id`.
    pub(crate) fn with_id(&self, id: &MessageId) -> Self {
        let mut copy = self.clone();
        copy.id = Some(id.clone());
        copy
    }
}
