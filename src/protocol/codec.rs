//! # Wire Codec
//!
//! Envelopes travel as JSON in the frame payload.

use super::errors::{ProtocolError, ProtocolResult};
use super::message::{Message, MessageId};
use crate::channels::Channel;
use crate::transport::Frame;

/// Encode `message` for `destination`, carrying `id`.
pub fn encode(message: &Message, id: &MessageId, destination: &Channel) -> ProtocolResult<Frame> {
    let payload =
        serde_json::to_vec(&message.with_id(id)).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(Frame {
        message_id: id.to_string(),
        destination: destination.name().to_string(),
        payload,
    })
}

/// Decode a received frame. The message counts as sent; it takes the
/// frame's id only if the envelope carried none.
pub fn decode(frame: &Frame) -> ProtocolResult<Message> {
    let mut message: Message = serde_json::from_slice(&frame.payload)
        .map_err(|e| ProtocolError::Undecodable(e.to_string()))?;
    message.mark_sent(MessageId::from(frame.message_id.clone()));
    Ok(message)
}
