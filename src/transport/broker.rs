//! # Broker Abstraction
//!
//! The connection layer talks to a message broker through these traits.
//! Operations are non-blocking; delivery to listeners happens through the
//! receiving half of an unbounded channel per subscription.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::errors::TransportResult;
use crate::channels::Channel;

/// An encoded message in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message id, frozen after the first successful send
    pub message_id: String,
    /// Destination channel name
    pub destination: String,
    /// Encoded envelope
    pub payload: Vec<u8>,
}

/// Receiving half of a subscription
pub type FrameReceiver = mpsc::UnboundedReceiver<Frame>;

/// A live subscription on one destination
#[derive(Debug)]
pub struct Subscription {
    /// Broker-assigned subscription id
    pub id: u64,
    /// Frames delivered to this subscription
    pub receiver: FrameReceiver,
}

/// Factory for broker sessions
pub trait Broker: Send + Sync + fmt::Debug {
    /// Open a new session. Queue and topic traffic share one session.
    fn connect(&self) -> TransportResult<Arc<dyn BrokerSession>>;
}

/// One connection to the broker
pub trait BrokerSession: Send + Sync + fmt::Debug {
    /// Hand a frame to the broker. Returns once the broker accepted it.
    fn publish(&self, frame: Frame) -> TransportResult<()>;

    /// Start receiving frames sent to `destination`.
    fn subscribe(&self, destination: &Channel) -> TransportResult<Subscription>;

    /// Stop a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, subscription_id: u64) -> TransportResult<()>;

    /// Whether the session is still usable.
    fn is_open(&self) -> bool;

    /// Close the session and all of its subscriptions.
    fn close(&self);
}
