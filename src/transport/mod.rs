//! # Transport
//!
//! The broker seam underneath the connection layer, plus an in-process
//! broker used for embedded deployments and tests.

mod broker;
mod errors;
mod local;

pub use broker::{Broker, BrokerSession, Frame, FrameReceiver, Subscription};
pub use errors::{TransportError, TransportResult};
pub use local::{LocalBroker, LocalSession};
