//! # Channel Registry
//!
//! Logical destinations (per-replica queues, broadcast topics, the error
//! channel, per-process reply queues) resolved to stable names.

mod channel;
mod errors;
mod registry;
mod replica;

pub use channel::{is_topic, Channel, ChannelKind, ChannelScope, Topology};
pub use errors::{ChannelError, ChannelResult};
pub use registry::{ChannelRegistry, COMMON};
pub use replica::{Replica, ReplicaType};
