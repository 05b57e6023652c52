//! # Replica Servers
//!
//! The lifecycle shared by the checksum and bitarchive servers: which
//! channels a server listens on, how its state is reloaded, and the
//! registry keeping one live server per replica.

mod errors;
mod listener;
mod registry;

pub use errors::{ServerError, ServerResult};
pub use registry::ServerRegistry;

use crate::channels::{Channel, ChannelRegistry, ChannelResult, Replica};
use crate::protocol::ArchiveMessageHandler;

/// A server owning one replica's storage
pub trait ReplicaServer: ArchiveMessageHandler {
    fn replica(&self) -> &Replica;

    /// Short name used in logs and rejection messages
    fn description(&self) -> &'static str;

    /// Channels the server listens on
    fn channels(&self, registry: &ChannelRegistry) -> ChannelResult<Vec<Channel>>;

    /// Discard in-memory state and read it again from disk.
    fn reload(&self) -> ServerResult<()>;
}
