//! # Replica Clients
//!
//! Per-replica façades enforcing the capability matrix before any
//! network I/O, and the factory that owns them.

mod capability;
mod errors;
mod factory;
mod replica_client;

pub use capability::{permits, permitted_kinds};
pub use errors::{ClientError, ClientResult};
pub use factory::ReplicaClientFactory;
pub use replica_client::{require_ok, ReplicaClient};
