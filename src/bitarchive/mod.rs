//! # Bitarchive Replica
//!
//! Full-content replica: stores archived files in a directory and serves
//! reads, batch jobs and checksum queries computed from the content.

mod errors;
mod server;
mod store;

pub use errors::{BitarchiveError, BitarchiveResult};
pub use server::BitarchiveServer;
pub use store::ArchiveStore;
