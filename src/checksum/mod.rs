//! # Checksum Store
//!
//! MD5 helpers, the durable `filename##checksum` catalog and the server
//! answering catalog queries and mutations for a checksum replica.

mod catalog;
mod digest;
mod errors;
mod server;

pub use catalog::{parse_catalog, ChecksumCatalog, ChecksumEntry, SEPARATOR};
pub use digest::{md5_file, md5_hex};
pub use errors::{ChecksumError, ChecksumResult};
pub use server::{ChecksumServer, ChecksumServerSettings};
