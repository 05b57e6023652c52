//! # File Transfer
//!
//! The "bytes by reference" collaborator used for upload sources,
//! correction sources and materialized outputs.

mod backend;
mod errors;
mod file_ref;
mod local;

pub use backend::FileTransfer;
pub use errors::{TransferError, TransferResult};
pub use file_ref::FileRef;
pub use local::LocalTransfer;
