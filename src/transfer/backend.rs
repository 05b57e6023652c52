//! # File Transfer Trait

use std::path::Path;

use super::errors::{TransferError, TransferResult};
use super::file_ref::FileRef;

/// Produces and consumes byte streams by reference.
///
/// Upload sources, correction sources and batch/catalog outputs all move
/// through this trait; how bytes travel between hosts is up to the
/// implementation.
pub trait FileTransfer: Send + Sync + std::fmt::Debug {
    /// Store bytes and return a reference to them
    fn put(&self, name: &str, data: &[u8]) -> TransferResult<FileRef>;

    /// Read the bytes behind a reference
    fn fetch(&self, file: &FileRef) -> TransferResult<Vec<u8>>;

    /// Release the bytes behind a reference. Disposing twice is an error.
    fn dispose(&self, file: &FileRef) -> TransferResult<()>;

    /// Whether the reference can still be fetched
    fn exists(&self, file: &FileRef) -> bool;

    /// Store the content of a local file
    fn put_path(&self, path: &Path) -> TransferResult<FileRef> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::InvalidName(path.display().to_string()))?;
        let data = std::fs::read(path).map_err(|e| TransferError::IoError(e.to_string()))?;
        self.put(name, &data)
    }

    /// Read the bytes and dispose of the reference
    fn take(&self, file: &FileRef) -> TransferResult<Vec<u8>> {
        let data = self.fetch(file)?;
        self.dispose(file)?;
        Ok(data)
    }
}
