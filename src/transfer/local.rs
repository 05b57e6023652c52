//! # Local Directory Transfer
//!
//! Keeps transferred bytes in one staging directory shared by the
//! processes of a host.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use super::backend::FileTransfer;
use super::errors::{TransferError, TransferResult};
use super::file_ref::FileRef;

/// Staging-directory file transfer
#[derive(Debug, Clone)]
pub struct LocalTransfer {
    root: PathBuf,
}

impl LocalTransfer {
    /// Create a transfer rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, file: &FileRef) -> PathBuf {
        self.root.join(file.id.to_string())
    }

    fn map_io(file: &FileRef, e: std::io::Error) -> TransferError {
        if e.kind() == ErrorKind::NotFound {
            TransferError::NotFound(file.to_string())
        } else {
            TransferError::IoError(e.to_string())
        }
    }
}

impl FileTransfer for LocalTransfer {
    fn put(&self, name: &str, data: &[u8]) -> TransferResult<FileRef> {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(TransferError::InvalidName(name.to_string()));
        }

        fs::create_dir_all(&self.root).map_err(|e| TransferError::IoError(e.to_string()))?;

        let file = FileRef::new(name, data.len() as u64);
        fs::write(self.full_path(&file), data).map_err(|e| TransferError::IoError(e.to_string()))?;
        Ok(file)
    }

    fn fetch(&self, file: &FileRef) -> TransferResult<Vec<u8>> {
        fs::read(self.full_path(file)).map_err(|e| Self::map_io(file, e))
    }

    fn dispose(&self, file: &FileRef) -> TransferResult<()> {
        fs::remove_file(self.full_path(file)).map_err(|e| Self::map_io(file, e))
    }

    fn exists(&self, file: &FileRef) -> bool {
        self.full_path(file).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_fetch() {
        let temp = TempDir::new().unwrap();
        let transfer = LocalTransfer::new(temp.path().join("staging"));

        let file = transfer.put("a.arc", b"hello").unwrap();
        assert_eq!(file.name, "a.arc");
        assert_eq!(file.size, 5);
        assert_eq!(transfer.fetch(&file).unwrap(), b"hello");
    }

    #[test]
    fn test_take_disposes() {
        let temp = TempDir::new().unwrap();
        let transfer = LocalTransfer::new(temp.path());

        let file = transfer.put("a.arc", b"bye").unwrap();
        assert_eq!(transfer.take(&file).unwrap(), b"bye");
        assert!(!transfer.exists(&file));
        assert!(matches!(transfer.fetch(&file), Err(TransferError::NotFound(_))));
        assert!(matches!(transfer.dispose(&file), Err(TransferError::NotFound(_))));
    }

    #[test]
    fn test_same_name_twice_gets_distinct_refs() {
        let temp = TempDir::new().unwrap();
        let transfer = LocalTransfer::new(temp.path());

        let first = transfer.put("a.arc", b"1").unwrap();
        let second = transfer.put("a.arc", b"2").unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(transfer.fetch(&first).unwrap(), b"1");
    }

    #[test]
    fn test_put_path() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source.arc");
        fs::write(&source, b"content").unwrap();

        let transfer = LocalTransfer::new(temp.path().join("staging"));
        let file = transfer.put_path(&source).unwrap();
        assert_eq!(file.name, "source.arc");
        assert_eq!(transfer.fetch(&file).unwrap(), b"content");
    }

    #[test]
    fn test_rejects_path_names() {
        let temp = TempDir::new().unwrap();
        let transfer = LocalTransfer::new(temp.path());
        assert!(matches!(
            transfer.put("../escape", b""),
            Err(TransferError::InvalidName(_))
        ));
    }
}
