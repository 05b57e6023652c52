//! # Archive Directory
//!
//! Files are kept flat under one directory, named as archived. Writes go
//! through a temporary file that is fsynced and renamed into place.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::errors::{BitarchiveError, BitarchiveResult};
use crate::checksum::md5_file;

const TEMP_SUFFIX: &str = ".partial";

#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    /// Open (and create) the archive directory
    pub fn open(root: impl Into<PathBuf>) -> BitarchiveResult<Self> {
        let store = Self { root: root.into() };
        store.ensure()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure(&self) -> BitarchiveResult<()> {
        fs::create_dir_all(&self.root)
            .map_err(|e| BitarchiveError::io(self.root.display().to_string(), e))
    }

    fn path_of(&self, filename: &str) -> BitarchiveResult<PathBuf> {
        let invalid = filename.is_empty()
            || filename.starts_with('.')
            || filename.ends_with(TEMP_SUFFIX)
            || filename.contains(['/', '\\', '\n', '\r']);
        if invalid {
            return Err(BitarchiveError::InvalidFilename(filename.to_string()));
        }
        Ok(self.root.join(filename))
    }

    fn not_found(filename: &str, e: std::io::Error) -> BitarchiveError {
        if e.kind() == ErrorKind::NotFound {
            BitarchiveError::NotFound(filename.to_string())
        } else {
            BitarchiveError::io(filename, e)
        }
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.path_of(filename).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn read(&self, filename: &str) -> BitarchiveResult<Vec<u8>> {
        let path = self.path_of(filename)?;
        fs::read(path).map_err(|e| Self::not_found(filename, e))
    }

    /// Bytes of `filename` from `offset` to the end
    pub fn read_from(&self, filename: &str, offset: u64) -> BitarchiveResult<Vec<u8>> {
        let path = self.path_of(filename)?;
        let mut file = File::open(path).map_err(|e| Self::not_found(filename, e))?;
        let size = file
            .metadata()
            .map_err(|e| BitarchiveError::io(filename, e))?
            .len();
        if offset > size {
            return Err(BitarchiveError::OffsetOutOfRange {
                filename: filename.to_string(),
                offset,
                size,
            });
        }

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| BitarchiveError::io(filename, e))?;
        let mut buffer = Vec::with_capacity((size - offset) as usize);
        file.read_to_end(&mut buffer)
            .map_err(|e| BitarchiveError::io(filename, e))?;
        Ok(buffer)
    }

    pub fn checksum(&self, filename: &str) -> BitarchiveResult<String> {
        let path = self.path_of(filename)?;
        md5_file(&path).map_err(|e| Self::not_found(filename, e))
    }

    /// Write `content` as `filename`, replacing any existing file.
    pub fn write(&self, filename: &str, content: &[u8]) -> BitarchiveResult<()> {
        let path = self.path_of(filename)?;
        let temp = self.root.join(format!("{}{}", filename, TEMP_SUFFIX));
        self.ensure()?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)
            .map_err(|e| BitarchiveError::io(filename, e))?;
        file.write_all(content)
            .and_then(|_| file.sync_all())
            .map_err(|e| BitarchiveError::io(filename, e))?;
        fs::rename(&temp, &path).map_err(|e| BitarchiveError::io(filename, e))
    }

    pub fn remove(&self, filename: &str) -> BitarchiveResult<()> {
        let path = self.path_of(filename)?;
        fs::remove_file(path).map_err(|e| Self::not_found(filename, e))
    }

    /// Archived files as (filename, path), sorted by name
    pub fn files(&self) -> BitarchiveResult<Vec<(String, PathBuf)>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BitarchiveError::io(self.root.display().to_string(), e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BitarchiveError::io(self.root.display().to_string(), e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if self.path_of(name).is_ok() {
                    files.push((name.to_string(), path.clone()));
                }
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_read_remove() {
        let temp = TempDir::new().unwrap();
        let store = ArchiveStore::open(temp.path().join("archive")).unwrap();

        store.write("a.arc", b"0123456789").unwrap();
        assert!(store.contains("a.arc"));
        assert_eq!(store.read_from("a.arc", 7).unwrap(), b"789");
        assert_eq!(store.read_from("a.arc", 10).unwrap(), b"");
        assert!(matches!(
            store.read_from("a.arc", 11),
            Err(BitarchiveError::OffsetOutOfRange { size: 10, .. })
        ));

        store.remove("a.arc").unwrap();
        assert_eq!(
            store.read("a.arc").unwrap_err(),
            BitarchiveError::NotFound("a.arc".into())
        );
    }

    #[test]
    fn test_files_skips_partial_writes() {
        let temp = TempDir::new().unwrap();
        let store = ArchiveStore::open(temp.path()).unwrap();
        store.write("b.arc", b"b").unwrap();
        store.write("a.arc", b"a").unwrap();
        fs::write(temp.path().join("c.arc.partial"), b"junk").unwrap();

        let names: Vec<String> = store.files().unwrap().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a.arc", "b.arc"]);
    }

    #[test]
    fn test_rejects_path_names() {
        let temp = TempDir::new().unwrap();
        let store = ArchiveStore::open(temp.path()).unwrap();
        assert!(matches!(
            store.write("../escape", b"x"),
            Err(BitarchiveError::InvalidFilename(_))
        ));
    }
}
