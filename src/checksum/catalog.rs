//! # Checksum Catalog
//!
//! One replica's (filename, checksum) entries, held in memory and backed
//! by a text file with one `filename##checksum` line per entry.
//!
//! Every mutation rewrites the file through a temporary file, fsync and
//! rename. Entries replaced by a correction are appended to
//! `<catalog>.wrong`.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::errors::{ChecksumError, ChecksumResult};

/// Separator between filename and checksum
pub const SEPARATOR: &str = "##";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    pub filename: String,
    pub checksum: String,
}

impl ChecksumEntry {
    pub fn new(filename: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            checksum: checksum.into(),
        }
    }

    /// Parse a `filename##checksum` line.
    pub fn parse(line: &str) -> Option<Self> {
        let (filename, checksum) = line.split_once(SEPARATOR)?;
        if filename.is_empty() || checksum.is_empty() || checksum.contains(SEPARATOR) {
            return None;
        }
        Some(Self::new(filename, checksum))
    }

    pub fn to_line(&self) -> String {
        format!("{}{}{}", self.filename, SEPARATOR, self.checksum)
    }
}

fn check_filename(filename: &str) -> ChecksumResult<()> {
    if filename.is_empty()
        || filename.contains(SEPARATOR)
        || filename.contains('\n')
        || filename.contains('\r')
    {
        return Err(ChecksumError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Parse catalog text. Blank lines are ignored.
pub fn parse_catalog(text: &str) -> ChecksumResult<BTreeMap<String, String>> {
    let mut entries = BTreeMap::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let entry = ChecksumEntry::parse(line).ok_or_else(|| ChecksumError::MalformedCatalog {
            line: index + 1,
            content: line.to_string(),
        })?;
        entries.insert(entry.filename, entry.checksum);
    }
    Ok(entries)
}

#[derive(Debug)]
pub struct ChecksumCatalog {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl ChecksumCatalog {
    /// Load the catalog at `path`. A missing file is an empty catalog;
    /// the file is created by the first mutation.
    pub fn load(path: impl Into<PathBuf>) -> ChecksumResult<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => parse_catalog(&text)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(ChecksumError::io(
                    format!("Failed to read catalog {}", path.display()),
                    e,
                ))
            }
        };
        Ok(Self { path, entries })
    }

    /// Discard memory and read the file again.
    pub fn reload(&mut self) -> ChecksumResult<()> {
        *self = Self::load(self.path.clone())?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Audit file receiving replaced entries
    pub fn wrong_entries_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".wrong");
        PathBuf::from(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, filename: &str) -> Option<&str> {
        self.entries.get(filename).map(String::as_str)
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = ChecksumEntry> + '_ {
        self.entries
            .iter()
            .map(|(filename, checksum)| ChecksumEntry::new(filename.as_str(), checksum.as_str()))
    }

    /// Insert or overwrite an entry. Returns the previous checksum.
    pub fn upsert(&mut self, filename: &str, checksum: &str) -> ChecksumResult<Option<String>> {
        check_filename(filename)?;
        let previous = self
            .entries
            .insert(filename.to_string(), checksum.to_string());
        if let Err(e) = self.persist() {
            match &previous {
                Some(old) => self.entries.insert(filename.to_string(), old.clone()),
                None => self.entries.remove(filename),
            };
            return Err(e);
        }
        Ok(previous)
    }

    /// Replace the checksum of `filename`, provided it currently is
    /// `expected_old`. Returns the replaced entry.
    pub fn correct(
        &mut self,
        filename: &str,
        expected_old: &str,
        new_checksum: &str,
    ) -> ChecksumResult<ChecksumEntry> {
        let actual = self
            .get(filename)
            .ok_or_else(|| ChecksumError::NotFound(filename.to_string()))?
            .to_string();
        if actual != expected_old {
            return Err(ChecksumError::StaleChecksum {
                filename: filename.to_string(),
                expected: expected_old.to_string(),
                actual,
            });
        }

        let removed = ChecksumEntry::new(filename, actual);
        self.append_wrong_entry(&removed)?;
        self.entries
            .insert(filename.to_string(), new_checksum.to_string());
        if let Err(e) = self.persist() {
            self.entries
                .insert(filename.to_string(), removed.checksum.clone());
            return Err(e);
        }
        Ok(removed)
    }

    /// All entries in catalog format
    pub fn export_checksums(&self) -> String {
        self.entries().map(|e| e.to_line() + "\n").collect()
    }

    /// All filenames, one per line
    pub fn export_filenames(&self) -> String {
        self.filenames().map(|f| format!("{}\n", f)).collect()
    }

    fn persist(&self) -> ChecksumResult<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| {
            ChecksumError::io(
                format!("Failed to create catalog directory {}", parent.display()),
                e,
            )
        })?;

        let mut temp = self.path.as_os_str().to_owned();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);

        let mut file = File::create(&temp).map_err(|e| {
            ChecksumError::io(format!("Failed to create {}", temp.display()), e)
        })?;
        file.write_all(self.export_checksums().as_bytes())
            .map_err(|e| ChecksumError::io(format!("Failed to write {}", temp.display()), e))?;
        file.sync_all()
            .map_err(|e| ChecksumError::io(format!("Failed to fsync {}", temp.display()), e))?;
        drop(file);

        fs::rename(&temp, &self.path).map_err(|e| {
            ChecksumError::io(
                format!("Failed to replace catalog {}", self.path.display()),
                e,
            )
        })?;

        // fsync the directory so the rename is durable
        let dir = OpenOptions::new().read(true).open(parent).map_err(|e| {
            ChecksumError::io(format!("Failed to open {} for fsync", parent.display()), e)
        })?;
        dir.sync_all()
            .map_err(|e| ChecksumError::io(format!("Failed to fsync {}", parent.display()), e))
    }

    fn append_wrong_entry(&self, entry: &ChecksumEntry) -> ChecksumResult<()> {
        let path = self.wrong_entries_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ChecksumError::io(format!("Failed to open {}", path.display()), e))?;
        writeln!(file, "{}", entry.to_line())
            .map_err(|e| ChecksumError::io(format!("Failed to write {}", path.display()), e))?;
        file.sync_all()
            .map_err(|e| ChecksumError::io(format!("Failed to fsync {}", path.display()), e))
    }
}
