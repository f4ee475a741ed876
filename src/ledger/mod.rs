//! Sidecar record of every backup the pipelines produced.
//!
//! Restores need to know which device slot each backup came from. That
//! mapping is captured here at backup time instead of being encoded in
//! resource names, so the restore path never parses provider metadata.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ledger document format understood by this build.
const LEDGER_VERSION: u32 = 1;

/// One backup and the slot its source volume occupied.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackupRecord {
    /// Backup identifier.
    pub backup_id: String,
    /// Server the source volume was attached to.
    pub server_id: String,
    /// Volume that was backed up.
    pub source_volume_id: String,
    /// Device path of the source volume (for example `/dev/vdb`).
    pub device: String,
    /// Whether the source volume was bootable.
    pub bootable: bool,
    /// Size of the source volume in GiB.
    pub size_gb: u64,
    /// When the backup completed.
    pub created_at: DateTime<Utc>,
}

/// Errors raised while reading or writing the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the ledger content is not valid JSON.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the ledger was written by an incompatible version.
    #[error("{path} has ledger version {found}, which this build cannot read")]
    UnsupportedVersion {
        /// Ledger path.
        path: Utf8PathBuf,
        /// Version found in the file.
        found: u32,
    },
    /// Raised when the ledger path has no file name.
    #[error("ledger path {0} is missing a filename")]
    InvalidPath(Utf8PathBuf),
}

/// Storage for [`BackupRecord`]s.
pub trait BackupLedger {
    /// Inserts or replaces the record for `record.backup_id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the ledger cannot be read or written.
    fn record(&self, record: &BackupRecord) -> Result<(), LedgerError>;

    /// Returns the record for `backup_id`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the ledger cannot be read.
    fn lookup(&self, backup_id: &str) -> Result<Option<BackupRecord>, LedgerError>;

    /// Removes the record for `backup_id`, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the ledger cannot be read or written.
    fn forget(&self, backup_id: &str) -> Result<bool, LedgerError>;
}

#[derive(Debug, Deserialize, Serialize)]
struct LedgerDocument {
    version: u32,
    records: Vec<BackupRecord>,
}

/// JSON ledger stored in a single file.
///
/// Every call re-reads the file, and writes replace it through a rename so
/// an interrupted write never leaves a truncated ledger behind.
#[derive(Clone, Debug)]
pub struct FileLedger {
    path: Utf8PathBuf,
}

impl FileLedger {
    /// Creates a ledger backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the ledger location.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn file_name(&self) -> Result<&str, LedgerError> {
        self.path
            .file_name()
            .ok_or_else(|| LedgerError::InvalidPath(self.path.clone()))
    }

    fn parent(&self) -> &Utf8Path {
        self.path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."))
    }

    fn io_error(path: &Utf8Path, err: &io::Error) -> LedgerError {
        LedgerError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    fn load(&self) -> Result<LedgerDocument, LedgerError> {
        let file_name = self.file_name()?;
        let parent = self.parent();
        let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(LedgerDocument::empty());
            }
            Err(err) => return Err(Self::io_error(parent, &err)),
        };
        let contents = match dir.read_to_string(file_name) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(LedgerDocument::empty());
            }
            Err(err) => return Err(Self::io_error(&self.path, &err)),
        };
        if contents.trim().is_empty() {
            return Ok(LedgerDocument::empty());
        }
        let document: LedgerDocument =
            serde_json::from_str(&contents).map_err(|err| LedgerError::Parse {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        if document.version != LEDGER_VERSION {
            return Err(LedgerError::UnsupportedVersion {
                path: self.path.clone(),
                found: document.version,
            });
        }
        Ok(document)
    }

    fn store(&self, document: &LedgerDocument) -> Result<(), LedgerError> {
        let file_name = self.file_name()?;
        let parent = self.parent();
        Dir::create_ambient_dir_all(parent, ambient_authority())
            .map_err(|err| Self::io_error(parent, &err))?;
        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|err| Self::io_error(parent, &err))?;

        let rendered =
            serde_json::to_string_pretty(document).map_err(|err| LedgerError::Parse {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        let staging = format!(".{file_name}.tmp");
        dir.write(&staging, rendered)
            .map_err(|err| Self::io_error(&self.path, &err))?;
        dir.rename(&staging, &dir, file_name)
            .map_err(|err| Self::io_error(&self.path, &err))
    }
}

impl LedgerDocument {
    const fn empty() -> Self {
        Self {
            version: LEDGER_VERSION,
            records: Vec::new(),
        }
    }
}

impl BackupLedger for FileLedger {
    fn record(&self, record: &BackupRecord) -> Result<(), LedgerError> {
        let mut document = self.load()?;
        document
            .records
            .retain(|existing| existing.backup_id != record.backup_id);
        document.records.push(record.clone());
        self.store(&document)
    }

    fn lookup(&self, backup_id: &str) -> Result<Option<BackupRecord>, LedgerError> {
        Ok(self
            .load()?
            .records
            .into_iter()
            .find(|record| record.backup_id == backup_id))
    }

    fn forget(&self, backup_id: &str) -> Result<bool, LedgerError> {
        let mut document = self.load()?;
        let before = document.records.len();
        document
            .records
            .retain(|record| record.backup_id != backup_id);
        if document.records.len() == before {
            return Ok(false);
        }
        self.store(&document)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests;
