//! The progress ledger: the persisted record of files already safely
//! transferred, and the mechanism that makes a run resumable.
//!
//! The ledger is a plain text file with one relative path per line. It is
//! loaded fully into memory at the start of a run, queried before each
//! discovered file, and appended to after each verified transfer. It is
//! never rewritten or compacted; a crash at any point leaves at worst a
//! redundant re-verify on the next run, never data loss.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
}

fn classify(e: std::io::Error, path: &Path) -> LedgerError {
    if e.kind() == ErrorKind::PermissionDenied {
        LedgerError::PermissionDenied(path.to_path_buf())
    } else {
        LedgerError::Io(e)
    }
}

/// Canonical ledger key for a relative path.
///
/// Paths are stored lossily as UTF-8 lines. Membership is consistent
/// because both load and record go through the same encoding.
pub fn ledger_key(relative: &Path) -> String {
    relative.to_string_lossy().into_owned()
}

pub struct ProgressLedger {
    entries: HashSet<String>,
    file: File,
}

impl ProgressLedger {
    /// Loads the ledger from `path`, treating a missing file as empty,
    /// and opens it for appending.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(classify(e, path)),
        };

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| classify(e, path))?;

        debug!(
            "Loaded {} ledger entries from {}",
            entries.len(),
            path.display()
        );

        Ok(ProgressLedger { entries, file })
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, relative: &Path) -> bool {
        self.entries.contains(&ledger_key(relative))
    }

    /// Appends one relative path and syncs it to disk before returning.
    ///
    /// Durability here is what upholds the resume guarantee: once this
    /// returns, a crash cannot lose the record of a verified transfer.
    pub fn record(&mut self, relative: &Path) -> Result<(), LedgerError> {
        let key = ledger_key(relative);

        writeln!(self.file, "{key}").map_err(LedgerError::Io)?;
        self.file.sync_all().map_err(LedgerError::Io)?;

        self.entries.insert(key);
        Ok(())
    }
}
