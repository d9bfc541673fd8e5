//! Single-file transfer-and-verify: copy, digest both sides, and purge
//! the source only once the destination copy is proven byte-identical.

use crate::checksum::{ChecksumError, checksum_file};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const COPY_BUFFER_SIZE: usize = 128 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("copy failed for {path}: {source}")]
    Copy {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("checksum mismatch for {path}: source {source_digest}, destination {destination_digest}")]
    VerifyMismatch {
        path: PathBuf,
        source_digest: String,
        destination_digest: String,
    },
    #[error("checksum failed during verification: {0}")]
    Verify(#[from] ChecksumError),
}

impl TransferError {
    /// Whether the run loop should re-probe mount health before deciding
    /// how to react. Only a failed byte copy is ambiguous between "the
    /// drive is gone" and a local problem like a full destination.
    pub fn warrants_mount_recheck(&self) -> bool {
        matches!(self, TransferError::Copy { .. })
    }
}

/// One source file scheduled for transfer. Created when the walk
/// discovers a file not already in the ledger; consumed within a single
/// run-loop iteration.
#[derive(Debug)]
pub struct TransferTask {
    pub source: PathBuf,
    pub relative: PathBuf,
    pub destination: PathBuf,
    pub size: u64,
}

impl TransferTask {
    pub fn new(relative: PathBuf, source_root: &Path, dest_root: &Path, size: u64) -> Self {
        TransferTask {
            source: source_root.join(&relative),
            destination: dest_root.join(&relative),
            relative,
            size,
        }
    }
}

#[derive(Debug)]
pub struct TransferOutcome {
    /// Verified content digest, identical on both sides.
    pub digest: String,
    /// False when the destination copy is durable but the source could
    /// not be deleted. The transfer still counts as a success.
    pub source_removed: bool,
}

/// Copies, verifies, and purges one file.
///
/// On success the destination holds a verified byte-identical copy and
/// the source has been deleted (or, if deletion failed, left behind with
/// a warning; `source_removed` reports which). On verification failure
/// the bad destination copy is removed and the source is left untouched
/// so a later run can retry.
pub fn transfer_file(task: &TransferTask) -> Result<TransferOutcome, TransferError> {
    if let Some(parent) = task.destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TransferError::DirectoryCreate {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    copy_bytes(&task.source, &task.destination).map_err(|e| TransferError::Copy {
        path: task.source.clone(),
        source: e,
    })?;

    let digest = verify_and_purge_on_mismatch(&task.source, &task.destination)?;

    let source_removed = match std::fs::remove_file(&task.source) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                "Could not delete source {} after verified copy: {}",
                task.source.display(),
                e
            );
            false
        }
    };

    Ok(TransferOutcome {
        digest,
        source_removed,
    })
}

/// Streams source bytes into the destination and carries metadata over.
///
/// The destination is opened without truncation and trimmed with
/// `set_len` afterward, so rewriting over a partial file from an
/// interrupted run reuses already-allocated blocks instead of starting
/// from an empty file. The destination is fsynced before returning;
/// verification must never bless bytes that only exist in the page cache.
fn copy_bytes(source: &Path, destination: &Path) -> std::io::Result<()> {
    let src_file = File::open(source)?;
    let metadata = src_file.metadata()?;

    let dst_file = OpenOptions::new()
        .write(true)
        .create(true)
        .open(destination)?;

    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, src_file);
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, dst_file);

    let mut buffer = [0u8; COPY_BUFFER_SIZE];
    let mut written: u64 = 0;
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
        written += bytes_read as u64;
    }
    writer.flush()?;

    let dst_file = writer
        .into_inner()
        .map_err(std::io::IntoInnerError::into_error)?;
    dst_file.set_len(written)?;
    dst_file.sync_all()?;

    std::fs::set_permissions(destination, metadata.permissions())?;
    let mtime = filetime::FileTime::from_last_modification_time(&metadata);
    filetime::set_file_mtime(destination, mtime)?;

    debug!(
        "Copied {} bytes from {} to {}",
        written,
        source.display(),
        destination.display()
    );

    Ok(())
}

/// Digests both sides and compares. Any failure here removes the
/// destination copy so a bad file is never left in place for a later run
/// to mistake for a verified one.
fn verify_and_purge_on_mismatch(
    source: &Path,
    destination: &Path,
) -> Result<String, TransferError> {
    let source_digest = match checksum_file(source) {
        Ok(digest) => digest,
        Err(e) => {
            purge_destination(destination);
            return Err(TransferError::Verify(e));
        }
    };
    let destination_digest = match checksum_file(destination) {
        Ok(digest) => digest,
        Err(e) => {
            purge_destination(destination);
            return Err(TransferError::Verify(e));
        }
    };

    if source_digest.sha256 != destination_digest.sha256
        || source_digest.size != destination_digest.size
    {
        purge_destination(destination);
        return Err(TransferError::VerifyMismatch {
            path: source.to_path_buf(),
            source_digest: source_digest.sha256,
            destination_digest: destination_digest.sha256,
        });
    }

    Ok(source_digest.sha256)
}

fn purge_destination(destination: &Path) {
    if let Err(e) = std::fs::remove_file(destination)
        && e.kind() != ErrorKind::NotFound
    {
        warn!(
            "Failed to remove unverified destination {}: {}",
            destination.display(),
            e
        );
    }
}
