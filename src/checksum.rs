use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
}

pub struct FileDigest {
    /// Hex encoded.
    pub sha256: String,
    /// File size in bytes, as observed while reading.
    pub size: u64,
}

/// Computes the SHA-256 digest of a file's contents.
///
/// The file is always read in full; the digest is never inferred from
/// size or mtime. Transfers are verified by recomputing this on both the
/// source and the destination after the byte copy completes.
pub fn checksum_file(path: &Path) -> Result<FileDigest, ChecksumError> {
    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            ChecksumError::PermissionDenied(path.to_path_buf())
        } else {
            ChecksumError::Io(e)
        }
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    let mut size: u64 = 0;

    loop {
        let bytes_read = file.read(&mut buffer).map_err(ChecksumError::Io)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
        size += bytes_read as u64;
    }

    let sha256 = format!("{:x}", hasher.finalize());

    debug!("Checksum of {} is {}", path.display(), sha256);

    Ok(FileDigest { sha256, size })
}
