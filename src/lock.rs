//! Guard against two simultaneous runs sharing one progress ledger.
//!
//! Two runs appending to the same ledger would interleave their writes
//! and corrupt the resume record, so a lock file is created next to the
//! progress file before any work begins. The lock holds the PID of the
//! owning process; on Unix a lock whose owner is no longer alive is
//! treated as stale and reclaimed, so a SIGKILLed run does not wedge the
//! tool until someone deletes the file by hand.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("another run is already using this progress file (pid {pid}, lock {lock_path})")]
    AlreadyRunning { pid: u32, lock_path: PathBuf },
    #[error("IO error on lock file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquires the lock guarding `progress_file`, creating
    /// `<progress_file>.lock` with this process's PID.
    pub fn acquire(progress_file: &Path) -> Result<Self, LockError> {
        let path = lock_path(progress_file);

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    write!(file, "{}", std::process::id()).map_err(|e| LockError::Io {
                        path: path.clone(),
                        source: e,
                    })?;
                    debug!("Acquired run lock {}", path.display());
                    return Ok(RunLock { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    match read_owner(&path) {
                        Some(pid) if process_alive(pid) => {
                            return Err(LockError::AlreadyRunning {
                                pid,
                                lock_path: path,
                            });
                        }
                        Some(pid) => {
                            warn!(
                                "Removing stale lock {} held by dead process {}",
                                path.display(),
                                pid
                            );
                        }
                        None => {
                            warn!("Removing unreadable lock {}", path.display());
                        }
                    }
                    std::fs::remove_file(&path).map_err(|e| LockError::Io {
                        path: path.clone(),
                        source: e,
                    })?;
                    // Retry the create_new; a racing process may win, in
                    // which case the next iteration reports it as the owner.
                }
                Err(e) => {
                    return Err(LockError::Io { path, source: e });
                }
            }
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}

fn lock_path(progress_file: &Path) -> PathBuf {
    let mut name = progress_file.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

fn read_owner(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| content.trim().parse().ok())
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // Signal 0 performs the permission and existence checks without
    // delivering anything. EPERM still means the process exists.
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    // No portable liveness probe; honor the lock unconditionally.
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_lock_with_own_pid() {
        let temp = TempDir::new().unwrap();
        let progress = temp.path().join("progress.txt");

        let _lock = RunLock::acquire(&progress).unwrap();

        let lock_file = temp.path().join("progress.txt.lock");
        assert!(lock_file.exists());
        let content = std::fs::read_to_string(&lock_file).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_drop_removes_lock() {
        let temp = TempDir::new().unwrap();
        let progress = temp.path().join("progress.txt");
        let lock_file = temp.path().join("progress.txt.lock");

        {
            let _lock = RunLock::acquire(&progress).unwrap();
            assert!(lock_file.exists());
        }

        assert!(!lock_file.exists());
    }

    #[test]
    fn test_second_acquire_fails_while_held() {
        let temp = TempDir::new().unwrap();
        let progress = temp.path().join("progress.txt");

        let _lock = RunLock::acquire(&progress).unwrap();
        let result = RunLock::acquire(&progress);

        match result {
            Err(LockError::AlreadyRunning { pid, .. }) => {
                assert_eq!(pid, std::process::id());
            }
            other => panic!("Expected AlreadyRunning error, got {:?}", other.err()),
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_stale_lock_is_reclaimed() {
        let temp = TempDir::new().unwrap();
        let progress = temp.path().join("progress.txt");
        let lock_file = temp.path().join("progress.txt.lock");

        // A PID beyond any plausible pid_max, so the owner is dead.
        std::fs::write(&lock_file, "999999999").unwrap();

        let _lock = RunLock::acquire(&progress).unwrap();

        let content = std::fs::read_to_string(&lock_file).unwrap();
        assert_eq!(content.trim(), std::process::id().to_string());
    }

    #[test]
    fn test_garbage_lock_is_reclaimed() {
        let temp = TempDir::new().unwrap();
        let progress = temp.path().join("progress.txt");
        let lock_file = temp.path().join("progress.txt.lock");

        std::fs::write(&lock_file, "not-a-pid").unwrap();

        let _lock = RunLock::acquire(&progress).unwrap();
        assert!(lock_file.exists());
    }
}
