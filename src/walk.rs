//! Lazy depth-first enumeration of regular files under the source root.
//!
//! The walk is a restartable sequence: a fresh run rediscovers the same
//! files, and the progress ledger filters out the ones already handled.
//! Each directory's listing is sorted so that processing order is stable
//! enough to reason about, though the resume contract never depends on
//! ordering.
//!
//! A directory that cannot be read (or an entry that cannot be stat'ed)
//! does not abort the walk; it is surfaced as an [`WalkEvent::Unreadable`]
//! event so the run loop can decide whether the whole source has gone
//! away or just one subtree is inaccessible.

use std::collections::VecDeque;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug)]
pub enum WalkEvent {
    /// A regular file eligible for transfer.
    File { path: PathBuf, size: u64 },
    /// A directory or entry that could not be inspected.
    Unreadable {
        path: PathBuf,
        error: std::io::Error,
    },
}

pub struct SourceWalk {
    /// Directories still to be listed, popped depth-first.
    dirs: Vec<PathBuf>,
    /// Events from the most recently listed directory.
    pending: VecDeque<WalkEvent>,
}

impl SourceWalk {
    pub fn new(root: PathBuf) -> Self {
        SourceWalk {
            dirs: vec![root],
            pending: VecDeque::new(),
        }
    }

    fn list_next_directory(&mut self) -> Option<()> {
        let dir = self.dirs.pop()?;

        let read_dir = match std::fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) => {
                self.pending
                    .push_back(WalkEvent::Unreadable { path: dir, error: e });
                return Some(());
            }
        };

        let mut paths = Vec::new();
        for entry in read_dir {
            match entry {
                Ok(entry) => paths.push(entry.path()),
                Err(e) => self.pending.push_back(WalkEvent::Unreadable {
                    path: dir.clone(),
                    error: e,
                }),
            }
        }
        paths.sort();

        let mut subdirs = Vec::new();
        for path in paths {
            // symlink_metadata so links are never followed; a symlink is
            // not a regular file and a link into another filesystem must
            // not be purged from here.
            match std::fs::symlink_metadata(&path) {
                Ok(metadata) => {
                    let file_type = metadata.file_type();
                    if file_type.is_symlink() {
                        debug!("Skipping symlink {}", path.display());
                    } else if file_type.is_dir() {
                        subdirs.push(path);
                    } else if file_type.is_file() {
                        self.pending.push_back(WalkEvent::File {
                            path,
                            size: metadata.len(),
                        });
                    } else {
                        debug!("Skipping special file {}", path.display());
                    }
                }
                Err(e) => self
                    .pending
                    .push_back(WalkEvent::Unreadable { path, error: e }),
            }
        }

        // Reverse so popping yields subdirectories in sorted order.
        for subdir in subdirs.into_iter().rev() {
            self.dirs.push(subdir);
        }

        Some(())
    }
}

impl Iterator for SourceWalk {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            self.list_next_directory()?;
        }
    }
}
