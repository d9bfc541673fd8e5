//! Source mount health probing.
//!
//! The tool's risk profile is an external drive that can disappear in the
//! middle of a run. The probe must answer "is the source root still a
//! live, listable filesystem" by actually touching the filesystem every
//! time; the result is never cached. A physically disconnected device
//! must produce `false`, never a silent `true`.

use std::path::Path;
use tracing::debug;

/// Returns true if `root` is currently a readable, listable directory.
///
/// Listability (rather than bare existence) is the probe: after a drive
/// is yanked, the mount point path often still exists as an empty
/// directory while `read_dir` on the dead filesystem fails.
pub fn source_alive(root: &Path) -> bool {
    let alive = std::fs::read_dir(root).is_ok();
    if !alive {
        debug!("Mount probe failed for {}", root.display());
    }
    alive
}
