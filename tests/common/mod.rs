use assert_cmd::{Command, cargo::cargo_bin_cmd};
use std::path::Path;

/// Command against an isolated workspace: source and destination trees
/// plus log and progress files all live under `root`.
pub fn copy_cmd(root: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("resilient-copy");
    cmd.arg(root.join("src"))
        .arg(root.join("dst"))
        .arg(root.join("copy.log"))
        .arg(root.join("progress.txt"));
    cmd
}

/// Lays out a source tree under `root/src` from (relative path, content)
/// pairs, creating parent directories as needed.
pub fn seed_source(root: &Path, files: &[(&str, &str)]) {
    for (relative, content) in files {
        let path = root.join("src").join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}
