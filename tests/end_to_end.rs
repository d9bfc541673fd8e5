mod common;

use common::{copy_cmd, seed_source};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// The canonical scenario: two files, one in a subdirectory, moved with
/// structure preserved, sources purged, both recorded, exit 0.
#[test]
fn moves_tree_verifies_and_purges() {
    let temp = TempDir::new().unwrap();
    seed_source(temp.path(), &[("a.txt", "hello"), ("sub/b.txt", "world")]);

    copy_cmd(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("COPY a.txt"))
        .stdout(predicate::str::contains("COPY sub/b.txt"))
        .stdout(predicate::str::contains("VERIFIED a.txt"))
        .stdout(predicate::str::contains("VERIFIED sub/b.txt"))
        .stdout(predicate::str::contains("Files found:   2"))
        .stdout(predicate::str::contains("Copied:        2"))
        .stdout(predicate::str::contains("Skipped:       0"))
        .stdout(predicate::str::contains("Failed:        0"));

    let dst = temp.path().join("dst");
    assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "hello");
    assert_eq!(fs::read_to_string(dst.join("sub/b.txt")).unwrap(), "world");

    let src = temp.path().join("src");
    assert!(!src.join("a.txt").exists());
    assert!(!src.join("sub/b.txt").exists());

    let progress = fs::read_to_string(temp.path().join("progress.txt")).unwrap();
    let mut lines: Vec<_> = progress.lines().collect();
    lines.sort();
    assert_eq!(lines, vec!["a.txt", "sub/b.txt"]);
}

#[test]
fn empty_source_completes_cleanly() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("src")).unwrap();

    copy_cmd(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Files found:   0"));
}

#[test]
fn destination_is_created_if_missing() {
    let temp = TempDir::new().unwrap();
    seed_source(temp.path(), &[("only.txt", "content")]);
    assert!(!temp.path().join("dst").exists());

    copy_cmd(temp.path()).assert().success();

    assert_eq!(
        fs::read_to_string(temp.path().join("dst/only.txt")).unwrap(),
        "content"
    );
}

#[test]
fn lock_file_is_removed_after_run() {
    let temp = TempDir::new().unwrap();
    seed_source(temp.path(), &[("a.txt", "hello")]);

    copy_cmd(temp.path()).assert().success();

    assert!(!temp.path().join("progress.txt.lock").exists());
}

#[test]
fn help_exits_zero_and_names_positional_args() {
    use assert_cmd::cargo::cargo_bin_cmd;

    cargo_bin_cmd!("resilient-copy")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("SOURCE_DIRECTORY"))
        .stdout(predicate::str::contains("DESTINATION_DIRECTORY"))
        .stdout(predicate::str::contains("-v, --verbose"))
        .stdout(predicate::str::contains("--log-level <LEVEL>"))
        .stdout(predicate::str::contains("Takes precedence over RUST_LOG."));
}
