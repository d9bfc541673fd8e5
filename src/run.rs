//! The top-level run loop: walk the source tree, transfer each file not
//! yet in the ledger, and classify failures as per-file (keep going) or
//! fatal (the source mount is gone, abort).
//!
//! Processing is strictly sequential: one file is fully copied, verified,
//! and purged before the next is started. There is no pause state;
//! killing the process and re-invoking the same command is the resume
//! mechanism, because the ledger reflects exactly the files fully handled
//! so far.

use crate::ledger::{LedgerError, ProgressLedger};
use crate::lock::{LockError, RunLock};
use crate::mount;
use crate::transfer::{TransferError, TransferTask, transfer_file};
use crate::walk::{SourceWalk, WalkEvent};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("source directory does not exist or is not a directory: {0}")]
    InvalidSource(PathBuf),
    #[error("progress ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("lock error: {0}")]
    Lock(#[from] LockError),
}

pub struct RunConfig {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub progress_file: PathBuf,
}

/// Run-scoped counters, threaded through the loop and returned at the
/// end. Never process-global.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub found: u64,
    pub copied: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Normal completion; `failed` in the summary decides the exit code.
    Completed(RunSummary),
    /// The source mount disappeared mid-run. The ledger holds exactly
    /// the files verified before the disconnect; the operator should
    /// remount and re-invoke the same command.
    Aborted(RunSummary),
}

/// Executes one full run against the configured source and destination.
pub fn run(config: &RunConfig) -> Result<RunOutcome, RunError> {
    if !config.source.is_dir() {
        return Err(RunError::InvalidSource(config.source.clone()));
    }

    let _lock = RunLock::acquire(&config.progress_file)?;
    let mut ledger = ProgressLedger::load(&config.progress_file)?;

    info!(
        "Starting run: {} -> {} ({} files already in ledger)",
        config.source.display(),
        config.destination.display(),
        ledger.entry_count()
    );

    let walk = SourceWalk::new(config.source.clone());
    let outcome = process_events(config, walk, &mut ledger)?;

    print_summary(summary_of(&outcome));
    match &outcome {
        RunOutcome::Completed(summary) => {
            info!(
                "Run complete: {} found, {} copied, {} skipped, {} failed",
                summary.found, summary.copied, summary.skipped, summary.failed
            );
        }
        RunOutcome::Aborted(summary) => {
            error!(
                "Run aborted after {} copied: source {} is no longer accessible. \
                 Remount it and re-invoke the same command to resume.",
                summary.copied,
                config.source.display()
            );
        }
    }

    Ok(outcome)
}

fn summary_of(outcome: &RunOutcome) -> &RunSummary {
    match outcome {
        RunOutcome::Completed(summary) | RunOutcome::Aborted(summary) => summary,
    }
}

/// The per-event loop, separated from [`run`] so the event sequence can
/// be driven directly in tests.
fn process_events(
    config: &RunConfig,
    events: impl IntoIterator<Item = WalkEvent>,
    ledger: &mut ProgressLedger,
) -> Result<RunOutcome, RunError> {
    let mut summary = RunSummary::default();

    for event in events {
        match event {
            WalkEvent::Unreadable { path, error } => {
                if !mount::source_alive(&config.source) {
                    return Ok(RunOutcome::Aborted(summary));
                }
                warn!(
                    "Skipping unreadable entry {} (source still mounted): {}",
                    path.display(),
                    error
                );
            }
            WalkEvent::File { path, size } => {
                summary.found += 1;

                let Ok(relative) = path.strip_prefix(&config.source) else {
                    // The walk only yields paths under the root; treat
                    // anything else as a per-file failure.
                    warn!("Discovered file outside source root: {}", path.display());
                    summary.failed += 1;
                    continue;
                };
                let relative = relative.to_path_buf();

                if ledger.contains(&relative) {
                    summary.skipped += 1;
                    println!("SKIP {}", relative.display());
                    info!("Skipping {} (already in ledger)", relative.display());
                    continue;
                }

                // Proactive probe before committing to a new file, so a
                // yanked drive aborts here instead of surfacing as a
                // confusing copy error.
                if !mount::source_alive(&config.source) {
                    return Ok(RunOutcome::Aborted(summary));
                }

                let task =
                    TransferTask::new(relative, &config.source, &config.destination, size);

                println!("COPY {}", task.relative.display());
                info!(
                    "Copying {} ({} bytes) to {}",
                    task.relative.display(),
                    task.size,
                    task.destination.display()
                );

                match transfer_file(&task) {
                    Ok(outcome) => {
                        println!("VERIFIED {}", task.relative.display());
                        info!(
                            "Verified {} (sha256 {})",
                            task.relative.display(),
                            outcome.digest
                        );
                        if outcome.source_removed {
                            println!("DELETED {}", task.relative.display());
                        } else {
                            println!("RETAINED {}", task.relative.display());
                        }
                        // Recorded even when the source could not be
                        // removed: the contract is "copy is durable",
                        // not "source is gone".
                        ledger.record(&task.relative)?;
                        summary.copied += 1;
                    }
                    Err(e) if e.warrants_mount_recheck() && !mount::source_alive(&config.source) => {
                        error!("Copy of {} failed: {}", task.relative.display(), e);
                        return Ok(RunOutcome::Aborted(summary));
                    }
                    Err(e @ TransferError::VerifyMismatch { .. }) => {
                        summary.failed += 1;
                        println!("MISMATCH {}", task.relative.display());
                        error!("{}; destination removed, source kept for retry", e);
                    }
                    Err(e) => {
                        summary.failed += 1;
                        println!("FAILED {}", task.relative.display());
                        error!("Failed to transfer {}: {}", task.relative.display(), e);
                    }
                }
            }
        }
    }

    Ok(RunOutcome::Completed(summary))
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Files found:   {}", summary.found);
    println!("Copied:        {}", summary.copied);
    println!("Skipped:       {}", summary.skipped);
    println!("Failed:        {}", summary.failed);
}
