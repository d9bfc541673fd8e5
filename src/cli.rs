use clap::Parser;
use std::path::PathBuf;

/// Move a file tree to a new location, verifying every copy by checksum
/// before deleting the source. Safe to kill and re-run: already-verified
/// files are recorded in the progress file and skipped on the next run.
#[derive(Parser, Debug)]
#[command(name = "resilient-copy", version, about, long_about = None)]
pub struct Cli {
    /// Directory to move files out of (e.g. a mounted external drive)
    #[arg(value_name = "SOURCE_DIRECTORY")]
    pub source: PathBuf,

    /// Directory to move files into; created as needed
    #[arg(value_name = "DESTINATION_DIRECTORY")]
    pub destination: PathBuf,

    /// Append-mode log file with timestamped progress lines
    #[arg(value_name = "LOG_FILE", default_value = "./resilient_copy.log")]
    pub log_file: PathBuf,

    /// Append-mode record of already-transferred files, one path per line
    #[arg(
        value_name = "PROGRESS_FILE",
        default_value = "./resilient_copy_progress.txt"
    )]
    pub progress_file: PathBuf,

    /// Increase stderr verbosity. Takes precedence over RUST_LOG.
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "log_level", verbatim_doc_comment)]
    pub verbose: u8,

    /// Stderr log level. Takes precedence over RUST_LOG.
    #[arg(long, value_name = "LEVEL", conflicts_with = "verbose", verbatim_doc_comment)]
    pub log_level: Option<String>,
}
