mod checksum;
mod cli;
mod ledger;
mod lock;
mod mount;
mod run;
mod transfer;
mod walk;

use clap::Parser;
use clap::error::ErrorKind as ClapErrorKind;
use cli::Cli;
use run::{RunConfig, RunOutcome};
use std::fmt as stdfmt;
use std::io::{IsTerminal, stderr};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{Event, Level, Subscriber, error};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

struct CopyExitCode;

impl CopyExitCode {
    /// Exit code used when the run completed but one or more files failed,
    /// and for usage errors (invalid arguments, nonexistent source).
    fn completed_with_failures() -> ExitCode {
        ExitCode::from(1)
    }

    /// Exit code used when the source became inaccessible mid-run; the
    /// operator should remount and re-invoke the same command.
    fn aborted() -> ExitCode {
        ExitCode::from(2)
    }
}

fn main() -> ExitCode {
    // Usage errors must exit 1 rather than clap's default 2; --help and
    // --version still exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => CopyExitCode::completed_with_failures(),
            };
            // clap routes help to stdout and errors to stderr.
            let _ = e.print();
            return code;
        }
    };

    if let Err(e) = init_tracing(cli.verbose, cli.log_level.as_deref(), &cli.log_file) {
        eprintln!("ERROR: failed to open log file {}: {e}", cli.log_file.display());
        return CopyExitCode::completed_with_failures();
    }

    let config = RunConfig {
        source: cli.source,
        destination: cli.destination,
        progress_file: cli.progress_file,
    };

    let result: anyhow::Result<ExitCode> = handle_run(&config);

    match result {
        Ok(exit_code) => exit_code,
        Err(err) => {
            error!("{err}");
            CopyExitCode::completed_with_failures()
        }
    }
}

fn handle_run(config: &RunConfig) -> anyhow::Result<ExitCode> {
    let outcome = run::run(config)?;

    Ok(match outcome {
        RunOutcome::Completed(summary) if summary.failed == 0 => ExitCode::SUCCESS,
        RunOutcome::Completed(_) => CopyExitCode::completed_with_failures(),
        RunOutcome::Aborted(_) => CopyExitCode::aborted(),
    })
}

fn init_tracing(
    verbose: u8,
    log_level: Option<&str>,
    log_file: &std::path::Path,
) -> std::io::Result<()> {
    let stderr_is_terminal = stderr().is_terminal();
    let formatter = ConsoleFormatter { stderr_is_terminal };

    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let filter = if let Some(level) = log_level {
        EnvFilter::new(level)
    } else if verbose > 0 {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let stderr_layer = tracing_fmt::layer()
        .event_format(formatter)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    // The log file always records info and above, independent of the
    // console verbosity, and accumulates across runs.
    let file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(log_file)?;
    let file_layer = tracing_fmt::layer()
        .event_format(TimestampedFormatter)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::INFO);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

struct ConsoleFormatter {
    stderr_is_terminal: bool,
}

impl<S, N> FormatEvent<S, N> for ConsoleFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        if self.stderr_is_terminal {
            match *event.metadata().level() {
                Level::DEBUG => write!(writer, "🔍 ")?,
                Level::INFO => write!(writer, "ℹ️ ")?,
                Level::WARN => write!(writer, "⚠️  ")?,
                Level::ERROR => write!(writer, "❌️ ")?,
                _ => {}
            }
        } else {
            match *event.metadata().level() {
                Level::DEBUG => writer.write_str("DEBUG: ")?,
                Level::INFO => writer.write_str("INFO: ")?,
                Level::WARN => writer.write_str("WARN: ")?,
                Level::ERROR => writer.write_str("ERROR: ")?,
                _ => {}
            }
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Formatter for the append-mode log file: local-time timestamped,
/// human-readable lines.
struct TimestampedFormatter;

impl<S, N> FormatEvent<S, N> for TimestampedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        write!(writer, "[{}] {} ", now, event.metadata().level())?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
