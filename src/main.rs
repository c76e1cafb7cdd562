//! tidemark - Detects what changed in a directory tree since it was last synchronized.
//!
//! Usage:
//!   tidemark status [PATH]           List pending changes
//!   tidemark sync [PATH] --to DIR    Mirror pending changes into DIR
//!   tidemark accept [PATH]           Record the current tree as synchronized
//!   tidemark --help                  Show help

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use tidemark_core::{ScanWarning, TrackerConfig};
use tidemark_state::{Change, StateRepository};
use tidemark_sync::{DirectoryReplica, SyncReport, Synchronizer};

#[derive(Parser)]
#[command(
    name = "tidemark",
    version,
    about = "Detects what changed in a directory tree since it was last synchronized",
    long_about = "tidemark remembers a fingerprint of every file it has seen and reports \
                  files that were added, modified or deleted since.\n\n\
                  State lives in a `.tidemark` directory inside the tracked tree."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List pending changes without recording anything
    Status {
        /// Tracked directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Mirror pending changes into a directory replica
    Sync {
        /// Tracked directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Replica directory
        #[arg(long)]
        to: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Record every pending change as synchronized without copying anything
    Accept {
        /// Tracked directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// One pending change, as printed by `status`.
#[derive(Debug, Serialize)]
struct StatusEntry {
    kind: String,
    item: PathBuf,
    size: Option<u64>,
    previous: Option<String>,
    new: Option<String>,
}

impl From<&Change<'_>> for StatusEntry {
    fn from(change: &Change<'_>) -> Self {
        Self {
            kind: change.kind().to_string(),
            item: change.item().to_path_buf(),
            size: change.new_state().map(|state| state.size()),
            previous: change.previous_state().map(ToString::to_string),
            new: change.new_state().map(ToString::to_string),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    root: PathBuf,
    changes: Vec<StatusEntry>,
    warnings: Vec<ScanWarning>,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Command::Status { path, format } => run_status(&path, format),
        Command::Sync { path, to, format } => run_sync(&path, &to, format),
        Command::Accept { path } => run_accept(&path),
    }
}

/// Log to stderr; `RUST_LOG` overrides the verbosity flag.
fn init_logging(verbose: u8) -> Result<()> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {e}"))?;
    Ok(())
}

fn open_repository(path: &Path) -> Result<StateRepository> {
    let path = path.canonicalize().context("Invalid path")?;
    let config = TrackerConfig::load(&path).context("Failed to load configuration")?;
    tracing::debug!(?config, "Opening repository");
    StateRepository::open(config).with_context(|| format!("Cannot track {}", path.display()))
}

/// Explain an empty result: either nothing changed or there is nothing to track.
fn print_no_changes(repository: &StateRepository) {
    if repository.has_content() {
        println!("No changes detected.");
    } else {
        println!(
            "Directory '{}' contains no files to back up.",
            repository.root().display()
        );
    }
}

/// List pending changes.
fn run_status(path: &Path, format: OutputFormat) -> Result<()> {
    let repository = open_repository(path)?;

    let mut changes = repository.changes();
    let entries: Vec<StatusEntry> = changes.by_ref().map(|change| StatusEntry::from(&change)).collect();
    let warnings = changes.take_warnings();
    drop(changes);

    match format {
        OutputFormat::Text => {
            if entries.is_empty() {
                print_no_changes(&repository);
            } else {
                for entry in &entries {
                    let size = entry
                        .size
                        .map(format_size)
                        .unwrap_or_else(|| "-".to_string());
                    println!("{:<9} {:>10}  {}", entry.kind, size, entry.item.display());
                }
                println!();
                println!("{} pending change(s)", entries.len());
            }
            print_warnings(&warnings);
        }
        OutputFormat::Json => {
            let report = StatusReport {
                root: repository.root().to_path_buf(),
                changes: entries,
                warnings,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Mirror pending changes into a directory replica.
fn run_sync(path: &Path, destination: &Path, format: OutputFormat) -> Result<()> {
    let repository = open_repository(path)?;
    let mut replica = DirectoryReplica::open_outside(destination, repository.root())
        .with_context(|| format!("Cannot open replica at {}", destination.display()))?;

    eprintln!(
        "Synchronizing {} to {}...",
        repository.root().display(),
        replica.root().display()
    );

    let report = Synchronizer::from_config(repository.config())
        .run(&repository, &mut replica)
        .context("Synchronization aborted")?;

    match format {
        OutputFormat::Text => print_sync_report(&repository, &report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if !report.failures.is_empty() {
        bail!("{} item(s) could not be synchronized", report.failures.len());
    }
    Ok(())
}

fn print_sync_report(repository: &StateRepository, report: &SyncReport) {
    if !report.has_changes() {
        print_no_changes(repository);
        print_warnings(&report.warnings);
        return;
    }

    for item in &report.uploaded {
        println!("uploaded  {}", item.display());
    }
    for item in &report.unchanged {
        println!("unchanged {}", item.display());
    }
    for item in &report.deleted {
        println!("deleted   {}", item.display());
    }
    for failure in &report.failures {
        println!("failed    {failure}");
    }

    println!();
    println!(
        "{} uploaded ({}), {} deleted, {} failed",
        report.uploaded.len(),
        format_size(report.bytes_uploaded),
        report.deleted.len(),
        report.failures.len()
    );
    print_warnings(&report.warnings);
}

/// Commit every pending change.
fn run_accept(path: &Path) -> Result<()> {
    let repository = open_repository(path)?;

    let mut accepted = 0usize;
    let mut failed = Vec::new();
    let mut changes = repository.changes();
    for change in changes.by_ref() {
        let item = change.item().to_path_buf();
        match change.commit() {
            Ok(()) => accepted += 1,
            Err(err) => {
                tracing::warn!("Could not record state of {}: {err}", item.display());
                failed.push(err);
            }
        }
    }
    let warnings = changes.take_warnings();
    drop(changes);

    if accepted == 0 && failed.is_empty() {
        print_no_changes(&repository);
    } else {
        println!("Accepted {accepted} change(s).");
    }
    for err in &failed {
        println!("failed    {err}");
    }
    print_warnings(&warnings);

    if !failed.is_empty() {
        bail!("{} change(s) could not be recorded; run accept again", failed.len());
    }
    Ok(())
}

fn print_warnings(warnings: &[ScanWarning]) {
    if warnings.is_empty() {
        return;
    }
    eprintln!();
    eprintln!("{} warning(s) during scan", warnings.len());
    for warning in warnings {
        eprintln!("  {}: {}", warning.path.display(), warning.message);
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
