//! # djarchive CLI - publish and retrieve dataset revisions
//!
//! ## Usage
//! ```bash
//! # List published datasets
//! djarchive datasets
//!
//! # List revisions of one dataset (or of all datasets)
//! djarchive revisions acme
//!
//! # Retrieve a revision into ./acme-rev1, creating it if needed
//! djarchive retrieve acme rev1 ./acme-rev1 --create
//!
//! # Publish a local tree (uses the admin scope)
//! djarchive upload acme rev2 ./acme --ignore '*.tmp'
//!
//! # Check a retrieved tree against its manifest, offline
//! djarchive verify ./acme-rev1
//! ```
//!
//! Settings are read from `--config`, or `djarchive.json` in the working
//! directory, and can be overridden with `DJARCHIVE_*` variables.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use djarchive::config::ENV_LOGLEVEL;
use djarchive::utils::format_bytes;
use djarchive::{
    ArchiveClient, ArchiveConfig, ArchiveError, ConfigFile, DownloadOptions, DownloadReport,
    IntegrityIssue, Manifest, ProgressCallback, ProgressInfo, UploadMode, UploadOptions,
    MANIFEST_FILENAME,
};
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Exit status when a command completed but found integrity issues
const EXIT_ISSUES: i32 = 2;

/// djarchive CLI - manifest-verified dataset archives
#[derive(Parser)]
#[command(name = "djarchive")]
#[command(author = "Vathes, Inc. <chris@vathes.com>")]
#[command(version)]
#[command(about = "Publish and retrieve versioned datasets on an object store")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./djarchive.json if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the admin credential scope
    #[arg(long, global = true)]
    admin: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List datasets
    #[command(alias = "ls")]
    Datasets,

    /// List revisions as `dataset,revision`
    Revisions {
        /// Only list revisions of this dataset
        dataset: Option<String>,
    },

    /// Retrieve a dataset revision
    #[command(alias = "get")]
    Retrieve {
        /// Dataset name
        dataset: String,

        /// Revision name
        revision: String,

        /// Target directory (defaults to current)
        target: Option<PathBuf>,

        /// Create the target directory if missing
        #[arg(long)]
        create: bool,

        /// Stop at the first integrity issue
        #[arg(long)]
        strict: bool,
    },

    /// Publish a local directory as a dataset revision
    #[command(alias = "put")]
    Upload {
        /// Dataset name
        dataset: String,

        /// Revision name
        revision: String,

        /// Source directory
        source: PathBuf,

        /// Leave out files matching a glob pattern
        #[arg(short, long)]
        ignore: Vec<String>,

        /// Follow symbolic links instead of skipping them
        #[arg(long)]
        follow_symlinks: bool,
    },

    /// Check a local directory against its manifest
    Verify {
        /// Directory containing the manifest
        directory: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    let config_file = match ConfigFile::discover(cli.config.as_deref()) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e.user_message());
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(cli.verbose, &config_file) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }

    match run(cli, &config_file) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            match e.downcast_ref::<ArchiveError>() {
                Some(archive_error) => eprintln!("{}: {}", "Error".red().bold(), archive_error.user_message()),
                None => eprintln!("{}: {:#}", "Error".red().bold(), e),
            }
            std::process::exit(1);
        }
    }
}

/// Install the tracing subscriber
///
/// Level: `--verbose`, then `DJARCHIVE_LOGLEVEL`, then the config file, then
/// `info`. Output goes to stderr and, if configured, to a log file.
fn init_logging(verbose: bool, config_file: &ConfigFile) -> anyhow::Result<()> {
    let level = if verbose {
        "debug".to_string()
    } else {
        std::env::var(ENV_LOGLEVEL)
            .ok()
            .or_else(|| config_file.loglevel.clone())
            .unwrap_or_else(|| "info".to_string())
    };
    let filter = EnvFilter::try_new(level.to_lowercase())
        .with_context(|| format!("invalid log level '{}'", level))?;

    let file_layer = match &config_file.logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {:?}", path))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

/// Main command runner, returning the process exit code
fn run(cli: Cli, config_file: &ConfigFile) -> anyhow::Result<i32> {
    match cli.command {
        Commands::Datasets => {
            let client = connect(config_file, cli.admin)?;
            cmd_datasets(&client)
        }
        Commands::Revisions { dataset } => {
            let client = connect(config_file, cli.admin)?;
            cmd_revisions(&client, dataset.as_deref())
        }
        Commands::Retrieve {
            dataset,
            revision,
            target,
            create,
            strict,
        } => {
            let client = connect(config_file, cli.admin)?;
            let target = target.unwrap_or_else(|| PathBuf::from("."));
            cmd_retrieve(&client, &dataset, &revision, &target, create, strict, cli.quiet)
        }
        Commands::Upload {
            dataset,
            revision,
            source,
            ignore,
            follow_symlinks,
        } => {
            let client = connect(config_file, true)?;
            let options = UploadOptions {
                ignore_patterns: ignore,
                follow_symlinks,
                progress_callback: None,
            };
            cmd_upload(&client, &dataset, &revision, &source, options, cli.quiet)
        }
        Commands::Verify { directory } => cmd_verify(&directory),
    }
}

/// Open a client for the requested credential scope
fn connect(config_file: &ConfigFile, admin: bool) -> anyhow::Result<ArchiveClient> {
    let config = ArchiveConfig::from_file(config_file, admin).with_env_overrides();
    let client = ArchiveClient::from_config(&config)?;
    Ok(client)
}

fn cmd_datasets(client: &ArchiveClient) -> anyhow::Result<i32> {
    for name in client.datasets() {
        println!("{}", name?);
    }
    Ok(0)
}

fn cmd_revisions(client: &ArchiveClient, dataset: Option<&str>) -> anyhow::Result<i32> {
    for revision in client.revisions(dataset)? {
        println!("{}", revision);
    }
    Ok(0)
}

/// Retrieve a revision
///
/// Files already present with a matching digest are left alone, so an
/// interrupted retrieval can simply be run again.
fn cmd_retrieve(
    client: &ArchiveClient,
    dataset: &str,
    revision: &str,
    target: &Path,
    create: bool,
    strict: bool,
    quiet: bool,
) -> anyhow::Result<i32> {
    eprintln!(
        "{} {}/{} into {}",
        "Retrieving".blue().bold(),
        dataset.yellow(),
        revision.yellow(),
        target.display()
    );

    let progress = (!quiet).then(|| spinner("Fetching manifest..."));
    let options = DownloadOptions {
        create_target: create,
        strict,
        progress_callback: progress.as_ref().map(chunk_progress),
        ..Default::default()
    };

    let result = client.download(dataset, revision, target, options);
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }
    let report = result.with_context(|| format!("retrieving {}/{}", dataset, revision))?;

    print_download_report(&report);
    Ok(if report.is_clean() { 0 } else { EXIT_ISSUES })
}

fn print_download_report(report: &DownloadReport) {
    let mark = if report.is_clean() { "✓".green().bold() } else { "⚠".yellow().bold() };
    eprintln!("{} Retrieval complete", mark);
    eprintln!("  Fetched: {}", report.files_transferred.to_string().cyan());
    eprintln!("  Up to date: {}", report.files_skipped.to_string().cyan());
    eprintln!("  Bytes: {}", format_bytes(report.bytes_transferred).cyan());
    eprintln!(
        "  Time: {}",
        format_duration(Duration::from_millis(report.duration_ms)).to_string().cyan()
    );

    if !report.is_clean() {
        eprintln!("\n{} {}", report.issue_count().to_string().red().bold(), "integrity issues:".red());
        print_issues(&report.issues);
    }
}

/// Publish a local tree
fn cmd_upload(
    client: &ArchiveClient,
    dataset: &str,
    revision: &str,
    source: &Path,
    mut options: UploadOptions,
    quiet: bool,
) -> anyhow::Result<i32> {
    eprintln!(
        "{} {} as {}/{}",
        "Uploading".blue().bold(),
        source.display(),
        dataset.yellow(),
        revision.yellow()
    );

    let progress = (!quiet).then(|| spinner("Scanning files..."));
    options.progress_callback = progress.as_ref().map(file_progress);

    let result = client.upload(dataset, revision, source, options);
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }
    let report = result.with_context(|| format!("uploading {}/{}", dataset, revision))?;

    let mode = match report.mode {
        UploadMode::Create => "generated",
        UploadMode::Verify => "verified",
    };
    eprintln!("{} Upload complete (manifest {})", "✓".green().bold(), mode);
    eprintln!("  Files: {}", report.files_uploaded.to_string().cyan());
    eprintln!("  Bytes: {}", format_bytes(report.bytes_uploaded).cyan());
    eprintln!("  Manifest: {}", report.manifest_key.cyan());
    eprintln!(
        "  Time: {}",
        format_duration(Duration::from_millis(report.duration_ms)).to_string().cyan()
    );
    Ok(0)
}

/// Verify a local tree against its manifest without touching the store
fn cmd_verify(directory: &Path) -> anyhow::Result<i32> {
    let manifest = Manifest::read(&directory.join(MANIFEST_FILENAME))?;
    eprintln!(
        "{} {} ({} entries)",
        "Verifying".blue().bold(),
        directory.display(),
        manifest.len()
    );

    let report = manifest.verify_tree(directory)?;
    eprintln!("  Files checked: {}", report.files_checked.to_string().cyan());
    if report.is_valid() {
        eprintln!("{} All files match the manifest", "✓".green().bold());
        return Ok(0);
    }

    eprintln!("{} {} issues", "✗".red().bold(), report.issues.len());
    print_issues(&report.issues);
    Ok(EXIT_ISSUES)
}

fn print_issues(issues: &[IntegrityIssue]) {
    for issue in issues {
        println!("  - {}", issue.to_string().yellow());
    }
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Progress callback for downloads, ticking once per chunk
fn chunk_progress(pb: &ProgressBar) -> ProgressCallback {
    let pb = pb.clone();
    Arc::new(move |info: ProgressInfo| {
        let percent = info.percentage().unwrap_or(100.0);
        let total = info.total_bytes.unwrap_or(info.bytes_processed);
        pb.set_message(format!(
            "{} {}/{} ({:.0}%)",
            info.current_item.as_deref().unwrap_or_default(),
            format_bytes(info.bytes_processed),
            format_bytes(total),
            percent
        ));
    })
}

/// Progress callback for uploads, ticking once per file
fn file_progress(pb: &ProgressBar) -> ProgressCallback {
    let pb = pb.clone();
    Arc::new(move |info: ProgressInfo| {
        let counter = match (info.total, info.percentage()) {
            (Some(total), Some(percent)) => {
                format!("[{}/{} {:.0}%]", info.processed, total, percent)
            }
            _ => format!("[{}]", info.processed),
        };
        pb.set_message(format!(
            "{} {} ({})",
            counter,
            info.current_item.unwrap_or_default(),
            format_bytes(info.bytes_processed)
        ));
    })
}
