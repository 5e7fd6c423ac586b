use std::path::{Path, PathBuf};
use std::sync::Mutex;

use downloads_core::DownloadsError;
use downloads_data::reader::find_usage_files;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Initialise the global `tracing` subscriber.
///
/// `log_level` is mapped to a [`tracing_subscriber::EnvFilter`] directive.
/// Falls back to `"info"` if the level string is not recognised. Logs go to
/// stderr, and additionally to `log_file` when one is given, so stdout stays
/// free for the JSON summary.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(normalise_level(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

/// Map the CLI log-level names to tracing level names.
fn normalise_level(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => log_level.to_lowercase(),
    }
}

// ── Source discovery ───────────────────────────────────────────────────────────

/// Expand `source` into the usage files to read.
///
/// A directory yields every usage CSV under it; anything else is taken as a
/// single file and checked when it is opened.
pub fn resolve_sources(
    source: &Path,
    usage_prefix: &str,
) -> Result<Vec<PathBuf>, DownloadsError> {
    if !source.is_dir() {
        return Ok(vec![source.to_path_buf()]);
    }
    let files = find_usage_files(source, usage_prefix);
    if files.is_empty() {
        return Err(DownloadsError::NoUsageFiles(source.to_path_buf()));
    }
    Ok(files)
}

// ── Output paths ───────────────────────────────────────────────────────────────

/// Where the three reports are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub filtered: PathBuf,
    pub monthly: PathBuf,
    pub unique: PathBuf,
}

impl OutputPaths {
    /// Derive report paths from the source path.
    ///
    /// For a file, a leading `usage_prefix` in the file name is replaced by
    /// the report prefix (`usage-2021.csv` → `monthly-2021.csv`); names that
    /// do not start with it get the report prefix prepended. For a directory, fixed names inside it
    /// are used.
    pub fn for_source(source: &Path, usage_prefix: &str) -> Self {
        if source.is_dir() {
            return Self {
                filtered: source.join("filtered-downloads.csv"),
                monthly: source.join("monthly-downloads.csv"),
                unique: source.join("unique-downloads.csv"),
            };
        }
        Self {
            filtered: replace_prefix(source, usage_prefix, "filtered-"),
            monthly: replace_prefix(source, usage_prefix, "monthly-"),
            unique: replace_prefix(source, usage_prefix, "unique-"),
        }
    }
}

fn replace_prefix(source: &Path, usage_prefix: &str, replacement: &str) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let rest = name.strip_prefix(usage_prefix).unwrap_or(name.as_str());
    let renamed = format!("{replacement}{rest}");
    source.with_file_name(renamed)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
