//! Main analysis pipeline.
//!
//! Reads each usage file, filters and aggregates it on its own, merges the
//! per-file results and runs the unique-download estimate over every kept
//! record. Returns an [`AnalysisResult`] ready to be written out.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use downloads_core::models::{FilteredRecord, MonthlyUniqueCount};
use downloads_core::progress::{LogProgress, Throttled};
use downloads_core::settings::Settings;
use downloads_core::time_utils::TimezoneHandler;
use downloads_core::Result;
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregator::{DownloadAggregator, MonthlyCounts, MonthlyRow};
use crate::estimator::DownloadStore;
use crate::filter::{scan, FilterRules, FilterStats, RowFilter};
use crate::reader::LogReader;

// ── Public types ──────────────────────────────────────────────────────────────

/// Knobs of one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// IANA timezone name, or `"auto"`.
    pub timezone: String,
    pub product_marker: String,
    /// SQLite file for the estimator; in memory when `None`.
    pub database: Option<PathBuf>,
    pub progress_interval: Duration,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            timezone: "auto".to_string(),
            product_marker: "InVEST".to_string(),
            database: None,
            progress_interval: Duration::from_secs(5),
        }
    }
}

impl From<&Settings> for AnalysisOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            timezone: settings.timezone.clone(),
            product_marker: settings.product_marker.clone(),
            database: settings.database.clone(),
            progress_interval: settings.progress_interval(),
        }
    }
}

/// Filter and aggregation result of one usage file.
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    pub source: PathBuf,
    pub headers: Vec<String>,
    pub records: Vec<FilteredRecord>,
    pub stats: FilterStats,
    pub monthly: MonthlyCounts,
}

/// Metadata produced alongside the analysis result.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMetadata {
    /// ISO-8601 timestamp when this result was generated.
    pub generated_at: String,
    /// Usage files that were read.
    pub sources: Vec<PathBuf>,
    /// IANA name of the timezone used for month/day/hour buckets.
    pub timezone: String,
    /// Wall-clock seconds spent reading and filtering.
    pub load_time_seconds: f64,
    /// Wall-clock seconds spent on the unique-download estimate.
    pub estimate_time_seconds: f64,
}

/// The complete output of [`analyze_files`].
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// Column names of the filtered output, excluding `datetime`.
    pub headers: Vec<String>,
    /// Kept records of every file, in read order.
    pub records: Vec<FilteredRecord>,
    pub monthly: MonthlyCounts,
    pub unique: Vec<MonthlyUniqueCount>,
    pub stats: FilterStats,
    pub metadata: AnalysisMetadata,
}

/// JSON-friendly view of an [`AnalysisResult`].
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub metadata: &'a AnalysisMetadata,
    pub stats: &'a FilterStats,
    pub monthly: Vec<MonthlyRow>,
    pub unique: &'a [MonthlyUniqueCount],
}

impl AnalysisResult {
    pub fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            metadata: &self.metadata,
            stats: &self.stats,
            monthly: self.monthly.rows(),
            unique: &self.unique,
        }
    }
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Filter and aggregate a single usage file.
pub fn analyze_file(
    path: &Path,
    filter: &RowFilter,
    progress_interval: Duration,
) -> Result<FileAnalysis> {
    let mut reader = LogReader::open(path)?;
    let headers = reader.headers().to_vec();
    let mut progress = Throttled::new(LogProgress::new(path), progress_interval);

    let outcome = scan(reader.records(), filter, path, &mut progress)?;
    let monthly = DownloadAggregator::aggregate_monthly(&outcome.records);

    Ok(FileAnalysis {
        source: path.to_path_buf(),
        headers,
        records: outcome.records,
        stats: outcome.stats,
        monthly,
    })
}

/// Run the full pipeline over `files`.
///
/// 1. Filter and aggregate each file with [`analyze_file`].
/// 2. Merge monthly counts and filter statistics.
/// 3. Load all kept records into a [`DownloadStore`] and estimate unique
///    downloads per month.
///
/// The filtered-output header is taken from the first file; records from
/// files with a different column layout are re-ordered to match it.
pub fn analyze_files(files: &[PathBuf], options: &AnalysisOptions) -> Result<AnalysisResult> {
    let clock = TimezoneHandler::new(&options.timezone);
    let filter = RowFilter::new(FilterRules::new(options.product_marker.clone()), clock);

    // ── Step 1: Filter and aggregate per file ─────────────────────────────────
    let load_start = Instant::now();
    let mut parts = Vec::with_capacity(files.len());
    for path in files {
        info!("Reading {}", path.display());
        parts.push(analyze_file(path, &filter, options.progress_interval)?);
    }

    // ── Step 2: Merge ─────────────────────────────────────────────────────────
    let monthly = DownloadAggregator::merge_all(parts.iter().map(|p| &p.monthly));
    let mut stats = FilterStats::default();
    for part in &parts {
        stats.merge(&part.stats);
    }
    if parts.len() > 1 {
        info!(
            "All files: {} rows read, {} rows ({:.2}%) had an unrecognised extension",
            stats.rows_read,
            stats.unrecognized,
            stats.unrecognized_percent()
        );
    }

    let headers = parts.first().map(|p| p.headers.clone()).unwrap_or_default();
    let mut records = Vec::with_capacity(stats.kept as usize);
    for part in parts {
        if part.headers == headers {
            records.extend(part.records);
        } else {
            debug!(
                "{}: re-ordering columns to match the first file",
                part.source.display()
            );
            records.extend(part.records.into_iter().map(|mut record| {
                record.record.fields =
                    align_fields(&record.record.fields, &part.headers, &headers);
                record
            }));
        }
    }
    let load_time = load_start.elapsed().as_secs_f64();

    // ── Step 3: Unique-download estimate ──────────────────────────────────────
    let estimate_start = Instant::now();
    let mut store = match &options.database {
        Some(path) => DownloadStore::open(path)?,
        None => DownloadStore::open_in_memory()?,
    };
    store.insert_records(&records)?;
    let unique = store.unique_downloads_by_month()?;
    let estimate_time = estimate_start.elapsed().as_secs_f64();

    info!(
        "{} downloads kept across {} months; {} estimated unique",
        stats.kept,
        unique.len(),
        unique.iter().map(|u| u.unique_downloads).sum::<u64>()
    );

    let metadata = AnalysisMetadata {
        generated_at: Utc::now().to_rfc3339(),
        sources: files.to_vec(),
        timezone: clock.tz().name().to_string(),
        load_time_seconds: load_time,
        estimate_time_seconds: estimate_time,
    };

    Ok(AnalysisResult {
        headers,
        records,
        monthly,
        unique,
        stats,
        metadata,
    })
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Re-order `fields` (laid out as `from`) into the `to` layout. Columns that
/// `from` lacks become empty.
fn align_fields(fields: &[String], from: &[String], to: &[String]) -> Vec<String> {
    to.iter()
        .map(|column| {
            from.iter()
                .position(|c| c == column)
                .and_then(|idx| fields.get(idx))
                .cloned()
                .unwrap_or_default()
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
