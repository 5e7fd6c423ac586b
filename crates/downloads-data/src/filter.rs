//! Row filter: decides which access-log rows are installer downloads.
//!
//! [`RowFilter::classify`] is a pure keep/drop decision for one record;
//! [`scan`] folds a whole row stream into kept records plus [`FilterStats`].

use std::path::Path;

use downloads_core::models::{FilteredRecord, LogRecord, Platform};
use downloads_core::progress::{ProgressObserver, ScanProgress};
use downloads_core::time_utils::{is_month_key, month_key, TimezoneHandler};
use downloads_core::Result;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::reader::RowError;

/// Recognised installer suffixes. Classification picks the longest match.
pub const INSTALLER_SUFFIXES: [(&str, Platform); 5] = [
    (".tar.gz", Platform::Python),
    (".whl", Platform::Python),
    (".exe", Platform::Windows),
    (".dmg", Platform::Mac),
    (".zip", Platform::Mac),
];

/// Platform of `object` by its longest recognised suffix.
pub fn classify_platform(object: &str) -> Option<Platform> {
    INSTALLER_SUFFIXES
        .iter()
        .filter(|(suffix, _)| object.ends_with(suffix))
        .max_by_key(|(suffix, _)| suffix.len())
        .map(|(_, platform)| *platform)
}

// ── FilterRules ───────────────────────────────────────────────────────────────

/// Path markers that decide whether an object is a product installer.
#[derive(Debug, Clone)]
pub struct FilterRules {
    /// Case-sensitive token every counted object path contains.
    pub product_marker: String,
    /// Objects containing this token are documentation pages.
    pub documentation_marker: String,
    sample_data: Regex,
}

impl FilterRules {
    pub fn new(product_marker: impl Into<String>) -> Self {
        Self {
            product_marker: product_marker.into(),
            documentation_marker: "userguide".to_string(),
            sample_data: Regex::new(r"_sample_data\.zip$|/data/").expect("regex is valid"),
        }
    }

    fn is_sample_data(&self, object: &str) -> bool {
        self.sample_data.is_match(object)
    }
}

impl Default for FilterRules {
    fn default() -> Self {
        Self::new("InVEST")
    }
}

// ── Verdicts ──────────────────────────────────────────────────────────────────

/// Why a row was not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    MissingObject,
    NotProduct,
    Documentation,
    SampleData,
    HttpError,
    UnrecognizedExtension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep(Platform),
    Drop(DropReason),
}

// ── RowFilter ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RowFilter {
    rules: FilterRules,
    clock: TimezoneHandler,
}

impl RowFilter {
    pub fn new(rules: FilterRules, clock: TimezoneHandler) -> Self {
        Self { rules, clock }
    }

    /// Keep/drop decision for one record. Checks run in a fixed order and the
    /// first failing check names the reason.
    pub fn classify(&self, record: &LogRecord) -> Verdict {
        let Some(object) = record.cs_object.as_deref() else {
            return Verdict::Drop(DropReason::MissingObject);
        };
        if !object.contains(&self.rules.product_marker) {
            return Verdict::Drop(DropReason::NotProduct);
        }
        if object.contains(&self.rules.documentation_marker) {
            return Verdict::Drop(DropReason::Documentation);
        }
        if self.rules.is_sample_data(object) {
            return Verdict::Drop(DropReason::SampleData);
        }
        if record.is_http_error() {
            return Verdict::Drop(DropReason::HttpError);
        }
        match classify_platform(object) {
            Some(platform) => Verdict::Keep(platform),
            None => Verdict::Drop(DropReason::UnrecognizedExtension),
        }
    }

    /// Attach the local datetime to a kept record.
    ///
    /// Timestamps whose local date has no four-digit `YYYY-MM` month key are
    /// rejected as out of range.
    pub fn keep(
        &self,
        record: LogRecord,
        platform: Platform,
    ) -> std::result::Result<FilteredRecord, RowError> {
        let value = record.time_micros;
        let out_of_range = || RowError::TimestampOutOfRange { value };
        let datetime = self
            .clock
            .local_from_micros(value)
            .ok_or_else(out_of_range)?;
        if !is_month_key(&month_key(&datetime)) {
            return Err(out_of_range());
        }
        Ok(FilteredRecord {
            record,
            datetime,
            platform,
        })
    }
}

// ── FilterStats ───────────────────────────────────────────────────────────────

/// Counters of one scan. Merging is plain per-field addition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub rows_read: u64,
    pub malformed: u64,
    pub kept: u64,
    pub missing_object: u64,
    pub not_product: u64,
    pub documentation: u64,
    pub sample_data: u64,
    pub http_error: u64,
    pub unrecognized: u64,
}

impl FilterStats {
    pub fn record_drop(&mut self, reason: DropReason) {
        let counter = match reason {
            DropReason::MissingObject => &mut self.missing_object,
            DropReason::NotProduct => &mut self.not_product,
            DropReason::Documentation => &mut self.documentation,
            DropReason::SampleData => &mut self.sample_data,
            DropReason::HttpError => &mut self.http_error,
            DropReason::UnrecognizedExtension => &mut self.unrecognized,
        };
        *counter += 1;
    }

    /// Rows that parsed but were not kept.
    pub fn dropped(&self) -> u64 {
        self.missing_object
            + self.not_product
            + self.documentation
            + self.sample_data
            + self.http_error
            + self.unrecognized
    }

    /// Share of all rows read that had an unrecognised extension, in percent.
    pub fn unrecognized_percent(&self) -> f64 {
        if self.rows_read == 0 {
            return 0.0;
        }
        self.unrecognized as f64 / self.rows_read as f64 * 100.0
    }

    pub fn merge(&mut self, other: &FilterStats) {
        self.rows_read += other.rows_read;
        self.malformed += other.malformed;
        self.kept += other.kept;
        self.missing_object += other.missing_object;
        self.not_product += other.not_product;
        self.documentation += other.documentation;
        self.sample_data += other.sample_data;
        self.http_error += other.http_error;
        self.unrecognized += other.unrecognized;
    }
}

// ── scan ──────────────────────────────────────────────────────────────────────

/// Kept records and counters of one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub records: Vec<FilteredRecord>,
    pub stats: FilterStats,
}

/// Filter a stream of parsed rows.
///
/// Malformed rows are skipped with a warning. Only an I/O failure of the
/// underlying reader aborts the scan. `observer` is called after every row
/// and is expected to throttle itself.
pub fn scan<I>(
    rows: I,
    filter: &RowFilter,
    source: &Path,
    observer: &mut dyn ProgressObserver,
) -> Result<ScanOutcome>
where
    I: IntoIterator<Item = std::result::Result<LogRecord, RowError>>,
{
    let mut outcome = ScanOutcome::default();

    for row in rows {
        outcome.stats.rows_read += 1;

        let kept = row.and_then(|record| match filter.classify(&record) {
            Verdict::Keep(platform) => filter.keep(record, platform).map(Some),
            Verdict::Drop(reason) => {
                if reason == DropReason::UnrecognizedExtension {
                    debug!(
                        "{}: unrecognised extension on {:?}",
                        source.display(),
                        record.cs_object
                    );
                }
                outcome.stats.record_drop(reason);
                Ok(None)
            }
        });

        match kept {
            Ok(Some(record)) => {
                outcome.stats.kept += 1;
                outcome.records.push(record);
            }
            Ok(None) => {}
            Err(RowError::Csv { source: err, .. }) if err.is_io_error() => {
                return Err(err.into())
            }
            Err(err) => {
                warn!("{}: skipping malformed row: {}", source.display(), err);
                outcome.stats.malformed += 1;
            }
        }

        observer.on_progress(&ScanProgress {
            rows_read: outcome.stats.rows_read,
            rows_kept: outcome.stats.kept,
        });
    }

    log_summary(source, &outcome.stats);
    Ok(outcome)
}

fn log_summary(source: &Path, stats: &FilterStats) {
    info!(
        "{}: {} rows read, {} kept, {} dropped, {} malformed",
        source.display(),
        stats.rows_read,
        stats.kept,
        stats.dropped(),
        stats.malformed
    );
    info!(
        "{}: {} rows ({:.2}%) had an unrecognised extension",
        source.display(),
        stats.unrecognized,
        stats.unrecognized_percent()
    );
}

// ── Tests ─────────────────────────────────────────────────────────────────────
