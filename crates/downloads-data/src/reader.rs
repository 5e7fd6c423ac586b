//! Access-log CSV discovery and loading.
//!
//! Reads cloud storage usage exports and converts each row into a
//! [`LogRecord`]. Rows that cannot be parsed are reported as [`RowError`]s so
//! the scan can skip them; a header without the required columns is fatal.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use downloads_core::models::LogRecord;
use downloads_core::{DownloadsError, Result};
use tracing::{debug, warn};

/// Columns every usage log must provide.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "cs_object",
    "sc_status",
    "time_micros",
    "c_ip",
    "cs_user_agent",
    "cs_referer",
    "sc_bytes",
    "cs_method",
];

// ── Public API ────────────────────────────────────────────────────────────────

/// Find all usage CSV files recursively under `dir`, sorted by path.
///
/// A file qualifies when its extension is `csv` and its name starts with
/// `usage_prefix`.
pub fn find_usage_files(dir: &Path, usage_prefix: &str) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Source path does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let path = entry.path();
            entry.file_type().is_file()
                && path.extension().map(|ext| ext == "csv").unwrap_or(false)
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with(usage_prefix))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// A row that could not be turned into a [`LogRecord`].
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    /// The CSV layer rejected the line (wrong field count, bad UTF-8, I/O).
    #[error("line {line}: {source}")]
    Csv {
        line: u64,
        #[source]
        source: csv::Error,
    },

    /// A numeric column held something that is not a number.
    #[error("line {line}: invalid {column} value \"{value}\"")]
    InvalidField {
        line: u64,
        column: &'static str,
        value: String,
    },

    /// The timestamp cannot be represented as a calendar date.
    #[error("time_micros {value} is out of range")]
    TimestampOutOfRange { value: i64 },
}

/// Streaming reader over one usage log.
pub struct LogReader<R> {
    headers: Vec<String>,
    columns: ColumnIndex,
    reader: csv::Reader<R>,
}

impl LogReader<File> {
    /// Open `path` and validate its header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| DownloadsError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, path)
    }
}

impl<R: Read> LogReader<R> {
    /// Wrap any reader; `source` is only used in messages.
    pub fn from_reader(rdr: R, source: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(rdr);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let columns = ColumnIndex::from_headers(&headers, source)?;

        debug!(
            "{}: {} columns, required columns present",
            source.display(),
            headers.len()
        );

        Ok(Self {
            headers,
            columns,
            reader,
        })
    }

    /// Column names of the source file, in order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Iterate over the data rows.
    pub fn records(
        &mut self,
    ) -> impl Iterator<Item = std::result::Result<LogRecord, RowError>> + '_ {
        let columns = self.columns;
        self.reader.records().map(move |result| {
            let record = result.map_err(|source| RowError::Csv {
                line: source.position().map(|p| p.line()).unwrap_or(0),
                source,
            })?;
            columns.parse(&record)
        })
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Positions of the required columns within a header row.
#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    cs_object: usize,
    sc_status: usize,
    time_micros: usize,
    c_ip: usize,
    cs_user_agent: usize,
    cs_referer: usize,
    sc_bytes: usize,
    cs_method: usize,
}

impl ColumnIndex {
    fn from_headers(headers: &[String], source: &Path) -> Result<Self> {
        let find = |column: &str| {
            headers
                .iter()
                .position(|h| h.trim() == column)
                .ok_or_else(|| DownloadsError::MissingColumn {
                    path: source.to_path_buf(),
                    column: column.to_string(),
                })
        };

        Ok(Self {
            cs_object: find("cs_object")?,
            sc_status: find("sc_status")?,
            time_micros: find("time_micros")?,
            c_ip: find("c_ip")?,
            cs_user_agent: find("cs_user_agent")?,
            cs_referer: find("cs_referer")?,
            sc_bytes: find("sc_bytes")?,
            cs_method: find("cs_method")?,
        })
    }

    fn parse(&self, record: &csv::StringRecord) -> std::result::Result<LogRecord, RowError> {
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let required = |column: &'static str| RowError::InvalidField {
            line,
            column,
            value: String::new(),
        };

        let time_micros = parse_number::<i64>(field(self.time_micros), line, "time_micros")?
            .ok_or_else(|| required("time_micros"))?;
        let sc_status = parse_number::<u16>(field(self.sc_status), line, "sc_status")?
            .ok_or_else(|| required("sc_status"))?;
        let sc_bytes = parse_number::<u64>(field(self.sc_bytes), line, "sc_bytes")?.unwrap_or(0);
        // The download store keeps byte counts as SQLite integers.
        if i64::try_from(sc_bytes).is_err() {
            return Err(RowError::InvalidField {
                line,
                column: "sc_bytes",
                value: sc_bytes.to_string(),
            });
        }

        let object = field(self.cs_object);
        let cs_object = if object.is_empty() {
            None
        } else {
            Some(object.to_string())
        };

        Ok(LogRecord {
            time_micros,
            cs_object,
            sc_status,
            c_ip: field(self.c_ip).to_string(),
            cs_user_agent: field(self.cs_user_agent).to_string(),
            cs_referer: field(self.cs_referer).to_string(),
            sc_bytes,
            cs_method: field(self.cs_method).to_string(),
            fields: record.iter().map(str::to_string).collect(),
        })
    }
}

/// Parse a numeric column. Empty cells yield `Ok(None)`.
fn parse_number<T: std::str::FromStr>(
    raw: &str,
    line: u64,
    column: &'static str,
) -> std::result::Result<Option<T>, RowError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|_| RowError::InvalidField {
            line,
            column,
            value: trimmed.to_string(),
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
