use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the download report pipeline.
#[derive(Error, Debug)]
pub enum DownloadsError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An output file could not be created or written.
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A usage log is missing a column the pipeline cannot run without.
    #[error("Missing required column \"{column}\" in {path}")]
    MissingColumn { path: PathBuf, column: String },

    /// A source directory contained no usage CSV files.
    #[error("No usage CSV files found in {0}")]
    NoUsageFiles(PathBuf),

    /// The CSV layer failed in a way that is not a per-row problem.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The embedded SQLite store rejected a statement.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A run summary could not be serialised.
    #[error("Failed to serialise JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the downloads crates.
pub type Result<T> = std::result::Result<T, DownloadsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = DownloadsError::FileRead {
            path: PathBuf::from("/logs/usage-2021.csv"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/logs/usage-2021.csv"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_error_display_missing_column() {
        let err = DownloadsError::MissingColumn {
            path: PathBuf::from("usage-a.csv"),
            column: "sc_status".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing required column \"sc_status\" in usage-a.csv"
        );
    }

    #[test]
    fn test_error_display_no_usage_files() {
        let err = DownloadsError::NoUsageFiles(PathBuf::from("/empty/dir"));
        assert_eq!(err.to_string(), "No usage CSV files found in /empty/dir");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: DownloadsError = io_err.into();
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let sql_err = conn.execute("SELECT * FROM missing_table", []).unwrap_err();
        let err: DownloadsError = sql_err.into();
        assert!(err.to_string().starts_with("Database error:"));
    }
}
