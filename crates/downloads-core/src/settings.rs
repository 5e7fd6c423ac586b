use clap::Parser;
use std::path::PathBuf;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Count installer downloads in cloud storage access logs
#[derive(Parser, Debug, Clone)]
#[command(
    name = "release-downloads",
    about = "Count installer downloads by month and platform from storage access logs",
    version
)]
pub struct Settings {
    /// Usage log CSV file, or a directory of usage log CSV files
    pub source: PathBuf,

    /// Timezone for month/day/hour bucketing (system timezone if "auto")
    #[arg(long, default_value = "auto")]
    pub timezone: String,

    /// Case-sensitive token an object path must contain to count as a release
    #[arg(long, default_value = "InVEST")]
    pub product_marker: String,

    /// Leading file-name prefix that selects usage files in a directory and
    /// is replaced when deriving output file names
    #[arg(long, default_value = "usage-")]
    pub usage_prefix: String,

    /// SQLite file for the unique-download store (in memory when omitted)
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Seconds between progress messages during a scan (1-3600)
    #[arg(long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub progress_interval: u64,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub summary_json: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse the process arguments and apply derived overrides.
    pub fn load() -> Self {
        Self::resolve(Settings::parse())
    }

    /// Same as [`Settings::load`] but with an explicit argument list.
    pub fn load_from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::resolve(Settings::parse_from(args))
    }

    /// `--debug` overrides the log level.
    fn resolve(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    pub fn progress_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.progress_interval)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
