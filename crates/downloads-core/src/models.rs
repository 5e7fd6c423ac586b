use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Target platform of a downloaded installer, inferred from its file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Python wheels and source distributions.
    Python,
    /// macOS disk images and app bundles.
    Mac,
    /// Windows installers.
    Windows,
}

impl Platform {
    /// Every platform, in report column order.
    pub const ALL: [Platform; 3] = [Platform::Python, Platform::Mac, Platform::Windows];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Python => "python",
            Platform::Mac => "mac",
            Platform::Windows => "windows",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of a cloud storage access log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Request time in microseconds since the Unix epoch.
    pub time_micros: i64,
    /// Requested object path; `None` when the column is empty.
    pub cs_object: Option<String>,
    /// HTTP status code returned to the client.
    pub sc_status: u16,
    /// Client IP address.
    pub c_ip: String,
    /// Client user agent.
    pub cs_user_agent: String,
    /// HTTP referrer.
    pub cs_referer: String,
    /// Bytes served for this request.
    pub sc_bytes: u64,
    /// HTTP method, e.g. `GET` or `HEAD`.
    pub cs_method: String,
    /// Every column value of the source row, in header order.
    pub fields: Vec<String>,
}

impl LogRecord {
    /// `true` for 4xx and 5xx responses.
    pub fn is_http_error(&self) -> bool {
        (400..600).contains(&self.sc_status)
    }
}

/// A log record that passed the row filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredRecord {
    pub record: LogRecord,
    /// Request time converted to the report timezone.
    pub datetime: NaiveDateTime,
    pub platform: Platform,
}

impl FilteredRecord {
    /// ISO-8601 rendering of [`FilteredRecord::datetime`] with microseconds.
    pub fn iso_datetime(&self) -> String {
        self.datetime.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }

    /// Month bucket, `YYYY-MM`.
    pub fn month_key(&self) -> String {
        crate::time_utils::month_key(&self.datetime)
    }

    /// Calendar day, `YYYY-MM-DD`.
    pub fn day_key(&self) -> String {
        crate::time_utils::day_key(&self.datetime)
    }

    pub fn hour(&self) -> u32 {
        self.datetime.hour()
    }

    pub fn is_get(&self) -> bool {
        self.record.cs_method == "GET"
    }

    /// The key under which this record is clustered with its retries.
    pub fn cluster_key(&self) -> ClusterKey {
        ClusterKey {
            user_agent: self.record.cs_user_agent.clone(),
            referer: self.record.cs_referer.clone(),
            object: self.record.cs_object.clone().unwrap_or_default(),
            client_ip: self.record.c_ip.clone(),
            day: self.day_key(),
            hour: self.hour(),
        }
    }
}

/// Requests sharing this key are presumed to be one logical download.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClusterKey {
    pub user_agent: String,
    pub referer: String,
    pub object: String,
    pub client_ip: String,
    /// Calendar day, `YYYY-MM-DD`.
    pub day: String,
    /// Hour of day, 0-23.
    pub hour: u32,
}

/// One estimated real-world download and the requests it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadCluster {
    pub key: ClusterKey,
    /// Month bucket of the cluster, `YYYY-MM`.
    pub month: String,
    /// Number of GET requests folded into this cluster.
    pub requests: u64,
    /// Bytes served across all requests of the cluster.
    pub total_bytes: u64,
}

/// Estimated unique downloads for one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyUniqueCount {
    pub month: String,
    pub unique_downloads: u64,
}
