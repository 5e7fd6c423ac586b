use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::warn;

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Uses the `iana-time-zone` crate directly – no subprocess calls.
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

// ── TimezoneHandler ───────────────────────────────────────────────────────────

/// Converts access-log epoch timestamps into report-local calendar time.
#[derive(Debug, Clone, Copy)]
pub struct TimezoneHandler {
    tz: Tz,
}

impl TimezoneHandler {
    /// Create a handler for the given IANA timezone name.
    ///
    /// `"auto"` resolves to the system timezone. Names that are not a
    /// recognised IANA timezone fall back to UTC with a warning.
    pub fn new(tz_name: &str) -> Self {
        let resolved = if tz_name.eq_ignore_ascii_case("auto") {
            get_system_timezone()
        } else {
            tz_name.to_string()
        };
        let tz = resolved.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                "TimezoneHandler: unrecognised timezone \"{}\", falling back to UTC",
                resolved
            );
            Tz::UTC
        });
        Self { tz }
    }

    pub fn utc() -> Self {
        Self { tz: Tz::UTC }
    }

    /// Convert microseconds since the epoch into local wall-clock time.
    ///
    /// Returns `None` when the value is outside chrono's representable range.
    pub fn local_from_micros(&self, micros: i64) -> Option<NaiveDateTime> {
        let utc: DateTime<Utc> = DateTime::from_timestamp_micros(micros)?;
        Some(utc.with_timezone(&self.tz).naive_local())
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }
}

// ── Bucket keys ───────────────────────────────────────────────────────────────

/// `YYYY-MM` month bucket of a local datetime.
pub fn month_key(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m").to_string()
}

/// `YYYY-MM-DD` calendar day of a local datetime.
pub fn day_key(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d").to_string()
}

/// `true` when `key` is a well-formed `YYYY-MM` month bucket.
pub fn is_month_key(key: &str) -> bool {
    let bytes = key.as_bytes();
    bytes.len() == 7
        && bytes[4] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_digit)
        && key[5..]
            .parse::<u32>()
            .map(|month| (1..=12).contains(&month))
            .unwrap_or(false)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
