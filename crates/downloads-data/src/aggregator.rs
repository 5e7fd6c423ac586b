//! Monthly download counts per platform.

use std::collections::BTreeMap;

use downloads_core::models::{FilteredRecord, Platform};
use serde::Serialize;

// ── MonthlyCounts ─────────────────────────────────────────────────────────────

/// `YYYY-MM` → platform → downloads.
///
/// Keys are kept in a `BTreeMap`, so iteration is in ascending month order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthlyCounts {
    months: BTreeMap<String, BTreeMap<Platform, u64>>,
}

impl MonthlyCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one kept record.
    pub fn add(&mut self, record: &FilteredRecord) {
        self.add_count(record.month_key(), record.platform, 1);
    }

    pub fn add_count(&mut self, month: impl Into<String>, platform: Platform, count: u64) {
        *self
            .months
            .entry(month.into())
            .or_default()
            .entry(platform)
            .or_insert(0) += count;
    }

    /// Per-key addition of `other` into `self`.
    pub fn merge(&mut self, other: &MonthlyCounts) {
        for (month, platforms) in &other.months {
            for (platform, count) in platforms {
                self.add_count(month.clone(), *platform, *count);
            }
        }
    }

    pub fn get(&self, month: &str, platform: Platform) -> u64 {
        self.months
            .get(month)
            .and_then(|platforms| platforms.get(&platform))
            .copied()
            .unwrap_or(0)
    }

    /// Sum over every platform present in `month`.
    pub fn total(&self, month: &str) -> u64 {
        self.months
            .get(month)
            .map(|platforms| platforms.values().sum())
            .unwrap_or(0)
    }

    pub fn grand_total(&self) -> u64 {
        self.months
            .values()
            .flat_map(|platforms| platforms.values())
            .sum()
    }

    /// Month keys in ascending order.
    pub fn months(&self) -> impl Iterator<Item = &str> {
        self.months.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    /// One report row per month, ascending.
    pub fn rows(&self) -> Vec<MonthlyRow> {
        self.months
            .iter()
            .map(|(month, platforms)| {
                let count = |p: Platform| platforms.get(&p).copied().unwrap_or(0);
                MonthlyRow {
                    month: month.clone(),
                    python: count(Platform::Python),
                    mac: count(Platform::Mac),
                    windows: count(Platform::Windows),
                    total: platforms.values().sum(),
                }
            })
            .collect()
    }
}

/// One line of the monthly report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyRow {
    pub month: String,
    pub python: u64,
    pub mac: u64,
    pub windows: u64,
    pub total: u64,
}

// ── DownloadAggregator ────────────────────────────────────────────────────────

/// Stateless helper that folds kept records into monthly counts.
pub struct DownloadAggregator;

impl DownloadAggregator {
    /// Count `records` by calendar month and platform.
    pub fn aggregate_monthly<'a, I>(records: I) -> MonthlyCounts
    where
        I: IntoIterator<Item = &'a FilteredRecord>,
    {
        records
            .into_iter()
            .fold(MonthlyCounts::new(), |mut counts, record| {
                counts.add(record);
                counts
            })
    }

    /// Merge per-file counts into one.
    pub fn merge_all<'a, I>(parts: I) -> MonthlyCounts
    where
        I: IntoIterator<Item = &'a MonthlyCounts>,
    {
        parts
            .into_iter()
            .fold(MonthlyCounts::new(), |mut merged, part| {
                merged.merge(part);
                merged
            })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
