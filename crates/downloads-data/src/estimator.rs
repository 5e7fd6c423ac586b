//! Unique-download estimate backed by an embedded SQLite store.
//!
//! Kept records are loaded into a `downloads` table. GET requests sharing
//! user agent, referrer, object, client IP, calendar day and hour-of-day are
//! one cluster, i.e. one estimated download. Separate downloads of the same
//! file by the same client within one clock hour are therefore counted once.

use std::path::Path;

use downloads_core::models::{ClusterKey, DownloadCluster, FilteredRecord, MonthlyUniqueCount};
use downloads_core::Result;
use rusqlite::Connection;
use tracing::debug;

const SCHEMA: &str = "DROP TABLE IF EXISTS downloads;
    CREATE TABLE downloads (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        datetime TEXT NOT NULL,
        month TEXT NOT NULL,
        day TEXT NOT NULL,
        hour INTEGER NOT NULL,
        platform TEXT NOT NULL,
        cs_method TEXT NOT NULL,
        is_get INTEGER NOT NULL,
        cs_user_agent TEXT NOT NULL,
        cs_referer TEXT NOT NULL,
        cs_object TEXT NOT NULL,
        c_ip TEXT NOT NULL,
        sc_status INTEGER NOT NULL,
        sc_bytes INTEGER NOT NULL
    );
    CREATE INDEX idx_downloads_month ON downloads(month);";

/// One row per cluster. `month` follows from `day`, grouping on it as well
/// does not change the groups. `TOTAL` sums as a float and cannot overflow.
const CLUSTERS_SQL: &str = "SELECT cs_user_agent, cs_referer, cs_object, c_ip, day, hour, month,
            COUNT(*) AS requests, TOTAL(sc_bytes) AS total_bytes
     FROM downloads
     WHERE is_get = 1
     GROUP BY cs_user_agent, cs_referer, cs_object, c_ip, day, hour, month";

/// SQLite store of kept records.
pub struct DownloadStore {
    conn: Connection,
}

impl DownloadStore {
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open a file-backed store. Any `downloads` table already in the file is
    /// replaced.
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Insert `records` in one transaction. Returns the number inserted.
    pub fn insert_records(&mut self, records: &[FilteredRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO downloads (datetime, month, day, hour, platform, cs_method, is_get, cs_user_agent, cs_referer, cs_object, c_ip, sc_status, sc_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for record in records {
                let key = record.cluster_key();
                stmt.execute(rusqlite::params![
                    record.iso_datetime(),
                    record.month_key(),
                    key.day,
                    key.hour,
                    record.platform.as_str(),
                    record.record.cs_method,
                    record.is_get(),
                    key.user_agent,
                    key.referer,
                    key.object,
                    key.client_ip,
                    record.record.sc_status,
                    record.record.sc_bytes,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Inserted {} records into the download store", records.len());
        Ok(records.len())
    }

    /// Number of stored records, GET or not.
    pub fn len(&self) -> Result<u64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM downloads", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Every cluster, ordered by its key.
    pub fn clusters(&self) -> Result<Vec<DownloadCluster>> {
        let sql = format!(
            "{CLUSTERS_SQL} ORDER BY cs_user_agent, cs_referer, cs_object, c_ip, day, hour"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(DownloadCluster {
                key: ClusterKey {
                    user_agent: row.get(0)?,
                    referer: row.get(1)?,
                    object: row.get(2)?,
                    client_ip: row.get(3)?,
                    day: row.get(4)?,
                    hour: row.get(5)?,
                },
                month: row.get(6)?,
                requests: row.get(7)?,
                total_bytes: bytes_from_total(row.get(8)?),
            })
        })?;

        let mut clusters = Vec::new();
        for cluster in rows {
            clusters.push(cluster?);
        }
        Ok(clusters)
    }

    /// Estimated unique downloads per month, ascending by month.
    pub fn unique_downloads_by_month(&self) -> Result<Vec<MonthlyUniqueCount>> {
        let sql = format!(
            "SELECT month, COUNT(*) FROM ({CLUSTERS_SQL}) GROUP BY month ORDER BY month"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(MonthlyUniqueCount {
                month: row.get(0)?,
                unique_downloads: row.get(1)?,
            })
        })?;

        let mut counts = Vec::new();
        for count in rows {
            counts.push(count?);
        }
        Ok(counts)
    }
}

/// Convert a `TOTAL()` result back to a byte count, saturating at the
/// bounds of `u64`.
fn bytes_from_total(total: f64) -> u64 {
    if total <= 0.0 {
        0
    } else if total >= u64::MAX as f64 {
        u64::MAX
    } else {
        total.round() as u64
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use downloads_core::models::{LogRecord, Platform};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn make_record(
        (y, m, d): (i32, u32, u32),
        (hour, minute): (u32, u32),
        method: &str,
        bytes: u64,
    ) -> FilteredRecord {
        FilteredRecord {
            record: LogRecord {
                time_micros: 0,
                cs_object: Some("InVEST_3.10.2_Setup.exe".to_string()),
                sc_status: 206,
                c_ip: "10.0.0.1".to_string(),
                cs_user_agent: "Mozilla/5.0".to_string(),
                cs_referer: "https://naturalcapitalproject.stanford.edu/".to_string(),
                sc_bytes: bytes,
                cs_method: method.to_string(),
                fields: Vec::new(),
            },
            datetime: NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(hour, minute, 0)
                .unwrap(),
            platform: Platform::Windows,
        }
    }

    fn base() -> FilteredRecord {
        make_record((2021, 7, 1), (10, 5), "GET", 1_000)
    }

    fn store_with(records: &[FilteredRecord]) -> DownloadStore {
        let mut store = DownloadStore::open_in_memory().unwrap();
        store.insert_records(records).unwrap();
        store
    }

    #[test]
    fn test_ranged_requests_collapse_into_one_download() {
        let first = base();
        let second = make_record((2021, 7, 1), (10, 45), "GET", 25_000);
        let store = store_with(&[first, second]);

        assert_eq!(store.len().unwrap(), 2);
        let clusters = store.clusters().unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].requests, 2);
        assert_eq!(clusters[0].total_bytes, 26_000);
        assert_eq!(clusters[0].month, "2021-07");
        assert_eq!(
            store.unique_downloads_by_month().unwrap(),
            vec![MonthlyUniqueCount {
                month: "2021-07".to_string(),
                unique_downloads: 1,
            }]
        );
    }

    #[test]
    fn test_changing_any_key_field_splits_the_cluster() {
        let variants: Vec<Box<dyn Fn(&mut FilteredRecord)>> = vec![
            Box::new(|r: &mut FilteredRecord| r.record.cs_user_agent = "curl/8.0".to_string()),
            Box::new(|r: &mut FilteredRecord| r.record.cs_referer = String::new()),
            Box::new(|r: &mut FilteredRecord| r.record.cs_object = Some("InVEST-3.10.2.dmg".to_string())),
            Box::new(|r: &mut FilteredRecord| r.record.c_ip = "10.0.0.2".to_string()),
            Box::new(|r: &mut FilteredRecord| r.datetime = r.datetime + chrono::Duration::days(1)),
            Box::new(|r: &mut FilteredRecord| r.datetime = r.datetime + chrono::Duration::hours(1)),
        ];

        for change in variants {
            let mut other = base();
            change(&mut other);
            let store = store_with(&[base(), other]);
            assert_eq!(store.clusters().unwrap().len(), 2);
        }
    }

    #[test]
    fn test_same_hour_repeat_downloads_are_undercounted() {
        // Two complete downloads ten minutes apart are indistinguishable from
        // one download split into ranged requests.
        let store = store_with(&[
            make_record((2021, 7, 1), (10, 0), "GET", 50_000),
            make_record((2021, 7, 1), (10, 10), "GET", 50_000),
        ]);
        assert_eq!(store.unique_downloads_by_month().unwrap()[0].unique_downloads, 1);
    }

    #[test]
    fn test_only_get_requests_count() {
        let store = store_with(&[
            make_record((2021, 7, 1), (10, 0), "HEAD", 0),
            make_record((2021, 8, 1), (10, 0), "HEAD", 0),
            make_record((2021, 8, 1), (11, 0), "GET", 10),
        ]);
        assert_eq!(store.len().unwrap(), 3);
        assert_eq!(
            store.unique_downloads_by_month().unwrap(),
            vec![MonthlyUniqueCount {
                month: "2021-08".to_string(),
                unique_downloads: 1,
            }]
        );
    }

    #[test]
    fn test_unique_downloads_sorted_by_month() {
        let store = store_with(&[
            make_record((2021, 9, 1), (1, 0), "GET", 1),
            make_record((2020, 1, 1), (1, 0), "GET", 1),
            make_record((2021, 9, 1), (2, 0), "GET", 1),
            make_record((2021, 7, 4), (1, 0), "GET", 1),
        ]);
        let months: Vec<(String, u64)> = store
            .unique_downloads_by_month()
            .unwrap()
            .into_iter()
            .map(|c| (c.month, c.unique_downloads))
            .collect();
        assert_eq!(
            months,
            vec![
                ("2020-01".to_string(), 1),
                ("2021-07".to_string(), 1),
                ("2021-09".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_every_get_record_lands_in_exactly_one_cluster() {
        let records = vec![
            make_record((2021, 7, 1), (10, 0), "GET", 1),
            make_record((2021, 7, 1), (10, 30), "GET", 2),
            make_record((2021, 7, 1), (11, 0), "GET", 3),
            make_record((2021, 7, 2), (10, 0), "GET", 4),
        ];
        let store = store_with(&records);
        let clusters = store.clusters().unwrap();
        let members: u64 = clusters.iter().map(|c| c.requests).sum();
        assert_eq!(members, records.len() as u64);
        assert_eq!(clusters.len(), 3);
    }

    #[test]
    fn test_clusters_match_grouping_by_cluster_key() {
        let mut other_agent = make_record((2021, 7, 1), (10, 20), "GET", 7);
        other_agent.record.cs_user_agent = "curl/8.0".to_string();
        let records = vec![
            make_record((2021, 7, 1), (10, 0), "GET", 1),
            make_record((2021, 7, 1), (10, 59), "GET", 2),
            make_record((2021, 7, 1), (10, 30), "HEAD", 0),
            make_record((2021, 7, 1), (11, 0), "GET", 3),
            make_record((2021, 8, 3), (0, 0), "GET", 4),
            other_agent,
        ];

        let mut expected: BTreeMap<ClusterKey, (u64, u64)> = BTreeMap::new();
        for record in records.iter().filter(|r| r.is_get()) {
            let entry = expected.entry(record.cluster_key()).or_default();
            entry.0 += 1;
            entry.1 += record.record.sc_bytes;
        }

        let store = store_with(&records);
        let actual: BTreeMap<ClusterKey, (u64, u64)> = store
            .clusters()
            .unwrap()
            .into_iter()
            .map(|c| (c.key, (c.requests, c.total_bytes)))
            .collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_huge_byte_counts_do_not_fail_the_estimate() {
        let store = store_with(&[
            make_record((2021, 7, 1), (10, 0), "GET", i64::MAX as u64),
            make_record((2021, 7, 1), (10, 5), "GET", i64::MAX as u64),
        ]);

        let clusters = store.clusters().unwrap();
        assert_eq!(clusters.len(), 1);
        assert!(clusters[0].total_bytes >= i64::MAX as u64);
        assert_eq!(store.unique_downloads_by_month().unwrap()[0].unique_downloads, 1);
    }

    #[test]
    fn test_bytes_from_total_saturates() {
        assert_eq!(bytes_from_total(0.0), 0);
        assert_eq!(bytes_from_total(-1.0), 0);
        assert_eq!(bytes_from_total(26_000.0), 26_000);
        assert_eq!(bytes_from_total(1e30), u64::MAX);
    }

    #[test]
    fn test_empty_store() {
        let store = DownloadStore::open_in_memory().unwrap();
        assert_eq!(store.len().unwrap(), 0);
        assert!(store.clusters().unwrap().is_empty());
        assert!(store.unique_downloads_by_month().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_is_replaced_on_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("downloads.db");

        {
            let mut store = DownloadStore::open(&path).unwrap();
            store.insert_records(&[base(), base()]).unwrap();
            assert_eq!(store.len().unwrap(), 2);
        }

        let store = DownloadStore::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 0);
    }
}
