//! CSV report output.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use downloads_core::models::{FilteredRecord, MonthlyUniqueCount};
use downloads_core::{DownloadsError, Result};
use tracing::info;

use crate::aggregator::MonthlyCounts;

/// Filtered rows: `datetime` followed by every source column.
pub fn write_filtered<W: Write>(
    out: W,
    headers: &[String],
    records: &[FilteredRecord],
) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(std::iter::once("datetime").chain(headers.iter().map(String::as_str)))?;
    for record in records {
        let datetime = record.iso_datetime();
        let fields = record.record.fields.iter().map(String::as_str);
        wtr.write_record(std::iter::once(datetime.as_str()).chain(fields))?;
    }
    wtr.flush()?;
    Ok(records.len())
}

/// Monthly report: `month,python,mac,windows,total`, ascending by month.
pub fn write_monthly<W: Write>(out: W, counts: &MonthlyCounts) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(out);
    let rows = counts.rows();
    if rows.is_empty() {
        wtr.write_record(["month", "python", "mac", "windows", "total"])?;
    }
    for row in &rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(rows.len())
}

/// Unique-download report: `month,unique_downloads`.
pub fn write_unique<W: Write>(out: W, counts: &[MonthlyUniqueCount]) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(out);
    if counts.is_empty() {
        wtr.write_record(["month", "unique_downloads"])?;
    }
    for count in counts {
        wtr.serialize(count)?;
    }
    wtr.flush()?;
    Ok(counts.len())
}

// ── Path wrappers ─────────────────────────────────────────────────────────────

fn create(path: &Path) -> Result<File> {
    File::create(path).map_err(|source| DownloadsError::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_filtered_csv(
    path: &Path,
    headers: &[String],
    records: &[FilteredRecord],
) -> Result<usize> {
    let rows = write_filtered(create(path)?, headers, records)?;
    info!("Wrote {} filtered rows to {}", rows, path.display());
    Ok(rows)
}

pub fn write_monthly_csv(path: &Path, counts: &MonthlyCounts) -> Result<usize> {
    let rows = write_monthly(create(path)?, counts)?;
    info!("Wrote {} monthly rows to {}", rows, path.display());
    Ok(rows)
}

pub fn write_unique_csv(path: &Path, counts: &[MonthlyUniqueCount]) -> Result<usize> {
    let rows = write_unique(create(path)?, counts)?;
    info!("Wrote {} unique-download rows to {}", rows, path.display());
    Ok(rows)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use downloads_core::models::{LogRecord, Platform};
    use tempfile::TempDir;

    fn make_record(object: &str, platform: Platform, fields: &[&str]) -> FilteredRecord {
        FilteredRecord {
            record: LogRecord {
                time_micros: 1_625_097_600_000_000,
                cs_object: Some(object.to_string()),
                sc_status: 200,
                c_ip: "10.0.0.1".to_string(),
                cs_user_agent: "ua".to_string(),
                cs_referer: String::new(),
                sc_bytes: 5,
                cs_method: "GET".to_string(),
                fields: fields.iter().map(|f| f.to_string()).collect(),
            },
            datetime: NaiveDate::from_ymd_opt(2021, 7, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            platform,
        }
    }

    fn to_string(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_write_filtered_prepends_datetime() {
        let headers = vec!["cs_object".to_string(), "sc_status".to_string()];
        let records = vec![make_record(
            "InVEST_3.10.2_Setup.exe",
            Platform::Windows,
            &["InVEST_3.10.2_Setup.exe", "200"],
        )];

        let mut buf = Vec::new();
        assert_eq!(write_filtered(&mut buf, &headers, &records).unwrap(), 1);
        assert_eq!(
            to_string(buf),
            "datetime,cs_object,sc_status\n2021-07-01T00:00:00.000000,InVEST_3.10.2_Setup.exe,200\n"
        );
    }

    #[test]
    fn test_write_filtered_quotes_commas() {
        let headers = vec!["cs_user_agent".to_string()];
        let records = vec![make_record(
            "InVEST.exe",
            Platform::Windows,
            &["Mozilla/5.0 (KHTML, like Gecko)"],
        )];
        let mut buf = Vec::new();
        write_filtered(&mut buf, &headers, &records).unwrap();
        assert!(to_string(buf).contains("\"Mozilla/5.0 (KHTML, like Gecko)\""));
    }

    #[test]
    fn test_write_monthly_columns_and_order() {
        let mut counts = MonthlyCounts::new();
        counts.add_count("2021-08", Platform::Python, 2);
        counts.add_count("2021-07", Platform::Windows, 3);
        counts.add_count("2021-07", Platform::Mac, 1);

        let mut buf = Vec::new();
        assert_eq!(write_monthly(&mut buf, &counts).unwrap(), 2);
        assert_eq!(
            to_string(buf),
            "month,python,mac,windows,total\n2021-07,0,1,3,4\n2021-08,2,0,0,2\n"
        );
    }

    #[test]
    fn test_write_monthly_empty_still_has_header() {
        let mut buf = Vec::new();
        write_monthly(&mut buf, &MonthlyCounts::new()).unwrap();
        assert_eq!(to_string(buf), "month,python,mac,windows,total\n");
    }

    #[test]
    fn test_write_unique() {
        let counts = vec![
            MonthlyUniqueCount {
                month: "2021-07".to_string(),
                unique_downloads: 12,
            },
            MonthlyUniqueCount {
                month: "2021-08".to_string(),
                unique_downloads: 3,
            },
        ];
        let mut buf = Vec::new();
        write_unique(&mut buf, &counts).unwrap();
        assert_eq!(
            to_string(buf),
            "month,unique_downloads\n2021-07,12\n2021-08,3\n"
        );
    }

    #[test]
    fn test_write_csv_files_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("unique-a.csv");
        write_unique_csv(&path, &[]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "month,unique_downloads\n"
        );
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let err = write_monthly_csv(
            Path::new("/tmp/does-not-exist-downloads-dir/monthly.csv"),
            &MonthlyCounts::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DownloadsError::FileWrite { .. }));
    }
}
