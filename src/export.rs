/// Data export: download the backend's CSV/JSON export, check that it
/// parses, and write it to disk.
///
/// The CSV layout is whatever pandas `to_csv(index=False)` produced on the
/// server, so columns are located by header name and extra feature columns
/// are ignored.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};

use crate::ingest::api::{self, ApiError};
use crate::ingest::client::ApiClient;
use crate::model::HistoricalRecord;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("export is missing the '{0}' column")]
    MissingColumn(&'static str),

    #[error("row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unsupported export format '{}' (use csv or json)", other)),
        }
    }
}

/// `flood_data_export.csv`, or `flood_data_export_osh.json` for one region.
/// Characters outside `[A-Za-z0-9_-]` in the region id become `_`, so the
/// name never leaves the current directory.
pub fn default_file_name(format: ExportFormat, region_id: Option<&str>) -> String {
    match region_id {
        Some(id) => {
            let safe: String = id
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
                .collect();
            format!("flood_data_export_{}.{}", safe, format)
        }
        None => format!("flood_data_export.{}", format),
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

const COLUMNS: [&str; 6] = ["date", "region", "river_level", "precipitation", "temperature", "flood_status"];

/// Parses a CSV export into records.
///
/// # Errors
/// - `ExportError::MissingColumn` when a required header is absent.
/// - `ExportError::InvalidRow` for an unparsable value; `row` is 1-based
///   and excludes the header.
pub fn parse_export_csv(text: &str) -> Result<Vec<HistoricalRecord>, ExportError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = rdr.headers()?.clone();
    let mut index = [0usize; 6];
    for (slot, name) in index.iter_mut().zip(COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h == name)
            .ok_or(ExportError::MissingColumn(name))?;
    }

    let mut records = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        records.push(record_from_row(&row?, &index, i + 1)?);
    }
    Ok(records)
}

fn record_from_row(row: &StringRecord, index: &[usize; 6], row_no: usize) -> Result<HistoricalRecord, ExportError> {
    let field = |i: usize| row.get(index[i]).unwrap_or("");
    let invalid = |reason: String| ExportError::InvalidRow { row: row_no, reason };
    let number = |i: usize| -> Result<f64, ExportError> {
        field(i)
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| invalid(format!("{} '{}' is not a number", COLUMNS[i], field(i))))
    };

    let raw_date = field(0);
    let date = NaiveDate::parse_from_str(raw_date.get(..10).unwrap_or(raw_date), "%Y-%m-%d")
        .map_err(|e| invalid(format!("date '{}': {}", raw_date, e)))?;

    // pandas writes 0/1 for the integer column and True/False for booleans
    let flood_status = match field(5).to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => true,
        "0" | "0.0" | "false" => false,
        other => return Err(invalid(format!("flood_status '{}' is not 0/1 or a boolean", other))),
    };

    Ok(HistoricalRecord {
        date,
        region: field(1).to_string(),
        river_level: number(2)?,
        precipitation: number(3)?,
        temperature: number(4)?,
        flood_status,
    })
}

/// Parses an export body in either format.
pub fn parse_export(format: ExportFormat, body: &str) -> Result<Vec<HistoricalRecord>, ExportError> {
    match format {
        ExportFormat::Csv => parse_export_csv(body),
        ExportFormat::Json => Ok(api::parse_historical_response(body)?),
    }
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub bytes: usize,
    pub records: usize,
}

/// Fetches an export, validates it parses, and writes the raw body to
/// `path`. Nothing is written if the body does not parse.
pub fn download(
    client: &ApiClient,
    format: ExportFormat,
    region_id: Option<&str>,
    path: &Path,
) -> Result<ExportSummary, ExportError> {
    let body = client.export(format, region_id)?;
    let records = parse_export(format, &body)?;
    fs::write(path, &body).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!("wrote {} records ({} bytes) to {}", records.len(), body.len(), path.display());
    Ok(ExportSummary {
        path: path.to_path_buf(),
        bytes: body.len(),
        records: records.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::{fixture_export_csv, fixture_historical_json};

    #[test]
    fn test_parse_csv_export() {
        let records = parse_export_csv(fixture_export_csv()).expect("fixture should parse");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].region, "Batken Area");
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2024, 4, 14).unwrap());
        assert_eq!(records[0].river_level, 4.6);
        assert!(records[0].flood_status);
        assert!(!records[2].flood_status);
    }

    #[test]
    fn test_csv_boolean_status_and_column_order() {
        let csv = "region,flood_status,date,temperature,precipitation,river_level\n\
                   Osh,True,2024-04-15,14.0,6.1,2.9\n";
        let records = parse_export_csv(csv).expect("reordered columns should parse");
        assert_eq!(records[0].region, "Osh");
        assert!(records[0].flood_status);
        assert_eq!(records[0].river_level, 2.9);
    }

    #[test]
    fn test_csv_missing_column() {
        let csv = "date,region,river_level,precipitation,temperature\n2024-04-15,Osh,2.9,6.1,14.0\n";
        assert!(matches!(
            parse_export_csv(csv),
            Err(ExportError::MissingColumn("flood_status"))
        ));
    }

    #[test]
    fn test_csv_bad_value_reports_row() {
        let csv = "date,region,river_level,precipitation,temperature,flood_status\n\
                   2024-04-15,Osh,2.9,6.1,14.0,0\n\
                   2024-04-16,Osh,high,6.1,14.0,0\n";
        match parse_export_csv(csv) {
            Err(ExportError::InvalidRow { row, reason }) => {
                assert_eq!(row, 2);
                assert!(reason.contains("river_level"), "reason was: {}", reason);
            }
            other => panic!("expected InvalidRow, got {:?}", other),
        }
    }

    #[test]
    fn test_json_export_uses_historical_parser() {
        let records = parse_export(ExportFormat::Json, fixture_historical_json()).expect("should parse");
        assert_eq!(records.len(), 5);
    }

    #[test]
    fn test_format_and_file_name() {
        assert_eq!("JSON".parse::<ExportFormat>(), Ok(ExportFormat::Json));
        assert!("xlsx".parse::<ExportFormat>().is_err());
        assert_eq!(default_file_name(ExportFormat::Csv, None), "flood_data_export.csv");
        assert_eq!(default_file_name(ExportFormat::Json, Some("osh")), "flood_data_export_osh.json");
        assert_eq!(
            default_file_name(ExportFormat::Csv, Some("jalal-abad_2")),
            "flood_data_export_jalal-abad_2.csv"
        );
    }

    #[test]
    fn test_default_file_name_stays_in_directory() {
        let name = default_file_name(ExportFormat::Csv, Some("../x"));
        assert_eq!(name, "flood_data_export____x.csv");
        assert!(!name.contains('/'));
        assert_eq!(default_file_name(ExportFormat::Json, Some("a\\b c")), "flood_data_export_a_b_c.json");
        assert_eq!(std::path::Path::new(&name).components().count(), 1);
    }
}
