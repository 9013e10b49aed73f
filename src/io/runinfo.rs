//! Runinfo CSV ingest.
//!
//! The runinfo table has one row per run with its holding time and the fill
//! monitor value of each segment:
//!
//! ```text
//! Run Number,Holding Time,fillUCN12,fillUCN34,fillUCN1112,fillUCN1314
//! ```
//!
//! Design goals:
//! - **Strict schema** for `Run Number` / `Holding Time` (exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - Fill columns are optional; a missing or blank value counts as `0.0`

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{RunInfo, Segment};
use crate::error::AppError;

const COL_RUN: &str = "run number";
const COL_HOLD: &str = "holding time";

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Parsed runinfo table.
#[derive(Debug, Clone)]
pub struct RunInfoTable {
    pub runs: Vec<RunInfo>,
    pub row_errors: Vec<RowError>,
}

impl RunInfoTable {
    /// Sorted unique holding times over every row (good or not).
    pub fn hold_times(&self) -> Vec<u32> {
        let mut out: Vec<u32> = self.runs.iter().map(|r| r.hold_time).collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Load the runinfo CSV from disk.
pub fn load_runinfo(path: &Path) -> Result<RunInfoTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open runinfo CSV '{}': {e}", path.display())))?;
    read_runinfo(file)
}

/// Parse a runinfo CSV from any reader.
pub fn read_runinfo<R: Read>(reader: R) -> Result<RunInfoTable, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read runinfo headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    for required in [COL_RUN, COL_HOLD] {
        if !header_map.contains_key(required) {
            return Err(AppError::input(format!("Missing required runinfo column: `{required}`")));
        }
    }

    let mut runs = Vec::new();
    let mut row_errors = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };
        match parse_row(&record, &header_map) {
            Ok(run) => runs.push(run),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    Ok(RunInfoTable { runs, row_errors })
}

pub(crate) fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

pub(crate) fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}').trim();
    name.to_ascii_lowercase()
}

fn parse_row(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<RunInfo, String> {
    let run = parse_integral(get_required(record, header_map, COL_RUN)?)
        .ok_or_else(|| "Invalid `Run Number`.".to_string())?;
    let hold_time = parse_integral(get_required(record, header_map, COL_HOLD)?)
        .ok_or_else(|| "Invalid `Holding Time`.".to_string())?;

    let mut fills = [0.0; 4];
    for seg in Segment::ALL {
        let column = seg.fill_column().to_ascii_lowercase();
        fills[seg.index()] = match get_optional(record, header_map, &column) {
            None => 0.0,
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("Invalid `{}` value '{raw}'.", seg.fill_column()))?,
        };
    }

    Ok(RunInfo { run, hold_time, fills })
}

/// Write a runinfo CSV with every fill column.
pub fn write_runinfo(path: &Path, runs: &[RunInfo]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create runinfo CSV '{}': {e}", path.display())))?;
    let mut writer = csv::Writer::from_writer(file);
    let mut header = vec!["Run Number", "Holding Time"];
    header.extend(Segment::ALL.iter().map(|s| s.fill_column()));
    writer
        .write_record(&header)
        .map_err(|e| AppError::input(format!("Failed to write runinfo header: {e}")))?;
    for run in runs {
        let mut row = vec![run.run.to_string(), run.hold_time.to_string()];
        row.extend(run.fills.iter().map(|f| format!("{f:.3}")));
        writer
            .write_record(&row)
            .map_err(|e| AppError::input(format!("Failed to write runinfo row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush runinfo CSV: {e}")))
}

/// Parse an integer column that may have been written as a float (`120.0`).
fn parse_integral(s: &str) -> Option<u32> {
    if let Ok(v) = s.parse::<u32>() {
        return Some(v);
    }
    let v = s.parse::<f64>().ok()?;
    if v.is_finite() && v >= 0.0 && v <= u32::MAX as f64 {
        Some(v.trunc() as u32)
    } else {
        None
    }
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    get_optional(record, header_map, name).ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, name: &str) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_and_defaults_missing_fills() {
        let csv = "\u{feff}Run Number, Holding Time ,fillUCN12,fillUCN34,fillUCN1112\n\
                   101,20,1500.5,1400,\n\
                   102,100.0,1200,1100,900\n";
        let table = read_runinfo(csv.as_bytes()).unwrap();
        assert!(table.row_errors.is_empty());
        assert_eq!(table.runs.len(), 2);

        let first = &table.runs[0];
        assert_eq!(first.run, 101);
        assert_eq!(first.hold_time, 20);
        assert!((first.fill(Segment::S12) - 1500.5).abs() < 1e-12);
        assert_eq!(first.fill(Segment::S56), 0.0);
        assert_eq!(first.fill(Segment::S78), 0.0);

        assert_eq!(table.runs[1].hold_time, 100);
        assert!((table.runs[1].fill(Segment::S56) - 900.0).abs() < 1e-12);
    }

    #[test]
    fn bad_rows_are_collected_not_fatal() {
        let csv = "Run Number,Holding Time,fillUCN12\n\
                   abc,20,1\n\
                   7,50,oops\n\
                   8,50,3\n";
        let table = read_runinfo(csv.as_bytes()).unwrap();
        assert_eq!(table.runs.len(), 1);
        assert_eq!(table.row_errors.len(), 2);
        assert_eq!(table.row_errors[0].line, 2);
        assert_eq!(table.row_errors[1].line, 3);
    }

    #[test]
    fn missing_required_column_is_an_input_error() {
        let err = read_runinfo("Run Number,fillUCN12\n1,2\n".as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
    }

    #[test]
    fn hold_times_are_sorted_and_unique() {
        let csv = "Run Number,Holding Time\n1,200\n2,20\n3,200\n4,100\n";
        let table = read_runinfo(csv.as_bytes()).unwrap();
        assert_eq!(table.hold_times(), vec![20, 100, 200]);
    }
}
