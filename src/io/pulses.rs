//! Per-run pulse-analysis CSV (`PulseAnalysis_<run>.csv`).
//!
//! Columns: `Segment, Time (us), PE, Event`. Despite its header the time column
//! holds seconds; the name is kept so files stay interchangeable with older
//! outputs. `Event` is `1` for the counting window and `0` for background.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use csv::StringRecord;

use crate::domain::{EventClass, PulseRecord, Segment};
use crate::error::AppError;
use crate::io::runinfo::{RowError, build_header_map};

pub const HEADER: [&str; 4] = ["Segment", "Time (us)", "PE", "Event"];

/// Parsed pulse file.
#[derive(Debug, Clone, Default)]
pub struct PulseFile {
    pub records: Vec<PulseRecord>,
    /// Segment labels present in the file that are not detector segments.
    pub unknown_segments: Vec<String>,
    pub row_errors: Vec<RowError>,
}

/// File name used for a run's pulse-analysis output.
pub fn pulse_file_name(run: u32) -> String {
    format!("PulseAnalysis_{run}.csv")
}

pub fn pulse_file_path(dir: &Path, run: u32) -> PathBuf {
    dir.join(pulse_file_name(run))
}

pub fn load_pulse_file(path: &Path) -> Result<PulseFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open pulse file '{}': {e}", path.display())))?;
    read_pulse_file(file)
}

pub fn read_pulse_file<R: Read>(reader: R) -> Result<PulseFile, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read pulse file headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    let columns = Columns::resolve(&header_map)?;

    let mut out = PulseFile::default();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                out.row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let label = record.get(columns.segment).map(str::trim).unwrap_or("");
        let Some(segment) = Segment::from_label(label) else {
            if !out.unknown_segments.iter().any(|s| s == label) {
                out.unknown_segments.push(label.to_string());
            }
            continue;
        };

        match parse_row(&record, &columns, segment) {
            Ok(r) => out.records.push(r),
            Err(message) => out.row_errors.push(RowError { line, message }),
        }
    }

    Ok(out)
}

struct Columns {
    segment: usize,
    time: usize,
    pe: usize,
    event: usize,
}

impl Columns {
    fn resolve(header_map: &HashMap<String, usize>) -> Result<Self, AppError> {
        let get = |name: &str| {
            header_map
                .get(name)
                .copied()
                .ok_or_else(|| AppError::input(format!("Missing required pulse column: `{name}`")))
        };
        Ok(Self {
            segment: get("segment")?,
            time: get("time (us)")?,
            pe: get("pe")?,
            event: get("event")?,
        })
    }
}

fn parse_row(record: &StringRecord, columns: &Columns, segment: Segment) -> Result<PulseRecord, String> {
    let field = |idx: usize, name: &str| {
        record
            .get(idx)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("Missing `{name}` value."))
    };

    let time = field(columns.time, "Time (us)")?
        .parse::<f64>()
        .map_err(|_| "Invalid `Time (us)` value.".to_string())?;
    let pe = field(columns.pe, "PE")?
        .parse::<f64>()
        .map_err(|_| "Invalid `PE` value.".to_string())?;
    let raw_event = field(columns.event, "Event")?;
    let flag = raw_event
        .parse::<i64>()
        .ok()
        .or_else(|| raw_event.parse::<f64>().ok().filter(|v| v.fract() == 0.0).map(|v| v as i64))
        .ok_or_else(|| format!("Invalid `Event` value '{raw_event}'."))?;
    let event = EventClass::from_flag(flag).ok_or_else(|| format!("Unknown `Event` flag {flag}."))?;

    if !pe.is_finite() || !time.is_finite() {
        return Err("Non-finite pulse value.".to_string());
    }

    Ok(PulseRecord {
        segment,
        time,
        pe,
        event,
    })
}

/// Write a pulse-analysis CSV.
pub fn write_pulse_file(path: &Path, records: &[PulseRecord]) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create pulse file '{}': {e}", path.display())))?;
    write_pulses(file, records)
}

pub fn write_pulses<W: Write>(writer: W, records: &[PulseRecord]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(writer);
    writer
        .write_record(HEADER)
        .map_err(|e| AppError::input(format!("Failed to write pulse file header: {e}")))?;
    for r in records {
        writer
            .write_record([
                r.segment.label().to_string(),
                format!("{:.9}", r.time),
                format!("{:.6}", r.pe),
                r.event.flag().to_string(),
            ])
            .map_err(|e| AppError::input(format!("Failed to write pulse row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to flush pulse file: {e}")))?;
    Ok(())
}
