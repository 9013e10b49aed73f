//! Export lifetime-scan results to CSV and JSON.
//!
//! The CSV is one row per `(segment, threshold)`, meant for spreadsheets and
//! downstream scripts. The JSON carries the full scans plus the settings they
//! were produced with, and can be reloaded by the viewer.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::{LifetimeExport, SegmentScan};
use crate::error::AppError;

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.6}")).unwrap_or_default()
}

/// Write `segment,threshold,tau,dtau,amplitude,chi2,n_points` rows.
///
/// Thresholds without a fit keep their row with empty fit columns.
pub fn write_lifetime_csv(path: &Path, scans: &[SegmentScan]) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create export CSV '{}': {e}", path.display())))?;

    writeln!(file, "segment,threshold,tau,dtau,amplitude,chi2,n_points")
        .map_err(|e| AppError::input(format!("Failed to write export CSV header: {e}")))?;

    for scan in scans {
        for point in &scan.points {
            let fit = point.fit.as_ref();
            writeln!(
                file,
                "{},{},{},{},{},{},{}",
                scan.segment,
                point.threshold,
                fmt_opt(fit.map(|f| f.tau)),
                fmt_opt(fit.and_then(|f| f.dtau)),
                fit.map(|f| format!("{:.10e}", f.amplitude)).unwrap_or_default(),
                fmt_opt(fit.map(|f| f.chi2)),
                fit.map(|f| f.n_points).unwrap_or(point.counts.len()),
            )
            .map_err(|e| AppError::input(format!("Failed to write export CSV row: {e}")))?;
        }
    }
    Ok(())
}

pub fn write_lifetime_json(path: &Path, export: &LifetimeExport) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create export JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, export)
        .map_err(|e| AppError::input(format!("Failed to write export JSON: {e}")))
}

pub fn read_lifetime_json(path: &Path) -> Result<LifetimeExport, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open results JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::input(format!("Invalid results JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Campaign, HoldCount, LifetimeFit, Segment, ThresholdPoint};

    fn scans() -> Vec<SegmentScan> {
        vec![SegmentScan {
            segment: Segment::S34,
            points: vec![
                ThresholdPoint {
                    threshold: 5,
                    counts: vec![
                        HoldCount { hold_time: 20, count: 10.0 },
                        HoldCount { hold_time: 100, count: 9.0 },
                    ],
                    fit: Some(LifetimeFit {
                        tau: 812.5,
                        dtau: None,
                        amplitude: 10.25,
                        chi2: 0.125,
                        n_points: 2,
                    }),
                },
                ThresholdPoint {
                    threshold: 6,
                    counts: vec![HoldCount { hold_time: 20, count: 1.0 }],
                    fit: None,
                },
            ],
        }]
    }

    #[test]
    fn csv_rows_keep_unfitted_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lifetimes.csv");
        write_lifetime_csv(&path, &scans()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("34,5,812.500000,,"));
        assert!(lines[1].ends_with(",0.125000,2"));
        assert_eq!(lines[2], "34,6,,,,,1");
    }

    #[test]
    fn json_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lifetimes.json");
        let export = LifetimeExport {
            tool: "ucnlife".to_string(),
            generated_at: chrono::Utc::now(),
            campaign: Campaign::Y2023,
            method: Campaign::Y2023.method(),
            signal_window: 60.0,
            background_window: 60.0,
            hold_times: vec![20, 100],
            runs_used: vec![1, 2],
            scans: scans(),
        };
        write_lifetime_json(&path, &export).unwrap();
        let back = read_lifetime_json(&path).unwrap();
        assert_eq!(back.campaign, Campaign::Y2023);
        assert_eq!(back.scans, export.scans);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"campaign\": \"2023\""));
        assert!(text.contains("\"segment\": \"34\""));
    }
}
