//! Formatted terminal output.
//!
//! Formatting lives in one place so the pipeline code stays free of
//! presentation details and output changes stay localized.

use crate::aggregate::AggregatedData;
use crate::domain::{LifetimeConfig, SegmentScan};
use crate::pulse::{PulseRunSummary, SkipReason};

/// Dataset summary plus the analysis method in effect.
pub fn format_run_summary(data: &AggregatedData, config: &LifetimeConfig) -> String {
    let s = &data.summary;
    let mut out = String::new();

    out.push_str("=== ucnlife - UCN storage lifetime ===\n");
    out.push_str(&format!("Campaign: {}\n", config.campaign.display_name()));
    out.push_str(&format!(
        "Method: background={:?} | normalization={:?} | error scan={:?}\n",
        config.method.background, config.method.normalization, config.method.error_scan
    ));
    out.push_str(&format!(
        "Windows: signal={}s | background={}s\n",
        config.signal_window, config.background_window
    ));
    out.push_str(&format!(
        "Runs: total={} | used={} | not good={} | missing file={} | good list={}\n",
        s.runs_total,
        s.runs_used.len(),
        s.runs_rejected,
        s.runs_missing_file.len(),
        s.good_runs
    ));
    out.push_str(&format!(
        "Hold times: {} | bins={}\n",
        fmt_list(&data.hold_times),
        data.bins.len()
    ));
    if s.runinfo_errors + s.row_errors + s.unknown_segments > 0 {
        out.push_str(&format!(
            "Skipped: runinfo rows={} | pulse rows={} | unknown-segment rows={}\n",
            s.runinfo_errors, s.row_errors, s.unknown_segments
        ));
    }
    if !s.runs_missing_file.is_empty() {
        out.push_str(&format!("Missing pulse files: {}\n", fmt_list(&s.runs_missing_file)));
    }

    out
}

/// One lifetime table per segment.
pub fn format_scan_tables(scans: &[SegmentScan]) -> String {
    let mut out = String::new();
    for (i, scan) in scans.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("Segment {}:\n", scan.segment));
        out.push_str(&format_scan_table(scan));
    }
    out
}

fn format_scan_table(scan: &SegmentScan) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:>9} {:>10} {:>10} {:>12} {:>12} {:>3}\n",
            "threshold", "tau(s)", "dtau(s)", "amplitude", "chi2", "n"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<9} {:-<10} {:-<10} {:-<12} {:-<12} {:-<3}\n", "", "", "", "", "", "").trim_end());
    out.push('\n');

    for point in &scan.points {
        let line = match point.fit {
            Some(fit) => format!(
                "{:>9} {:>10.2} {:>10} {:>12.5e} {:>12.4e} {:>3}\n",
                point.threshold,
                fit.tau,
                fit.dtau.map(|d| format!("{d:.2}")).unwrap_or_else(|| "-".to_string()),
                fit.amplitude,
                fit.chi2,
                fit.n_points
            ),
            None => format!(
                "{:>9} {:>10} {:>10} {:>12} {:>12} {:>3}\n",
                point.threshold,
                "no fit",
                "-",
                "-",
                "-",
                point.counts.len()
            ),
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Outcome of the pulse or tail stage.
pub fn format_pulse_summary(summary: &PulseRunSummary) -> String {
    let count = |reason: SkipReason| summary.skipped.iter().filter(|(_, r)| *r == reason).count();
    let mut out = String::new();
    out.push_str(&format!(
        "Runs: processed={} | not good={} | not production={} | missing hits={}\n",
        summary.processed.len(),
        count(SkipReason::NotGood),
        count(SkipReason::NotProduction),
        count(SkipReason::MissingHits)
    ));
    out.push_str(&format!("Pulses: {}\n", summary.pulses_written));
    if !summary.processed.is_empty() {
        out.push_str(&format!("Processed: {}\n", fmt_list(&summary.processed)));
    }
    out
}

fn fmt_list(v: &[u32]) -> String {
    let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HoldCount, LifetimeFit, Segment, ThresholdPoint};

    #[test]
    fn scan_table_marks_missing_fits() {
        let scan = SegmentScan {
            segment: Segment::S78,
            points: vec![
                ThresholdPoint {
                    threshold: 5,
                    counts: vec![HoldCount { hold_time: 20, count: 1.0 }; 3],
                    fit: Some(LifetimeFit {
                        tau: 879.456,
                        dtau: Some(12.345),
                        amplitude: 0.5,
                        chi2: 0.01,
                        n_points: 3,
                    }),
                },
                ThresholdPoint {
                    threshold: 6,
                    counts: vec![HoldCount { hold_time: 20, count: 1.0 }],
                    fit: None,
                },
            ],
        };
        let text = format_scan_tables(&[scan]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Segment 78:");
        assert!(lines[1].trim_start().starts_with("threshold"));
        assert!(lines[3].contains("879.46") && lines[3].contains("12.35"));
        assert!(lines[4].contains("no fit"));
        assert!(lines.iter().all(|l| !l.ends_with(' ')));
    }

    #[test]
    fn pulse_summary_counts_skips() {
        let summary = PulseRunSummary {
            processed: vec![3, 4],
            skipped: vec![(1, SkipReason::NotGood), (2, SkipReason::MissingHits), (5, SkipReason::NotGood)],
            pulses_written: 17,
        };
        let text = format_pulse_summary(&summary);
        assert!(text.contains("processed=2 | not good=2 | not production=0 | missing hits=1"));
        assert!(text.contains("Processed: [3, 4]"));
    }
}
