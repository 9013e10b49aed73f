//! Aggregation of per-run pulse files into `(hold time, segment)` bins.
//!
//! A bin pools every pulse of every good run that shares a holding time,
//! separately for each segment, together with the fill monitor values of the
//! contributing runs. Threshold counting and fill normalization then operate
//! on these bins.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::domain::{
    AnalysisMethod, BackgroundModel, EventClass, FillNormalization, PulseRecord, RunInfo, Segment,
};
use crate::error::AppError;
use crate::io::pulses::{PulseFile, load_pulse_file, pulse_file_path};
use crate::io::runinfo::RunInfoTable;
use crate::io::runlist::GoodRuns;

/// Number of 1-PE bins in the PE distribution histogram (`[0, 200)`).
pub const PE_HIST_BINS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
struct BinPulse {
    pe: f64,
    event: EventClass,
    /// Index into the bin's contributing runs.
    slot: usize,
}

/// All pulses for one `(hold time, segment)`.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldBin {
    pub hold_time: u32,
    pub segment: Segment,
    pulses: Vec<BinPulse>,
    /// Segment fill of each contributing run.
    fills: Vec<f64>,
}

/// Signal/background counts above a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowCounts {
    pub signal: u64,
    pub background: u64,
}

impl HoldBin {
    fn new(hold_time: u32, segment: Segment) -> Self {
        Self {
            hold_time,
            segment,
            pulses: Vec::new(),
            fills: Vec::new(),
        }
    }

    /// Sum of the contributing runs' fills.
    pub fn fill_sum(&self) -> f64 {
        self.fills.iter().sum()
    }

    pub fn pe_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.pulses.iter().map(|p| p.pe)
    }

    fn push_run(&mut self, fill: f64, records: impl Iterator<Item = PulseRecord>) {
        let slot = self.fills.len();
        self.fills.push(fill);
        self.pulses.extend(records.map(|r| BinPulse {
            pe: r.pe,
            event: r.event,
            slot,
        }));
    }

    /// Pooled counts with `pe > threshold` (strict).
    pub fn threshold_counts(&self, threshold: f64) -> WindowCounts {
        let mut out = WindowCounts::default();
        for p in self.pulses.iter().filter(|p| p.pe > threshold) {
            match p.event {
                EventClass::Signal => out.signal += 1,
                EventClass::Background => out.background += 1,
            }
        }
        out
    }

    /// Per-run counts with `pe > threshold`, aligned with the contributing runs.
    pub fn threshold_counts_per_run(&self, threshold: f64) -> Vec<WindowCounts> {
        let mut out = vec![WindowCounts::default(); self.fills.len()];
        for p in self.pulses.iter().filter(|p| p.pe > threshold) {
            let counts = &mut out[p.slot];
            match p.event {
                EventClass::Signal => counts.signal += 1,
                EventClass::Background => counts.background += 1,
            }
        }
        out
    }

    /// Background-corrected, fill-normalized count above `threshold`.
    pub fn normalized_count(&self, threshold: f64, method: &AnalysisMethod, window_ratio: f64) -> f64 {
        match method.normalization {
            FillNormalization::Summed => {
                let counts = self.threshold_counts(threshold);
                corrected(counts, method.background, window_ratio) / self.fill_sum().max(1.0)
            }
            FillNormalization::PerRun => {
                if self.fills.is_empty() {
                    return 0.0;
                }
                let per_run = self.threshold_counts_per_run(threshold);
                let total: f64 = per_run
                    .iter()
                    .zip(&self.fills)
                    .map(|(&c, &fill)| corrected(c, method.background, window_ratio) / fill.max(1.0))
                    .sum();
                total / self.fills.len() as f64
            }
        }
    }
}

/// Apply the background model to raw window counts.
///
/// `window_ratio` is `signal_window / background_window` and only affects
/// `RateScaled`.
pub fn corrected(counts: WindowCounts, model: BackgroundModel, window_ratio: f64) -> f64 {
    let sig = counts.signal as f64;
    let bg = counts.background as f64;
    match model {
        BackgroundModel::Subtract => sig - bg,
        BackgroundModel::RateScaled => sig - bg * window_ratio,
    }
}

/// What happened while loading runs.
#[derive(Debug, Clone, Default)]
pub struct LoadSummary {
    pub runs_total: usize,
    /// Runinfo rows that could not be parsed.
    pub runinfo_errors: usize,
    /// Entries in the good-run list.
    pub good_runs: usize,
    pub runs_used: Vec<u32>,
    pub runs_rejected: usize,
    pub runs_missing_file: Vec<u32>,
    pub unknown_segments: usize,
    pub row_errors: usize,
}

/// Aggregated bins plus the campaign-wide hold-time list.
#[derive(Debug, Clone, Default)]
pub struct AggregatedData {
    pub hold_times: Vec<u32>,
    pub bins: BTreeMap<(u32, Segment), HoldBin>,
    pub summary: LoadSummary,
}

impl AggregatedData {
    pub fn new(hold_times: Vec<u32>) -> Self {
        Self {
            hold_times,
            ..Default::default()
        }
    }

    pub fn bin(&self, hold_time: u32, segment: Segment) -> Option<&HoldBin> {
        self.bins.get(&(hold_time, segment))
    }

    /// Add one run's pulses. Only segments present in the file create bins,
    /// and the run's fill is added once per such segment.
    pub fn add_run(&mut self, info: &RunInfo, file: &PulseFile) {
        for label in &file.unknown_segments {
            warn!(run = info.run, segment = %label, "unknown segment, skipping");
        }
        self.summary.unknown_segments += file.unknown_segments.len();
        self.summary.row_errors += file.row_errors.len();

        for segment in Segment::ALL {
            if !file.records.iter().any(|r| r.segment == segment) {
                continue;
            }
            let bin = self
                .bins
                .entry((info.hold_time, segment))
                .or_insert_with(|| HoldBin::new(info.hold_time, segment));
            bin.push_run(
                info.fill(segment),
                file.records.iter().copied().filter(|r| r.segment == segment),
            );
        }
        self.summary.runs_used.push(info.run);
    }

    /// 1-PE histogram over `[0, 200)` of every pulse (all segments, both
    /// windows) at `hold_time`. `None` when no segment has data there.
    pub fn pe_histogram(&self, hold_time: u32) -> Option<Vec<u64>> {
        let mut hist = vec![0u64; PE_HIST_BINS];
        let mut any = false;
        for segment in Segment::ALL {
            let Some(bin) = self.bin(hold_time, segment) else {
                continue;
            };
            for pe in bin.pe_values() {
                any = true;
                if pe >= 0.0 && pe < PE_HIST_BINS as f64 {
                    hist[pe.floor() as usize] += 1;
                }
            }
        }
        any.then_some(hist)
    }
}

/// Load every good run's pulse file and build the bins.
pub fn collect_bins(table: &RunInfoTable, good_runs: &GoodRuns, analysis_dir: &Path) -> Result<AggregatedData, AppError> {
    let mut data = AggregatedData::new(table.hold_times());
    data.summary.runs_total = table.runs.len();
    data.summary.runinfo_errors = table.row_errors.len();
    data.summary.good_runs = good_runs.len();
    for err in &table.row_errors {
        warn!(line = err.line, message = %err.message, "skipping runinfo row");
    }

    for info in &table.runs {
        if !good_runs.accepts(info.run) {
            data.summary.runs_rejected += 1;
            continue;
        }
        let path = pulse_file_path(analysis_dir, info.run);
        if !path.exists() {
            warn!(run = info.run, path = %path.display(), "missing pulse file, skipping run");
            data.summary.runs_missing_file.push(info.run);
            continue;
        }
        let file = load_pulse_file(&path)?;
        debug!(run = info.run, pulses = file.records.len(), "loaded pulse file");
        data.add_run(info, &file);
    }

    if data.bins.is_empty() {
        return Err(AppError::no_data(format!(
            "No pulse data found for any good run under '{}'.",
            analysis_dir.display()
        )));
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Campaign, ErrorScan};

    fn rec(segment: Segment, pe: f64, event: EventClass) -> PulseRecord {
        PulseRecord {
            segment,
            time: 0.0,
            pe,
            event,
        }
    }

    fn run(run: u32, hold_time: u32, fill: f64) -> RunInfo {
        RunInfo {
            run,
            hold_time,
            fills: [fill; 4],
        }
    }

    fn file(records: Vec<PulseRecord>) -> PulseFile {
        PulseFile {
            records,
            ..Default::default()
        }
    }

    #[test]
    fn threshold_is_strict_and_splits_windows() {
        let mut data = AggregatedData::new(vec![20]);
        data.add_run(
            &run(1, 20, 100.0),
            &file(vec![
                rec(Segment::S12, 5.0, EventClass::Signal),
                rec(Segment::S12, 6.0, EventClass::Signal),
                rec(Segment::S12, 12.0, EventClass::Signal),
                rec(Segment::S12, 8.0, EventClass::Background),
                rec(Segment::S34, 30.0, EventClass::Signal),
            ]),
        );
        let bin = data.bin(20, Segment::S12).unwrap();
        let c = bin.threshold_counts(5.0);
        assert_eq!(c, WindowCounts { signal: 2, background: 1 });
        assert_eq!(bin.threshold_counts(10.0), WindowCounts { signal: 1, background: 0 });
        assert!(data.bin(20, Segment::S56).is_none());
    }

    #[test]
    fn summed_normalization_pools_runs_and_floors_fill() {
        let mut data = AggregatedData::new(vec![20]);
        data.add_run(
            &run(1, 20, 0.25),
            &file(vec![
                rec(Segment::S12, 20.0, EventClass::Signal),
                rec(Segment::S12, 20.0, EventClass::Signal),
            ]),
        );
        data.add_run(&run(2, 20, 0.25), &file(vec![rec(Segment::S12, 20.0, EventClass::Background)]));
        let bin = data.bin(20, Segment::S12).unwrap();
        assert!((bin.fill_sum() - 0.5).abs() < 1e-12);

        let method = Campaign::Y2022.method();
        // (2 - 1) / max(0.5, 1)
        assert!((bin.normalized_count(5.0, &method, 1.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn per_run_normalization_averages_runs() {
        let mut data = AggregatedData::new(vec![100]);
        data.add_run(
            &run(1, 100, 10.0),
            &file(vec![
                rec(Segment::S78, 20.0, EventClass::Signal),
                rec(Segment::S78, 20.0, EventClass::Signal),
                rec(Segment::S78, 20.0, EventClass::Signal),
                rec(Segment::S78, 20.0, EventClass::Signal),
            ]),
        );
        data.add_run(&run(2, 100, 20.0), &file(vec![rec(Segment::S78, 20.0, EventClass::Signal)]));
        let bin = data.bin(100, Segment::S78).unwrap();
        let method = AnalysisMethod {
            background: BackgroundModel::Subtract,
            normalization: FillNormalization::PerRun,
            error_scan: ErrorScan::Grid,
        };
        // mean(4/10, 1/20)
        assert!((bin.normalized_count(5.0, &method, 1.0) - 0.225).abs() < 1e-12);
    }

    #[test]
    fn rate_scaled_background_uses_window_ratio() {
        let counts = WindowCounts { signal: 10, background: 4 };
        assert_eq!(corrected(counts, BackgroundModel::Subtract, 0.5), 6.0);
        assert_eq!(corrected(counts, BackgroundModel::RateScaled, 0.5), 8.0);
    }

    #[test]
    fn pe_histogram_pools_segments() {
        let mut data = AggregatedData::new(vec![20, 50]);
        data.add_run(
            &run(1, 20, 1.0),
            &file(vec![
                rec(Segment::S12, 3.2, EventClass::Signal),
                rec(Segment::S34, 3.9, EventClass::Background),
                rec(Segment::S56, 250.0, EventClass::Signal),
            ]),
        );
        let hist = data.pe_histogram(20).unwrap();
        assert_eq!(hist.len(), PE_HIST_BINS);
        assert_eq!(hist[3], 2);
        assert_eq!(hist.iter().sum::<u64>(), 2);
        assert!(data.pe_histogram(50).is_none());
    }

    #[test]
    fn collect_bins_skips_rejected_and_missing_runs() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![rec(Segment::S12, 10.0, EventClass::Signal)];
        crate::io::pulses::write_pulse_file(&pulse_file_path(dir.path(), 1), &records).unwrap();
        crate::io::pulses::write_pulse_file(&pulse_file_path(dir.path(), 3), &records).unwrap();

        let table = RunInfoTable {
            runs: vec![run(1, 20, 5.0), run(2, 20, 5.0), run(3, 50, 5.0)],
            row_errors: Vec::new(),
        };
        let good: GoodRuns = [1, 2].into_iter().collect();
        let data = collect_bins(&table, &good, dir.path()).unwrap();
        assert_eq!(data.hold_times, vec![20, 50]);
        assert_eq!(data.summary.runs_used, vec![1]);
        assert_eq!(data.summary.runs_missing_file, vec![2]);
        assert_eq!(data.summary.runs_rejected, 1);
        assert!(data.bin(50, Segment::S12).is_none());
    }
}
