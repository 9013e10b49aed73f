//! Pulse analysis: from raw PE hit times to `PulseAnalysis_<run>.csv`.
//!
//! Responsibilities:
//!
//! - place the signal and background windows of a run
//! - find pulses in each window (per segment, in parallel)
//! - write one pulse file per processed run

pub mod finder;
pub mod fitter;
pub mod likelihood;
pub mod window;

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::{EventClass, FinderSettings, PulseConfig, PulseRecord, RunParams, Segment, WindowTiming};
use crate::error::AppError;
use crate::io::hits::{RunHits, hit_file_path, load_run_hits};
use crate::io::params::{RunParamTable, load_run_params};
use crate::io::pulses::{pulse_file_path, write_pulse_file};
use crate::io::runlist::{GoodRuns, load_good_runs};

pub use finder::{FoundPulse, PulseFinder};

/// Signal and background windows of one run, in seconds from run start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunWindows {
    pub signal: (f64, f64),
    /// Absent when the window would not start after zero.
    pub background: Option<(f64, f64)>,
}

impl RunWindows {
    pub fn for_run(params: &RunParams, timing: &WindowTiming) -> Self {
        let start = params.fill_time + params.hold_time + params.clean_time + timing.signal_offset;
        let stop = start + timing.signal_length;
        let bg_start = stop + timing.background_gap;
        Self {
            signal: (start, stop),
            background: (bg_start > 0.0).then_some((bg_start, bg_start + timing.background_length)),
        }
    }
}

/// Pulses of one segment, split by window.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPulses {
    pub segment: Segment,
    pub signal: Vec<FoundPulse>,
    pub background: Vec<FoundPulse>,
}

/// Find pulses in both windows of one segment's sorted hits (µs).
pub fn analyze_segment(segment: Segment, hits: &[f64], windows: &RunWindows, settings: FinderSettings) -> SegmentPulses {
    let mut finder = PulseFinder::new(settings);
    let (s0, s1) = windows.signal;
    let signal_hits = window::select_range(hits, s0 * 1e6, s1 * 1e6);
    let signal = finder.find(signal_hits);

    let background = match windows.background {
        Some((b0, b1)) => finder.find(window::select_range(hits, b0 * 1e6, b1 * 1e6)),
        None => Vec::new(),
    };
    debug!(
        segment = %segment,
        hits = hits.len(),
        signal_hits = signal_hits.len(),
        signal = signal.len(),
        background = background.len(),
        "segment analyzed"
    );
    SegmentPulses {
        segment,
        signal,
        background,
    }
}

/// Analyze every segment of a run on the rayon pool, in segment order.
pub fn analyze_run(hits: &RunHits, windows: &RunWindows, settings: FinderSettings) -> Vec<SegmentPulses> {
    Segment::ALL
        .par_iter()
        .map(|&segment| analyze_segment(segment, hits.times(segment), windows, settings))
        .collect()
}

/// Pulse-file rows: per segment, signal pulses then background pulses.
pub fn pulse_records(segments: &[SegmentPulses]) -> Vec<PulseRecord> {
    let mut out = Vec::new();
    for seg in segments {
        for (pulses, event) in [(&seg.signal, EventClass::Signal), (&seg.background, EventClass::Background)] {
            out.extend(pulses.iter().map(|p| PulseRecord {
                segment: seg.segment,
                time: p.time_us / 1e6,
                pe: p.pe,
                event,
            }));
        }
    }
    out
}

/// Why a run in the requested range was not analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotGood,
    NotProduction,
    MissingHits,
}

/// Outcome of [`run_pulse_analysis`].
#[derive(Debug, Clone, Default)]
pub struct PulseRunSummary {
    pub processed: Vec<u32>,
    pub skipped: Vec<(u32, SkipReason)>,
    pub pulses_written: usize,
}

/// Runs in `[start_run, end_run)` that pass the good-run and production
/// filters, with their parameters. Filtered runs are recorded in `summary`.
pub fn select_runs<'a>(
    config: &PulseConfig,
    good: &GoodRuns,
    params: &'a RunParamTable,
    summary: &mut PulseRunSummary,
) -> Vec<(u32, &'a RunParams)> {
    let mut out = Vec::new();
    for run in config.start_run..config.end_run {
        if !good.accepts(run) {
            debug!(run, "not in good-run list, skipping");
            summary.skipped.push((run, SkipReason::NotGood));
            continue;
        }
        match params.get(run) {
            Some(p) if p.is_production() => out.push((run, p)),
            _ => {
                debug!(run, "not a production run, skipping");
                summary.skipped.push((run, SkipReason::NotProduction));
            }
        }
    }
    out
}

/// Directory receiving `PulseAnalysis_<run>.csv` files.
pub fn results_dir(config: &PulseConfig) -> PathBuf {
    config.output_dir.join("results")
}

/// Analyze one run's hit file and write its pulse file. `Ok(None)` when the
/// hit file is missing.
pub fn process_run(config: &PulseConfig, run: u32, params: &RunParams) -> Result<Option<usize>, AppError> {
    let Some(hits) = load_run_hits(&hit_file_path(&config.data_dir, run))? else {
        warn!(run, "missing hit file, skipping run");
        return Ok(None);
    };
    let windows = RunWindows::for_run(params, &config.windows);
    let segments = analyze_run(&hits, &windows, config.finder);
    let records = pulse_records(&segments);
    write_pulse_file(&pulse_file_path(&results_dir(config), run), &records)?;
    info!(
        run,
        hits = hits.total(),
        signal = segments.iter().map(|s| s.signal.len()).sum::<usize>(),
        background = segments.iter().map(|s| s.background.len()).sum::<usize>(),
        "run analyzed"
    );
    Ok(Some(records.len()))
}

/// Analyze every selected run and write `PulseAnalysis_<run>.csv` files
/// under `<output_dir>/results/`.
pub fn run_pulse_analysis(config: &PulseConfig) -> Result<PulseRunSummary, AppError> {
    ensure_dir(&results_dir(config))?;
    let good = load_good_runs(&config.good_runs_path)?;
    let params = load_run_params(&config.run_params_path)?;
    info!(good_runs = good.len(), run_params = params.len(), "pulse analysis inputs loaded");

    let mut summary = PulseRunSummary::default();
    for (run, run_params) in select_runs(config, &good, &params, &mut summary) {
        match process_run(config, run, run_params)? {
            Some(n) => {
                summary.processed.push(run);
                summary.pulses_written += n;
            }
            None => summary.skipped.push((run, SkipReason::MissingHits)),
        }
    }

    if summary.processed.is_empty() {
        return Err(AppError::no_data(format!(
            "No runs in [{}, {}) could be analyzed.",
            config.start_run, config.end_run
        )));
    }
    Ok(summary)
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::input(format!("Failed to create directory '{}': {e}", dir.display())))
}
