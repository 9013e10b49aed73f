//! Summed tail response: hits following isolated signal pulses.
//!
//! For every signal pulse that is alone in its window, all hits of the same
//! segment arriving within `max_delay` after it are histogrammed by delay.
//! The histogram is summed over runs; a cumulative CSV is written after each
//! run and an SVG of the final sums at the end.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::domain::{Segment, TailConfig};
use crate::error::AppError;
use crate::io::hits::{hit_file_path, load_run_hits};
use crate::io::params::load_run_params;
use crate::io::runlist::GoodRuns;
use crate::plot::write_tail_svg;
use crate::pulse::{FoundPulse, PulseRunSummary, RunWindows, SkipReason, analyze_run, ensure_dir, select_runs};

/// Per-segment delay histograms.
#[derive(Debug, Clone, PartialEq)]
pub struct TailHistogram {
    pub bin_width: f64,
    pub segments: [Vec<f64>; 4],
}

impl TailHistogram {
    pub fn new(bin_width: f64, max_delay: f64) -> Self {
        let n = (max_delay / bin_width).ceil().max(0.0) as usize;
        Self {
            bin_width,
            segments: std::array::from_fn(|_| vec![0.0; n]),
        }
    }

    pub fn n_bins(&self) -> usize {
        self.segments[0].len()
    }

    pub fn max_delay(&self) -> f64 {
        self.n_bins() as f64 * self.bin_width
    }

    pub fn segment(&self, segment: Segment) -> &[f64] {
        &self.segments[segment.index()]
    }

    /// Add hits following the non-pile-up `pulses` of one segment.
    pub fn accumulate(&mut self, segment: Segment, pulses: &[FoundPulse], hits: &[f64]) {
        let max_delay = self.max_delay();
        let bin_width = self.bin_width;
        let bins = &mut self.segments[segment.index()];
        for pulse in pulses.iter().filter(|p| !p.pileup) {
            let lo = hits.partition_point(|&t| t < pulse.time_us);
            for &t in &hits[lo..] {
                let dt = t - pulse.time_us;
                if dt >= max_delay {
                    break;
                }
                let bin = (dt / bin_width) as usize;
                if let Some(b) = bins.get_mut(bin) {
                    *b += 1.0;
                }
            }
        }
    }
}

pub fn tail_csv_path(dir: &Path, run: u32) -> PathBuf {
    dir.join(format!("summed_tail_response_{run}.csv"))
}

/// Write `Time(us),Segment_12,...` rows, one per delay bin.
pub fn write_tail_csv(path: &Path, tail: &TailHistogram) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::input(format!("Failed to create '{}': {e}", path.display())))?;
    let mut writer = csv::Writer::from_writer(file);
    let mut header = vec!["Time(us)".to_string()];
    header.extend(Segment::ALL.iter().map(|s| format!("Segment_{}", s.label())));
    writer
        .write_record(&header)
        .map_err(|e| AppError::input(format!("Failed to write tail CSV: {e}")))?;

    for i in 0..tail.n_bins() {
        let mut row = vec![format!("{}", i as f64 * tail.bin_width)];
        row.extend(tail.segments.iter().map(|bins| format!("{}", bins[i])));
        writer
            .write_record(&row)
            .map_err(|e| AppError::input(format!("Failed to write tail CSV: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::input(format!("Failed to write tail CSV: {e}")))
}

/// Output of [`run_tail_analysis`].
#[derive(Debug, Clone)]
pub struct TailSummary {
    pub runs: PulseRunSummary,
    pub tail: TailHistogram,
    pub svg_path: Option<PathBuf>,
}

/// Accumulate tails over the configured run range.
///
/// Every production run in range is used; the good-run list does not apply
/// here. Outputs go to `<output_dir>/tail/`.
pub fn run_tail_analysis(config: &TailConfig) -> Result<TailSummary, AppError> {
    let pulses = &config.pulses;
    let tail_dir = pulses.output_dir.join("tail");
    ensure_dir(&tail_dir)?;
    let params = load_run_params(&pulses.run_params_path)?;

    let mut runs = PulseRunSummary::default();
    let mut tail = TailHistogram::new(config.bin_width, config.max_delay);

    for (run, run_params) in select_runs(pulses, &GoodRuns::default(), &params, &mut runs) {
        let Some(hits) = load_run_hits(&hit_file_path(&pulses.data_dir, run))? else {
            warn!(run, "missing hit file, skipping run");
            runs.skipped.push((run, SkipReason::MissingHits));
            continue;
        };
        let windows = RunWindows::for_run(run_params, &pulses.windows);
        for seg in analyze_run(&hits, &windows, pulses.finder) {
            tail.accumulate(seg.segment, &seg.signal, hits.times(seg.segment));
            runs.pulses_written += seg.signal.len();
        }
        write_tail_csv(&tail_csv_path(&tail_dir, run), &tail)?;
        info!(run, "tail accumulated");
        runs.processed.push(run);
    }

    if runs.processed.is_empty() {
        return Err(AppError::no_data(format!(
            "No runs in [{}, {}) could be analyzed.",
            pulses.start_run, pulses.end_run
        )));
    }

    let svg_path = tail_dir.join(format!(
        "summed_tail_response_{}_{}.svg",
        pulses.start_run, pulses.end_run
    ));
    let svg_path = match write_tail_svg(&svg_path, &tail) {
        Ok(()) => Some(svg_path),
        Err(err) => {
            warn!(error = %err, "failed to render tail plot");
            None
        }
    };

    Ok(TailSummary { runs, tail, svg_path })
}
