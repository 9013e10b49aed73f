//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during aggregation and fitting
//! - exported to JSON/CSV
//! - reloaded later for plotting

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Detector segment (a pair of PMTs read out together).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Segment {
    #[serde(rename = "12")]
    S12,
    #[serde(rename = "34")]
    S34,
    #[serde(rename = "56")]
    S56,
    #[serde(rename = "78")]
    S78,
}

impl Segment {
    pub const ALL: [Segment; 4] = [Segment::S12, Segment::S34, Segment::S56, Segment::S78];

    /// Label used in CSV files and plots.
    pub fn label(self) -> &'static str {
        match self {
            Segment::S12 => "12",
            Segment::S34 => "34",
            Segment::S56 => "56",
            Segment::S78 => "78",
        }
    }

    /// Runinfo column holding the per-run fill for this segment.
    pub fn fill_column(self) -> &'static str {
        match self {
            Segment::S12 => "fillUCN12",
            Segment::S34 => "fillUCN34",
            Segment::S56 => "fillUCN1112",
            Segment::S78 => "fillUCN1314",
        }
    }

    /// MCS channels summed into this segment.
    pub fn channels(self) -> [u32; 2] {
        match self {
            Segment::S12 => [1, 2],
            Segment::S34 => [3, 4],
            Segment::S56 => [11, 12],
            Segment::S78 => [13, 14],
        }
    }

    pub fn from_label(label: &str) -> Option<Segment> {
        match label.trim() {
            "12" => Some(Segment::S12),
            "34" => Some(Segment::S34),
            "56" => Some(Segment::S56),
            "78" => Some(Segment::S78),
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Segment::S12 => 0,
            Segment::S34 => 1,
            Segment::S56 => 2,
            Segment::S78 => 3,
        }
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Which counting window a pulse was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventClass {
    /// Pulse inside the post-hold counting window (flag `1`).
    Signal,
    /// Pulse inside the background window (flag `0`).
    Background,
}

impl EventClass {
    pub fn flag(self) -> u8 {
        match self {
            EventClass::Signal => 1,
            EventClass::Background => 0,
        }
    }

    pub fn from_flag(flag: i64) -> Option<EventClass> {
        match flag {
            1 => Some(EventClass::Signal),
            0 => Some(EventClass::Background),
            _ => None,
        }
    }
}

/// One fitted pulse as stored in a `PulseAnalysis_<run>.csv` file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseRecord {
    pub segment: Segment,
    /// Pulse time in seconds since the start of the run.
    pub time: f64,
    pub pe: f64,
    pub event: EventClass,
}

/// One row of the runinfo table.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    pub run: u32,
    /// Holding time in seconds.
    pub hold_time: u32,
    /// Fill normalization per segment, indexed by `Segment::index`.
    pub fills: [f64; 4],
}

impl RunInfo {
    pub fn fill(&self, segment: Segment) -> f64 {
        self.fills[segment.index()]
    }
}

/// Timing parameters of a run from the run-parameter JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    pub run_type: String,
    pub fill_time: f64,
    pub hold_time: f64,
    pub clean_time: f64,
}

impl RunParams {
    pub fn is_production(&self) -> bool {
        self.run_type == "production"
    }
}

/// Background correction applied to the signal-window count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackgroundModel {
    /// `sig - bg` (equal-length windows assumed).
    Subtract,
    /// `sig - bg * signal_window / background_window`.
    RateScaled,
}

/// How a hold-time bin is normalized by the fill monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FillNormalization {
    /// Pooled corrected count divided by `max(sum of run fills, 1)`.
    Summed,
    /// Mean over runs of `run corrected count / max(run fill, 1)`.
    PerRun,
}

/// How the Δχ² = 1 band around the best lifetime is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorScan {
    /// Dense linear scan over `τ ± max(50, 0.15 τ)`.
    Grid,
    /// Bisection on both crossings of `χ²_min + 1`.
    Bisect,
}

/// Run-campaign presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Campaign {
    #[serde(rename = "2022")]
    #[value(name = "2022")]
    Y2022,
    #[serde(rename = "2023")]
    #[value(name = "2023")]
    Y2023,
}

impl Campaign {
    pub fn display_name(self) -> &'static str {
        match self {
            Campaign::Y2022 => "2022",
            Campaign::Y2023 => "2023",
        }
    }

    pub fn next(self) -> Campaign {
        match self {
            Campaign::Y2022 => Campaign::Y2023,
            Campaign::Y2023 => Campaign::Y2022,
        }
    }

    pub fn method(self) -> AnalysisMethod {
        match self {
            Campaign::Y2022 => AnalysisMethod {
                background: BackgroundModel::Subtract,
                normalization: FillNormalization::Summed,
                error_scan: ErrorScan::Grid,
            },
            Campaign::Y2023 => AnalysisMethod {
                background: BackgroundModel::RateScaled,
                normalization: FillNormalization::PerRun,
                error_scan: ErrorScan::Bisect,
            },
        }
    }
}

/// The three knobs that differ between campaigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisMethod {
    pub background: BackgroundModel,
    pub normalization: FillNormalization,
    pub error_scan: ErrorScan,
}

/// Result of a profiled exponential fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LifetimeFit {
    /// Best-fit lifetime (s).
    pub tau: f64,
    /// Half-width of the Δχ² = 1 interval (s), absent when no band was found.
    pub dtau: Option<f64>,
    /// Profiled amplitude at `tau`.
    pub amplitude: f64,
    pub chi2: f64,
    pub n_points: usize,
}

/// Normalized count for one hold time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoldCount {
    pub hold_time: u32,
    pub count: f64,
}

/// Counts and fit for one PE threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPoint {
    pub threshold: u32,
    pub counts: Vec<HoldCount>,
    pub fit: Option<LifetimeFit>,
}

/// Lifetime vs threshold for one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentScan {
    pub segment: Segment,
    pub points: Vec<ThresholdPoint>,
}

/// Configuration of a lifetime run as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct LifetimeConfig {
    pub runinfo_path: PathBuf,
    pub analysis_dir: PathBuf,
    pub graph_dir: PathBuf,
    pub good_runs_path: PathBuf,

    pub campaign: Campaign,
    pub method: AnalysisMethod,

    pub threshold_min: u32,
    pub threshold_max: u32,
    pub segments: Vec<Segment>,

    /// Signal counting window length (s).
    pub signal_window: f64,
    /// Background window length (s).
    pub background_window: f64,

    pub tau_start: f64,
    pub tau_min: f64,
    pub tau_max: f64,
    pub tau_grid_steps: usize,

    pub plot: bool,
    pub export_csv: Option<PathBuf>,
    pub export_json: Option<PathBuf>,
}

impl LifetimeConfig {
    pub fn thresholds(&self) -> Vec<u32> {
        (self.threshold_min..=self.threshold_max).collect()
    }
}

/// Configuration of the pulse-finding stage.
#[derive(Debug, Clone)]
pub struct PulseConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub run_params_path: PathBuf,
    pub good_runs_path: PathBuf,
    pub start_run: u32,
    pub end_run: u32,
    pub windows: WindowTiming,
    pub finder: FinderSettings,
}

/// Tail-response accumulation settings.
#[derive(Debug, Clone)]
pub struct TailConfig {
    pub pulses: PulseConfig,
    /// Histogram bin width (µs).
    pub bin_width: f64,
    /// Maximum delay after a pulse (µs).
    pub max_delay: f64,
}

/// Offsets used to place the signal and background windows in a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowTiming {
    /// Delay after fill+hold+clean before counting starts (s).
    pub signal_offset: f64,
    /// Counting window length (s).
    pub signal_length: f64,
    /// Gap between the end of counting and the background window (s).
    pub background_gap: f64,
    /// Background window length (s).
    pub background_length: f64,
}

impl Default for WindowTiming {
    fn default() -> Self {
        Self {
            signal_offset: 40.0,
            signal_length: 60.0,
            background_gap: 50.0,
            background_length: 60.0,
        }
    }
}

/// Tunables of the windowed pulse finder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinderSettings {
    /// Primary histogram bin (µs).
    pub bin_width: f64,
    /// Fallback bin when a window yields fewer than two bins (µs).
    pub fine_bin_width: f64,
    /// Largest inter-hit gap that keeps a window open (µs).
    pub min_gap: f64,
}

impl Default for FinderSettings {
    fn default() -> Self {
        Self {
            bin_width: 1.0,
            fine_bin_width: 0.25,
            min_gap: 10.0,
        }
    }
}

/// Synthetic dataset settings.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub output_dir: PathBuf,
    pub seed: u64,
    pub tau: f64,
    pub hold_times: Vec<u32>,
    pub runs_per_hold: usize,
    pub first_run: u32,
    /// Mean fill monitor value per run and segment.
    pub fill_mean: f64,
    /// Detected neutrons per unit fill at zero holding time.
    pub efficiency: f64,
    /// Background pulse rate per segment (1/s).
    pub background_rate: f64,
    /// Counting window length (s); the background window has the same length.
    pub window: f64,
    /// Also write raw PE hit files and a run-parameter JSON for the pulse stage.
    pub hits: bool,
}

/// Portable lifetime-scan results (`--export-json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifetimeExport {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub campaign: Campaign,
    pub method: AnalysisMethod,
    pub signal_window: f64,
    pub background_window: f64,
    pub hold_times: Vec<u32>,
    pub runs_used: Vec<u32>,
    pub scans: Vec<SegmentScan>,
}
