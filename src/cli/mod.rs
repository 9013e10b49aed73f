//! Command-line parsing for the UCN lifetime tools.
//!
//! Argument parsing stays here; `crate::app` turns the parsed args into the
//! plain config structs the library works with.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::domain::{BackgroundModel, Campaign, ErrorScan, FillNormalization, Segment};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "ucnlife", version, about = "UCN storage lifetime analysis")]
pub struct Cli {
    /// More log output on stderr (repeatable).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Aggregate pulse files, fit τ per threshold and segment, write plots.
    Lifetime(LifetimeArgs),
    /// Find pulses in raw PE hit files and write `PulseAnalysis_<run>.csv`.
    Pulses(PulseArgs),
    /// Accumulate the PMT tail response after fitted pulses.
    Tail(TailArgs),
    /// Write a synthetic campaign with a known lifetime.
    Simulate(SimArgs),
    /// Interactive lifetime-vs-threshold viewer.
    View(ViewArgs),
}

/// Options of the lifetime pipeline.
#[derive(Debug, Args, Clone)]
pub struct LifetimeArgs {
    /// Run-info CSV (run number, holding time, fill per segment).
    #[arg(long, env = "UCN_RUNINFO", default_value = "runinfo_2022_all.csv")]
    pub runinfo: PathBuf,

    /// Directory holding `PulseAnalysis_<run>.csv` files.
    #[arg(long, env = "UCN_ANALYSIS_DIR", default_value = "./output/results/")]
    pub analysis_dir: PathBuf,

    /// Directory receiving the SVG plots.
    #[arg(long, env = "UCN_GRAPH_DIR", default_value = "./output/graphs/")]
    pub graph_dir: PathBuf,

    /// Good-run list, one run number per line.
    #[arg(long, env = "UCN_GOOD_RUNS", default_value = "./config/2022runlist.txt")]
    pub good_runs: PathBuf,

    /// Campaign preset selecting the analysis method.
    #[arg(long, value_enum, default_value_t = Campaign::Y2022)]
    pub campaign: Campaign,

    /// Override the campaign's background correction.
    #[arg(long, value_enum)]
    pub background: Option<BackgroundModel>,

    /// Override the campaign's fill normalization.
    #[arg(long, value_enum)]
    pub normalization: Option<FillNormalization>,

    /// Override the campaign's Δχ² = 1 band search.
    #[arg(long, value_enum)]
    pub error_scan: Option<ErrorScan>,

    /// Lowest PE threshold.
    #[arg(long, default_value_t = 5)]
    pub threshold_min: u32,

    /// Highest PE threshold (inclusive).
    #[arg(long, default_value_t = 19)]
    pub threshold_max: u32,

    /// Segments to fit, comma separated (12,34,56,78).
    #[arg(long, value_delimiter = ',', value_parser = parse_segment, default_value = "12,34,56,78")]
    pub segments: Vec<Segment>,

    /// Signal window length (s).
    #[arg(long, default_value_t = 60.0)]
    pub signal_window: f64,

    /// Background window length (s).
    #[arg(long, default_value_t = 60.0)]
    pub background_window: f64,

    /// Starting lifetime for the fit (s).
    #[arg(long, default_value_t = 800.0)]
    pub tau_start: f64,

    /// Lower lifetime bound (s).
    #[arg(long, default_value_t = 1.0)]
    pub tau_min: f64,

    /// Upper lifetime bound (s).
    #[arg(long, default_value_t = 1e6)]
    pub tau_max: f64,

    /// Log-spaced candidates of the coarse τ search.
    #[arg(long, default_value_t = 241)]
    pub tau_grid_steps: usize,

    /// Skip the SVG plots.
    #[arg(long)]
    pub no_plot: bool,

    /// Export lifetimes per segment and threshold to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export the full scan with its settings to JSON.
    #[arg(long = "export-json")]
    pub export_json: Option<PathBuf>,
}

/// Options of the pulse finder.
#[derive(Debug, Args, Clone)]
pub struct PulseArgs {
    /// Directory holding `PECountsRun<run>.txt` hit files.
    #[arg(long, env = "UCN_DATA_DIR", default_value = "./data/")]
    pub data_dir: PathBuf,

    /// Output root; pulse files go to `results/`, tails to `tail/`.
    #[arg(long, env = "UCN_OUTPUT_DIR", default_value = "./output/")]
    pub output_dir: PathBuf,

    /// Run parameter JSON keyed by run number.
    #[arg(long, env = "UCN_RUN_PARAMS", default_value = "./config/run_params.json")]
    pub run_params: PathBuf,

    /// Good-run list, one run number per line (not used by `tail`).
    #[arg(long, env = "UCN_GOOD_RUNS", default_value = "./config/2022runlist.txt")]
    pub good_runs: PathBuf,

    /// First run (inclusive).
    #[arg(long)]
    pub start_run: u32,

    /// Last run (exclusive).
    #[arg(long)]
    pub end_run: u32,

    /// Delay after fill+hold+clean before counting (s); 40 for pulses, 70 for tails.
    #[arg(long)]
    pub signal_offset: Option<f64>,

    /// Counting window length (s).
    #[arg(long, default_value_t = 60.0)]
    pub signal_length: f64,

    /// Gap between counting and background windows (s).
    #[arg(long, default_value_t = 50.0)]
    pub background_gap: f64,

    /// Background window length (s).
    #[arg(long, default_value_t = 60.0)]
    pub background_length: f64,

    /// Hit histogram bin width (µs).
    #[arg(long, default_value_t = 1.0)]
    pub bin_width: f64,

    /// Fallback bin width for short windows (µs).
    #[arg(long, default_value_t = 0.25)]
    pub fine_bin_width: f64,

    /// Largest hit gap inside one window (µs).
    #[arg(long, default_value_t = 10.0)]
    pub min_gap: f64,
}

/// Options of the tail accumulation.
#[derive(Debug, Args, Clone)]
pub struct TailArgs {
    #[command(flatten)]
    pub pulses: PulseArgs,

    /// Tail histogram bin width (µs).
    #[arg(long, default_value_t = 0.1)]
    pub tail_bin_width: f64,

    /// Longest delay after a pulse (µs).
    #[arg(long, default_value_t = 75.0)]
    pub max_delay: f64,
}

/// Options of the synthetic campaign generator.
#[derive(Debug, Args, Clone)]
pub struct SimArgs {
    /// Output root for the generated files.
    #[arg(long, default_value = "./output/sim/")]
    pub output_dir: PathBuf,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// True storage lifetime (s).
    #[arg(long, default_value_t = 880.0)]
    pub tau: f64,

    /// Holding times (s), comma separated.
    #[arg(long, value_delimiter = ',', default_value = "20,100,200,500,1000")]
    pub hold_times: Vec<u32>,

    #[arg(long, default_value_t = 3)]
    pub runs_per_hold: usize,

    #[arg(long, default_value_t = 1000)]
    pub first_run: u32,

    /// Mean fill monitor value per run and segment.
    #[arg(long, default_value_t = 2000.0)]
    pub fill_mean: f64,

    /// Detected neutrons per unit fill at zero hold.
    #[arg(long, default_value_t = 0.5)]
    pub efficiency: f64,

    /// Background pulses per second and segment.
    #[arg(long, default_value_t = 0.2)]
    pub background_rate: f64,

    /// Counting and background window length (s).
    #[arg(long, default_value_t = 60.0)]
    pub window: f64,

    /// Also write raw hit files and run parameters for `pulses`/`tail`.
    #[arg(long)]
    pub hits: bool,
}

/// Options of the viewer.
#[derive(Debug, Args, Clone)]
pub struct ViewArgs {
    #[command(flatten)]
    pub lifetime: LifetimeArgs,

    /// Show a saved `--export-json` file instead of running the pipeline.
    #[arg(long, value_name = "JSON")]
    pub results: Option<PathBuf>,
}

fn parse_segment(s: &str) -> Result<Segment, String> {
    Segment::from_label(s.trim()).ok_or_else(|| format!("unknown segment '{s}' (expected 12, 34, 56 or 78)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifetime_defaults() {
        let cli = Cli::parse_from(["ucnlife", "lifetime"]);
        let Command::Lifetime(args) = cli.command else {
            panic!("expected lifetime");
        };
        assert_eq!(args.campaign, Campaign::Y2022);
        assert_eq!(args.segments, Segment::ALL.to_vec());
        assert_eq!((args.threshold_min, args.threshold_max), (5, 19));
        assert!(args.background.is_none());
    }

    #[test]
    fn segments_and_overrides_parse() {
        let cli = Cli::parse_from([
            "ucnlife",
            "-vv",
            "lifetime",
            "--campaign",
            "2023",
            "--segments",
            "34,78",
            "--background",
            "subtract",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Lifetime(args) = cli.command else {
            panic!("expected lifetime");
        };
        assert_eq!(args.campaign, Campaign::Y2023);
        assert_eq!(args.segments, vec![Segment::S34, Segment::S78]);
        assert_eq!(args.background, Some(BackgroundModel::Subtract));
        assert!(Cli::try_parse_from(["ucnlife", "lifetime", "--segments", "13"]).is_err());
    }

    #[test]
    fn tail_flattens_pulse_args() {
        let cli = Cli::parse_from(["ucnlife", "tail", "--start-run", "10", "--end-run", "12", "--max-delay", "50"]);
        let Command::Tail(args) = cli.command else {
            panic!("expected tail");
        };
        assert_eq!(args.pulses.start_run, 10);
        assert_eq!(args.max_delay, 50.0);
        assert!(args.pulses.signal_offset.is_none());
    }
}
