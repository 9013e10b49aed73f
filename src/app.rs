//! Top-level application orchestration.
//!
//! `src/main.rs` only maps errors to exit codes; this module is the real main:
//! - loads `.env` and sets up logging
//! - parses CLI arguments into config structs
//! - dispatches to the pipeline stages and prints reports

use clap::Parser;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::cli::{Command, LifetimeArgs, PulseArgs, SimArgs, TailArgs, ViewArgs};
use crate::domain::{AnalysisMethod, FinderSettings, LifetimeConfig, PulseConfig, SimConfig, TailConfig, WindowTiming};
use crate::error::AppError;

pub mod pipeline;

/// Default delay before the counting window of the pulse stage (s).
pub const PULSE_SIGNAL_OFFSET: f64 = 40.0;
/// Default delay before the counting window of the tail stage (s).
pub const TAIL_SIGNAL_OFFSET: f64 = 70.0;

/// Entry point for the `ucnlife` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // `ucnlife` and `ucnlife --campaign 2023` behave like `ucnlife lifetime ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Lifetime(args) => handle_lifetime(&args),
        Command::Pulses(args) => handle_pulses(&args),
        Command::Tail(args) => handle_tail(&args),
        Command::Simulate(args) => handle_simulate(&args),
        Command::View(args) => handle_view(&args),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, 2) => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn handle_lifetime(args: &LifetimeArgs) -> Result<(), AppError> {
    let config = lifetime_config_from_args(args)?;
    let run = pipeline::run_lifetime(&config)?;

    println!("{}", crate::report::format_run_summary(&run.data, &config));
    println!("{}", crate::report::format_scan_tables(&run.scans));

    let written = pipeline::write_outputs(&config, &run)?;
    for path in written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn handle_pulses(args: &PulseArgs) -> Result<(), AppError> {
    let config = pulse_config_from_args(args, PULSE_SIGNAL_OFFSET)?;
    let summary = crate::pulse::run_pulse_analysis(&config)?;
    println!("{}", crate::report::format_pulse_summary(&summary));
    println!("pulse files in {}", crate::pulse::results_dir(&config).display());
    Ok(())
}

fn handle_tail(args: &TailArgs) -> Result<(), AppError> {
    let config = tail_config_from_args(args)?;
    let summary = crate::tail::run_tail_analysis(&config)?;
    println!("{}", crate::report::format_pulse_summary(&summary.runs));
    if let Some(path) = &summary.svg_path {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn handle_simulate(args: &SimArgs) -> Result<(), AppError> {
    let config = sim_config_from_args(args);
    let summary = crate::sim::simulate(&config)?;
    info!(runs = summary.runs.len(), "simulation finished");
    println!(
        "simulated {} runs ({} pulses) into {}",
        summary.runs.len(),
        summary.pulses,
        config.output_dir.display()
    );
    println!("  runinfo   : {}", summary.runinfo_path.display());
    println!("  run list  : {}", summary.runlist_path.display());
    println!("  pulses    : {}", summary.analysis_dir.display());
    if let Some(dir) = &summary.hits_dir {
        println!("  hits      : {}", dir.display());
    }
    if let Some(path) = &summary.params_path {
        println!("  run params: {}", path.display());
    }
    Ok(())
}

fn handle_view(args: &ViewArgs) -> Result<(), AppError> {
    let config = lifetime_config_from_args(&args.lifetime)?;
    crate::tui::run(config, args.results.clone())
}

/// Build the lifetime config, applying method overrides on top of the
/// campaign preset.
pub fn lifetime_config_from_args(args: &LifetimeArgs) -> Result<LifetimeConfig, AppError> {
    if args.threshold_min > args.threshold_max {
        return Err(AppError::input(format!(
            "--threshold-min ({}) must not exceed --threshold-max ({}).",
            args.threshold_min, args.threshold_max
        )));
    }
    if !(args.tau_min > 0.0 && args.tau_min < args.tau_max && args.tau_max.is_finite()) {
        return Err(AppError::input("Lifetime bounds must satisfy 0 < --tau-min < --tau-max."));
    }
    if args.tau_grid_steps < 2 {
        return Err(AppError::input("--tau-grid-steps must be at least 2."));
    }
    for (name, v) in [
        ("--signal-window", args.signal_window),
        ("--background-window", args.background_window),
    ] {
        if !(v.is_finite() && v > 0.0) {
            return Err(AppError::input(format!("{name} must be finite and > 0.")));
        }
    }
    if args.segments.is_empty() {
        return Err(AppError::input("At least one segment is required."));
    }

    let preset = args.campaign.method();
    let method = AnalysisMethod {
        background: args.background.unwrap_or(preset.background),
        normalization: args.normalization.unwrap_or(preset.normalization),
        error_scan: args.error_scan.unwrap_or(preset.error_scan),
    };

    let mut segments = args.segments.clone();
    segments.sort();
    segments.dedup();

    Ok(LifetimeConfig {
        runinfo_path: args.runinfo.clone(),
        analysis_dir: args.analysis_dir.clone(),
        graph_dir: args.graph_dir.clone(),
        good_runs_path: args.good_runs.clone(),
        campaign: args.campaign,
        method,
        threshold_min: args.threshold_min,
        threshold_max: args.threshold_max,
        segments,
        signal_window: args.signal_window,
        background_window: args.background_window,
        tau_start: args.tau_start,
        tau_min: args.tau_min,
        tau_max: args.tau_max,
        tau_grid_steps: args.tau_grid_steps,
        plot: !args.no_plot,
        export_csv: args.export.clone(),
        export_json: args.export_json.clone(),
    })
}

/// Build the pulse config; `default_offset` applies when `--signal-offset`
/// is not given.
pub fn pulse_config_from_args(args: &PulseArgs, default_offset: f64) -> Result<PulseConfig, AppError> {
    if args.start_run >= args.end_run {
        return Err(AppError::input(format!(
            "Empty run range [{}, {}).",
            args.start_run, args.end_run
        )));
    }
    for (name, v) in [
        ("--bin-width", args.bin_width),
        ("--fine-bin-width", args.fine_bin_width),
        ("--signal-length", args.signal_length),
        ("--background-length", args.background_length),
    ] {
        if !(v.is_finite() && v > 0.0) {
            return Err(AppError::input(format!("{name} must be finite and > 0.")));
        }
    }
    if !(args.min_gap.is_finite() && args.min_gap >= 0.0) {
        return Err(AppError::input("--min-gap must be finite and >= 0."));
    }

    Ok(PulseConfig {
        data_dir: args.data_dir.clone(),
        output_dir: args.output_dir.clone(),
        run_params_path: args.run_params.clone(),
        good_runs_path: args.good_runs.clone(),
        start_run: args.start_run,
        end_run: args.end_run,
        windows: WindowTiming {
            signal_offset: args.signal_offset.unwrap_or(default_offset),
            signal_length: args.signal_length,
            background_gap: args.background_gap,
            background_length: args.background_length,
        },
        finder: FinderSettings {
            bin_width: args.bin_width,
            fine_bin_width: args.fine_bin_width,
            min_gap: args.min_gap,
        },
    })
}

pub fn tail_config_from_args(args: &TailArgs) -> Result<TailConfig, AppError> {
    if !(args.tail_bin_width.is_finite() && args.tail_bin_width > 0.0) {
        return Err(AppError::input("--tail-bin-width must be finite and > 0."));
    }
    if !(args.max_delay.is_finite() && args.max_delay >= args.tail_bin_width) {
        return Err(AppError::input("--max-delay must cover at least one tail bin."));
    }
    Ok(TailConfig {
        pulses: pulse_config_from_args(&args.pulses, TAIL_SIGNAL_OFFSET)?,
        bin_width: args.tail_bin_width,
        max_delay: args.max_delay,
    })
}

pub fn sim_config_from_args(args: &SimArgs) -> SimConfig {
    SimConfig {
        output_dir: args.output_dir.clone(),
        seed: args.seed,
        tau: args.tau,
        hold_times: args.hold_times.clone(),
        runs_per_hold: args.runs_per_hold,
        first_run: args.first_run,
        fill_mean: args.fill_mean,
        efficiency: args.efficiency,
        background_rate: args.background_rate,
        window: args.window,
        hits: args.hits,
    }
}

/// Rewrite argv so `ucnlife` defaults to `ucnlife lifetime`.
///
/// Rules:
/// - `ucnlife`                       -> `ucnlife lifetime`
/// - `ucnlife --campaign 2023 ...`   -> `ucnlife lifetime --campaign 2023 ...`
/// - `ucnlife --help/--version/-h`   -> unchanged (top-level help/version)
/// - `ucnlife -v lifetime`           -> unchanged (global flag before a subcommand)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    // Global -v/-q may come before the subcommand; only the first token
    // after them decides.
    let is_global = |s: &str| {
        matches!(s, "--verbose" | "--quiet")
            || s.strip_prefix('-')
                .is_some_and(|f| !f.is_empty() && f.chars().all(|c| c == 'v' || c == 'q'))
    };
    let first = argv.iter().skip(1).position(|a| !is_global(a)).map(|i| i + 1);
    let Some(first) = first else {
        argv.push("lifetime".to_string());
        return argv;
    };

    let token = argv[first].as_str();
    let is_help_or_version = matches!(token, "-h" | "--help" | "-V" | "--version" | "help");
    let is_subcommand = matches!(token, "lifetime" | "pulses" | "tail" | "simulate" | "view");
    if is_help_or_version || is_subcommand {
        return argv;
    }

    // Leading flags belong to `lifetime`.
    if token.starts_with('-') {
        argv.insert(first, "lifetime".to_string());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BackgroundModel, Campaign, ErrorScan, FillNormalization};

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn rewrite_defaults_to_lifetime() {
        assert_eq!(rewrite_args(argv(&["ucnlife"])), argv(&["ucnlife", "lifetime"]));
        assert_eq!(
            rewrite_args(argv(&["ucnlife", "--campaign", "2023"])),
            argv(&["ucnlife", "lifetime", "--campaign", "2023"])
        );
        assert_eq!(rewrite_args(argv(&["ucnlife", "--help"])), argv(&["ucnlife", "--help"]));
        assert_eq!(rewrite_args(argv(&["ucnlife", "-v", "tail"])), argv(&["ucnlife", "-v", "tail"]));
        assert_eq!(rewrite_args(argv(&["ucnlife", "simulate"])), argv(&["ucnlife", "simulate"]));
        assert_eq!(rewrite_args(argv(&["ucnlife", "-q"])), argv(&["ucnlife", "-q", "lifetime"]));
        assert_eq!(
            rewrite_args(argv(&["ucnlife", "-vv", "--campaign", "2023"])),
            argv(&["ucnlife", "-vv", "lifetime", "--campaign", "2023"])
        );
    }

    #[test]
    fn rewrite_ignores_subcommand_names_in_values() {
        assert_eq!(
            rewrite_args(argv(&["ucnlife", "--graph-dir", "tail"])),
            argv(&["ucnlife", "lifetime", "--graph-dir", "tail"])
        );
        let cli = crate::cli::Cli::parse_from(rewrite_args(argv(&["ucnlife", "--graph-dir", "view"])));
        match cli.command {
            Command::Lifetime(args) => assert_eq!(args.graph_dir, std::path::PathBuf::from("view")),
            _ => panic!("expected lifetime"),
        }
    }

    fn lifetime_args(extra: &[&str]) -> LifetimeArgs {
        let mut all = vec!["ucnlife", "lifetime"];
        all.extend_from_slice(extra);
        match crate::cli::Cli::parse_from(all).command {
            Command::Lifetime(args) => args,
            _ => panic!("expected lifetime"),
        }
    }

    #[test]
    fn campaign_preset_and_overrides() {
        let config = lifetime_config_from_args(&lifetime_args(&["--campaign", "2023"])).unwrap();
        assert_eq!(config.campaign, Campaign::Y2023);
        assert_eq!(config.method, Campaign::Y2023.method());

        let config =
            lifetime_config_from_args(&lifetime_args(&["--campaign", "2023", "--error-scan", "grid"])).unwrap();
        assert_eq!(config.method.background, BackgroundModel::RateScaled);
        assert_eq!(config.method.normalization, FillNormalization::PerRun);
        assert_eq!(config.method.error_scan, ErrorScan::Grid);
    }

    #[test]
    fn invalid_lifetime_args_are_input_errors() {
        let err = lifetime_config_from_args(&lifetime_args(&["--threshold-min", "20"])).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
        let err = lifetime_config_from_args(&lifetime_args(&["--tau-min", "0"])).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
    }

    #[test]
    fn tail_uses_its_own_offset() {
        let args = match crate::cli::Cli::parse_from(["ucnlife", "tail", "--start-run", "1", "--end-run", "3"]).command
        {
            Command::Tail(args) => args,
            _ => panic!("expected tail"),
        };
        let config = tail_config_from_args(&args).unwrap();
        assert_eq!(config.pulses.windows.signal_offset, TAIL_SIGNAL_OFFSET);
        assert_eq!(config.bin_width, 0.1);

        let pulses = pulse_config_from_args(&args.pulses, PULSE_SIGNAL_OFFSET).unwrap();
        assert_eq!(pulses.windows.signal_offset, PULSE_SIGNAL_OFFSET);
    }
}
