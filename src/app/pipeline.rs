//! Shared lifetime pipeline used by both the CLI and the viewer.
//!
//! read -> aggregate -> threshold scan -> (plots, exports)
//!
//! The viewer keeps the aggregated data and only re-runs the scan when the
//! campaign changes.

use std::path::PathBuf;

use tracing::info;

use crate::aggregate::{AggregatedData, collect_bins};
use crate::domain::{LifetimeConfig, LifetimeExport, SegmentScan};
use crate::error::AppError;
use crate::fit::scan_thresholds;
use crate::io::runinfo::load_runinfo;
use crate::io::runlist::load_good_runs;
use crate::io::{write_lifetime_csv, write_lifetime_json};
use crate::plot::{write_lifetime_svg, write_pe_dist_svg};
use crate::pulse::ensure_dir;

/// Name recorded in JSON exports.
pub const TOOL_NAME: &str = "ucnlife";

/// All computed outputs of one `ucnlife lifetime` run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub data: AggregatedData,
    pub scans: Vec<SegmentScan>,
}

/// Read the runinfo table and good-run list, then aggregate pulse files.
pub fn load_data(config: &LifetimeConfig) -> Result<AggregatedData, AppError> {
    let table = load_runinfo(&config.runinfo_path)?;
    let good = load_good_runs(&config.good_runs_path)?;
    info!(
        runs = table.runs.len(),
        good_runs = good.len(),
        hold_times = table.hold_times().len(),
        "inputs loaded"
    );
    collect_bins(&table, &good, &config.analysis_dir)
}

/// Execute the full pipeline.
pub fn run_lifetime(config: &LifetimeConfig) -> Result<RunOutput, AppError> {
    let data = load_data(config)?;
    run_lifetime_with_data(config, data)
}

/// Scan thresholds on already aggregated data.
pub fn run_lifetime_with_data(config: &LifetimeConfig, data: AggregatedData) -> Result<RunOutput, AppError> {
    let scans = scan_thresholds(&data, config);
    let fitted: usize = scans
        .iter()
        .map(|s| s.points.iter().filter(|p| p.fit.is_some()).count())
        .sum();
    info!(
        campaign = config.campaign.display_name(),
        segments = scans.len(),
        fitted,
        "threshold scan finished"
    );
    if fitted == 0 {
        return Err(AppError::no_data(
            "No threshold produced a lifetime fit (need at least two hold times with data).",
        ));
    }
    Ok(RunOutput { data, scans })
}

/// Portable JSON form of a run.
pub fn build_export(config: &LifetimeConfig, run: &RunOutput) -> LifetimeExport {
    LifetimeExport {
        tool: TOOL_NAME.to_string(),
        generated_at: chrono::Utc::now(),
        campaign: config.campaign,
        method: config.method,
        signal_window: config.signal_window,
        background_window: config.background_window,
        hold_times: run.data.hold_times.clone(),
        runs_used: run.data.summary.runs_used.clone(),
        scans: run.scans.clone(),
    }
}

/// Chart title naming the campaign and method.
pub fn chart_title(config: &LifetimeConfig) -> String {
    format!(
        "Lifetime vs PE threshold ({}, {:?} background, {:?} fill)",
        config.campaign.display_name(),
        config.method.background,
        config.method.normalization
    )
}

/// Write plots and exports requested by `config`; returns the written paths.
pub fn write_outputs(config: &LifetimeConfig, run: &RunOutput) -> Result<Vec<PathBuf>, AppError> {
    let mut written = Vec::new();

    if config.plot {
        ensure_dir(&config.graph_dir)?;
        let pe_path = config.graph_dir.join("pe_dist.svg");
        write_pe_dist_svg(&pe_path, &run.data)?;
        written.push(pe_path);

        let lifetime_path = config.graph_dir.join("lifetime_vs_threshold.svg");
        write_lifetime_svg(&lifetime_path, &run.scans, &chart_title(config))?;
        written.push(lifetime_path);
    }

    if let Some(path) = &config.export_csv {
        write_lifetime_csv(path, &run.scans)?;
        written.push(path.clone());
    }
    if let Some(path) = &config.export_json {
        write_lifetime_json(path, &build_export(config, run))?;
        written.push(path.clone());
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Campaign, Segment, SimConfig};
    use crate::io::read_lifetime_json;

    fn simulate_into(dir: &std::path::Path, tau: f64) -> crate::sim::SimSummary {
        crate::sim::simulate(&SimConfig {
            output_dir: dir.to_path_buf(),
            seed: 11,
            tau,
            hold_times: vec![20, 100, 200, 500, 1000, 1500],
            runs_per_hold: 3,
            first_run: 500,
            fill_mean: 20_000.0,
            efficiency: 0.5,
            background_rate: 0.2,
            window: 60.0,
            hits: false,
        })
        .unwrap()
    }

    fn config_for(sim: &crate::sim::SimSummary, graph_dir: PathBuf, campaign: Campaign) -> LifetimeConfig {
        LifetimeConfig {
            runinfo_path: sim.runinfo_path.clone(),
            analysis_dir: sim.analysis_dir.clone(),
            graph_dir,
            good_runs_path: sim.runlist_path.clone(),
            campaign,
            method: campaign.method(),
            threshold_min: 5,
            threshold_max: 10,
            segments: Segment::ALL.to_vec(),
            signal_window: 60.0,
            background_window: 60.0,
            tau_start: 800.0,
            tau_min: 1.0,
            tau_max: 1e6,
            tau_grid_steps: 241,
            plot: true,
            export_csv: None,
            export_json: None,
        }
    }

    #[test]
    fn recovers_simulated_lifetime() {
        let dir = tempfile::tempdir().unwrap();
        let sim = simulate_into(dir.path(), 880.0);

        for campaign in [Campaign::Y2022, Campaign::Y2023] {
            let config = config_for(&sim, dir.path().join("graphs"), campaign);
            let run = run_lifetime(&config).unwrap();
            assert_eq!(run.data.summary.runs_used.len(), 18);
            assert_eq!(run.scans.len(), 4);

            for scan in &run.scans {
                // Threshold 5 keeps nearly every neutron pulse.
                let fit = scan.points[0].fit.expect("threshold 5 fits");
                assert_eq!(fit.n_points, 6);
                assert!((fit.tau - 880.0).abs() < 60.0, "{campaign:?} {} tau={}", scan.segment, fit.tau);
                // Weights are 1/y on fill-normalized counts, so the band is wide.
                assert!(fit.dtau.is_some_and(|d| d > 0.0));
            }
        }
    }

    #[test]
    fn writes_plots_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let sim = simulate_into(dir.path(), 700.0);
        let mut config = config_for(&sim, dir.path().join("graphs"), Campaign::Y2022);
        config.segments = vec![Segment::S56];
        config.export_csv = Some(dir.path().join("lifetimes.csv"));
        config.export_json = Some(dir.path().join("lifetimes.json"));

        let run = run_lifetime(&config).unwrap();
        let written = write_outputs(&config, &run).unwrap();
        assert_eq!(written.len(), 4);
        assert!(dir.path().join("graphs/pe_dist.svg").exists());
        assert!(dir.path().join("graphs/lifetime_vs_threshold.svg").exists());

        let export = read_lifetime_json(&dir.path().join("lifetimes.json")).unwrap();
        assert_eq!(export.tool, TOOL_NAME);
        assert_eq!(export.hold_times, vec![20, 100, 200, 500, 1000, 1500]);
        assert_eq!(export.scans.len(), 1);
        assert_eq!(export.scans[0].segment, Segment::S56);
        assert_eq!(export.scans[0].points.len(), run.scans[0].points.len());

        let csv = std::fs::read_to_string(dir.path().join("lifetimes.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1 + 6);
    }

    #[test]
    fn missing_pulse_files_are_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let sim = simulate_into(dir.path(), 880.0);
        let mut config = config_for(&sim, dir.path().join("graphs"), Campaign::Y2022);
        config.analysis_dir = dir.path().join("nowhere");
        let err = run_lifetime(&config).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_NO_DATA);
    }
}
