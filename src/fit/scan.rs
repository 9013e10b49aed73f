//! Lifetime vs PE threshold.
//!
//! Each `(segment, threshold)` pair is independent, so the fits run on the
//! rayon pool. Results are reassembled in segment/threshold order.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::aggregate::{AggregatedData, HoldBin};
use crate::domain::{HoldCount, LifetimeConfig, LifetimeFit, Segment, SegmentScan, ThresholdPoint};
use crate::fit::profiled::{FitOptions, fit_tau_profiled};

impl FitOptions {
    pub fn from_config(config: &LifetimeConfig) -> Self {
        Self {
            tau_start: config.tau_start,
            tau_min: config.tau_min,
            tau_max: config.tau_max,
            grid_steps: config.tau_grid_steps,
            error_scan: config.method.error_scan,
        }
    }
}

/// Bins of `segment` in hold-time order, warning about hold times without data.
fn segment_bins(data: &AggregatedData, segment: Segment) -> Vec<&HoldBin> {
    data.hold_times
        .iter()
        .filter_map(|&hold| {
            let bin = data.bin(hold, segment);
            if bin.is_none() {
                warn!(segment = %segment, hold_time = hold, "no data for hold time, skipping");
            }
            bin
        })
        .collect()
}

/// Normalized counts of `bins` above `threshold`.
pub fn threshold_counts(bins: &[&HoldBin], threshold: u32, config: &LifetimeConfig) -> Vec<HoldCount> {
    let window_ratio = config.signal_window / config.background_window;
    bins.iter()
        .map(|bin| HoldCount {
            hold_time: bin.hold_time,
            count: bin.normalized_count(threshold as f64, &config.method, window_ratio),
        })
        .collect()
}

/// Fit one threshold's counts; fewer than two hold times gives no fit.
pub fn fit_counts(counts: &[HoldCount], options: &FitOptions) -> Option<LifetimeFit> {
    if counts.len() < 2 {
        return None;
    }
    let ts: Vec<f64> = counts.iter().map(|c| c.hold_time as f64).collect();
    let ys: Vec<f64> = counts.iter().map(|c| c.count).collect();
    match fit_tau_profiled(&ys, &ts, options) {
        Ok(fit) => Some(fit),
        Err(err) => {
            debug!(error = %err, "lifetime fit failed");
            None
        }
    }
}

/// Run the threshold scan for every configured segment.
pub fn scan_thresholds(data: &AggregatedData, config: &LifetimeConfig) -> Vec<SegmentScan> {
    let options = FitOptions::from_config(config);
    let thresholds = config.thresholds();

    let per_segment: Vec<(Segment, Vec<&HoldBin>)> = config
        .segments
        .iter()
        .map(|&segment| (segment, segment_bins(data, segment)))
        .collect();

    let jobs: Vec<(usize, u32)> = (0..per_segment.len())
        .flat_map(|s| thresholds.iter().map(move |&thr| (s, thr)))
        .collect();

    let points: Vec<(usize, ThresholdPoint)> = jobs
        .par_iter()
        .map(|&(s, threshold)| {
            let counts = threshold_counts(&per_segment[s].1, threshold, config);
            let fit = fit_counts(&counts, &options);
            (
                s,
                ThresholdPoint {
                    threshold,
                    counts,
                    fit,
                },
            )
        })
        .collect();

    let mut scans: Vec<SegmentScan> = per_segment
        .iter()
        .map(|(segment, _)| SegmentScan {
            segment: *segment,
            points: Vec::with_capacity(thresholds.len()),
        })
        .collect();
    // `par_iter().collect()` keeps job order.
    for (s, point) in points {
        scans[s].points.push(point);
    }
    scans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Campaign, EventClass, PulseRecord, RunInfo};
    use crate::io::pulses::PulseFile;

    fn config(segments: Vec<Segment>) -> LifetimeConfig {
        LifetimeConfig {
            runinfo_path: "runinfo.csv".into(),
            analysis_dir: ".".into(),
            graph_dir: ".".into(),
            good_runs_path: "runlist.txt".into(),
            campaign: Campaign::Y2022,
            method: Campaign::Y2022.method(),
            threshold_min: 5,
            threshold_max: 7,
            segments,
            signal_window: 60.0,
            background_window: 60.0,
            tau_start: 800.0,
            tau_min: 1.0,
            tau_max: 1e6,
            tau_grid_steps: 241,
            plot: false,
            export_csv: None,
            export_json: None,
        }
    }

    fn add(data: &mut AggregatedData, run: u32, hold: u32, n_signal: usize) {
        add_windows(data, run, hold, 1.0, n_signal, 0);
    }

    fn add_windows(data: &mut AggregatedData, run: u32, hold: u32, fill: f64, n_signal: usize, n_background: usize) {
        let pulse = |event| PulseRecord {
            segment: Segment::S12,
            time: 0.0,
            pe: 20.0,
            event,
        };
        let records = std::iter::repeat_n(pulse(EventClass::Signal), n_signal)
            .chain(std::iter::repeat_n(pulse(EventClass::Background), n_background))
            .collect();
        data.add_run(
            &RunInfo {
                run,
                hold_time: hold,
                fills: [fill; 4],
            },
            &PulseFile {
                records,
                ..Default::default()
            },
        );
    }

    #[test]
    fn scan_fits_each_threshold_in_order() {
        let holds = [20u32, 100, 200, 500];
        let mut data = AggregatedData::new(holds.to_vec());
        for (i, &h) in holds.iter().enumerate() {
            let n = (10_000.0 * (-(h as f64) / 800.0).exp()).round() as usize;
            add(&mut data, i as u32 + 1, h, n);
        }
        let cfg = config(vec![Segment::S12]);
        let scans = scan_thresholds(&data, &cfg);
        assert_eq!(scans.len(), 1);
        let thresholds: Vec<u32> = scans[0].points.iter().map(|p| p.threshold).collect();
        assert_eq!(thresholds, vec![5, 6, 7]);
        for point in &scans[0].points {
            assert_eq!(point.counts.len(), 4);
            let fit = point.fit.unwrap();
            assert!((fit.tau - 800.0).abs() < 5.0, "tau={}", fit.tau);
            assert!(fit.dtau.is_some());
        }
    }

    #[test]
    fn missing_bins_are_skipped_and_single_points_do_not_fit() {
        let mut data = AggregatedData::new(vec![20, 100]);
        add(&mut data, 1, 20, 50);
        let scans = scan_thresholds(&data, &config(vec![Segment::S12, Segment::S34]));
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].points[0].counts.len(), 1);
        assert!(scans[0].points.iter().all(|p| p.fit.is_none()));
        assert_eq!(scans[1].segment, Segment::S34);
        assert!(scans[1].points.iter().all(|p| p.counts.is_empty() && p.fit.is_none()));
    }

    #[test]
    fn counts_above_highest_threshold_are_empty() {
        let mut data = AggregatedData::new(vec![20, 100]);
        add(&mut data, 1, 20, 5);
        add(&mut data, 2, 100, 3);
        let mut cfg = config(vec![Segment::S12]);
        cfg.threshold_min = 25;
        cfg.threshold_max = 25;
        let scans = scan_thresholds(&data, &cfg);
        let point = &scans[0].points[0];
        assert!(point.counts.iter().all(|c| c.count == 0.0));
        assert!(point.fit.is_none());
    }

    #[test]
    fn background_above_signal_keeps_negative_count() {
        let mut data = AggregatedData::new(vec![20, 100, 200, 500]);
        add_windows(&mut data, 1, 20, 1.0, 1000, 10);
        add_windows(&mut data, 2, 100, 1.0, 880, 10);
        add_windows(&mut data, 3, 200, 1.0, 780, 10);
        add_windows(&mut data, 4, 500, 1.0, 8, 12);
        let mut cfg = config(vec![Segment::S12]);
        cfg.threshold_max = 5;
        let scans = scan_thresholds(&data, &cfg);
        let point = &scans[0].points[0];
        assert_eq!(point.counts[3].count, -4.0);
        assert_eq!(point.counts[0].count, 990.0);
        let fit = point.fit.expect("negative bin still fits");
        assert!(fit.tau.is_finite() && fit.chi2.is_finite());
    }

    #[test]
    fn rate_scaled_per_run_counts_use_window_ratio() {
        let mut data = AggregatedData::new(vec![20, 100]);
        add_windows(&mut data, 1, 20, 10.0, 4, 2);
        add_windows(&mut data, 2, 20, 20.0, 2, 2);
        add_windows(&mut data, 3, 100, 10.0, 3, 4);
        let mut cfg = config(vec![Segment::S12]);
        cfg.campaign = Campaign::Y2023;
        cfg.method = Campaign::Y2023.method();
        cfg.background_window = 120.0;
        cfg.threshold_max = 5;
        let scans = scan_thresholds(&data, &cfg);
        let counts = &scans[0].points[0].counts;
        // mean((4 - 2*0.5)/10, (2 - 2*0.5)/20)
        assert!((counts[0].count - 0.175).abs() < 1e-12, "{}", counts[0].count);
        // (3 - 4*0.5)/10
        assert!((counts[1].count - 0.1).abs() < 1e-12, "{}", counts[1].count);
    }
}
