//! SVG charts rendered with Plotters.

use std::error::Error;
use std::path::Path;

use plotters::prelude::*;

use crate::aggregate::{AggregatedData, PE_HIST_BINS};
use crate::domain::{Segment, SegmentScan};
use crate::error::AppError;
use crate::plot::{fitted_runs, lifetime_bounds, threshold_bounds};
use crate::tail::TailHistogram;

type DrawResult = Result<(), Box<dyn Error>>;

/// Series colour for a segment, shared by every chart.
pub fn segment_color(segment: Segment) -> RGBColor {
    match segment {
        Segment::S12 => RED,
        Segment::S34 => BLUE,
        Segment::S56 => RGBColor(0, 160, 0),
        Segment::S78 => MAGENTA,
    }
}

fn render_error(path: &Path, err: Box<dyn Error>) -> AppError {
    AppError::runtime(format!("Failed to render '{}': {err}", path.display()))
}

/// Step outline of a unit-width histogram, with counts clamped to `floor`.
fn step_points(hist: &[u64], floor: f64) -> Vec<(f64, f64)> {
    let mut pts = Vec::with_capacity(2 * hist.len());
    for (i, &c) in hist.iter().enumerate() {
        let y = (c as f64).max(floor);
        pts.push((i as f64, y));
        pts.push((i as f64 + 1.0, y));
    }
    pts
}

/// `pe_dist.svg`: PE distribution per hold time, linear and log panels.
pub fn write_pe_dist_svg(path: &Path, data: &AggregatedData) -> Result<(), AppError> {
    draw_pe_dist(path, data).map_err(|e| render_error(path, e))
}

fn draw_pe_dist(path: &Path, data: &AggregatedData) -> DrawResult {
    let hists: Vec<(u32, Vec<u64>)> = data
        .hold_times
        .iter()
        .filter_map(|&h| data.pe_histogram(h).map(|hist| (h, hist)))
        .collect();
    let y_max = hists.iter().flat_map(|(_, h)| h.iter()).copied().max().unwrap_or(1).max(1) as f64;
    let x_max = PE_HIST_BINS as f64;

    let root = SVGBackend::new(path, (1400, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let (left, right) = root.split_horizontally(700);

    let mut linear = ChartBuilder::on(&left)
        .caption("PE distribution", ("sans-serif", 20))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..x_max, 0.0..y_max * 1.1)?;
    linear.configure_mesh().x_desc("PE").y_desc("Pulses").draw()?;

    for (idx, (hold, hist)) in hists.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        linear
            .draw_series(LineSeries::new(step_points(hist, 0.0), color))?
            .label(format!("{hold} s"))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    linear
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    let mut log = ChartBuilder::on(&right)
        .caption("PE distribution (log)", ("sans-serif", 20))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..x_max, (0.5..y_max * 2.0).log_scale())?;
    log.configure_mesh().x_desc("PE").y_desc("Pulses").draw()?;
    for (idx, (_, hist)) in hists.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        log.draw_series(LineSeries::new(step_points(hist, 0.5), color))?;
    }

    root.present()?;
    Ok(())
}

/// `lifetime_vs_threshold.svg`: τ vs PE threshold with Δχ² = 1 error bars.
pub fn write_lifetime_svg(path: &Path, scans: &[SegmentScan], title: &str) -> Result<(), AppError> {
    draw_lifetime(path, scans, title).map_err(|e| render_error(path, e))
}

fn draw_lifetime(path: &Path, scans: &[SegmentScan], title: &str) -> DrawResult {
    let (x0, x1) = threshold_bounds(scans);
    let (y0, y1) = lifetime_bounds(scans).unwrap_or((0.0, 1000.0));

    let root = SVGBackend::new(path, (900, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x0..x1, y0..y1)?;
    chart
        .configure_mesh()
        .x_desc("PE threshold")
        .y_desc("Lifetime (s)")
        .draw()?;

    let n = scans.len().max(1) as f64;
    for (idx, scan) in scans.iter().enumerate() {
        let color = segment_color(scan.segment);
        // Small horizontal offset per segment keeps error bars apart.
        let dx = (idx as f64 - (n - 1.0) / 2.0) * 0.08;
        let runs = fitted_runs(scan);

        for (r, run) in runs.iter().enumerate() {
            let line = chart.draw_series(LineSeries::new(run.iter().map(|&(t, tau, _)| (t + dx, tau)), color))?;
            if r == 0 {
                line.label(format!("Segment {}", scan.segment))
                    .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
            }
            chart.draw_series(run.iter().map(|&(t, tau, dtau)| {
                let d = dtau.unwrap_or(0.0);
                ErrorBar::new_vertical(t + dx, tau - d, tau, tau + d, color.filled(), 6)
            }))?;
        }
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Summed tail response of every segment.
pub fn write_tail_svg(path: &Path, tail: &TailHistogram) -> Result<(), AppError> {
    draw_tail(path, tail).map_err(|e| render_error(path, e))
}

fn draw_tail(path: &Path, tail: &TailHistogram) -> DrawResult {
    let y_max = tail
        .segments
        .iter()
        .flat_map(|s| s.iter())
        .copied()
        .fold(1.0_f64, f64::max);

    let root = SVGBackend::new(path, (1000, 700)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Summed Tail Response", ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..tail.max_delay().max(tail.bin_width), 0.0..y_max * 1.1)?;
    chart
        .configure_mesh()
        .x_desc("Time after pulse (us)")
        .y_desc("Counts")
        .draw()?;

    for segment in Segment::ALL {
        let color = segment_color(segment);
        let bins = tail.segment(segment);
        let pts = bins.iter().enumerate().flat_map(|(i, &c)| {
            let x = i as f64 * tail.bin_width;
            [(x, c), (x + tail.bin_width, c)]
        });
        chart
            .draw_series(LineSeries::new(pts, color.stroke_width(2)))?
            .label(format!("Segment {segment}"))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LifetimeFit, ThresholdPoint};

    #[test]
    fn step_points_outline_bins() {
        let pts = step_points(&[0, 3], 0.5);
        assert_eq!(pts, vec![(0.0, 0.5), (1.0, 0.5), (1.0, 3.0), (2.0, 3.0)]);
    }

    #[test]
    fn lifetime_svg_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lifetime_vs_threshold.svg");
        let scans = vec![SegmentScan {
            segment: Segment::S12,
            points: (5..8)
                .map(|t| ThresholdPoint {
                    threshold: t,
                    counts: Vec::new(),
                    fit: Some(LifetimeFit {
                        tau: 800.0 + t as f64,
                        dtau: Some(20.0),
                        amplitude: 1.0,
                        chi2: 1.0,
                        n_points: 4,
                    }),
                })
                .collect(),
        }];
        write_lifetime_svg(&path, &scans, "Lifetime vs threshold").unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("<svg"));
    }

    #[test]
    fn tail_svg_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.svg");
        let mut tail = TailHistogram::new(0.1, 75.0);
        tail.segments[0][3] = 5.0;
        write_tail_svg(&path, &tail).unwrap();
        assert!(path.exists());
    }
}
