//! Chart output.
//!
//! - `svg`: Plotters SVG files (`pe_dist.svg`, `lifetime_vs_threshold.svg`,
//!   summed tail response)
//!
//! The series preparation below is shared with the terminal viewer.

pub mod svg;

pub use svg::*;

use crate::domain::SegmentScan;

/// `(threshold, τ, dτ)` of one fitted point.
pub type LifetimePoint = (f64, f64, Option<f64>);

/// Fitted points of a scan split at thresholds without a fit, so that a
/// missing fit shows as a gap in the line.
pub fn fitted_runs(scan: &SegmentScan) -> Vec<Vec<LifetimePoint>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for point in &scan.points {
        match point.fit {
            Some(fit) if fit.tau.is_finite() => current.push((point.threshold as f64, fit.tau, fit.dtau)),
            _ => {
                if !current.is_empty() {
                    runs.push(std::mem::take(&mut current));
                }
            }
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Y range covering every `τ ± dτ`, padded by 5%. `None` without any fit.
pub fn lifetime_bounds(scans: &[SegmentScan]) -> Option<(f64, f64)> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for run in scans.iter().flat_map(fitted_runs) {
        for (_, tau, dtau) in run {
            let d = dtau.filter(|d| d.is_finite()).unwrap_or(0.0);
            lo = lo.min(tau - d);
            hi = hi.max(tau + d);
        }
    }
    if !(lo.is_finite() && hi.is_finite()) {
        return None;
    }
    let pad = ((hi - lo) * 0.05).max(1.0);
    Some((lo - pad, hi + pad))
}

/// Threshold range of the scans, padded by one on each side.
pub fn threshold_bounds(scans: &[SegmentScan]) -> (f64, f64) {
    let thresholds = scans.iter().flat_map(|s| s.points.iter().map(|p| p.threshold as f64));
    let (lo, hi) = thresholds.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| (lo.min(t), hi.max(t)));
    if lo.is_finite() { (lo - 1.0, hi + 1.0) } else { (0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LifetimeFit, Segment, ThresholdPoint};

    fn point(threshold: u32, tau: Option<f64>) -> ThresholdPoint {
        ThresholdPoint {
            threshold,
            counts: Vec::new(),
            fit: tau.map(|tau| LifetimeFit {
                tau,
                dtau: Some(10.0),
                amplitude: 1.0,
                chi2: 0.5,
                n_points: 3,
            }),
        }
    }

    #[test]
    fn missing_fits_split_runs() {
        let scan = SegmentScan {
            segment: Segment::S12,
            points: vec![
                point(5, Some(800.0)),
                point(6, Some(810.0)),
                point(7, None),
                point(8, Some(790.0)),
            ],
        };
        let runs = fitted_runs(&scan);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].len(), 2);
        assert_eq!(runs[1][0].0, 8.0);
    }

    #[test]
    fn bounds_cover_error_bars() {
        let scans = vec![SegmentScan {
            segment: Segment::S34,
            points: vec![point(5, Some(800.0)), point(19, Some(900.0))],
        }];
        let (lo, hi) = lifetime_bounds(&scans).unwrap();
        assert!(lo < 790.0 && hi > 910.0);
        assert_eq!(threshold_bounds(&scans), (4.0, 20.0));

        let empty = vec![SegmentScan {
            segment: Segment::S34,
            points: vec![point(5, None)],
        }];
        assert!(lifetime_bounds(&empty).is_none());
    }
}
