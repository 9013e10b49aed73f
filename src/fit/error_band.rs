//! Δχ² = 1 uncertainty on the fitted lifetime.

use crate::fit::tau_grid::lin_space;

/// Points in the fixed grid scan.
pub const BAND_GRID_POINTS: usize = 2001;
/// Minimum half-width of the scanned window, in seconds.
pub const MIN_BAND_SPAN: f64 = 50.0;
/// Half-width of the scanned window relative to τ.
pub const BAND_SPAN_FRACTION: f64 = 0.15;

const BISECT_MAX_ITER: usize = 200;

fn band_span(tau: f64) -> f64 {
    MIN_BAND_SPAN.max(BAND_SPAN_FRACTION * tau)
}

/// Scan a fixed window around `tau` and report half the width of the region
/// where `χ² < min(scan) + 1`.
///
/// The window is `[max(tau_min, τ - span), τ + span]` with
/// `span = max(50, 0.15 τ)`. Returns `None` when no scanned value is finite.
pub fn grid_band<F: Fn(f64) -> f64>(chi2: F, tau: f64, tau_min: f64) -> Option<f64> {
    let span = band_span(tau);
    let taus = lin_space((tau - span).max(tau_min), tau + span, BAND_GRID_POINTS);
    let values: Vec<f64> = taus.iter().map(|&t| chi2(t)).collect();

    let min = values.iter().copied().filter(|v| v.is_finite()).reduce(f64::min)?;
    let threshold = min + 1.0;
    let left = taus.iter().zip(&values).find(|(_, v)| **v < threshold).map(|(t, _)| *t)?;
    let right = taus.iter().zip(&values).rev().find(|(_, v)| **v < threshold).map(|(t, _)| *t)?;
    Some(0.5 * (right - left))
}

/// Bracket each side of `tau` by stepping outward, then bisect the
/// `χ²min + 1` crossing. A side that never crosses before its bound uses the
/// bound itself.
///
/// Returns `None` when `chi2_min` is not finite.
pub fn bisect_band<F: Fn(f64) -> f64>(chi2: F, tau: f64, chi2_min: f64, tau_min: f64, tau_max: f64) -> Option<f64> {
    if !chi2_min.is_finite() {
        return None;
    }
    let target = chi2_min + 1.0;
    let right = crossing(&chi2, tau, target, tau_max);
    let left = crossing(&chi2, tau, target, tau_min);
    Some(0.5 * (right - left))
}

/// Crossing of `target` between `tau` and `bound` (on either side).
fn crossing<F: Fn(f64) -> f64>(chi2: &F, tau: f64, target: f64, bound: f64) -> f64 {
    let direction = if bound >= tau { 1.0 } else { -1.0 };
    let limit = |x: f64| if direction > 0.0 { x.min(bound) } else { x.max(bound) };

    let mut step = band_span(tau);
    let mut inside = tau;
    let mut outside = limit(tau + direction * step);
    while chi2(outside) < target {
        if outside == bound {
            return bound;
        }
        inside = outside;
        step *= 2.0;
        outside = limit(tau + direction * step);
    }

    for _ in 0..BISECT_MAX_ITER {
        if (outside - inside).abs() <= 1e-9 * tau.abs().max(1.0) {
            break;
        }
        let mid = 0.5 * (inside + outside);
        if chi2(mid) < target {
            inside = mid;
        } else {
            outside = mid;
        }
    }
    0.5 * (inside + outside)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parabola(center: f64, sigma: f64) -> impl Fn(f64) -> f64 {
        move |t| ((t - center) / sigma).powi(2)
    }

    #[test]
    fn grid_band_on_parabola() {
        let d = grid_band(parabola(800.0, 10.0), 800.0, 1.0).unwrap();
        // Grid spacing is 240/2000 = 0.12 s.
        assert!((d - 10.0).abs() < 0.15, "d={d}");
    }

    #[test]
    fn bisect_band_on_parabola() {
        let d = bisect_band(parabola(800.0, 10.0), 800.0, 0.0, 1.0, 1e6).unwrap();
        assert!((d - 10.0).abs() < 1e-6, "d={d}");
    }

    #[test]
    fn bisect_uses_bound_when_never_crossing() {
        // Flat to the left: left edge is the lower bound.
        let f = |t: f64| if t < 100.0 { 0.0 } else { ((t - 100.0) / 5.0).powi(2) };
        let d = bisect_band(f, 100.0, 0.0, 1.0, 1e6).unwrap();
        assert!((d - 0.5 * (105.0 - 1.0)).abs() < 1e-6, "d={d}");
    }

    #[test]
    fn bands_are_absent_without_finite_chi2() {
        assert!(grid_band(|_| f64::INFINITY, 800.0, 1.0).is_none());
        assert!(bisect_band(parabola(800.0, 10.0), 800.0, f64::NAN, 1.0, 1e6).is_none());
    }
}
