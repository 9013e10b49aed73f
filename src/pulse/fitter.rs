//! Multi-pulse fit of one window histogram.
//!
//! Candidate pulses are seeded from rising edges of the histogram, then the
//! amplitudes and bin offsets of all candidates are fitted together by a
//! bounded simplex on the Poisson likelihood. Pulses that end up below
//! [`MIN_PULSE_PE`] are dropped and the survivors refitted.

use nalgebra::DVector;
use tracing::trace;

use crate::math::{SimplexOptions, nelder_mead_bounded};
use crate::models::ShiftedResponse;
use crate::pulse::likelihood::neg_log_likelihood;

/// Smallest accepted pulse amplitude (PE).
pub const MIN_PULSE_PE: f64 = 5.0;
/// Amplitude of the default seed at the window start.
pub const DEFAULT_SEED_PE: f64 = 20.0;
pub const PE_LOWER: f64 = 1.0;
pub const PE_UPPER: f64 = 300.0;
/// Leading bins excluded from peak detection.
pub const PEAK_IGNORE_BINS: usize = 3;
/// Peak threshold in units of the RMS gradient.
pub const PEAK_THRESHOLD: f64 = 2.0;
/// Bins summed from a peak to estimate its amplitude.
pub const SEED_SUM_BINS: usize = 5;

/// Fitted pulse, offset in bins from the window start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FittedPulse {
    pub pe: f64,
    pub offset: f64,
}

/// Indices (into the gradient, i.e. shifted by `ignore`) where the central
/// difference exceeds `factor` times its RMS.
pub fn gradient_peaks(hist: &[u32], factor: f64, ignore: usize) -> Vec<usize> {
    if hist.len() <= ignore + 2 {
        return Vec::new();
    }
    let mut grad = vec![0.0; hist.len() - ignore];
    for i in ignore.max(1)..hist.len() - 1 {
        grad[i - ignore] = (hist[i + 1] as f64 - hist[i - 1] as f64) / 2.0;
    }
    let rms = (grad.iter().map(|g| g * g).sum::<f64>() / grad.len() as f64).sqrt();
    let threshold = factor * rms;
    (1..grad.len() - 1).filter(|&i| grad[i] > threshold).collect()
}

/// Starting `(pe, offset)` for every candidate pulse.
pub fn seed_pulses(hist: &[u32]) -> Vec<FittedPulse> {
    let mut seeds = vec![FittedPulse {
        pe: DEFAULT_SEED_PE,
        offset: 0.0,
    }];
    for peak in gradient_peaks(hist, PEAK_THRESHOLD, PEAK_IGNORE_BINS) {
        let idx = peak + PEAK_IGNORE_BINS;
        let end = (idx + SEED_SUM_BINS).min(hist.len());
        let sum: u32 = hist[idx..end].iter().sum();
        if sum as f64 >= MIN_PULSE_PE {
            seeds.push(FittedPulse {
                pe: sum as f64,
                offset: idx as f64,
            });
        }
    }
    seeds
}

fn fit_candidates(hist: &[u32], response: &ShiftedResponse, seeds: &[FittedPulse]) -> Vec<FittedPulse> {
    let n = seeds.len();
    let max_offset = hist.len().saturating_sub(1) as f64;
    let x0 = DVector::from_iterator(2 * n, seeds.iter().map(|s| s.pe).chain(seeds.iter().map(|s| s.offset)));
    let lower = DVector::from_iterator(2 * n, (0..2 * n).map(|i| if i < n { PE_LOWER } else { 0.0 }));
    let upper = DVector::from_iterator(2 * n, (0..2 * n).map(|i| if i < n { PE_UPPER } else { max_offset }));

    let result = nelder_mead_bounded(
        |x| neg_log_likelihood(x, hist, response, n),
        &x0,
        &lower,
        &upper,
        SimplexOptions::default(),
    );
    trace!(pulses = n, nll = result.value, evals = result.evals, "window fit");
    (0..n)
        .map(|i| FittedPulse {
            pe: result.x[i],
            offset: result.x[n + i],
        })
        .collect()
}

/// Fit the pulses of one window.
///
/// `None` when no pulse reaches [`MIN_PULSE_PE`] (window rejected).
pub fn fit_window(hist: &[u32], response: &ShiftedResponse) -> Option<Vec<FittedPulse>> {
    let seeds: Vec<FittedPulse> = seed_pulses(hist).into_iter().filter(|s| s.pe >= MIN_PULSE_PE).collect();
    if seeds.is_empty() {
        return None;
    }

    let fitted = fit_candidates(hist, response, &seeds);
    let kept: Vec<FittedPulse> = fitted.iter().copied().filter(|p| p.pe >= MIN_PULSE_PE).collect();
    if kept.is_empty() {
        return None;
    }
    if kept.len() < fitted.len() {
        return Some(fit_candidates(hist, response, &kept));
    }
    Some(kept)
}
