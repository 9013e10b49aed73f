//! Profiled χ² fit of `y = A exp(-t/τ)`.
//!
//! For a trial `τ` the amplitude has a closed form,
//!
//! ```text
//! m_i = exp(-t_i/τ),   Â(τ) = Σ w y m / Σ w m²,   χ²(τ) = Σ w (y - Â m)²
//! ```
//!
//! with Poisson-like weights `w_i = 1 / max(y_i, 1e-9)`. The search is
//! therefore one-dimensional:
//!
//! 1. evaluate a log-spaced τ grid over `[tau_min, tau_max]`, plus the
//!    configured start value and a log-linear least-squares seed
//! 2. refine around the best grid point by golden-section search
//! 3. locate the Δχ² = 1 band with the configured [`ErrorScan`]

use crate::domain::{ErrorScan, LifetimeFit};
use crate::error::AppError;
use crate::fit::error_band::{bisect_band, grid_band};
use crate::fit::tau_grid::log_space;
use crate::math::{golden_section, log_linear_tau};
use crate::models::{decay_factor, predict};

/// Floor on counts when forming weights, so empty bins keep a finite weight.
pub const MIN_COUNT_VARIANCE: f64 = 1e-9;

/// Options for the lifetime search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub tau_start: f64,
    pub tau_min: f64,
    pub tau_max: f64,
    pub grid_steps: usize,
    pub error_scan: ErrorScan,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            tau_start: 800.0,
            tau_min: 1.0,
            tau_max: 1e6,
            grid_steps: 241,
            error_scan: ErrorScan::Grid,
        }
    }
}

/// Data prepared for repeated χ² evaluation.
#[derive(Debug, Clone)]
pub struct ProfiledChi2 {
    ts: Vec<f64>,
    ys: Vec<f64>,
    weights: Vec<f64>,
}

impl ProfiledChi2 {
    pub fn new(counts: &[f64], ts: &[f64]) -> Result<Self, AppError> {
        if counts.len() != ts.len() {
            return Err(AppError::input(format!(
                "Count/time length mismatch: {} counts vs {} hold times.",
                counts.len(),
                ts.len()
            )));
        }
        let weights = counts.iter().map(|&y| 1.0 / y.max(MIN_COUNT_VARIANCE)).collect();
        Ok(Self {
            ts: ts.to_vec(),
            ys: counts.to_vec(),
            weights,
        })
    }

    pub fn len(&self) -> usize {
        self.ts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ts.is_empty()
    }

    /// `(χ², Â)` at `tau`; `(∞, None)` when `τ ≤ 0` or the amplitude is
    /// undetermined.
    pub fn eval(&self, tau: f64) -> (f64, Option<f64>) {
        if !(tau > 0.0) {
            return (f64::INFINITY, None);
        }
        let mut num = 0.0;
        let mut den = 0.0;
        for i in 0..self.ts.len() {
            let m = decay_factor(self.ts[i], tau);
            num += self.weights[i] * self.ys[i] * m;
            den += self.weights[i] * m * m;
        }
        if !(den > 0.0) {
            return (f64::INFINITY, None);
        }
        let amplitude = num / den;
        let chi2: f64 = (0..self.ts.len())
            .map(|i| {
                let r = self.ys[i] - predict(amplitude, tau, self.ts[i]);
                self.weights[i] * r * r
            })
            .sum();
        if chi2.is_nan() {
            (f64::INFINITY, None)
        } else {
            (chi2, Some(amplitude))
        }
    }

    pub fn chi2(&self, tau: f64) -> f64 {
        self.eval(tau).0
    }
}

/// `(χ², Â)` at `tau` for raw counts/hold times.
pub fn chi2_for_tau(counts: &[f64], ts: &[f64], tau: f64) -> Result<(f64, Option<f64>), AppError> {
    Ok(ProfiledChi2::new(counts, ts)?.eval(tau))
}

/// Fit the lifetime of `counts` observed at hold times `ts`.
pub fn fit_tau_profiled(counts: &[f64], ts: &[f64], opts: &FitOptions) -> Result<LifetimeFit, AppError> {
    let profile = ProfiledChi2::new(counts, ts)?;
    if profile.len() < 2 {
        return Err(AppError::no_data("At least two hold times are needed to fit a lifetime."));
    }

    let mut candidates = log_space(opts.tau_min, opts.tau_max, opts.grid_steps)?;
    candidates.push(opts.tau_start.clamp(opts.tau_min, opts.tau_max));
    if let Some(seed) = log_linear_tau(ts, counts) {
        candidates.push(seed.clamp(opts.tau_min, opts.tau_max));
    }
    candidates.sort_by(f64::total_cmp);
    candidates.dedup();

    let values: Vec<f64> = candidates.iter().map(|&t| profile.chi2(t)).collect();
    let mut best = 0usize;
    for i in 1..values.len() {
        if values[i] < values[best] {
            best = i;
        }
    }
    if !values[best].is_finite() {
        return Err(AppError::runtime("Profiled chi-square is not finite for any lifetime."));
    }
    // All-zero counts give χ² = 0 everywhere; no lifetime to report.
    if values.iter().all(|&v| v == values[best]) {
        return Err(AppError::no_data("Chi-square profile is flat; counts carry no lifetime."));
    }

    let lo = candidates[best.saturating_sub(1)];
    let hi = candidates[(best + 1).min(candidates.len() - 1)];
    let (refined, refined_chi2) = golden_section(|t| profile.chi2(t), lo, hi, 1e-10, 200);
    let tau = if refined_chi2 < values[best] {
        refined
    } else {
        candidates[best]
    };

    let (chi2, amplitude) = profile.eval(tau);
    let amplitude = amplitude.ok_or_else(|| AppError::runtime("Amplitude undetermined at best lifetime."))?;

    let dtau = match opts.error_scan {
        ErrorScan::Grid => grid_band(|t| profile.chi2(t), tau, opts.tau_min),
        ErrorScan::Bisect => bisect_band(|t| profile.chi2(t), tau, chi2, opts.tau_min, opts.tau_max),
    };

    Ok(LifetimeFit {
        tau,
        dtau,
        amplitude,
        chi2,
        n_points: profile.len(),
    })
}
