//! Poisson likelihood of a window histogram under a set of pulses.

use std::f64::consts::PI;
use std::sync::LazyLock;

use nalgebra::DVector;

use crate::models::ShiftedResponse;

/// Counts below this use the exact `ln k!` table, the rest use Stirling.
pub const EXACT_FACTORIAL_LIMIT: u32 = 20;
/// Added to every expectation so empty model bins stay finite.
pub const LAMBDA_FLOOR: f64 = 1e-10;

static LOG_FACTORIAL: LazyLock<Vec<f64>> = LazyLock::new(|| {
    let mut table = Vec::with_capacity(EXACT_FACTORIAL_LIMIT as usize);
    let mut acc = 0.0;
    for k in 0..EXACT_FACTORIAL_LIMIT {
        if k > 1 {
            acc += (k as f64).ln();
        }
        table.push(acc);
    }
    table
});

/// `ln k!`
pub fn log_factorial(k: u32) -> f64 {
    if k < EXACT_FACTORIAL_LIMIT {
        LOG_FACTORIAL[k as usize]
    } else {
        let k = k as f64;
        k * k.ln() - k + 0.5 * (2.0 * PI * k).ln()
    }
}

/// `Σ k ln λ - λ - ln k!` with `λ = expected + 1e-10`.
pub fn poisson_log_likelihood(observed: &[u32], expected: &[f64]) -> f64 {
    observed
        .iter()
        .zip(expected)
        .map(|(&k, &e)| {
            let lambda = e + LAMBDA_FLOOR;
            k as f64 * lambda.ln() - lambda - log_factorial(k)
        })
        .sum()
}

/// Expected counts for `params = [pe_0..pe_n, dt_0..dt_n]`.
///
/// Offsets are truncated to whole bins.
pub fn expected_counts(params: &DVector<f64>, n_pulses: usize, response: &ShiftedResponse, n_bins: usize) -> Vec<f64> {
    let mut expected = vec![0.0; n_bins];
    for i in 0..n_pulses {
        let pe = params[i];
        let shift = params[n_pulses + i].max(0.0) as usize;
        for (e, &p) in expected.iter_mut().zip(response.row(shift)) {
            *e += pe * p;
        }
    }
    expected
}

pub fn neg_log_likelihood(params: &DVector<f64>, observed: &[u32], response: &ShiftedResponse, n_pulses: usize) -> f64 {
    let expected = expected_counts(params, n_pulses, response, observed.len());
    -poisson_log_likelihood(observed, &expected)
}
