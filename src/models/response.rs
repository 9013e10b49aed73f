//! PMT photoelectron time response.
//!
//! A single neutron capture produces a burst of photoelectrons whose arrival
//! times follow a mixture of three exponentials:
//!
//! ```text
//! p(t) = Σ_k w_k exp(-(t - loc)/s_k) / s_k,   t ≥ loc,   w_k = r_k / Σ r
//! ```
//!
//! The mixture is evaluated on window bin edges and normalized to unit sum,
//! so a pulse with `N` photoelectrons contributes `N · p_i` expected hits to
//! bin `i`.

use std::collections::HashMap;

/// Tri-exponential response shape (times in µs).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseShape {
    pub ratios: [f64; 3],
    pub scales: [f64; 3],
    pub loc: f64,
}

/// Shape measured from isolated pulses in production data.
pub const PMT_RESPONSE: ResponseShape = ResponseShape {
    ratios: [1.094_533_33e3, 5.320_774_46e3, 9.930_743_62e3],
    scales: [3.653_573_81e-1, 2.775_207_32, 2.301_657_40e1],
    loc: -4.842_534_84e-3,
};

impl ResponseShape {
    /// Unnormalized mixture density at `t`.
    pub fn density(&self, t: f64) -> f64 {
        if t < self.loc {
            return 0.0;
        }
        let total: f64 = self.ratios.iter().sum();
        self.ratios
            .iter()
            .zip(&self.scales)
            .map(|(&r, &s)| (r / total) * (-(t - self.loc) / s).exp() / s)
            .sum()
    }

    /// Density on `x`, normalized so the bins sum to one.
    pub fn binned(&self, x: &[f64]) -> Vec<f64> {
        let mut pdf: Vec<f64> = x.iter().map(|&t| self.density(t)).collect();
        let sum: f64 = pdf.iter().sum();
        if sum > 0.0 {
            for v in &mut pdf {
                *v /= sum;
            }
        }
        pdf
    }
}

/// For every integer bin offset `dx`, the binned response delayed by `dx` bins.
///
/// Row `dx` is zero before bin `dx`; entries past the window are truncated.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftedResponse {
    rows: Vec<Vec<f64>>,
}

impl ShiftedResponse {
    pub fn build(shape: &ResponseShape, x: &[f64]) -> Self {
        let base = shape.binned(x);
        let n = base.len();
        let rows = (0..n)
            .map(|dx| {
                let mut row = vec![0.0; n];
                row[dx..].copy_from_slice(&base[..n - dx]);
                row
            })
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Response delayed by `shift` bins (clamped into the window).
    pub fn row(&self, shift: usize) -> &[f64] {
        &self.rows[shift.min(self.rows.len().saturating_sub(1))]
    }
}

/// Cache of shifted responses keyed by `(n_bins, bin width in ps)`.
///
/// Windows repeat the same few shapes, so the cache is small in practice; it
/// is dropped wholesale once it grows past `limit` entries.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    shape: ResponseShape,
    entries: HashMap<(usize, i64), ShiftedResponse>,
    limit: usize,
}

impl ResponseCache {
    pub fn new(shape: ResponseShape, limit: usize) -> Self {
        Self {
            shape,
            entries: HashMap::new(),
            limit,
        }
    }

    /// Shifted responses for bins starting at 0 with spacing `bin_width`.
    pub fn lookup(&mut self, n_bins: usize, bin_width: f64) -> &ShiftedResponse {
        if self.entries.len() > self.limit {
            self.entries.clear();
        }
        let key = (n_bins, (bin_width * 1e6).round() as i64);
        let shape = self.shape;
        self.entries.entry(key).or_insert_with(|| {
            let x: Vec<f64> = (0..n_bins).map(|b| b as f64 * bin_width).collect();
            ShiftedResponse::build(&shape, &x)
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
