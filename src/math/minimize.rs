//! Derivative-free minimizers.
//!
//! - golden-section search for the 1-D profiled lifetime χ²
//! - a box-constrained Nelder–Mead simplex for the multi-pulse likelihood
//!
//! Both are deterministic: same inputs, same iterates.

use std::cell::Cell;

use nalgebra::DVector;

const INV_PHI: f64 = 0.618_033_988_749_894_8;

/// Minimize `f` on `[a, b]` by golden-section search.
///
/// Stops when the bracket is narrower than `tol * (|x| + 1)` or after
/// `max_iter` shrinks. Returns `(x, f(x))` of the best point seen.
pub fn golden_section<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, tol: f64, max_iter: usize) -> (f64, f64) {
    let (mut a, mut b) = if a <= b { (a, b) } else { (b, a) };
    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    for _ in 0..max_iter {
        if (b - a).abs() <= tol * (0.5 * (a + b)).abs().max(1.0) {
            break;
        }
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = f(d);
        }
    }

    if fc < fd { (c, fc) } else { (d, fd) }
}

/// Stopping rules for [`nelder_mead_bounded`].
#[derive(Debug, Clone, Copy)]
pub struct SimplexOptions {
    pub max_evals: usize,
    /// Relative size of the simplex below which the search stops.
    pub xtol_rel: f64,
    /// Initial step as a fraction of each bound range.
    pub initial_step: f64,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            max_evals: 200,
            xtol_rel: 1e-4,
            initial_step: 0.05,
        }
    }
}

/// Output of a simplex run.
#[derive(Debug, Clone)]
pub struct SimplexResult {
    pub x: DVector<f64>,
    pub value: f64,
    pub evals: usize,
}

/// Nelder–Mead on a box. Trial points are clamped into `[lower, upper]`, so
/// the objective is never evaluated outside the bounds.
pub fn nelder_mead_bounded<F: Fn(&DVector<f64>) -> f64>(
    f: F,
    x0: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
    opts: SimplexOptions,
) -> SimplexResult {
    let n = x0.len();
    let clamp = |x: DVector<f64>| -> DVector<f64> {
        DVector::from_iterator(n, x.iter().enumerate().map(|(i, &v)| v.clamp(lower[i], upper[i])))
    };
    let evals = Cell::new(0usize);
    let eval = |x: &DVector<f64>| {
        evals.set(evals.get() + 1);
        let v = f(x);
        if v.is_nan() { f64::INFINITY } else { v }
    };

    // Initial simplex: x0 plus one step along each axis, stepping inwards when
    // x0 sits on the upper bound.
    let start = clamp(x0.clone());
    let mut simplex: Vec<(DVector<f64>, f64)> = Vec::with_capacity(n + 1);
    let f0 = eval(&start);
    simplex.push((start.clone(), f0));
    for i in 0..n {
        let range = upper[i] - lower[i];
        let step = (opts.initial_step * range).max(1e-6);
        let mut v = start.clone();
        v[i] = if v[i] + step <= upper[i] { v[i] + step } else { v[i] - step };
        let v = clamp(v);
        let fv = eval(&v);
        simplex.push((v, fv));
    }

    while evals.get() < opts.max_evals {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

        let best = &simplex[0].0;
        let size = simplex[1..]
            .iter()
            .map(|(v, _)| (v - best).amax())
            .fold(0.0, f64::max);
        if size <= opts.xtol_rel * best.amax().max(1e-12) {
            break;
        }

        let centroid = simplex[..n]
            .iter()
            .fold(DVector::<f64>::zeros(n), |acc, (v, _)| acc + v)
            / n as f64;
        let (worst, f_worst) = simplex[n].clone();

        let reflected = clamp(&centroid + (&centroid - &worst));
        let f_reflected = eval(&reflected);

        if f_reflected < simplex[0].1 {
            let expanded = clamp(&centroid + 2.0 * (&centroid - &worst));
            let f_expanded = eval(&expanded);
            simplex[n] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
            continue;
        }
        if f_reflected < simplex[n - 1].1 {
            simplex[n] = (reflected, f_reflected);
            continue;
        }

        let contracted = if f_reflected < f_worst {
            clamp(&centroid + 0.5 * (&reflected - &centroid))
        } else {
            clamp(&centroid + 0.5 * (&worst - &centroid))
        };
        let f_contracted = eval(&contracted);
        if f_contracted < f_worst.min(f_reflected) {
            simplex[n] = (contracted, f_contracted);
            continue;
        }

        // Shrink towards the best vertex.
        let best = simplex[0].0.clone();
        for entry in simplex.iter_mut().skip(1) {
            let v = clamp(&best + 0.5 * (&entry.0 - &best));
            let fv = eval(&v);
            *entry = (v, fv);
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (x, value) = simplex.swap_remove(0);
    SimplexResult {
        x,
        value,
        evals: evals.get(),
    }
}
