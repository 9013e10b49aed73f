//! Exponential storage model `y(t) = A exp(-t/τ)`.

/// Survival factor `exp(-t/τ)`; zero for non-positive `τ`.
pub fn decay_factor(t: f64, tau: f64) -> f64 {
    if tau <= 0.0 {
        return 0.0;
    }
    (-t / tau).exp()
}

/// Predicted count at holding time `t`.
pub fn predict(amplitude: f64, tau: f64, t: f64) -> f64 {
    amplitude * decay_factor(t, tau)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_lifetime_is_one_over_e() {
        let y = predict(2.0, 800.0, 800.0);
        assert!((y - 2.0 / std::f64::consts::E).abs() < 1e-12);
        assert_eq!(decay_factor(10.0, 0.0), 0.0);
    }
}
