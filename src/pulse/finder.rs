//! Window-by-window pulse finding over a stream of PE hit times.

use crate::domain::FinderSettings;
use crate::models::{PMT_RESPONSE, ResponseCache};
use crate::pulse::fitter::fit_window;
use crate::pulse::window::{grow_window, histogram};

/// Shifted-response tables kept before the cache is reset.
pub const RESPONSE_CACHE_LIMIT: usize = 500;

/// A pulse found in a hit stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoundPulse {
    /// Absolute pulse time (µs).
    pub time_us: f64,
    pub pe: f64,
    /// Index of the window the pulse was fitted in (fitted windows only).
    pub window: usize,
    /// Width of that window (µs).
    pub window_width: f64,
    /// More than one pulse was fitted in the window.
    pub pileup: bool,
}

/// Windowed pulse finder. Holds the response cache between windows.
#[derive(Debug)]
pub struct PulseFinder {
    settings: FinderSettings,
    cache: ResponseCache,
}

impl PulseFinder {
    pub fn new(settings: FinderSettings) -> Self {
        Self {
            settings,
            cache: ResponseCache::new(PMT_RESPONSE, RESPONSE_CACHE_LIMIT),
        }
    }

    /// Find every pulse in sorted hit times `times` (µs).
    pub fn find(&mut self, times: &[f64]) -> Vec<FoundPulse> {
        let mut out = Vec::new();
        let mut window_index = 0usize;
        let mut i = 0usize;

        while i < times.len() {
            let window = grow_window(times, i, self.settings.min_gap);
            i = window.next;

            let Some(mut hist) = histogram(times, &window, self.settings.bin_width) else {
                continue;
            };
            if hist.len() < 2 {
                match histogram(times, &window, self.settings.fine_bin_width) {
                    Some(fine) if fine.len() >= 2 => hist = fine,
                    _ => continue,
                }
            }

            let response = self.cache.lookup(hist.len(), hist.bin_width);
            let Some(pulses) = fit_window(&hist.counts, response) else {
                continue;
            };

            let pileup = pulses.len() > 1;
            out.extend(pulses.iter().map(|p| FoundPulse {
                time_us: window.start + p.offset * hist.bin_width,
                pe: p.pe,
                window: window_index,
                window_width: window.width(),
                pileup,
            }));
            window_index += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hits of one pulse starting at `t0`, spread over ~`n` µs.
    fn burst(t0: f64, n: usize) -> Vec<f64> {
        (0..n).map(|k| t0 + k as f64 * 0.5).collect()
    }

    #[test]
    fn isolated_hits_give_no_pulses() {
        let times = [0.0, 100.0, 200.0, 300.0];
        let mut finder = PulseFinder::new(FinderSettings::default());
        assert!(finder.find(&times).is_empty());
    }

    #[test]
    fn separate_bursts_are_separate_windows() {
        let mut times = burst(1_000.0, 40);
        times.extend(burst(5_000.0, 40));
        let mut finder = PulseFinder::new(FinderSettings::default());
        let pulses = finder.find(&times);
        assert!(!pulses.is_empty());
        let windows: std::collections::BTreeSet<usize> = pulses.iter().map(|p| p.window).collect();
        assert_eq!(windows.len(), 2);
        assert!(pulses.iter().all(|p| p.pe >= 5.0));
        assert!(pulses.iter().any(|p| (p.time_us - 1_000.0).abs() < 20.0));
        assert!(pulses.iter().any(|p| (p.time_us - 5_000.0).abs() < 20.0));
    }
}
