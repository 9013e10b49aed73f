//! Hit windows and their histograms.
//!
//! A window starts at some hit and keeps absorbing the next hit while the gap
//! to it stays within `min_gap`. Each window is then binned relative to its
//! first hit.

/// Hits `times[first..next]` grouped into one window (times in µs).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitWindow {
    pub first: usize,
    /// One past the last hit of the window.
    pub next: usize,
    pub start: f64,
    pub end: f64,
}

impl HitWindow {
    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

/// Grow a window from `times[first]`. `times` must be sorted and
/// `first < times.len()`.
pub fn grow_window(times: &[f64], first: usize, min_gap: f64) -> HitWindow {
    let mut next = first + 1;
    while next < times.len() && times[next] - times[next - 1] <= min_gap {
        next += 1;
    }
    HitWindow {
        first,
        next,
        start: times[first],
        end: times[next - 1],
    }
}

/// Per-bin hit counts of one window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowHistogram {
    pub counts: Vec<u32>,
    pub bin_width: f64,
}

impl WindowHistogram {
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Bin the window's hits with `ceil(width / bin_width)` bins.
///
/// `None` when the window is narrower than one bin.
pub fn histogram(times: &[f64], window: &HitWindow, bin_width: f64) -> Option<WindowHistogram> {
    let width = window.width();
    if width < bin_width {
        return None;
    }
    let n_bins = (width / bin_width).ceil() as usize;
    if n_bins < 1 {
        return None;
    }
    let mut counts = vec![0u32; n_bins];
    for &t in &times[window.first..window.next] {
        let bin = ((t - window.start) / bin_width) as usize;
        // The last hit lands exactly on the upper edge when width is a
        // multiple of the bin width; it is not counted.
        if bin < n_bins {
            counts[bin] += 1;
        }
    }
    Some(WindowHistogram { counts, bin_width })
}

/// Hits of a sorted slice inside `[start, end)`.
pub fn select_range(times: &[f64], start: f64, end: f64) -> &[f64] {
    let lo = times.partition_point(|&t| t < start);
    let hi = times.partition_point(|&t| t < end);
    &times[lo..hi.max(lo)]
}
