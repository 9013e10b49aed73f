//! Raw PE hit text exports (`PECountsRun<run>.txt`).
//!
//! Each line is `segment, realtime_s, channel`. Hits are grouped per segment
//! and returned as sorted times in microseconds, which is what the pulse
//! finder expects.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Segment;
use crate::error::AppError;

/// Hit times (µs) per segment, indexed by `Segment::index`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunHits {
    pub segments: [Vec<f64>; 4],
    pub skipped_lines: usize,
}

impl RunHits {
    pub fn times(&self, segment: Segment) -> &[f64] {
        &self.segments[segment.index()]
    }

    pub fn total(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }
}

pub fn hit_file_path(dir: &Path, run: u32) -> PathBuf {
    dir.join(format!("PECountsRun{run}.txt"))
}

/// Load a hit file. Returns `Ok(None)` when the file does not exist.
pub fn load_run_hits(path: &Path) -> Result<Option<RunHits>, AppError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::input(format!("Failed to read hit file '{}': {e}", path.display())))?;
    Ok(Some(parse_run_hits(&text)))
}

pub fn parse_run_hits(text: &str) -> RunHits {
    let mut hits = RunHits::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(',').map(str::trim);
        let segment = fields.next().and_then(Segment::from_label);
        let time = fields.next().and_then(|s| s.parse::<f64>().ok()).filter(|t| t.is_finite());
        match (segment, time) {
            (Some(seg), Some(t)) => hits.segments[seg.index()].push(t * 1e6),
            _ => hits.skipped_lines += 1,
        }
    }
    for times in &mut hits.segments {
        times.sort_by(f64::total_cmp);
    }
    hits
}
