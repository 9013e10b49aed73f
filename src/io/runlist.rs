//! Good-run list: one run number per line, `#` starts a comment line.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::AppError;

/// Set of accepted runs. An empty list accepts every run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GoodRuns {
    runs: BTreeSet<u32>,
}

impl GoodRuns {
    pub fn accepts(&self, run: u32) -> bool {
        self.runs.is_empty() || self.runs.contains(&run)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl FromIterator<u32> for GoodRuns {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            runs: iter.into_iter().collect(),
        }
    }
}

/// Load a good-run list. A missing file is not an error: it yields an empty
/// list (and a warning), which accepts all runs.
pub fn load_good_runs(path: &Path) -> Result<GoodRuns, AppError> {
    if !path.exists() {
        warn!(path = %path.display(), "good runs file does not exist, accepting all runs");
        return Ok(GoodRuns::default());
    }
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::input(format!("Failed to read good runs file '{}': {e}", path.display())))?;
    Ok(parse_good_runs(&text))
}

/// Write one run per line.
pub fn write_good_runs(path: &Path, runs: &[u32]) -> Result<(), AppError> {
    let mut text = String::from("# good runs\n");
    for run in runs {
        text.push_str(&format!("{run}\n"));
    }
    fs::write(path, text)
        .map_err(|e| AppError::input(format!("Failed to write good runs file '{}': {e}", path.display())))
}

pub fn parse_good_runs(text: &str) -> GoodRuns {
    text.lines()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with('#'))
        .filter_map(|s| s.parse::<u32>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_blanks_and_garbage() {
        let list = parse_good_runs("# header\n\n 1201 \n1202\nnot-a-run\n#1203\n");
        assert_eq!(list.len(), 2);
        assert!(list.accepts(1201));
        assert!(list.accepts(1202));
        assert!(!list.accepts(1203));
    }

    #[test]
    fn empty_list_accepts_everything() {
        let list = parse_good_runs("# nothing yet\n");
        assert!(list.is_empty());
        assert!(list.accepts(42));
    }

    #[test]
    fn missing_file_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let list = load_good_runs(&dir.path().join("nope.txt")).unwrap();
        assert!(list.is_empty());
    }
}
