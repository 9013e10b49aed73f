//! Run-parameter JSON: `{ "<run>": { "run_type", "fill_time", "hold_time", "clean_time" } }`.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use serde::Deserialize;

use crate::domain::RunParams;
use crate::error::AppError;

#[derive(Debug, Clone, Default)]
pub struct RunParamTable {
    runs: BTreeMap<u32, RunParams>,
}

impl RunParamTable {
    pub fn get(&self, run: u32) -> Option<&RunParams> {
        self.runs.get(&run)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Entries whose key is not a run number or whose body does not match
/// `RunParams` are ignored; they carry campaign metadata in some files.
#[derive(Deserialize)]
#[serde(transparent)]
struct RawTable(BTreeMap<String, serde_json::Value>);

pub fn load_run_params(path: &Path) -> Result<RunParamTable, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open run parameters '{}': {e}", path.display())))?;
    let raw: RawTable =
        serde_json::from_reader(file).map_err(|e| AppError::input(format!("Invalid run parameter JSON: {e}")))?;
    Ok(from_raw(raw))
}

pub fn parse_run_params(text: &str) -> Result<RunParamTable, AppError> {
    let raw: RawTable =
        serde_json::from_str(text).map_err(|e| AppError::input(format!("Invalid run parameter JSON: {e}")))?;
    Ok(from_raw(raw))
}

fn from_raw(raw: RawTable) -> RunParamTable {
    let runs = raw
        .0
        .into_iter()
        .filter_map(|(key, value)| {
            let run = key.trim().parse::<u32>().ok()?;
            let params = serde_json::from_value::<RunParams>(value).ok()?;
            Some((run, params))
        })
        .collect();
    RunParamTable { runs }
}
