//! Input/output helpers.
//!
//! - runinfo CSV and good-run list (`runinfo`, `runlist`)
//! - per-run pulse files, read and written (`pulses`)
//! - raw PE hit exports and run-parameter JSON for pulse finding (`hits`, `params`)
//! - result exports (CSV/JSON) (`export`)

pub mod export;
pub mod hits;
pub mod params;
pub mod pulses;
pub mod runinfo;
pub mod runlist;

pub use export::*;
