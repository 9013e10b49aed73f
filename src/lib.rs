//! `ucn-lifetime` library crate.
//!
//! The binary (`ucnlife`) is a thin wrapper around this library so that:
//!
//! - every stage is testable without spawning processes
//! - the pipeline stages can be driven from other tools
//!
//! Stages: `pulse` (raw hits to pulse files), `aggregate` and `fit` (pulse
//! files to lifetimes), `plot`/`report`/`tui` (presentation), plus `tail` and
//! `sim` as side tools.

pub mod aggregate;
pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod plot;
pub mod pulse;
pub mod report;
pub mod sim;
pub mod tail;
pub mod tui;
