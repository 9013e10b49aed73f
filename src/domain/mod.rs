//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - detector vocabulary (`Segment`, `EventClass`, `PulseRecord`, `RunInfo`)
//! - campaign method knobs (`BackgroundModel`, `FillNormalization`, `ErrorScan`)
//! - fit outputs (`LifetimeFit`, `ThresholdPoint`, `SegmentScan`)
//! - run configurations derived from the CLI

pub mod types;

pub use types::*;
