//! Lifetime fitting.
//!
//! Responsibilities:
//!
//! - profiled χ² minimization over τ
//! - Δχ² = 1 uncertainty band (grid or bisection)
//! - the parallel lifetime vs threshold scan

pub mod error_band;
pub mod profiled;
pub mod scan;
pub mod tau_grid;

pub use error_band::*;
pub use profiled::*;
pub use scan::*;
pub use tau_grid::*;
