//! Mathematical utilities: weighted least squares and derivative-free minimizers.

pub mod minimize;
pub mod ols;

pub use minimize::*;
pub use ols::*;
