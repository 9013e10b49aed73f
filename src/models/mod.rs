//! Model evaluation kept as small, pure functions so that fitting code can
//! stay generic.
//!
//! - `decay`: stored-UCN exponential `A exp(-t/τ)`
//! - `response`: PMT single-photoelectron time response used by the pulse finder

pub mod decay;
pub mod response;

pub use decay::*;
pub use response::*;
