//! CLI command implementations.

pub mod kinds;
pub mod probe;
pub mod sync;
