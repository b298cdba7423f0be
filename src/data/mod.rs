//! Data containers: solver vectors with their shadows, and per-partition
//! matrix metadata.

pub mod array;
pub mod matrix;

pub use crate::debug_invariants::DebugInvariants;
