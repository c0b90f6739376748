//! Optimization passes over Tally bound trees.
//!
//! Each pass takes an immutable tree and returns a rewritten one that shares
//! every untouched subtree with its input.

// === Bound tree passes ===
pub mod hoist;

// Re-exports
pub use hoist::{HoistConfig, HoistResult, hoist, hoist_with_config, hoist_with_host};
