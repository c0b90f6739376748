//! Tally bound-tree optimization core.
//!
//! Re-exports the bound tree model and infrastructure from [`tally_bound`],
//! the optimization passes from [`tally_passes`], and provides
//! [`optimize`], the entry point hosts run over a freshly bound tree.

pub mod pipeline;

pub use pipeline::{OptimizeConfig, OptimizeError, Optimized, optimize, optimize_with_host};
pub use tally_bound as bound;
pub use tally_passes as passes;
pub use tally_passes::{HoistConfig, HoistResult};
