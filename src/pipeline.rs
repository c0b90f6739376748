//! Optimization pipeline.
//!
//! ```text
//! bound tree
//!     │
//!     ▼
//! validate (optional) ─► rejects malformed input
//!     │
//!     ▼
//! hoist ─► loop-invariant expressions bound outside their loops
//!     │
//!     ▼
//! validate (optional) ─► rejects a broken rewrite
//! ```
//!
//! Free scopes are the scopes the host binds around the tree (formula
//! parameters, outer `With` values); references to them are legal anywhere.

use derive_more::{Display, Error};
use serde::Deserialize;
use tally_bound::{ArgScope, Node, NoopHost, ReduceHost, ValidationError, validate};
use tally_passes::{HoistConfig, hoist_with_host};

/// Pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizeConfig {
    /// Validate the tree before and after rewriting.
    /// Default: on in debug builds.
    pub validate: bool,
    pub hoist: HoistConfig,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            validate: cfg!(debug_assertions),
            hoist: HoistConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum OptimizeError {
    #[display("invalid input tree: {source}")]
    Input { source: ValidationError },
    #[display("optimization produced an invalid tree: {source}")]
    Output { source: ValidationError },
}

/// An optimized tree.
#[derive(Debug)]
pub struct Optimized {
    pub node: Node,
    pub changed: bool,
    pub warnings: Vec<String>,
}

/// Run every optimization pass over `node`.
pub fn optimize(
    node: &Node,
    free_scopes: &[ArgScope],
    config: &OptimizeConfig,
) -> Result<Optimized, OptimizeError> {
    optimize_with_host(node, free_scopes, config, &mut NoopHost)
}

/// [`optimize`] reporting rewrites and warnings to `host`.
pub fn optimize_with_host(
    node: &Node,
    free_scopes: &[ArgScope],
    config: &OptimizeConfig,
    host: &mut dyn ReduceHost,
) -> Result<Optimized, OptimizeError> {
    if config.validate {
        validate(node, free_scopes).map_err(|source| OptimizeError::Input { source })?;
    }

    let hoisted = hoist_with_host(node, &config.hoist, host);
    tracing::debug!(
        changed = hoisted.changed,
        hoisted = hoisted.hoisted,
        deduplicated = hoisted.deduplicated,
        "optimized bound tree"
    );

    if config.validate && hoisted.changed {
        validate(&hoisted.node, free_scopes).map_err(|source| OptimizeError::Output { source })?;
    }
    Ok(Optimized {
        node: hoisted.node,
        changed: hoisted.changed,
        warnings: hoisted.warnings,
    })
}
