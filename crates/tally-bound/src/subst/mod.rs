//! Scope substitution utilities.
//!
//! Reduction passes that rewrite references to scopes that are free in the
//! rewritten tree, plus read-only queries over scope declarations and
//! references. Every pass skips subtrees whose kind mask shows they contain
//! no scope reference.
//!
//! Substitution is only defined for free scopes: remapping a scope that is
//! declared inside the rewritten tree is a bug in the caller and trips a
//! debug assertion.

mod find;
mod rename;
mod replace;
mod split;

pub use find::{
    DeclSite, LOOP_USE_WEIGHT, any_refs, any_refs_in, count_refs, count_refs_weighted, find_decl,
    find_decl_any,
};
pub use rename::{rename_scope, rename_scopes};
pub use replace::{replace_scope, replace_scope_with_host};
pub use split::{FieldTarget, split_fields};

use crate::kind::NodeKind;
use crate::node::Node;

/// Whether `node` may contain a reference to any scope.
fn may_reference(node: &Node) -> bool {
    node.all_kinds().contains(NodeKind::ScopeRef)
}
