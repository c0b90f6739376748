//! Per-node hoisting state.

use tally_bound::{BitSet, Node};

/// What the hoister knows about a visited subtree.
#[derive(Clone, Debug)]
pub(super) struct HoistInfo {
    /// The subtree after hoisting inside it.
    pub node: Node,
    /// Kernel stack positions of the active scopes the original subtree
    /// references. Scopes declared inside it are cleared on the way up.
    pub scopes: BitSet,
    pub changed: bool,
    /// Level the subtree would be bound at if hoisted.
    pub dest: usize,
    /// Never relocate or share: effects, errors, missing values.
    pub prohibit: bool,
    /// Not worth a binding on its own.
    pub inhibit: bool,
}

impl HoistInfo {
    /// A subtree left exactly as it was.
    pub fn kept(node: &Node, scopes: BitSet, dest: usize, prohibit: bool) -> Self {
        HoistInfo {
            node: node.clone(),
            scopes,
            changed: false,
            dest,
            prohibit,
            inhibit: node.is_cheap(),
        }
    }

    /// The same subtree, now standing as a reference to a hoisted binding.
    ///
    /// `scopes` keeps the original references so that any expression built
    /// over the reference is never bound above the binding itself.
    pub fn into_ref(self, reference: Node) -> Self {
        HoistInfo {
            node: reference,
            changed: true,
            inhibit: true,
            ..self
        }
    }
}
