//! Splitting field and slot projections off a scope.

use rustc_hash::FxHashMap;

use super::may_reference;
use crate::node::{Node, NodeBody};
use crate::reduce::{ReduceAction, ReduceCx, ReduceRule, Reducer};
use crate::scope::ArgScope;
use crate::types::Name;

/// A projection taken directly off a record or tuple scope.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldTarget {
    Field(Name),
    Slot(usize),
}

struct Split<'a> {
    scope: &'a ArgScope,
    map: &'a FxHashMap<FieldTarget, Node>,
}

impl Split<'_> {
    fn target(&self, node: &Node) -> Option<FieldTarget> {
        let (base, target) = match node.body() {
            NodeBody::GetField { record, name } => (record, FieldTarget::Field(name.clone())),
            NodeBody::GetSlot { tuple, slot } => (tuple, FieldTarget::Slot(*slot)),
            _ => return None,
        };
        (base.as_scope_ref() == Some(self.scope)).then_some(target)
    }
}

impl ReduceRule for Split<'_> {
    fn pre_reduce(&mut self, node: &Node, _cx: &mut ReduceCx<'_>) -> ReduceAction {
        if !may_reference(node) {
            return ReduceAction::Skip;
        }
        debug_assert!(
            node.scope_decls().iter().all(|d| &d.scope != self.scope),
            "split: scope {} declared inside the rewritten tree",
            self.scope
        );
        if let Some(target) = self.target(node)
            && let Some(replacement) = self.map.get(&target)
        {
            debug_assert_eq!(replacement.ty(), node.ty(), "split: {target:?} type mismatch");
            return ReduceAction::Replace(replacement.clone());
        }
        ReduceAction::Descend
    }
}

/// Rewrite `scope.field` and `scope.slot` projections found in `map` into
/// their replacement. Other uses of `scope` are left alone.
pub fn split_fields(
    node: &Node,
    scope: &ArgScope,
    map: &FxHashMap<FieldTarget, Node>,
) -> Node {
    if map.is_empty() {
        return node.clone();
    }
    Reducer::new(Split { scope, map }).run(node).node
}
