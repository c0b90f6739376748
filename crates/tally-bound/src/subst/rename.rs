//! Scope renaming.

use rustc_hash::FxHashMap;

use super::may_reference;
use crate::node::{Node, NodeBody};
use crate::reduce::{ReduceAction, ReduceCx, ReduceRule, Reducer};
use crate::scope::ArgScope;

struct Rename<'a> {
    map: &'a FxHashMap<ArgScope, ArgScope>,
}

impl Rename<'_> {
    /// Follow the map transitively. The map must be acyclic.
    fn resolve(&self, scope: &ArgScope) -> Option<ArgScope> {
        let mut target = self.map.get(scope)?;
        while let Some(next) = self.map.get(target) {
            target = next;
        }
        Some(target.clone())
    }
}

impl ReduceRule for Rename<'_> {
    fn pre_reduce(&mut self, node: &Node, _cx: &mut ReduceCx<'_>) -> ReduceAction {
        if !may_reference(node) {
            return ReduceAction::Skip;
        }
        debug_assert!(
            node.scope_decls()
                .iter()
                .all(|d| !self.map.contains_key(&d.scope)),
            "rename: scope declared inside the renamed tree"
        );
        match node.body() {
            NodeBody::ScopeRef(scope) => match self.resolve(scope) {
                Some(target) => {
                    debug_assert_eq!(target.ty(), scope.ty(), "rename: scope type mismatch");
                    ReduceAction::Replace(Node::scope_ref(&target))
                }
                None => ReduceAction::Skip,
            },
            _ => ReduceAction::Descend,
        }
    }
}

/// Replace references to each key of `map` by references to its value,
/// following chains `a -> b -> c` to their end.
pub fn rename_scopes(node: &Node, map: &FxHashMap<ArgScope, ArgScope>) -> Node {
    if map.is_empty() {
        return node.clone();
    }
    Reducer::new(Rename { map }).run(node).node
}

/// Replace every reference to `from` by a reference to `to`.
pub fn rename_scope(node: &Node, from: &ArgScope, to: &ArgScope) -> Node {
    let mut map = FxHashMap::default();
    map.insert(from.clone(), to.clone());
    rename_scopes(node, &map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitset::BitSet;
    use crate::ops::VariadicOp;
    use crate::scope::ScopeKind;
    use crate::types::DType;

    fn add(args: impl IntoIterator<Item = Node>) -> Node {
        Node::variadic(VariadicOp::Add, args, BitSet::new(), DType::Int)
    }

    #[test]
    fn renames_one_scope() {
        let a = ArgScope::new(ScopeKind::With, DType::Int);
        let b = ArgScope::new(ScopeKind::With, DType::Int);
        let untouched = add([Node::global("x", DType::Int), Node::int(1)]);
        let tree = add([Node::scope_ref(&a), untouched.clone()]);

        let renamed = rename_scope(&tree, &a, &b);
        assert_eq!(renamed.children()[0].as_scope_ref(), Some(&b));
        assert!(renamed.children()[1].ptr_eq(&untouched));
    }

    #[test]
    fn follows_chains() {
        let a = ArgScope::new(ScopeKind::With, DType::Int);
        let b = ArgScope::new(ScopeKind::With, DType::Int);
        let c = ArgScope::new(ScopeKind::With, DType::Int);
        let mut map = FxHashMap::default();
        map.insert(a.clone(), b.clone());
        map.insert(b.clone(), c.clone());

        let tree = add([Node::scope_ref(&a), Node::scope_ref(&b)]);
        let renamed = rename_scopes(&tree, &map);
        let children = renamed.children();
        assert_eq!(children[0].as_scope_ref(), Some(&c));
        assert_eq!(children[1].as_scope_ref(), Some(&c));
    }

    #[test]
    fn unrelated_tree_is_shared() {
        let a = ArgScope::new(ScopeKind::With, DType::Int);
        let b = ArgScope::new(ScopeKind::With, DType::Int);
        let other = ArgScope::new(ScopeKind::With, DType::Int);
        let tree = add([Node::scope_ref(&other), Node::int(2)]);
        assert!(rename_scope(&tree, &a, &b).ptr_eq(&tree));
    }
}
