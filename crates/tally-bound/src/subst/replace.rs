//! Inlining a value for a scope.

use super::{count_refs_weighted, may_reference};
use crate::node::{Node, NodeBody};
use crate::reduce::{NoopHost, ReduceAction, ReduceCx, ReduceHost, ReduceRule, Reducer};
use crate::scope::ArgScope;
use crate::typesvc::{CastError, TypeService};

struct Inline<'a> {
    scope: &'a ArgScope,
    value: &'a Node,
}

impl ReduceRule for Inline<'_> {
    fn pre_reduce(&mut self, node: &Node, cx: &mut ReduceCx<'_>) -> ReduceAction {
        if !may_reference(node) {
            return ReduceAction::Skip;
        }
        debug_assert!(
            node.scope_decls().iter().all(|d| &d.scope != self.scope),
            "replace: scope {} declared inside the rewritten tree",
            self.scope
        );
        match node.body() {
            NodeBody::ScopeRef(scope) if scope == self.scope => {
                cx.host.associate(node, self.value);
                ReduceAction::Replace(self.value.clone())
            }
            NodeBody::ScopeRef(_) => ReduceAction::Skip,
            _ => ReduceAction::Descend,
        }
    }
}

/// Replace every reference to `scope` in `node` by `value`.
///
/// When `value` has a different type than the scope, it is converted through
/// `types` first. A value that is not cheap must be referenced at most once,
/// otherwise its computation would be duplicated.
pub fn replace_scope(
    node: &Node,
    scope: &ArgScope,
    value: &Node,
    types: &dyn TypeService,
) -> Result<Node, CastError> {
    replace_scope_with_host(node, scope, value, types, &mut NoopHost)
}

/// [`replace_scope`] reporting mappings and conversion warnings to `host`.
pub fn replace_scope_with_host(
    node: &Node,
    scope: &ArgScope,
    value: &Node,
    types: &dyn TypeService,
    host: &mut dyn ReduceHost,
) -> Result<Node, CastError> {
    let value = if types.types_equal(value.ty(), scope.ty()) {
        value.clone()
    } else if types.accepts(scope.ty(), value.ty()) {
        types.cast(value, scope.ty(), host)?
    } else {
        return Err(CastError::Incompatible {
            from: value.ty().clone(),
            to: scope.ty().clone(),
        });
    };
    debug_assert!(
        value.is_cheap() || count_refs_weighted(node, scope, 1) <= 1,
        "replace: non-cheap value for {scope} would be duplicated"
    );
    let result = Reducer::with_host(
        Inline {
            scope,
            value: &value,
        },
        host,
    )
    .run(node);
    if result.changed {
        tracing::trace!(%scope, rewritten = result.rewritten, "inlined scope");
    }
    Ok(result.node)
}
