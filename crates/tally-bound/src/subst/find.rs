//! Read-only scope queries.

use std::ops::ControlFlow;

use rustc_hash::FxHashSet;

use super::may_reference;
use crate::kind::{KindMask, NodeKind};
use crate::node::Node;
use crate::scope::ArgScope;
use crate::visit::{Kernel, PushedScope, Visitor, WalkAction, walk};

/// Weight of a reference nested inside a loop, relative to a plain one.
///
/// Profitability heuristics use weighted counts to prefer scopes whose uses
/// are re-evaluated per element.
pub const LOOP_USE_WEIGHT: usize = 1000;

const OWNER_KINDS: KindMask = KindMask::EMPTY
    .with(NodeKind::Call)
    .with(NodeKind::With)
    .with(NodeKind::GroupBy)
    .with(NodeKind::SetFields)
    .with(NodeKind::ModuleProjection);

/// Where a scope is declared.
#[derive(Clone, Debug)]
pub struct DeclSite {
    pub owner: Node,
    pub slot: usize,
}

enum Targets<'a> {
    One(&'a ArgScope),
    Set(&'a FxHashSet<ArgScope>),
}

impl Targets<'_> {
    fn contains(&self, scope: &ArgScope) -> bool {
        match self {
            Targets::One(target) => *target == scope,
            Targets::Set(set) => set.contains(scope),
        }
    }
}

struct FindDecl<'a> {
    kernel: Kernel,
    targets: Targets<'a>,
    found: Option<(ArgScope, DeclSite)>,
}

impl Visitor for FindDecl<'_> {
    fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    fn kernel_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }

    fn pre_visit(&mut self, node: &Node) -> ControlFlow<(), WalkAction> {
        if !node.all_kinds().intersects(OWNER_KINDS) {
            return ControlFlow::Continue(WalkAction::Skip);
        }
        if let Some(decl) = node
            .scope_decls()
            .into_iter()
            .find(|d| self.targets.contains(&d.scope))
        {
            self.found = Some((
                decl.scope,
                DeclSite {
                    owner: node.clone(),
                    slot: decl.slot,
                },
            ));
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(WalkAction::Advance)
    }
}

fn find(node: &Node, targets: Targets<'_>) -> Option<(ArgScope, DeclSite)> {
    let mut v = FindDecl {
        kernel: Kernel::new(),
        targets,
        found: None,
    };
    let _ = walk(&mut v, node);
    v.found
}

/// The owner and slot declaring `scope` inside `node`.
pub fn find_decl(node: &Node, scope: &ArgScope) -> Option<DeclSite> {
    find(node, Targets::One(scope)).map(|(_, site)| site)
}

/// The first declaration, in pre-order, of any scope in `scopes`.
pub fn find_decl_any(
    node: &Node,
    scopes: &FxHashSet<ArgScope>,
) -> Option<(ArgScope, DeclSite)> {
    if scopes.is_empty() {
        return None;
    }
    find(node, Targets::Set(scopes))
}

struct CountRefs<'a> {
    kernel: Kernel,
    scope: &'a ArgScope,
    weight: usize,
    total: usize,
}

impl Visitor for CountRefs<'_> {
    fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    fn kernel_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }

    fn pre_visit(&mut self, node: &Node) -> ControlFlow<(), WalkAction> {
        if may_reference(node) {
            ControlFlow::Continue(WalkAction::Advance)
        } else {
            ControlFlow::Continue(WalkAction::Skip)
        }
    }

    fn visit_scope_ref(
        &mut self,
        _node: &Node,
        scope: &ArgScope,
        _pushed: Option<&PushedScope>,
    ) -> ControlFlow<()> {
        if scope == self.scope {
            // Only loops entered after the declaration re-evaluate the use.
            let floor = self.kernel.position(scope).map_or(0, |p| p + 1);
            let weight = if self.kernel.loops_from(floor) > 0 {
                self.weight
            } else {
                1
            };
            self.total = self.total.saturating_add(weight);
        }
        ControlFlow::Continue(())
    }
}

/// Count references to `scope`, weighting loop-nested ones by
/// [`LOOP_USE_WEIGHT`].
pub fn count_refs(node: &Node, scope: &ArgScope) -> usize {
    count_refs_weighted(node, scope, LOOP_USE_WEIGHT)
}

/// Count references to `scope`, weighting loop-nested ones by `loop_weight`.
pub fn count_refs_weighted(node: &Node, scope: &ArgScope, loop_weight: usize) -> usize {
    let mut v = CountRefs {
        kernel: Kernel::new(),
        scope,
        weight: loop_weight,
        total: 0,
    };
    let _ = walk(&mut v, node);
    v.total
}

struct AnyRefs<'a> {
    kernel: Kernel,
    targets: Targets<'a>,
}

impl Visitor for AnyRefs<'_> {
    fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    fn kernel_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }

    fn pre_visit(&mut self, node: &Node) -> ControlFlow<(), WalkAction> {
        if may_reference(node) {
            ControlFlow::Continue(WalkAction::Advance)
        } else {
            ControlFlow::Continue(WalkAction::Skip)
        }
    }

    fn visit_scope_ref(
        &mut self,
        _node: &Node,
        scope: &ArgScope,
        _pushed: Option<&PushedScope>,
    ) -> ControlFlow<()> {
        if self.targets.contains(scope) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}

/// Whether `node` references `scope`.
pub fn any_refs(node: &Node, scope: &ArgScope) -> bool {
    let mut v = AnyRefs {
        kernel: Kernel::new(),
        targets: Targets::One(scope),
    };
    walk(&mut v, node).is_break()
}

/// Whether `node` references any scope in `scopes`.
pub fn any_refs_in(node: &Node, scopes: &FxHashSet<ArgScope>) -> bool {
    if scopes.is_empty() {
        return false;
    }
    let mut v = AnyRefs {
        kernel: Kernel::new(),
        targets: Targets::Set(scopes),
    };
    walk(&mut v, node).is_break()
}
