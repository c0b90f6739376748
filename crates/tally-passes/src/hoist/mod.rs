//! Loop-invariant expression hoisting.
//!
//! Moves sub-expressions that do not depend on the per-element scopes of an
//! enclosing loop out of that loop, binding each once in a `With` placed
//! just outside the outermost loop it does not depend on. Every former
//! occurrence becomes a reference to the new scope.
//!
//! The pass walks the tree once, bottom-up. Every child slot that declares
//! scopes opens a *level*: a place where hoisted values can be bound,
//! wrapping that slot's child. Level 0 wraps the whole tree. A node's
//! destination is the level just outside the first enclosing loop level
//! whose scopes (and all deeper ones) it does not reference.
//!
//! Nodes containing effects (volatile or procedure calls), errors, missing
//! values or namespace markers are never moved nor shared. Cheap nodes are
//! never bound on their own, but may be part of a larger hoisted group.
//!
//! Variadic operators regroup their hoistable operands according to their
//! algebra (see [`VariadicFamily`](tally_bound::VariadicFamily)):
//! commutative operators gather all of them per destination, associative
//! ones only a leading run, ordered ones any contiguous run, and the rest
//! hoist operands one by one.

mod info;
mod variadic;

#[cfg(test)]
mod tests;

use serde::Deserialize;
use tally_bound::{
    ArgScope, BitSet, Kernel, Node, NodeBody, NodeKind, NodeVec, NoopHost, ReduceHost, ScopeKind,
    SlotFrame,
};

use info::HoistInfo;

/// Configuration for loop-invariant hoisting.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HoistConfig {
    /// Reuse an equivalent binding already hoisted to the same level.
    /// Default: true.
    pub dedup: bool,
    /// Regroup variadic operands by operator algebra; when false every
    /// variadic operand is hoisted individually. Default: true.
    pub group_variadics: bool,
    /// Trees deeper than this are returned unchanged. The walk recurses once
    /// per level, so this also bounds its stack use. Default: 256.
    pub max_depth: usize,
}

impl Default for HoistConfig {
    fn default() -> Self {
        Self {
            dedup: true,
            group_variadics: true,
            max_depth: 256,
        }
    }
}

/// Result of running the hoisting pass.
#[derive(Debug)]
pub struct HoistResult {
    /// The rewritten root; the input itself when nothing was hoisted.
    pub node: Node,
    pub changed: bool,
    /// Number of new bindings introduced.
    pub hoisted: usize,
    /// Number of hoisted expressions that reused an equivalent binding.
    pub deduplicated: usize,
    /// Advisory messages; the tree is still valid when non-empty.
    pub warnings: Vec<String>,
}

/// Hoist loop-invariant expressions using default configuration.
pub fn hoist(node: &Node) -> HoistResult {
    hoist_with_config(node, &HoistConfig::default())
}

/// Hoist loop-invariant expressions with custom configuration.
pub fn hoist_with_config(node: &Node, config: &HoistConfig) -> HoistResult {
    hoist_with_host(node, config, &mut NoopHost)
}

/// Hoist loop-invariant expressions, reporting each hoisted expression to
/// `host` through [`ReduceHost::associate`] and warnings through
/// [`ReduceHost::warn`].
pub fn hoist_with_host(
    node: &Node,
    config: &HoistConfig,
    host: &mut dyn ReduceHost,
) -> HoistResult {
    let mut warnings = Vec::new();
    if exceeds_depth(node, config.max_depth) {
        let message = format!(
            "expression nesting exceeds {} levels; hoisting skipped",
            config.max_depth
        );
        tracing::warn!(max_depth = config.max_depth, "{message}");
        host.warn(node, &message);
        warnings.push(message);
        return HoistResult {
            node: node.clone(),
            changed: false,
            hoisted: 0,
            deduplicated: 0,
            warnings,
        };
    }

    let mut hoister = Hoister {
        kernel: Kernel::new(),
        levels: vec![Level {
            start: 0,
            is_loop: false,
            bindings: Vec::new(),
        }],
        loop_levels: Vec::new(),
        config,
        host,
        hoisted: 0,
        deduplicated: 0,
    };
    let info = hoister.visit(node);
    let root = hoister.levels.pop().map(|l| l.bindings).unwrap_or_default();
    debug_assert!(hoister.levels.is_empty(), "hoist: unbalanced levels");
    let result = if root.is_empty() {
        info.node
    } else {
        Node::with(root, info.node)
    };

    let changed = !result.ptr_eq(node);
    if changed {
        tracing::debug!(
            hoisted = hoister.hoisted,
            deduplicated = hoister.deduplicated,
            "hoisted loop-invariant expressions"
        );
    }
    HoistResult {
        node: result,
        changed,
        hoisted: hoister.hoisted,
        deduplicated: hoister.deduplicated,
        warnings,
    }
}

fn exceeds_depth(root: &Node, max_depth: usize) -> bool {
    let mut stack = vec![(root, 1usize)];
    while let Some((node, depth)) = stack.pop() {
        if depth > max_depth {
            return true;
        }
        stack.extend(node.children().into_iter().map(|c| (c, depth + 1)));
    }
    false
}

// =========================================================================
// Hoister
// =========================================================================

/// A place where hoisted values can be bound.
struct Level {
    /// Kernel stack position of the first scope of the slot that opened it.
    start: usize,
    is_loop: bool,
    bindings: Vec<(ArgScope, Node)>,
}

/// A processed child together with how its slot relates to the parent.
struct SlotInfo {
    info: HoistInfo,
    /// The parent declares scopes visible in this slot.
    scoped: bool,
    /// The child references a scope its own slot declares.
    uses_own: bool,
    /// The slot is re-evaluated per element.
    loop_slot: bool,
}

struct Hoister<'a> {
    kernel: Kernel,
    levels: Vec<Level>,
    /// Indices into `levels` of the loop levels, increasing.
    loop_levels: Vec<usize>,
    config: &'a HoistConfig,
    host: &'a mut dyn ReduceHost,
    hoisted: usize,
    deduplicated: usize,
}

impl Hoister<'_> {
    fn current(&self) -> usize {
        self.levels.len() - 1
    }

    /// Level just outside the outermost loop whose scopes `scopes` does not
    /// reference, or the current level.
    fn dest(&self, scopes: &BitSet) -> usize {
        let need = scopes.max().map_or(0, |m| m + 1);
        let pos = self
            .loop_levels
            .partition_point(|&l| self.levels[l].start < need);
        match self.loop_levels.get(pos) {
            Some(&level) => level - 1,
            None => self.current(),
        }
    }

    fn push_level(&mut self, frame: &SlotFrame) {
        if frame.is_loop {
            self.loop_levels.push(self.levels.len());
        }
        self.levels.push(Level {
            start: frame.start,
            is_loop: frame.is_loop,
            bindings: Vec::new(),
        });
    }

    fn pop_level(&mut self) -> Vec<(ArgScope, Node)> {
        debug_assert!(self.levels.len() > 1, "hoist: popped the root level");
        match self.levels.pop() {
            Some(level) => {
                if level.is_loop {
                    self.loop_levels.pop();
                }
                level.bindings
            }
            None => Vec::new(),
        }
    }

    /// Bind `value` at level `dest`, or reuse an equivalent binding there,
    /// and return the reference standing for it.
    fn materialize(&mut self, value: &Node, dest: usize) -> Node {
        debug_assert!(!value.has_effects(), "hoist: effectful value {value}");
        let bindings = &mut self.levels[dest].bindings;
        if self.config.dedup
            && let Some((scope, _)) = bindings.iter().find(|(_, v)| v.equivalent(value))
        {
            let reference = Node::scope_ref(scope);
            self.deduplicated += 1;
            tracing::trace!(%value, dest, "reused hoisted binding");
            self.host.associate(value, &reference);
            return reference;
        }
        let scope = ArgScope::new(ScopeKind::With, value.ty().clone());
        bindings.push((scope.clone(), value.clone()));
        let reference = Node::scope_ref(&scope);
        self.hoisted += 1;
        tracing::debug!(%value, dest, "hoisted expression");
        self.host.associate(value, &reference);
        reference
    }

    /// Hoist `info` on its own to its destination.
    fn hoist_single(&mut self, info: HoistInfo) -> HoistInfo {
        let reference = self.materialize(&info.node, info.dest);
        info.into_ref(reference)
    }

    /// The rule shared by every operand that is not regrouped.
    fn hoist_individually(&mut self, info: HoistInfo, parent_dest: usize) -> HoistInfo {
        if !info.prohibit && !info.inhibit && info.dest < parent_dest {
            self.hoist_single(info)
        } else {
            info
        }
    }

    fn visit(&mut self, node: &Node) -> HoistInfo {
        let idx = self.kernel.enter_node(node);
        let info = self.visit_inner(node, idx);
        self.kernel.leave_node();
        info
    }

    fn visit_inner(&mut self, node: &Node, idx: usize) -> HoistInfo {
        // Erroneous subtrees are carried through untouched.
        if node.all_kinds().contains(NodeKind::Error) {
            let scopes = self.active_refs(node);
            return HoistInfo::kept(node, scopes, self.current(), true);
        }
        match node.body() {
            NodeBody::ScopeRef(scope) => {
                let scopes: BitSet = self.kernel.position(scope).into_iter().collect();
                let dest = self.dest(&scopes);
                return HoistInfo::kept(node, scopes, dest, false);
            }
            NodeBody::Missing | NodeBody::Namespace(_) => {
                return HoistInfo::kept(node, BitSet::new(), self.current(), true);
            }
            _ if node.kind().is_leaf() => {
                let scopes = BitSet::new();
                let dest = self.dest(&scopes);
                return HoistInfo::kept(node, scopes, dest, false);
            }
            _ => {}
        }

        let children = node.children();
        let mut slots = Vec::with_capacity(children.len());
        for (slot, child) in children.into_iter().enumerate() {
            let frame = self.kernel.enter_slot(node, idx, slot);
            if frame.is_empty() {
                let info = self.visit(child);
                self.kernel.exit_slot(frame);
                slots.push(SlotInfo {
                    info,
                    scoped: false,
                    uses_own: false,
                    loop_slot: false,
                });
                continue;
            }

            self.push_level(&frame);
            let mut info = self.visit(child);
            let bindings = self.pop_level();
            if !bindings.is_empty() {
                info.node = Node::with(bindings, info.node);
                info.changed = true;
            }
            let uses_own = info.scopes.any_from(frame.start);
            info.scopes.clear_from(frame.start);
            self.kernel.exit_slot(frame);
            info.dest = self.dest(&info.scopes);
            slots.push(SlotInfo {
                info,
                scoped: true,
                uses_own,
                loop_slot: frame.is_loop,
            });
        }

        let mut scopes = BitSet::new();
        let mut prohibit = node.has_effects();
        for slot in &slots {
            scopes.union_with(&slot.info.scopes);
            prohibit |= slot.info.prohibit;
        }
        let dest = if prohibit {
            self.current()
        } else {
            self.dest(&scopes)
        };

        if let NodeBody::Variadic { op, inverted, .. } = node.body()
            && self.config.group_variadics
        {
            let infos = slots.into_iter().map(|s| s.info).collect();
            let rebuilt = self.hoist_variadic(node, *op, inverted, infos, dest);
            return HoistInfo {
                changed: !rebuilt.ptr_eq(node),
                node: rebuilt,
                scopes,
                dest,
                prohibit,
                inhibit: node.is_cheap(),
            };
        }

        let mut changed = false;
        let mut rebuilt = NodeVec::with_capacity(slots.len());
        for slot in slots {
            let info = self.hoist_child(slot, dest);
            changed |= info.changed;
            rebuilt.push(info.node);
        }
        let new_node = if changed {
            node.with_children(rebuilt)
        } else {
            node.clone()
        };
        HoistInfo {
            node: new_node,
            scopes,
            changed,
            dest,
            prohibit,
            inhibit: node.is_cheap(),
        }
    }

    /// Generic per-child rule of non-variadic nodes.
    fn hoist_child(&mut self, slot: SlotInfo, parent_dest: usize) -> HoistInfo {
        let SlotInfo {
            info,
            scoped,
            uses_own,
            loop_slot,
        } = slot;
        if info.prohibit || info.inhibit || (scoped && uses_own) {
            return info;
        }
        // A loop body that ignores its own item is invariant even when the
        // loop itself cannot move.
        if info.dest < parent_dest || (loop_slot && !uses_own) {
            tracing::trace!(node = %info.node, dest = info.dest, "hoisting child");
            return self.hoist_single(info);
        }
        info
    }

    /// Positions of the active scopes referenced anywhere under `node`.
    fn active_refs(&self, node: &Node) -> BitSet {
        let mut scopes = BitSet::new();
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            if !node.all_kinds().contains(NodeKind::ScopeRef) {
                continue;
            }
            if let Some(position) = node.as_scope_ref().and_then(|s| self.kernel.position(s)) {
                scopes.insert(position);
            }
            stack.extend(node.children());
        }
        scopes
    }
}
