//! Traversal kernel.
//!
//! [`Kernel`] is the scratch state shared by every pass that walks a bound
//! tree: a pre-order node counter, the stack of active scopes, the stack of
//! active loop groups and the stack of ancestors. Passes drive it either
//! through [`walk`] with a [`Visitor`], or directly (the reducer and the
//! hoisting optimizer do their own recursion and only call
//! [`Kernel::enter_node`] and [`Kernel::enter_slot`] around each step).
//!
//! Scopes are pushed as a batch around each child slot in which they are
//! visible. A batch that contains a loop scope forms a loop group; loop
//! groups nest, so their start positions strictly increase along the stack.
//!
//! # Example
//!
//! ```
//! use std::ops::ControlFlow;
//! use tally_bound::{Kernel, Node, Visitor, WalkAction, walk};
//!
//! struct CountNodes {
//!     kernel: Kernel,
//!     count: usize,
//! }
//!
//! impl Visitor for CountNodes {
//!     fn kernel(&self) -> &Kernel {
//!         &self.kernel
//!     }
//!     fn kernel_mut(&mut self) -> &mut Kernel {
//!         &mut self.kernel
//!     }
//!     fn pre_visit(&mut self, _node: &Node) -> ControlFlow<(), WalkAction> {
//!         self.count += 1;
//!         ControlFlow::Continue(WalkAction::Advance)
//!     }
//! }
//!
//! let mut v = CountNodes { kernel: Kernel::new(), count: 0 };
//! let _ = walk(&mut v, &Node::int(1));
//! assert_eq!(v.count, 1);
//! ```

use std::ops::ControlFlow;

use rustc_hash::FxHashMap;

use crate::node::{Node, NodeBody};
use crate::scope::ArgScope;

/// Controls whether to descend into children during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    /// Continue walking and descend into children.
    Advance,
    /// Skip the children of the current node.
    Skip,
}

/// An active scope on the kernel's stack.
#[derive(Clone, Debug)]
pub struct PushedScope {
    pub scope: ArgScope,
    /// The declaring owner node.
    pub owner: Node,
    /// Pre-order index of the owner.
    pub idx: usize,
    /// Slot of the owner in which the scope is visible.
    pub slot: usize,
    /// Tree depth of the owner when the scope was pushed.
    pub depth: usize,
}

/// A batch of scopes containing at least one loop scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopGroup {
    /// Stack position of the first scope of the batch.
    pub start: usize,
    /// Pre-order index of the owner.
    pub owner_idx: usize,
}

/// Scopes pushed for one child slot; hand back to [`Kernel::exit_slot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use]
pub struct SlotFrame {
    /// Stack position of the first pushed scope.
    pub start: usize,
    /// Stack position one past the last pushed scope.
    pub end: usize,
    /// Whether the batch formed a loop group.
    pub is_loop: bool,
}

impl SlotFrame {
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Default)]
pub struct Kernel {
    next_idx: usize,
    scopes: Vec<PushedScope>,
    active: FxHashMap<ArgScope, usize>,
    loops: Vec<LoopGroup>,
    parents: Vec<Node>,
}

impl Kernel {
    pub fn new() -> Self {
        Self::default()
    }

    // === Node stack ===

    /// Assign the next pre-order index to `node` and make it the innermost
    /// ancestor.
    pub fn enter_node(&mut self, node: &Node) -> usize {
        let idx = self.next_idx;
        self.next_idx += 1;
        self.parents.push(node.clone());
        idx
    }

    pub fn leave_node(&mut self) {
        let popped = self.parents.pop();
        debug_assert!(popped.is_some(), "leave_node without enter_node");
    }

    /// Number of nodes visited so far.
    pub fn visited(&self) -> usize {
        self.next_idx
    }

    /// Depth of the node currently being visited (the root is 1).
    pub fn depth(&self) -> usize {
        self.parents.len()
    }

    /// Parent of the node currently being visited.
    pub fn parent(&self) -> Option<&Node> {
        self.parents.iter().rev().nth(1)
    }

    /// Ancestors of the current node, innermost first, the node included.
    pub fn ancestors(&self) -> impl Iterator<Item = &Node> {
        self.parents.iter().rev()
    }

    // === Scope stack ===

    pub fn push_scope(&mut self, scope: &ArgScope, owner: &Node, idx: usize, slot: usize) {
        let position = self.scopes.len();
        let previous = self.active.insert(scope.clone(), position);
        debug_assert!(previous.is_none(), "scope {scope} pushed while active");
        self.scopes.push(PushedScope {
            scope: scope.clone(),
            owner: owner.clone(),
            idx,
            slot,
            depth: self.parents.len(),
        });
    }

    pub fn pop_scope(&mut self, scope: &ArgScope) {
        let top = self.scopes.pop();
        debug_assert!(
            top.as_ref().is_some_and(|p| &p.scope == scope),
            "scope {scope} popped out of order"
        );
        self.active.remove(scope);
    }

    /// Push every scope of `owner` visible in `slot` as one batch.
    pub fn enter_slot(&mut self, owner: &Node, idx: usize, slot: usize) -> SlotFrame {
        let start = self.scopes.len();
        let mut is_loop = false;
        for scope in owner.scopes_visible_at(slot) {
            is_loop |= scope.is_loop();
            self.push_scope(&scope, owner, idx, slot);
        }
        if is_loop {
            debug_assert!(self.loops.last().is_none_or(|g| g.start < start));
            self.loops.push(LoopGroup {
                start,
                owner_idx: idx,
            });
        }
        SlotFrame {
            start,
            end: self.scopes.len(),
            is_loop,
        }
    }

    pub fn exit_slot(&mut self, frame: SlotFrame) {
        if frame.is_loop {
            let group = self.loops.pop();
            debug_assert_eq!(group.map(|g| g.start), Some(frame.start));
        }
        for position in (frame.start..frame.end).rev() {
            let scope = self.scopes[position].scope.clone();
            self.pop_scope(&scope);
        }
    }

    /// The active declaration of `scope`, if it is pushed.
    pub fn lookup(&self, scope: &ArgScope) -> Option<&PushedScope> {
        self.active.get(scope).map(|&p| &self.scopes[p])
    }

    /// Stack position of an active scope.
    pub fn position(&self, scope: &ArgScope) -> Option<usize> {
        self.active.get(scope).copied()
    }

    pub fn is_active(&self, scope: &ArgScope) -> bool {
        self.active.contains_key(scope)
    }

    pub fn scopes(&self) -> &[PushedScope] {
        &self.scopes
    }

    // === Loop groups ===

    pub fn loop_groups(&self) -> &[LoopGroup] {
        &self.loops
    }

    pub fn in_loop(&self) -> bool {
        !self.loops.is_empty()
    }

    /// Number of loop groups starting at or above stack position `start`.
    pub fn loops_from(&self, start: usize) -> usize {
        let first = self.loops.partition_point(|g| g.start < start);
        self.loops.len() - first
    }
}

/// Per-node hooks of a read-only traversal.
pub trait Visitor {
    fn kernel(&self) -> &Kernel;

    fn kernel_mut(&mut self) -> &mut Kernel;

    /// Called before the children. `Skip` leaves the subtree unvisited.
    fn pre_visit(&mut self, _node: &Node) -> ControlFlow<(), WalkAction> {
        ControlFlow::Continue(WalkAction::Advance)
    }

    /// Called after the children.
    fn post_visit(&mut self, _node: &Node) {}

    /// Called for each `ScopeRef`; `pushed` is `None` for a reference to a
    /// scope declared outside the walked tree.
    fn visit_scope_ref(
        &mut self,
        _node: &Node,
        _scope: &ArgScope,
        _pushed: Option<&PushedScope>,
    ) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

/// Walk `node` depth-first, maintaining the visitor's kernel.
pub fn walk<V: Visitor + ?Sized>(v: &mut V, node: &Node) -> ControlFlow<()> {
    let idx = v.kernel_mut().enter_node(node);
    let result = walk_inner(v, node, idx);
    v.kernel_mut().leave_node();
    result
}

fn walk_inner<V: Visitor + ?Sized>(v: &mut V, node: &Node, idx: usize) -> ControlFlow<()> {
    if let WalkAction::Skip = v.pre_visit(node)? {
        return ControlFlow::Continue(());
    }
    if let NodeBody::ScopeRef(scope) = node.body() {
        let pushed = v.kernel().lookup(scope).cloned();
        v.visit_scope_ref(node, scope, pushed.as_ref())?;
    }
    for (slot, child) in node.children().into_iter().enumerate() {
        let frame = v.kernel_mut().enter_slot(node, idx, slot);
        let result = walk(v, child);
        v.kernel_mut().exit_slot(frame);
        result?;
    }
    v.post_visit(node);
    ControlFlow::Continue(())
}
