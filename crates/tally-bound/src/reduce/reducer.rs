//! The reduction driver.

use rustc_hash::FxHashMap;

use crate::NodeVec;
use crate::node::Node;
use crate::reduce::{NoopHost, ReduceAction, ReduceCx, ReduceHost, ReduceRule};
use crate::visit::Kernel;

/// Result of running a reducer over a tree.
#[derive(Debug)]
pub struct ReduceResult {
    /// The rewritten root.
    pub node: Node,
    /// Whether the root differs from the input.
    pub changed: bool,
    /// Number of nodes that were replaced or rebuilt.
    pub rewritten: usize,
}

/// Bottom-up rewriter applying a [`ReduceRule`].
pub struct Reducer<R, H: ReduceHost = NoopHost> {
    rule: R,
    host: H,
    kernel: Kernel,
    /// Original node address to (original, result). The original is kept
    /// alive so its address cannot be reused within the pass.
    memo: Option<FxHashMap<usize, (Node, Node)>>,
    rewritten: usize,
}

impl<R: ReduceRule> Reducer<R, NoopHost> {
    pub fn new(rule: R) -> Self {
        Reducer::with_host(rule, NoopHost)
    }
}

impl<R: ReduceRule, H: ReduceHost> Reducer<R, H> {
    pub fn with_host(rule: R, host: H) -> Self {
        Reducer {
            rule,
            host,
            kernel: Kernel::new(),
            memo: None,
            rewritten: 0,
        }
    }

    /// Rewrite each distinct node identity only once.
    pub fn memoized(mut self) -> Self {
        self.memo = Some(FxHashMap::default());
        self
    }

    pub fn rule(&self) -> &R {
        &self.rule
    }

    pub fn into_parts(self) -> (R, H) {
        (self.rule, self.host)
    }

    /// Reduce a whole tree.
    pub fn run(&mut self, root: &Node) -> ReduceResult {
        let before = self.rewritten;
        let node = self.reduce(root);
        let changed = !node.ptr_eq(root);
        if changed {
            tracing::trace!(rewritten = self.rewritten - before, "reduced tree");
        }
        ReduceResult {
            node,
            changed,
            rewritten: self.rewritten - before,
        }
    }

    /// Reduce `node` and its subtree.
    pub fn reduce(&mut self, node: &Node) -> Node {
        if let Some(memo) = &self.memo
            && let Some((_, reduced)) = memo.get(&node.addr())
        {
            return reduced.clone();
        }

        let idx = self.kernel.enter_node(node);
        let reduced = self.reduce_inner(node, idx);
        self.kernel.leave_node();

        debug_assert_eq!(
            reduced.ty(),
            node.ty(),
            "reduction changed the type of {:?}",
            node.kind()
        );
        if !reduced.ptr_eq(node) {
            self.rewritten += 1;
            self.host.on_mapped(node, &reduced);
        }
        if let Some(memo) = &mut self.memo {
            memo.insert(node.addr(), (node.clone(), reduced.clone()));
        }
        reduced
    }

    fn reduce_inner(&mut self, node: &Node, idx: usize) -> Node {
        let action = {
            let mut cx = ReduceCx {
                kernel: &self.kernel,
                host: &mut self.host,
            };
            self.rule.pre_reduce(node, &mut cx)
        };
        match action {
            ReduceAction::Skip => return node.clone(),
            ReduceAction::Replace(replacement) => return replacement,
            ReduceAction::Descend => {}
        }

        let children = node.children();
        let mut reduced = NodeVec::with_capacity(children.len());
        let mut changed = false;
        for (slot, child) in children.into_iter().enumerate() {
            let frame = self.kernel.enter_slot(node, idx, slot);
            let new_child = self.reduce(child);
            self.kernel.exit_slot(frame);
            changed |= !new_child.ptr_eq(child);
            reduced.push(new_child);
        }
        let rebuilt = if changed {
            node.with_children(reduced)
        } else {
            node.clone()
        };

        let mut cx = ReduceCx {
            kernel: &self.kernel,
            host: &mut self.host,
        };
        self.rule.post_reduce(node, rebuilt, &mut cx)
    }
}
