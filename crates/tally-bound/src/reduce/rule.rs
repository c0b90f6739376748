//! Rules driven by the reducer.

use crate::node::Node;
use crate::reduce::ReduceHost;
use crate::visit::Kernel;

/// What to do with a node before its children are reduced.
#[derive(Debug)]
pub enum ReduceAction {
    /// Reduce the children, then call `post_reduce`.
    Descend,
    /// Keep the node and its subtree unchanged.
    Skip,
    /// Use the given node instead; its subtree is not visited.
    Replace(Node),
}

/// Context handed to rules: the traversal state and the host.
pub struct ReduceCx<'a> {
    pub kernel: &'a Kernel,
    pub host: &'a mut dyn ReduceHost,
}

/// A kind-specific rewrite applied by a [`Reducer`](super::Reducer).
pub trait ReduceRule {
    fn pre_reduce(&mut self, _node: &Node, _cx: &mut ReduceCx<'_>) -> ReduceAction {
        ReduceAction::Descend
    }

    /// `rebuilt` is `original` with its reduced children, or `original`
    /// itself when no child changed.
    fn post_reduce(&mut self, _original: &Node, rebuilt: Node, _cx: &mut ReduceCx<'_>) -> Node {
        rebuilt
    }
}
