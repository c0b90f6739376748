//! Callbacks a host receives while a tree is rewritten.

use crate::node::Node;

/// Host-side hooks invoked by rewriting passes.
///
/// The binder uses `on_mapped` and `associate` to keep its source-to-node
/// map pointing at the right nodes after a rewrite. All hooks are no-ops by
/// default.
pub trait ReduceHost {
    /// `old` was rewritten into `new`.
    fn on_mapped(&mut self, _old: &Node, _new: &Node) {}

    /// `new` stands for `old` in the rewritten tree without being a rewrite
    /// of it, e.g. a scope reference replacing a hoisted expression.
    fn associate(&mut self, _old: &Node, _new: &Node) {}

    /// Non-fatal advisory diagnostic about `node`.
    fn warn(&mut self, _node: &Node, _message: &str) {}
}

/// Host that ignores every callback.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHost;

impl ReduceHost for NoopHost {}

impl<H: ReduceHost + ?Sized> ReduceHost for &mut H {
    fn on_mapped(&mut self, old: &Node, new: &Node) {
        (**self).on_mapped(old, new);
    }

    fn associate(&mut self, old: &Node, new: &Node) {
        (**self).associate(old, new);
    }

    fn warn(&mut self, node: &Node, message: &str) {
        (**self).warn(node, message);
    }
}

/// Host that collects warnings and ignores mappings.
#[derive(Clone, Debug, Default)]
pub struct Warnings {
    pub messages: Vec<String>,
}

impl ReduceHost for Warnings {
    fn warn(&mut self, _node: &Node, message: &str) {
        self.messages.push(message.to_owned());
    }
}
