//! Bottom-up rewriting of bound trees with structural sharing.
//!
//! A [`Reducer`] rebuilds a tree from the leaves up. Each node's children are
//! reduced first; if none of them changed, the original node is returned
//! as-is, so an untouched subtree is shared between the input and the output
//! rather than copied. A [`ReduceRule`] decides what happens at each node:
//!
//! - [`ReduceRule::pre_reduce`] runs before descending and may replace the
//!   node outright or skip its subtree (typically by looking at
//!   [`Node::all_kinds`](crate::Node::all_kinds)).
//! - [`ReduceRule::post_reduce`] runs after the children and may replace the
//!   rebuilt node.
//!
//! The framework performs no validation. A rule that changes a node's type is
//! a bug in the rule and trips a debug assertion.
//!
//! # Usage
//!
//! ```
//! use tally_bound::{DType, Node, NodeBody, ReduceCx, ReduceRule, Reducer, Value};
//!
//! /// Replace every integer constant 1 by 2.
//! struct Bump;
//!
//! impl ReduceRule for Bump {
//!     fn post_reduce(&mut self, _original: &Node, rebuilt: Node, _cx: &mut ReduceCx<'_>) -> Node {
//!         match rebuilt.body() {
//!             NodeBody::Const(Value::Int(1)) => Node::int(2),
//!             _ => rebuilt,
//!         }
//!     }
//! }
//!
//! let result = Reducer::new(Bump).run(&Node::int(1));
//! assert!(result.changed);
//! assert_eq!(result.node.to_string(), "2");
//! # let _ = DType::Int;
//! ```

mod host;
mod reducer;
mod rule;

pub use host::{NoopHost, ReduceHost, Warnings};
pub use reducer::{ReduceResult, Reducer};
pub use rule::{ReduceAction, ReduceCx, ReduceRule};
