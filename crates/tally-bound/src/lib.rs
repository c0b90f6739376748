//! Tally bound tree crate.
//!
//! The bound tree is the fully type-checked expression tree produced by the
//! binder. This crate provides the immutable node model, the traversal kernel
//! every pass is built on, the bottom-up reduction framework, and the scope
//! substitution utilities used both by hosts and by the optimizer.

// === Data model ===
pub mod bitset;
pub mod kind;
pub mod node;
pub mod ops;
pub mod scope;
pub mod types;

// === Tree infrastructure ===
pub mod printer;
pub mod reduce;
pub mod subst;
pub mod typesvc;
pub mod validation;
pub mod visit;

// Re-export smallvec for external crates building child lists
pub use smallvec;

pub use bitset::BitSet;
pub use kind::{KindMask, NodeKind};
pub use node::{CallScope, Clause, GroupBy, Node, NodeBody, ScopeDecl, Value};
pub use ops::{
    BinaryOp, CastOp, CompareOp, Func, FuncFlags, FuncRef, SliceShape, UnaryOp, VariadicFamily,
    VariadicOp,
};
pub use reduce::{
    NoopHost, ReduceAction, ReduceCx, ReduceHost, ReduceResult, ReduceRule, Reducer, Warnings,
};
pub use scope::{ArgScope, ScopeKind};
pub use types::{DType, FloatBits, Name};
pub use typesvc::{BasicTypeService, CastError, TypeService};
pub use validation::{ValidationError, validate};
pub use visit::{Kernel, LoopGroup, PushedScope, SlotFrame, Visitor, WalkAction, walk};

/// Small vector for child lists.
pub type NodeVec = smallvec::SmallVec<[Node; 4]>;
pub use smallvec::smallvec as nodevec;
