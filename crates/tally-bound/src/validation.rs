//! Structural validation of bound trees.
//!
//! Constructors only check shapes with debug assertions, and passes trust
//! their input. `validate` re-checks the model invariants over a whole tree
//! so tests and debug pipelines can catch a broken rewrite at the pass that
//! produced it rather than in a later consumer.

use std::ops::ControlFlow;

use derive_more::{Display, Error};
use rustc_hash::FxHashSet;

use crate::kind::NodeKind;
use crate::node::{Clause, Node, NodeBody};
use crate::ops::VariadicOp;
use crate::scope::ArgScope;
use crate::types::DType;
use crate::visit::{Kernel, PushedScope, Visitor, WalkAction, walk};

/// First invariant violation found in a tree.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum ValidationError {
    #[display("scope {scope} is declared twice")]
    DuplicateDecl { scope: ArgScope },
    #[display("scope {scope} is referenced outside its declaration")]
    UnboundScope { scope: ArgScope },
    #[display("scope {scope} is referenced with type {found}")]
    ScopeTypeMismatch { scope: ArgScope, found: DType },
    #[display("{kind} child {slot} has type {found}, expected {expected}")]
    ChildType {
        kind: NodeKind,
        slot: usize,
        expected: DType,
        found: DType,
    },
    #[display("{op:?} over {ty} has invalid inverted operands")]
    InvalidInverted { op: VariadicOp, ty: DType },
    #[display("{kind} has {found} operands, expected {expected}")]
    Arity {
        kind: NodeKind,
        expected: usize,
        found: usize,
    },
    #[display("slice shapes are malformed or do not match their values")]
    SliceShape,
}

struct Validator<'a> {
    kernel: Kernel,
    free: &'a [ArgScope],
    declared: FxHashSet<ArgScope>,
    error: Option<ValidationError>,
}

impl Validator<'_> {
    fn fail(&mut self, error: ValidationError) -> ControlFlow<(), WalkAction> {
        self.error = Some(error);
        ControlFlow::Break(())
    }
}

fn child_type(
    kind: NodeKind,
    slot: usize,
    expected: &DType,
    child: &Node,
) -> Result<(), ValidationError> {
    if child.ty() == expected {
        Ok(())
    } else {
        Err(ValidationError::ChildType {
            kind,
            slot,
            expected: expected.clone(),
            found: child.ty().clone(),
        })
    }
}

fn clause_arity(kind: NodeKind, clause: &Clause) -> Result<(), ValidationError> {
    if clause.names.len() == clause.values.len() {
        Ok(())
    } else {
        Err(ValidationError::Arity {
            kind,
            expected: clause.names.len(),
            found: clause.values.len(),
        })
    }
}

/// Checks local to one node: operand counts and child types.
fn check_shape(node: &Node) -> Result<(), ValidationError> {
    let kind = node.kind();
    match node.body() {
        NodeBody::Compare { ops, args } => {
            if ops.len() + 1 != args.len() {
                return Err(ValidationError::Arity {
                    kind,
                    expected: ops.len() + 1,
                    found: args.len(),
                });
            }
        }
        NodeBody::Variadic { op, args, inverted } => {
            if args.len() < 2 {
                return Err(ValidationError::Arity {
                    kind,
                    expected: 2,
                    found: args.len(),
                });
            }
            let bad_bits = !inverted.is_empty() && !op.allows_inverted(node.ty());
            if bad_bits || inverted.max().is_some_and(|m| m >= args.len()) {
                return Err(ValidationError::InvalidInverted {
                    op: *op,
                    ty: node.ty().clone(),
                });
            }
            if op.is_homogeneous() {
                for (slot, arg) in args.iter().enumerate() {
                    child_type(kind, slot, node.ty(), arg)?;
                }
            }
        }
        NodeBody::Record(clause) => clause_arity(kind, clause)?,
        NodeBody::If { cond, then, els } => {
            child_type(kind, 0, &DType::Bool, cond)?;
            child_type(kind, 1, node.ty(), then)?;
            child_type(kind, 2, node.ty(), els)?;
        }
        NodeBody::Slice { shapes, values, .. } => {
            let count: usize = shapes.iter().map(|s| s.value_count()).sum();
            if count != values.len() || !shapes.iter().all(|s| s.is_valid()) {
                return Err(ValidationError::SliceShape);
            }
        }
        NodeBody::Call { args, scopes, .. } => {
            if let Some(cs) = scopes.iter().find(|cs| cs.slot >= args.len()) {
                return Err(ValidationError::Arity {
                    kind,
                    expected: cs.slot + 1,
                    found: args.len(),
                });
            }
        }
        NodeBody::With {
            scopes,
            values,
            body,
        } => {
            if scopes.len() != values.len() {
                return Err(ValidationError::Arity {
                    kind,
                    expected: scopes.len(),
                    found: values.len(),
                });
            }
            for (slot, (scope, value)) in scopes.iter().zip(values.iter()).enumerate() {
                child_type(kind, slot, scope.ty(), value)?;
            }
            child_type(kind, values.len(), node.ty(), body)?;
        }
        NodeBody::GroupBy(g) => {
            clause_arity(kind, &g.keys)?;
            clause_arity(kind, &g.maps)?;
            clause_arity(kind, &g.aggs)?;
        }
        NodeBody::SetFields { adds, .. } => clause_arity(kind, adds)?,
        NodeBody::ModuleProjection { record, .. } => child_type(kind, 1, node.ty(), record)?,
        _ => {}
    }
    Ok(())
}

impl Visitor for Validator<'_> {
    fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    fn kernel_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }

    fn pre_visit(&mut self, node: &Node) -> ControlFlow<(), WalkAction> {
        for decl in node.scope_decls() {
            if self.free.contains(&decl.scope) || !self.declared.insert(decl.scope.clone()) {
                return self.fail(ValidationError::DuplicateDecl { scope: decl.scope });
            }
        }
        if let NodeBody::ScopeRef(scope) = node.body()
            && node.ty() != scope.ty()
        {
            return self.fail(ValidationError::ScopeTypeMismatch {
                scope: scope.clone(),
                found: node.ty().clone(),
            });
        }
        match check_shape(node) {
            Ok(()) => ControlFlow::Continue(WalkAction::Advance),
            Err(error) => self.fail(error),
        }
    }

    fn visit_scope_ref(
        &mut self,
        _node: &Node,
        scope: &ArgScope,
        pushed: Option<&PushedScope>,
    ) -> ControlFlow<()> {
        if pushed.is_none() && !self.free.contains(scope) {
            self.error = Some(ValidationError::UnboundScope {
                scope: scope.clone(),
            });
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

/// Check the model invariants of the tree under `root`.
///
/// Every scope reference must be active at its position or listed in
/// `free_scopes`; no scope may be declared twice, nor declared while free.
pub fn validate(root: &Node, free_scopes: &[ArgScope]) -> Result<(), ValidationError> {
    let mut v = Validator {
        kernel: Kernel::new(),
        free: free_scopes,
        declared: FxHashSet::default(),
        error: None,
    };
    let _ = walk(&mut v, root);
    match v.error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
