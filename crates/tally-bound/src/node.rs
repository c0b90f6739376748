//! Bound tree nodes.
//!
//! A [`Node`] is a cheap-to-clone handle to immutable node data. Passes never
//! mutate a node; they build new nodes that share unchanged children with the
//! original. Every node caches the union of the kinds present in its subtree,
//! whether the subtree has effects, and whether it is cheap or constant, so
//! passes can skip subtrees without walking them.
//!
//! # Children and slots
//!
//! `children()` lists the child nodes in a fixed order, and a child's index in
//! that list is its *slot*. Scope owners declare each scope as visible in a
//! contiguous range of slots (see [`ScopeDecl`]):
//!
//! | owner | children | visibility |
//! |---|---|---|
//! | `With` | values, then body | binding *i* in slots *i+1 ..= n* |
//! | `GroupBy` | source, keys, maps, aggs | item over keys and maps, group over aggs |
//! | `SetFields` | source, values | scope over the values |
//! | `ModuleProjection` | module, record | scope over the record |
//! | `Call` | arguments | each scope over its one argument |

use std::fmt;
use std::iter;
use std::ops::Range;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::{SmallVec, smallvec};

use crate::NodeVec;
use crate::bitset::BitSet;
use crate::kind::{KindMask, NodeKind};
use crate::ops::{BinaryOp, CastOp, CompareOp, FuncRef, SliceShape, UnaryOp, VariadicOp};
use crate::scope::ArgScope;
use crate::types::{DType, FloatBits, Name};

// =========================================================================
// Payload types
// =========================================================================

/// Constant value of a `Const` leaf.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(FloatBits),
    Text(Name),
}

impl Value {
    /// Natural type of the constant.
    pub fn ty(&self) -> DType {
        match self {
            Value::Bool(_) => DType::Bool,
            Value::Int(_) => DType::Int,
            Value::Float(_) => DType::R8,
            Value::Text(_) => DType::Text,
        }
    }
}

/// Scope declared by a `Call` over one of its arguments.
#[derive(Clone, Debug)]
pub struct CallScope {
    pub scope: ArgScope,
    /// Companion position scope, declared alongside a sequence item.
    pub index: Option<ArgScope>,
    /// Argument in which the scope is visible.
    pub slot: usize,
}

/// Name-keyed list of child nodes.
#[derive(Clone, Debug, Default)]
pub struct Clause {
    pub names: Arc<[Name]>,
    pub values: NodeVec,
}

impl Clause {
    pub fn new<N: Into<Name>>(entries: impl IntoIterator<Item = (N, Node)>) -> Self {
        let (names, values): (Vec<Name>, NodeVec) =
            entries.into_iter().map(|(n, v)| (n.into(), v)).unzip();
        Clause {
            names: names.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Name, &Node)> {
        self.names.iter().zip(self.values.iter())
    }

    fn field_types(&self) -> impl Iterator<Item = (Name, DType)> + '_ {
        self.entries().map(|(n, v)| (n.clone(), v.ty().clone()))
    }
}

/// Grouping of a sequence by key.
#[derive(Clone, Debug)]
pub struct GroupBy {
    pub source: Node,
    /// Per-row scope, visible in `keys` and `maps`.
    pub item: ArgScope,
    pub keys: Clause,
    pub maps: Clause,
    /// Per-group scope over the mapped rows, visible in `aggs`.
    pub group: ArgScope,
    pub aggs: Clause,
}

/// Body of a bound node.
#[derive(Clone, Debug)]
pub enum NodeBody {
    // === Leaves ===
    Const(Value),
    Default,
    This,
    Error(Name),
    Missing,
    Global(Name),
    FreeVar(Name),
    Namespace(Name),

    ScopeRef(ArgScope),

    // === Operators ===
    Unary {
        op: UnaryOp,
        arg: Node,
    },
    Cast {
        op: CastOp,
        arg: Node,
    },
    Binary {
        op: BinaryOp,
        left: Node,
        right: Node,
    },
    /// Chained comparison `a < b <= c`; `ops.len() + 1 == args.len()`.
    Compare {
        ops: SmallVec<[CompareOp; 2]>,
        args: NodeVec,
    },
    Variadic {
        op: VariadicOp,
        args: NodeVec,
        inverted: BitSet,
    },

    // === Structural ===
    Sequence(NodeVec),
    Tensor(NodeVec),
    Tuple(NodeVec),
    Record(Clause),
    GetField {
        record: Node,
        name: Name,
    },
    GetSlot {
        tuple: Node,
        slot: usize,
    },
    If {
        cond: Node,
        then: Node,
        els: Node,
    },
    /// `values` is the flattened list of present parts of every dimension.
    Slice {
        target: Node,
        shapes: SmallVec<[SliceShape; 2]>,
        values: NodeVec,
    },

    // === Calls and scope owners ===
    Call {
        func: FuncRef,
        args: NodeVec,
        scopes: SmallVec<[CallScope; 1]>,
    },
    With {
        scopes: SmallVec<[ArgScope; 2]>,
        values: NodeVec,
        body: Node,
    },
    GroupBy(Box<GroupBy>),
    SetFields {
        source: Node,
        scope: ArgScope,
        adds: Clause,
    },
    ModuleProjection {
        module: Node,
        scope: ArgScope,
        record: Node,
    },
}

/// Declaration of a scope by an owner node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeDecl {
    pub scope: ArgScope,
    /// First slot in which the scope is visible.
    pub slot: usize,
    /// Slots in which the scope is visible.
    pub visible: Range<usize>,
}

impl ScopeDecl {
    fn new(scope: &ArgScope, visible: Range<usize>) -> Self {
        ScopeDecl {
            scope: scope.clone(),
            slot: visible.start,
            visible,
        }
    }
}

impl NodeBody {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeBody::Const(_) => NodeKind::Const,
            NodeBody::Default => NodeKind::Default,
            NodeBody::This => NodeKind::This,
            NodeBody::Error(_) => NodeKind::Error,
            NodeBody::Missing => NodeKind::Missing,
            NodeBody::Global(_) => NodeKind::Global,
            NodeBody::FreeVar(_) => NodeKind::FreeVar,
            NodeBody::Namespace(_) => NodeKind::Namespace,
            NodeBody::ScopeRef(_) => NodeKind::ScopeRef,
            NodeBody::Unary { .. } => NodeKind::Unary,
            NodeBody::Cast { .. } => NodeKind::Cast,
            NodeBody::Binary { .. } => NodeKind::Binary,
            NodeBody::Compare { .. } => NodeKind::Compare,
            NodeBody::Variadic { .. } => NodeKind::Variadic,
            NodeBody::Sequence(_) => NodeKind::Sequence,
            NodeBody::Tensor(_) => NodeKind::Tensor,
            NodeBody::Tuple(_) => NodeKind::Tuple,
            NodeBody::Record(_) => NodeKind::Record,
            NodeBody::GetField { .. } => NodeKind::GetField,
            NodeBody::GetSlot { .. } => NodeKind::GetSlot,
            NodeBody::If { .. } => NodeKind::If,
            NodeBody::Slice { .. } => NodeKind::Slice,
            NodeBody::Call { .. } => NodeKind::Call,
            NodeBody::With { .. } => NodeKind::With,
            NodeBody::GroupBy(_) => NodeKind::GroupBy,
            NodeBody::SetFields { .. } => NodeKind::SetFields,
            NodeBody::ModuleProjection { .. } => NodeKind::ModuleProjection,
        }
    }

    /// Child nodes in slot order.
    pub fn children(&self) -> SmallVec<[&Node; 4]> {
        match self {
            NodeBody::Const(_)
            | NodeBody::Default
            | NodeBody::This
            | NodeBody::Error(_)
            | NodeBody::Missing
            | NodeBody::Global(_)
            | NodeBody::FreeVar(_)
            | NodeBody::Namespace(_)
            | NodeBody::ScopeRef(_) => SmallVec::new(),
            NodeBody::Unary { arg, .. } | NodeBody::Cast { arg, .. } => smallvec![arg],
            NodeBody::Binary { left, right, .. } => smallvec![left, right],
            NodeBody::Compare { args, .. }
            | NodeBody::Variadic { args, .. }
            | NodeBody::Sequence(args)
            | NodeBody::Tensor(args)
            | NodeBody::Tuple(args)
            | NodeBody::Call { args, .. } => args.iter().collect(),
            NodeBody::Record(clause) => clause.values.iter().collect(),
            NodeBody::GetField { record, .. } => smallvec![record],
            NodeBody::GetSlot { tuple, .. } => smallvec![tuple],
            NodeBody::If { cond, then, els } => smallvec![cond, then, els],
            NodeBody::Slice { target, values, .. } => {
                iter::once(target).chain(values.iter()).collect()
            }
            NodeBody::With { values, body, .. } => {
                values.iter().chain(iter::once(body)).collect()
            }
            NodeBody::GroupBy(g) => iter::once(&g.source)
                .chain(g.keys.values.iter())
                .chain(g.maps.values.iter())
                .chain(g.aggs.values.iter())
                .collect(),
            NodeBody::SetFields { source, adds, .. } => {
                iter::once(source).chain(adds.values.iter()).collect()
            }
            NodeBody::ModuleProjection { module, record, .. } => smallvec![module, record],
        }
    }

    fn children_mut(&mut self) -> SmallVec<[&mut Node; 4]> {
        match self {
            NodeBody::Const(_)
            | NodeBody::Default
            | NodeBody::This
            | NodeBody::Error(_)
            | NodeBody::Missing
            | NodeBody::Global(_)
            | NodeBody::FreeVar(_)
            | NodeBody::Namespace(_)
            | NodeBody::ScopeRef(_) => SmallVec::new(),
            NodeBody::Unary { arg, .. } | NodeBody::Cast { arg, .. } => smallvec![arg],
            NodeBody::Binary { left, right, .. } => smallvec![left, right],
            NodeBody::Compare { args, .. }
            | NodeBody::Variadic { args, .. }
            | NodeBody::Sequence(args)
            | NodeBody::Tensor(args)
            | NodeBody::Tuple(args)
            | NodeBody::Call { args, .. } => args.iter_mut().collect(),
            NodeBody::Record(clause) => clause.values.iter_mut().collect(),
            NodeBody::GetField { record, .. } => smallvec![record],
            NodeBody::GetSlot { tuple, .. } => smallvec![tuple],
            NodeBody::If { cond, then, els } => smallvec![cond, then, els],
            NodeBody::Slice { target, values, .. } => {
                iter::once(target).chain(values.iter_mut()).collect()
            }
            NodeBody::With { values, body, .. } => {
                values.iter_mut().chain(iter::once(body)).collect()
            }
            NodeBody::GroupBy(g) => {
                let g = &mut **g;
                iter::once(&mut g.source)
                    .chain(g.keys.values.iter_mut())
                    .chain(g.maps.values.iter_mut())
                    .chain(g.aggs.values.iter_mut())
                    .collect()
            }
            NodeBody::SetFields { source, adds, .. } => {
                iter::once(source).chain(adds.values.iter_mut()).collect()
            }
            NodeBody::ModuleProjection { module, record, .. } => smallvec![module, record],
        }
    }

    /// Scopes declared by this node, in declaration order.
    pub fn scope_decls(&self) -> SmallVec<[ScopeDecl; 2]> {
        match self {
            NodeBody::Call { scopes, .. } => {
                let mut decls = SmallVec::new();
                for cs in scopes {
                    decls.push(ScopeDecl::new(&cs.scope, cs.slot..cs.slot + 1));
                    if let Some(index) = &cs.index {
                        decls.push(ScopeDecl::new(index, cs.slot..cs.slot + 1));
                    }
                }
                decls
            }
            NodeBody::With { scopes, values, .. } => {
                let end = values.len() + 1;
                scopes
                    .iter()
                    .enumerate()
                    .map(|(i, scope)| ScopeDecl::new(scope, i + 1..end))
                    .collect()
            }
            NodeBody::GroupBy(g) => {
                let rows = 1 + g.keys.len() + g.maps.len();
                smallvec![
                    ScopeDecl::new(&g.item, 1..rows),
                    ScopeDecl::new(&g.group, rows..rows + g.aggs.len()),
                ]
            }
            NodeBody::SetFields { scope, adds, .. } => {
                smallvec![ScopeDecl::new(scope, 1..1 + adds.len())]
            }
            NodeBody::ModuleProjection { scope, .. } => smallvec![ScopeDecl::new(scope, 1..2)],
            _ => SmallVec::new(),
        }
    }

    /// Whether this node declares any scope.
    pub fn is_scope_owner(&self) -> bool {
        match self {
            NodeBody::Call { scopes, .. } => !scopes.is_empty(),
            NodeBody::With { .. }
            | NodeBody::GroupBy(_)
            | NodeBody::SetFields { .. }
            | NodeBody::ModuleProjection { .. } => true,
            _ => false,
        }
    }
}

// =========================================================================
// Node
// =========================================================================

struct NodeData {
    ty: DType,
    body: NodeBody,
    all_kinds: KindMask,
    effects: bool,
    cheap: bool,
    constant: bool,
}

/// Immutable, shareable bound node.
#[derive(Clone)]
pub struct Node(Arc<NodeData>);

impl Node {
    /// Build a node from its type and body, computing the cached summaries.
    pub fn new(ty: DType, body: NodeBody) -> Self {
        let kind = body.kind();
        let mut all_kinds = KindMask::of(kind);
        let mut effects = matches!(&body, NodeBody::Call { func, .. } if func.has_effects());
        let mut all_constant = true;
        for child in body.children() {
            all_kinds |= child.all_kinds();
            effects |= child.has_effects();
            all_constant &= child.is_constant();
        }
        let cheap = match &body {
            NodeBody::GetField { record: arg, .. }
            | NodeBody::GetSlot { tuple: arg, .. }
            | NodeBody::Cast { arg, .. } => arg.is_cheap(),
            _ => kind.is_leaf() || kind == NodeKind::ScopeRef,
        };
        let constant = match &body {
            NodeBody::Const(_) | NodeBody::Default => true,
            NodeBody::Unary { .. }
            | NodeBody::Cast { .. }
            | NodeBody::Binary { .. }
            | NodeBody::Compare { .. }
            | NodeBody::Variadic { .. }
            | NodeBody::Sequence(_)
            | NodeBody::Tensor(_)
            | NodeBody::Tuple(_)
            | NodeBody::Record(_)
            | NodeBody::GetField { .. }
            | NodeBody::GetSlot { .. }
            | NodeBody::If { .. }
            | NodeBody::Slice { .. } => all_constant,
            _ => false,
        };
        Node(Arc::new(NodeData {
            ty,
            body,
            all_kinds,
            effects,
            cheap,
            constant,
        }))
    }

    pub fn ty(&self) -> &DType {
        &self.0.ty
    }

    pub fn body(&self) -> &NodeBody {
        &self.0.body
    }

    pub fn kind(&self) -> NodeKind {
        self.0.body.kind()
    }

    /// Union of the kinds of this node and its whole subtree.
    pub fn all_kinds(&self) -> KindMask {
        self.0.all_kinds
    }

    /// Whether the subtree contains a volatile or procedure call.
    pub fn has_effects(&self) -> bool {
        self.0.effects
    }

    /// Trivially re-evaluable; not worth binding to a scope.
    pub fn is_cheap(&self) -> bool {
        self.0.cheap
    }

    pub fn is_constant(&self) -> bool {
        self.0.constant
    }

    pub fn children(&self) -> SmallVec<[&Node; 4]> {
        self.0.body.children()
    }

    pub fn scope_decls(&self) -> SmallVec<[ScopeDecl; 2]> {
        self.0.body.scope_decls()
    }

    /// Scopes visible in child `slot`, in declaration order.
    pub fn scopes_visible_at(&self, slot: usize) -> SmallVec<[ArgScope; 2]> {
        if !self.0.body.is_scope_owner() {
            return SmallVec::new();
        }
        self.scope_decls()
            .into_iter()
            .filter(|d| d.visible.contains(&slot))
            .map(|d| d.scope)
            .collect()
    }

    /// Rebuild this node with the same shape and new children.
    pub fn with_children(&self, children: NodeVec) -> Node {
        debug_assert_eq!(
            children.len(),
            self.children().len(),
            "with_children: child count mismatch for {:?}",
            self.kind()
        );
        let mut body = self.0.body.clone();
        for (slot, child) in body.children_mut().into_iter().zip(children) {
            debug_assert_eq!(
                slot.ty(),
                child.ty(),
                "with_children: child type changed in {:?}",
                self.kind()
            );
            *slot = child;
        }
        Node::new(self.0.ty.clone(), body)
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of the shared node data, stable while the node is alive.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Structural equality, treating scopes declared inside the two trees as
    /// equal when they are declared at corresponding positions.
    pub fn equivalent(&self, other: &Node) -> bool {
        Equiv::default().nodes(self, other)
    }

    /// The scope referenced by a `ScopeRef` node.
    pub fn as_scope_ref(&self) -> Option<&ArgScope> {
        match self.body() {
            NodeBody::ScopeRef(scope) => Some(scope),
            _ => None,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({self}: {})", self.ty())
    }
}

// =========================================================================
// Constructors
// =========================================================================

impl Node {
    pub fn constant(value: Value, ty: DType) -> Node {
        Node::new(ty, NodeBody::Const(value))
    }

    pub fn int(value: i64) -> Node {
        Node::constant(Value::Int(value), DType::Int)
    }

    pub fn float(value: f64) -> Node {
        Node::constant(Value::Float(FloatBits::new(value)), DType::R8)
    }

    pub fn boolean(value: bool) -> Node {
        Node::constant(Value::Bool(value), DType::Bool)
    }

    pub fn text(value: &str) -> Node {
        Node::constant(Value::Text(value.into()), DType::Text)
    }

    pub fn default_value(ty: DType) -> Node {
        Node::new(ty, NodeBody::Default)
    }

    pub fn this(ty: DType) -> Node {
        Node::new(ty, NodeBody::This)
    }

    pub fn error(message: impl Into<Name>, ty: DType) -> Node {
        Node::new(ty, NodeBody::Error(message.into()))
    }

    pub fn missing(ty: DType) -> Node {
        Node::new(ty, NodeBody::Missing)
    }

    pub fn global(name: impl Into<Name>, ty: DType) -> Node {
        Node::new(ty, NodeBody::Global(name.into()))
    }

    pub fn free_var(name: impl Into<Name>, ty: DType) -> Node {
        Node::new(ty, NodeBody::FreeVar(name.into()))
    }

    pub fn namespace(name: impl Into<Name>, ty: DType) -> Node {
        Node::new(ty, NodeBody::Namespace(name.into()))
    }

    pub fn scope_ref(scope: &ArgScope) -> Node {
        Node::new(scope.ty().clone(), NodeBody::ScopeRef(scope.clone()))
    }

    pub fn unary(op: UnaryOp, arg: Node) -> Node {
        let ty = match op {
            UnaryOp::Not => DType::Bool,
            UnaryOp::Negate | UnaryOp::BitNot => arg.ty().clone(),
        };
        Node::new(ty, NodeBody::Unary { op, arg })
    }

    pub fn cast(op: CastOp, arg: Node, ty: DType) -> Node {
        Node::new(ty, NodeBody::Cast { op, arg })
    }

    pub fn binary(op: BinaryOp, left: Node, right: Node, ty: DType) -> Node {
        Node::new(ty, NodeBody::Binary { op, left, right })
    }

    pub fn compare(
        ops: impl IntoIterator<Item = CompareOp>,
        args: impl IntoIterator<Item = Node>,
    ) -> Node {
        let ops: SmallVec<[CompareOp; 2]> = ops.into_iter().collect();
        let args: NodeVec = args.into_iter().collect();
        debug_assert_eq!(ops.len() + 1, args.len(), "compare: operator count");
        Node::new(DType::Bool, NodeBody::Compare { ops, args })
    }

    pub fn variadic(
        op: VariadicOp,
        args: impl IntoIterator<Item = Node>,
        inverted: BitSet,
        ty: DType,
    ) -> Node {
        let args: NodeVec = args.into_iter().collect();
        debug_assert!(args.len() >= 2, "variadic {op:?} needs two operands");
        debug_assert!(
            inverted.is_empty() || op.allows_inverted(&ty),
            "variadic {op:?} over {ty} cannot invert operands"
        );
        debug_assert!(
            inverted.max().is_none_or(|m| m < args.len()),
            "variadic inverted flag out of range"
        );
        Node::new(ty, NodeBody::Variadic { op, args, inverted })
    }

    pub fn sequence(items: impl IntoIterator<Item = Node>, item_ty: DType) -> Node {
        Node::new(
            DType::seq(item_ty),
            NodeBody::Sequence(items.into_iter().collect()),
        )
    }

    pub fn tensor(items: impl IntoIterator<Item = Node>, item_ty: DType, rank: u8) -> Node {
        Node::new(
            DType::tensor(item_ty, rank),
            NodeBody::Tensor(items.into_iter().collect()),
        )
    }

    pub fn tuple(items: impl IntoIterator<Item = Node>) -> Node {
        let items: NodeVec = items.into_iter().collect();
        let ty = DType::tuple(items.iter().map(|n| n.ty().clone()));
        Node::new(ty, NodeBody::Tuple(items))
    }

    pub fn record<N: Into<Name>>(fields: impl IntoIterator<Item = (N, Node)>) -> Node {
        let clause = Clause::new(fields);
        let ty = DType::Record(clause.field_types().collect());
        Node::new(ty, NodeBody::Record(clause))
    }

    pub fn get_field(record: Node, name: impl Into<Name>) -> Node {
        let name = name.into();
        let ty = record.ty().field_type(&name).cloned();
        debug_assert!(ty.is_some(), "get_field: no field {name} in {}", record.ty());
        Node::new(
            ty.unwrap_or(DType::General),
            NodeBody::GetField { record, name },
        )
    }

    pub fn get_slot(tuple: Node, slot: usize) -> Node {
        let ty = tuple.ty().slot_type(slot).cloned();
        debug_assert!(ty.is_some(), "get_slot: no slot {slot} in {}", tuple.ty());
        Node::new(ty.unwrap_or(DType::General), NodeBody::GetSlot { tuple, slot })
    }

    pub fn if_else(cond: Node, then: Node, els: Node) -> Node {
        debug_assert_eq!(then.ty(), els.ty(), "if_else: branch types differ");
        Node::new(then.ty().clone(), NodeBody::If { cond, then, els })
    }

    pub fn slice(
        target: Node,
        shapes: impl IntoIterator<Item = SliceShape>,
        values: impl IntoIterator<Item = Node>,
        ty: DType,
    ) -> Node {
        let shapes: SmallVec<[SliceShape; 2]> = shapes.into_iter().collect();
        let values: NodeVec = values.into_iter().collect();
        debug_assert_eq!(
            shapes.iter().map(|s| s.value_count()).sum::<usize>(),
            values.len(),
            "slice: values do not match shapes"
        );
        Node::new(
            ty,
            NodeBody::Slice {
                target,
                shapes,
                values,
            },
        )
    }

    pub fn call(
        func: FuncRef,
        args: impl IntoIterator<Item = Node>,
        scopes: impl IntoIterator<Item = CallScope>,
        ty: DType,
    ) -> Node {
        let args: NodeVec = args.into_iter().collect();
        let scopes: SmallVec<[CallScope; 1]> = scopes.into_iter().collect();
        debug_assert!(
            scopes.iter().all(|cs| cs.slot < args.len()),
            "call {}: scope slot out of range",
            func.name
        );
        Node::new(ty, NodeBody::Call { func, args, scopes })
    }

    /// Bind each value to its scope, in order, around `body`.
    pub fn with(bindings: impl IntoIterator<Item = (ArgScope, Node)>, body: Node) -> Node {
        let (scopes, values): (SmallVec<[ArgScope; 2]>, NodeVec) = bindings.into_iter().unzip();
        debug_assert!(
            scopes.iter().zip(values.iter()).all(|(s, v)| s.ty() == v.ty()),
            "with: binding type mismatch"
        );
        Node::new(
            body.ty().clone(),
            NodeBody::With {
                scopes,
                values,
                body,
            },
        )
    }

    pub fn group_by(group: GroupBy) -> Node {
        let fields: Vec<(Name, DType)> = group
            .keys
            .field_types()
            .chain(group.aggs.field_types())
            .collect();
        Node::new(
            DType::seq(DType::Record(fields.into())),
            NodeBody::GroupBy(Box::new(group)),
        )
    }

    pub fn set_fields(source: Node, scope: ArgScope, adds: Clause) -> Node {
        let ty = match source.ty().item_type() {
            Some(DType::Record(fields)) => {
                let mut fields: Vec<(Name, DType)> = fields.to_vec();
                for (name, ty) in adds.field_types() {
                    match fields.iter_mut().find(|(n, _)| *n == name) {
                        Some(field) => field.1 = ty,
                        None => fields.push((name, ty)),
                    }
                }
                DType::seq(DType::Record(fields.into()))
            }
            _ => DType::seq(DType::General),
        };
        Node::new(
            ty,
            NodeBody::SetFields {
                source,
                scope,
                adds,
            },
        )
    }

    pub fn module_projection(module: Node, scope: ArgScope, record: Node) -> Node {
        Node::new(
            record.ty().clone(),
            NodeBody::ModuleProjection {
                module,
                scope,
                record,
            },
        )
    }
}

// =========================================================================
// Structural equivalence
// =========================================================================

#[derive(Default)]
struct Equiv {
    /// Scopes declared in the left tree mapped to their right counterparts.
    map: FxHashMap<ArgScope, ArgScope>,
}

impl Equiv {
    fn nodes(&mut self, a: &Node, b: &Node) -> bool {
        if self.map.is_empty() && a.ptr_eq(b) {
            return true;
        }
        if a.ty() != b.ty() || a.all_kinds() != b.all_kinds() {
            return false;
        }
        if !self.same_shape(a.body(), b.body()) {
            return false;
        }

        let decls_a = a.scope_decls();
        let decls_b = b.scope_decls();
        if decls_a.len() != decls_b.len() {
            return false;
        }
        for (x, y) in decls_a.iter().zip(decls_b.iter()) {
            if x.scope.kind() != y.scope.kind()
                || x.scope.ty() != y.scope.ty()
                || x.visible != y.visible
            {
                return false;
            }
            if x.scope != y.scope {
                self.map.insert(x.scope.clone(), y.scope.clone());
            }
        }

        let children_a = a.children();
        let children_b = b.children();
        children_a.len() == children_b.len()
            && children_a
                .iter()
                .zip(children_b.iter())
                .all(|(x, y)| self.nodes(x, y))
    }

    fn same_shape(&self, a: &NodeBody, b: &NodeBody) -> bool {
        use NodeBody as B;
        match (a, b) {
            (B::Const(x), B::Const(y)) => x == y,
            (B::Default, B::Default) | (B::This, B::This) | (B::Missing, B::Missing) => true,
            (B::Error(x), B::Error(y))
            | (B::Global(x), B::Global(y))
            | (B::FreeVar(x), B::FreeVar(y))
            | (B::Namespace(x), B::Namespace(y)) => x == y,
            (B::ScopeRef(x), B::ScopeRef(y)) => match self.map.get(x) {
                Some(mapped) => mapped == y,
                None => x == y,
            },
            (B::Unary { op: x, .. }, B::Unary { op: y, .. }) => x == y,
            (B::Cast { op: x, .. }, B::Cast { op: y, .. }) => x == y,
            (B::Binary { op: x, .. }, B::Binary { op: y, .. }) => x == y,
            (B::Compare { ops: x, .. }, B::Compare { ops: y, .. }) => x == y,
            (
                B::Variadic {
                    op: x,
                    inverted: xi,
                    ..
                },
                B::Variadic {
                    op: y,
                    inverted: yi,
                    ..
                },
            ) => x == y && xi == yi,
            (B::Sequence(_), B::Sequence(_))
            | (B::Tensor(_), B::Tensor(_))
            | (B::Tuple(_), B::Tuple(_))
            | (B::If { .. }, B::If { .. })
            | (B::With { .. }, B::With { .. })
            | (B::ModuleProjection { .. }, B::ModuleProjection { .. }) => true,
            (B::Record(x), B::Record(y)) => x.names == y.names,
            (B::GetField { name: x, .. }, B::GetField { name: y, .. }) => x == y,
            (B::GetSlot { slot: x, .. }, B::GetSlot { slot: y, .. }) => x == y,
            (B::Slice { shapes: x, .. }, B::Slice { shapes: y, .. }) => x == y,
            (
                B::Call {
                    func: fx,
                    scopes: sx,
                    ..
                },
                B::Call {
                    func: fy,
                    scopes: sy,
                    ..
                },
            ) => {
                fx == fy
                    && sx.len() == sy.len()
                    && sx
                        .iter()
                        .zip(sy.iter())
                        .all(|(x, y)| x.slot == y.slot && x.index.is_some() == y.index.is_some())
            }
            (B::GroupBy(x), B::GroupBy(y)) => {
                x.keys.names == y.keys.names
                    && x.maps.names == y.maps.names
                    && x.aggs.names == y.aggs.names
            }
            (B::SetFields { adds: x, .. }, B::SetFields { adds: y, .. }) => x.names == y.names,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Func;
    use crate::ops::FuncFlags;
    use crate::scope::ScopeKind;

    fn add(args: impl IntoIterator<Item = Node>) -> Node {
        Node::variadic(VariadicOp::Add, args, BitSet::new(), DType::Int)
    }

    fn sum(source: Node, item: &ArgScope, body: Node) -> Node {
        Node::call(
            Func::pure("Sum"),
            [source, body],
            [CallScope {
                scope: item.clone(),
                index: None,
                slot: 1,
            }],
            DType::Int,
        )
    }

    #[test]
    fn caches_summarize_subtree() {
        let s = Node::global("S", DType::seq(DType::Int));
        let it = ArgScope::new(ScopeKind::SeqItem, DType::Int);
        let tree = sum(s, &it, add([Node::scope_ref(&it), Node::int(1)]));

        assert!(tree.all_kinds().contains(NodeKind::ScopeRef));
        assert!(tree.all_kinds().contains(NodeKind::Variadic));
        assert!(!tree.all_kinds().contains(NodeKind::Error));
        assert!(!tree.has_effects());
        assert!(!tree.is_cheap());
        assert!(!tree.is_constant());

        let tick = Node::call(
            Func::new("Tick", FuncFlags::VOLATILE),
            Vec::<Node>::new(),
            Vec::<CallScope>::new(),
            DType::Int,
        );
        assert!(add([tick, Node::int(2)]).has_effects());
    }

    #[test]
    fn cheap_and_constant() {
        assert!(Node::int(3).is_cheap());
        assert!(Node::int(3).is_constant());
        assert!(add([Node::int(1), Node::int(2)]).is_constant());
        assert!(!add([Node::int(1), Node::int(2)]).is_cheap());

        let rec = Node::global("R", DType::record([("a", DType::Int)]));
        assert!(Node::get_field(rec.clone(), "a").is_cheap());
        assert!(!Node::get_field(rec, "a").is_constant());
    }

    #[test]
    fn with_scope_visibility() {
        let a = ArgScope::new(ScopeKind::With, DType::Int);
        let b = ArgScope::new(ScopeKind::With, DType::Int);
        let tree = Node::with(
            [(a.clone(), Node::int(1)), (b.clone(), Node::scope_ref(&a))],
            add([Node::scope_ref(&a), Node::scope_ref(&b)]),
        );

        assert_eq!(tree.children().len(), 3);
        assert!(tree.scopes_visible_at(0).is_empty());
        assert_eq!(tree.scopes_visible_at(1).as_slice(), &[a.clone()]);
        assert_eq!(tree.scopes_visible_at(2).as_slice(), &[a.clone(), b.clone()]);

        let decls = tree.scope_decls();
        assert_eq!(decls[0].visible, 1..3);
        assert_eq!(decls[1].visible, 2..3);
    }

    #[test]
    fn group_by_slots() {
        let row = DType::record([("k", DType::Int), ("v", DType::Int)]);
        let item = ArgScope::new(ScopeKind::SeqItem, row.clone());
        let group = ArgScope::new(
            ScopeKind::Iter,
            DType::seq(DType::record([("v", DType::Int)])),
        );
        let node = Node::group_by(GroupBy {
            source: Node::global("T", DType::seq(row)),
            item: item.clone(),
            keys: Clause::new([("k", Node::get_field(Node::scope_ref(&item), "k"))]),
            maps: Clause::new([("v", Node::get_field(Node::scope_ref(&item), "v"))]),
            group: group.clone(),
            aggs: Clause::new([("n", Node::int(0))]),
        });

        assert_eq!(node.children().len(), 4);
        assert_eq!(node.scopes_visible_at(1).as_slice(), &[item.clone()]);
        assert_eq!(node.scopes_visible_at(2).as_slice(), &[item]);
        assert_eq!(node.scopes_visible_at(3).as_slice(), &[group]);
        assert_eq!(
            node.ty(),
            &DType::seq(DType::record([("k", DType::Int), ("n", DType::Int)]))
        );
    }

    #[test]
    fn with_children_keeps_shape() {
        let x = Node::global("x", DType::Int);
        let tree = add([x.clone(), Node::int(2)]);
        let rebuilt = tree.with_children(smallvec![x, Node::int(5)]);
        assert!(!rebuilt.ptr_eq(&tree));
        assert_eq!(rebuilt.ty(), tree.ty());
        assert_eq!(rebuilt.kind(), NodeKind::Variadic);
        assert!(!rebuilt.equivalent(&tree));
    }

    #[test]
    fn equivalent_modulo_local_scopes() {
        let s = Node::global("S", DType::seq(DType::Int));
        let a = ArgScope::new(ScopeKind::SeqItem, DType::Int);
        let b = ArgScope::new(ScopeKind::SeqItem, DType::Int);
        let left = sum(s.clone(), &a, add([Node::scope_ref(&a), Node::int(1)]));
        let right = sum(s.clone(), &b, add([Node::scope_ref(&b), Node::int(1)]));
        assert!(left.equivalent(&right));

        // Free scopes must match by identity.
        let w = ArgScope::new(ScopeKind::With, DType::Int);
        let v = ArgScope::new(ScopeKind::With, DType::Int);
        assert!(Node::scope_ref(&w).equivalent(&Node::scope_ref(&w)));
        assert!(!Node::scope_ref(&w).equivalent(&Node::scope_ref(&v)));

        let mut inverted = BitSet::new();
        inverted.insert(1);
        let minus = Node::variadic(
            VariadicOp::Add,
            [Node::int(1), Node::int(2)],
            inverted,
            DType::Int,
        );
        assert!(!minus.equivalent(&add([Node::int(1), Node::int(2)])));
    }
}
