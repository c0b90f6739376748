//! Compact textual form of bound trees.
//!
//! Scopes are renumbered per print in order of first appearance and shown
//! with a kind prefix (`w0`, `it1`, ...), so the output of a tree does not
//! depend on the process-wide scope counter and is stable for snapshots.
//!
//! ```text
//! with(w0 = (k * k); (x + Sum(S, it1 => (w0 + it1))))
//! ```

use std::fmt::{self, Write};

use rustc_hash::FxHashMap;

use crate::node::{Clause, Node, NodeBody, Value};
use crate::ops::SliceShape;
use crate::scope::ArgScope;

#[derive(Default)]
struct Printer {
    names: FxHashMap<ArgScope, usize>,
}

impl Printer {
    fn scope(&mut self, f: &mut dyn Write, scope: &ArgScope) -> fmt::Result {
        let next = self.names.len();
        let n = *self.names.entry(scope.clone()).or_insert(next);
        write!(f, "{}{}", scope.kind().prefix(), n)
    }

    fn list<'a>(
        &mut self,
        f: &mut dyn Write,
        nodes: impl IntoIterator<Item = &'a Node>,
    ) -> fmt::Result {
        for (i, node) in nodes.into_iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            self.node(f, node)?;
        }
        Ok(())
    }

    fn clause(&mut self, f: &mut dyn Write, clause: &Clause) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in clause.entries().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: ")?;
            self.node(f, value)?;
        }
        f.write_str("}")
    }

    fn node(&mut self, f: &mut dyn Write, node: &Node) -> fmt::Result {
        match node.body() {
            NodeBody::Const(value) => match value {
                Value::Bool(b) => write!(f, "{b}"),
                Value::Int(i) => write!(f, "{i}"),
                Value::Float(x) => write!(f, "{:?}", x.value()),
                Value::Text(t) => write!(f, "{:?}", &**t),
            },
            NodeBody::Default => f.write_str("default"),
            NodeBody::This => f.write_str("this"),
            NodeBody::Error(message) => write!(f, "error({:?})", &**message),
            NodeBody::Missing => f.write_str("missing"),
            NodeBody::Global(name) => f.write_str(name),
            NodeBody::FreeVar(name) => write!(f, "${name}"),
            NodeBody::Namespace(name) => write!(f, "ns:{name}"),
            NodeBody::ScopeRef(scope) => self.scope(f, scope),
            NodeBody::Unary { op, arg } => {
                f.write_str(op.symbol())?;
                self.node(f, arg)
            }
            NodeBody::Cast { op, arg } => {
                write!(f, "{}(", op.name())?;
                self.node(f, arg)?;
                f.write_str(")")
            }
            NodeBody::Binary { op, left, right } => {
                f.write_str("(")?;
                self.node(f, left)?;
                write!(f, " {} ", op.symbol())?;
                self.node(f, right)?;
                f.write_str(")")
            }
            NodeBody::Compare { ops, args } => {
                f.write_str("(")?;
                for (i, arg) in args.iter().enumerate() {
                    if let Some(op) = i.checked_sub(1).and_then(|j| ops.get(j)) {
                        write!(f, " {} ", op.symbol())?;
                    }
                    self.node(f, arg)?;
                }
                f.write_str(")")
            }
            NodeBody::Variadic { op, args, inverted } => match op.symbol() {
                Some(symbol) => {
                    f.write_str("(")?;
                    for (i, arg) in args.iter().enumerate() {
                        let sym = if inverted.contains(i) {
                            op.inverted_symbol()
                        } else {
                            symbol
                        };
                        if i > 0 {
                            write!(f, " {sym} ")?;
                        } else if inverted.contains(0) {
                            f.write_str(sym)?;
                        }
                        self.node(f, arg)?;
                    }
                    f.write_str(")")
                }
                None => {
                    write!(f, "{}(", op.name())?;
                    self.list(f, args)?;
                    f.write_str(")")
                }
            },
            NodeBody::Sequence(items) => {
                f.write_str("[")?;
                self.list(f, items)?;
                f.write_str("]")
            }
            NodeBody::Tensor(items) => {
                f.write_str("tensor[")?;
                self.list(f, items)?;
                f.write_str("]")
            }
            NodeBody::Tuple(items) => {
                f.write_str("tuple(")?;
                self.list(f, items)?;
                f.write_str(")")
            }
            NodeBody::Record(clause) => self.clause(f, clause),
            NodeBody::GetField { record, name } => {
                self.node(f, record)?;
                write!(f, ".{name}")
            }
            NodeBody::GetSlot { tuple, slot } => {
                self.node(f, tuple)?;
                write!(f, ".{slot}")
            }
            NodeBody::If { cond, then, els } => {
                f.write_str("if(")?;
                self.list(f, [cond, then, els])?;
                f.write_str(")")
            }
            NodeBody::Slice {
                target,
                shapes,
                values,
            } => {
                self.node(f, target)?;
                f.write_str("[")?;
                let mut values = values.iter();
                for (i, shape) in shapes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    self.slice_dim(f, *shape, &mut values)?;
                }
                f.write_str("]")
            }
            NodeBody::Call { func, args, scopes } => {
                write!(f, "{}(", func.name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    let mut any = false;
                    for cs in scopes.iter().filter(|cs| cs.slot == i) {
                        if any {
                            f.write_str(", ")?;
                        }
                        self.scope(f, &cs.scope)?;
                        if let Some(index) = &cs.index {
                            f.write_str(", ")?;
                            self.scope(f, index)?;
                        }
                        any = true;
                    }
                    if any {
                        f.write_str(" => ")?;
                    }
                    self.node(f, arg)?;
                }
                f.write_str(")")
            }
            NodeBody::With {
                scopes,
                values,
                body,
            } => {
                f.write_str("with(")?;
                for (scope, value) in scopes.iter().zip(values.iter()) {
                    self.scope(f, scope)?;
                    f.write_str(" = ")?;
                    self.node(f, value)?;
                    f.write_str("; ")?;
                }
                self.node(f, body)?;
                f.write_str(")")
            }
            NodeBody::GroupBy(g) => {
                f.write_str("groupby(")?;
                self.node(f, &g.source)?;
                f.write_str(", ")?;
                self.scope(f, &g.item)?;
                f.write_str(" => keys")?;
                self.clause(f, &g.keys)?;
                f.write_str(" maps")?;
                self.clause(f, &g.maps)?;
                f.write_str(", ")?;
                self.scope(f, &g.group)?;
                f.write_str(" => aggs")?;
                self.clause(f, &g.aggs)?;
                f.write_str(")")
            }
            NodeBody::SetFields {
                source,
                scope,
                adds,
            } => {
                f.write_str("setfields(")?;
                self.node(f, source)?;
                f.write_str(", ")?;
                self.scope(f, scope)?;
                f.write_str(" => ")?;
                self.clause(f, adds)?;
                f.write_str(")")
            }
            NodeBody::ModuleProjection {
                module,
                scope,
                record,
            } => {
                f.write_str("project(")?;
                self.node(f, module)?;
                f.write_str(", ")?;
                self.scope(f, scope)?;
                f.write_str(" => ")?;
                self.node(f, record)?;
                f.write_str(")")
            }
        }
    }

    fn slice_dim<'a>(
        &mut self,
        f: &mut dyn Write,
        shape: SliceShape,
        values: &mut impl Iterator<Item = &'a Node>,
    ) -> fmt::Result {
        let mut part = |this: &mut Self, f: &mut dyn Write, back: bool| -> fmt::Result {
            if back {
                f.write_str("^")?;
            }
            match values.next() {
                Some(value) => this.node(f, value),
                None => f.write_str("?"),
            }
        };
        if shape.contains(SliceShape::INDEX) {
            return part(self, f, shape.contains(SliceShape::INDEX_BACK));
        }
        if shape.contains(SliceShape::START) {
            part(self, f, shape.contains(SliceShape::START_BACK))?;
        }
        f.write_str(":")?;
        if shape.contains(SliceShape::STOP) {
            part(self, f, shape.contains(SliceShape::STOP_BACK))?;
        } else if shape.contains(SliceShape::STOP_STAR) {
            f.write_str("*")?;
        }
        if shape.contains(SliceShape::STEP) {
            f.write_str(":")?;
            part(self, f, false)?;
        }
        Ok(())
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer::default().node(f, self)
    }
}
