//! Common builders and a small reference evaluator for integration tests.

use rustc_hash::FxHashMap;
use tally::bound::{
    ArgScope, BitSet, CallScope, DType, Func, FuncFlags, Node, NodeBody, ScopeKind, Value,
    VariadicOp,
};

/// Route pass logging to the test output; filtered by `RUST_LOG`.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub fn global(name: &str) -> Node {
    Node::global(name, DType::Int)
}

#[allow(dead_code)]
pub fn add(args: impl IntoIterator<Item = Node>) -> Node {
    Node::variadic(VariadicOp::Add, args, BitSet::new(), DType::Int)
}

/// `Add` with the operands flagged `true` subtracted.
#[allow(dead_code)]
pub fn add_signed(args: impl IntoIterator<Item = (Node, bool)>) -> Node {
    let mut inverted = BitSet::new();
    let mut operands = Vec::new();
    for (i, (arg, negate)) in args.into_iter().enumerate() {
        inverted.set(i, negate);
        operands.push(arg);
    }
    Node::variadic(VariadicOp::Add, operands, inverted, DType::Int)
}

#[allow(dead_code)]
pub fn mul(args: impl IntoIterator<Item = Node>) -> Node {
    Node::variadic(VariadicOp::Mul, args, BitSet::new(), DType::Int)
}

#[allow(dead_code)]
pub fn item() -> ArgScope {
    ArgScope::new(ScopeKind::SeqItem, DType::Int)
}

/// `Sum(source, item => body)` over an integer sequence global.
#[allow(dead_code)]
pub fn sum(source: &str, item: &ArgScope, body: Node) -> Node {
    Node::call(
        Func::pure("Sum"),
        [Node::global(source, DType::seq(DType::Int)), body],
        [CallScope {
            scope: item.clone(),
            index: None,
            slot: 1,
        }],
        DType::Int,
    )
}

/// A volatile call returning how many times it has been evaluated before.
#[allow(dead_code)]
pub fn tick() -> Node {
    Node::call(
        Func::new("Tick", FuncFlags::VOLATILE),
        Vec::<Node>::new(),
        Vec::<CallScope>::new(),
        DType::Int,
    )
}

#[allow(dead_code)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Val {
    Int(i64),
    Bool(bool),
    Seq(Vec<i64>),
}

#[allow(dead_code)]
impl Val {
    fn int(&self) -> i64 {
        match self {
            Val::Int(i) => *i,
            other => panic!("expected an integer, got {other:?}"),
        }
    }
}

/// Evaluates the integer fragment used by the tests with wrapping
/// arithmetic. Globals `S0`, `S1`, ... are sequences; other globals are
/// integers derived from their name.
#[allow(dead_code)]
#[derive(Default)]
pub struct Evaluator {
    env: FxHashMap<ArgScope, Val>,
    pub ticks: i64,
}

#[allow(dead_code)]
impl Evaluator {
    pub fn global(name: &str) -> Val {
        match name {
            "S" | "S0" => Val::Seq(vec![1, 2, 3]),
            "S1" => Val::Seq(vec![4, -5]),
            "T" | "S2" => Val::Seq(vec![]),
            _ => Val::Int(name.bytes().map(i64::from).sum::<i64>() % 17 - 5),
        }
    }

    pub fn eval(&mut self, node: &Node) -> Val {
        match node.body() {
            NodeBody::Const(Value::Int(i)) => Val::Int(*i),
            NodeBody::Const(Value::Bool(b)) => Val::Bool(*b),
            NodeBody::Global(name) => Self::global(name),
            NodeBody::ScopeRef(scope) => match self.env.get(scope) {
                Some(value) => value.clone(),
                None => panic!("unbound scope {scope}"),
            },
            NodeBody::Variadic { op, args, inverted } => {
                let mut acc: Option<i64> = None;
                for (i, arg) in args.iter().enumerate() {
                    let v = self.eval(arg).int();
                    acc = Some(match (op, acc) {
                        (VariadicOp::Add, None) if inverted.contains(i) => v.wrapping_neg(),
                        (_, None) => v,
                        (VariadicOp::Add, Some(a)) if inverted.contains(i) => a.wrapping_sub(v),
                        (VariadicOp::Add, Some(a)) => a.wrapping_add(v),
                        (VariadicOp::Mul, Some(a)) => a.wrapping_mul(v),
                        (op, _) => panic!("unsupported operator {op:?}"),
                    });
                }
                Val::Int(acc.unwrap_or(0))
            }
            NodeBody::If { cond, then, els } => match self.eval(cond) {
                Val::Bool(true) => self.eval(then),
                Val::Bool(false) => self.eval(els),
                other => panic!("expected a boolean, got {other:?}"),
            },
            NodeBody::With {
                scopes,
                values,
                body,
            } => {
                for (scope, value) in scopes.iter().zip(values.iter()) {
                    let v = self.eval(value);
                    self.env.insert(scope.clone(), v);
                }
                let result = self.eval(body);
                for scope in scopes.iter() {
                    self.env.remove(scope);
                }
                result
            }
            NodeBody::Call { func, args, scopes } => match &*func.name {
                "Tick" => {
                    self.ticks += 1;
                    Val::Int(self.ticks - 1)
                }
                "Sum" => {
                    let Val::Seq(items) = self.eval(&args[0]) else {
                        panic!("Sum over a non-sequence");
                    };
                    let scope = &scopes[0].scope;
                    let mut total = 0i64;
                    for item in items {
                        self.env.insert(scope.clone(), Val::Int(item));
                        total = total.wrapping_add(self.eval(&args[1]).int());
                    }
                    self.env.remove(scope);
                    Val::Int(total)
                }
                name => panic!("unknown function {name}"),
            },
            _ => panic!("cannot evaluate {node}"),
        }
    }
}

/// Evaluate `node` in a fresh evaluator, returning the value and the number
/// of `Tick` calls made.
#[allow(dead_code)]
pub fn run(node: &Node) -> (Val, i64) {
    let mut evaluator = Evaluator::default();
    let value = evaluator.eval(node);
    (value, evaluator.ticks)
}
