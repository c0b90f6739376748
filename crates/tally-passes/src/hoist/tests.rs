use tally_bound::{
    ArgScope, BitSet, CallScope, Clause, DType, Func, FuncFlags, GroupBy, Node, ReduceHost,
    ScopeKind, UnaryOp, VariadicOp, validate,
};

use super::*;

fn global(name: &str) -> Node {
    Node::global(name, DType::Int)
}

fn fglobal(name: &str) -> Node {
    Node::global(name, DType::R8)
}

fn add(args: impl IntoIterator<Item = Node>) -> Node {
    Node::variadic(VariadicOp::Add, args, BitSet::new(), DType::Int)
}

fn mul(a: Node, b: Node) -> Node {
    let ty = a.ty().clone();
    Node::variadic(VariadicOp::Mul, [a, b], BitSet::new(), ty)
}

fn item(ty: DType) -> ArgScope {
    ArgScope::new(ScopeKind::SeqItem, ty)
}

/// `Sum(source, item => body)`.
fn sum(source: &str, item: &ArgScope, body: Node) -> Node {
    let ty = body.ty().clone();
    Node::call(
        Func::pure("Sum"),
        [Node::global(source, DType::seq(item.ty().clone())), body],
        [CallScope {
            scope: item.clone(),
            index: None,
            slot: 1,
        }],
        ty,
    )
}

fn tick() -> Node {
    Node::call(
        Func::new("Tick", FuncFlags::VOLATILE),
        Vec::<Node>::new(),
        Vec::<CallScope>::new(),
        DType::Int,
    )
}

#[test]
fn hoists_invariant_term_out_of_loop() {
    let it = item(DType::Int);
    let body = add([mul(global("k"), global("k")), Node::scope_ref(&it)]);
    let tree = add([global("x"), sum("S", &it, body)]);

    let result = hoist(&tree);
    assert!(result.changed);
    assert_eq!(result.hoisted, 1);
    assert_eq!(result.node.ty(), tree.ty());
    insta::assert_snapshot!(result.node.to_string(), @"with(w0 = (k * k); (x + Sum(S, it1 => (w0 + it1))))");
    assert_eq!(validate(&result.node, &[]), Ok(()));

    let again = hoist(&result.node);
    assert!(!again.changed);
    assert!(again.node.ptr_eq(&result.node));
}

#[test]
fn invariant_loop_body_leaves_the_loop() {
    let it = item(DType::Int);
    let tree = sum("S", &it, mul(global("k"), global("k")));
    let result = hoist(&tree);
    insta::assert_snapshot!(result.node.to_string(), @"with(w0 = (k * k); Sum(S, it1 => w0))");
}

#[test]
fn item_dependent_and_cheap_terms_stay() {
    let it = item(DType::Int);
    let tree = sum(
        "S",
        &it,
        add([
            global("k"),
            mul(Node::scope_ref(&it), Node::scope_ref(&it)),
        ]),
    );
    let result = hoist(&tree);
    assert!(!result.changed);
    assert!(result.node.ptr_eq(&tree));
    assert_eq!(result.hoisted, 0);
}

#[test]
fn commutative_operands_group_per_level() {
    let i = item(DType::Int);
    let j = item(DType::Int);
    let inner = sum(
        "T",
        &j,
        add([
            mul(global("a"), global("b")),
            mul(Node::scope_ref(&i), Node::scope_ref(&i)),
            Node::scope_ref(&j),
        ]),
    );
    let tree = sum("S", &i, inner);

    let result = hoist(&tree);
    assert_eq!(result.hoisted, 2);
    insta::assert_snapshot!(
        result.node.to_string(),
        @"with(w0 = (a * b); Sum(S, it1 => with(w2 = (w0 + (it1 * it1)); Sum(T, it3 => (w2 + it3)))))"
    );
    assert_eq!(validate(&result.node, &[]), Ok(()));
    assert!(!hoist(&result.node).changed);
}

#[test]
fn commutative_gathers_scattered_operands() {
    let it = item(DType::Int);
    let tree = sum(
        "S",
        &it,
        add([Node::scope_ref(&it), mul(global("k"), global("k")), Node::int(2)]),
    );
    let result = hoist(&tree);
    insta::assert_snapshot!(result.node.to_string(), @"with(w0 = ((k * k) + 2); Sum(S, it1 => (it1 + w0)))");
}

#[test]
fn inverted_group_is_referenced_inverted() {
    let it = item(DType::Int);
    let mut inverted = BitSet::new();
    inverted.insert(1);
    inverted.insert(2);
    let body = Node::variadic(
        VariadicOp::Add,
        [
            Node::scope_ref(&it),
            mul(global("a"), global("b")),
            mul(global("c"), global("d")),
        ],
        inverted,
        DType::Int,
    );
    let result = hoist(&sum("S", &it, body));
    insta::assert_snapshot!(result.node.to_string(), @"with(w0 = ((a * b) + (c * d)); Sum(S, it1 => (it1 - w0)))");
}

#[test]
fn fractional_sum_hoists_only_leading_run() {
    let it = item(DType::R8);
    let body = Node::variadic(
        VariadicOp::Add,
        [
            fglobal("a"),
            fglobal("b"),
            Node::scope_ref(&it),
            mul(fglobal("d"), fglobal("d")),
        ],
        BitSet::new(),
        DType::R8,
    );
    let result = hoist(&sum("S", &it, body));
    insta::assert_snapshot!(
        result.node.to_string(),
        @"with(w0 = (a + b); w1 = (d * d); Sum(S, it2 => (w0 + it2 + w1)))"
    );
}

#[test]
fn fractional_run_collapses_when_level_deepens() {
    let i = item(DType::R8);
    let j = item(DType::R8);
    let body = Node::variadic(
        VariadicOp::Add,
        [
            mul(fglobal("a"), fglobal("a")),
            Node::scope_ref(&i),
            Node::scope_ref(&j),
        ],
        BitSet::new(),
        DType::R8,
    );
    let tree = sum("S", &i, sum("T", &j, body));
    let result = hoist(&tree);
    insta::assert_snapshot!(
        result.node.to_string(),
        @"with(w0 = (a * a); Sum(S, it1 => with(w2 = (w0 + it1); Sum(T, it3 => (w2 + it3)))))"
    );
}

#[test]
fn fractional_operand_after_deeper_one_binds_at_its_own_level() {
    let i = item(DType::R8);
    let j = item(DType::R8);
    let body = Node::variadic(
        VariadicOp::Add,
        [
            mul(fglobal("a"), fglobal("a")),
            mul(Node::scope_ref(&i), Node::scope_ref(&i)),
            mul(fglobal("b"), fglobal("b")),
            Node::scope_ref(&j),
        ],
        BitSet::new(),
        DType::R8,
    );
    let tree = sum("S", &i, sum("T", &j, body));

    let result = hoist(&tree);
    assert_eq!(result.hoisted, 3);
    insta::assert_snapshot!(
        result.node.to_string(),
        @"with(w0 = (a * a); w1 = (b * b); Sum(S, it2 => with(w3 = (w0 + (it2 * it2) + w1); Sum(T, it4 => (w3 + it4)))))"
    );
    assert_eq!(validate(&result.node, &[]), Ok(()));
    let again = hoist(&result.node);
    assert!(!again.changed, "hoisted again to {}", again.node);
}

#[test]
fn concat_hoists_contiguous_run() {
    let it = item(DType::Text);
    let call_f = Node::call(
        Func::pure("f"),
        [Node::scope_ref(&it)],
        Vec::<CallScope>::new(),
        DType::Text,
    );
    let body = Node::variadic(
        VariadicOp::TextConcat,
        [Node::text("x"), call_f, Node::text("y"), Node::text("z")],
        BitSet::new(),
        DType::Text,
    );
    let tree = Node::call(
        Func::pure("Join"),
        [Node::global("S", DType::seq(DType::Text)), body],
        [CallScope {
            scope: it.clone(),
            index: None,
            slot: 1,
        }],
        DType::Text,
    );
    let result = hoist(&tree);
    assert_eq!(result.hoisted, 1);
    insta::assert_snapshot!(
        result.node.to_string(),
        @r#"with(w0 = ("y" & "z"); Join(S, it1 => ("x" & f(it1) & w0)))"#
    );
}

#[test]
fn equivalent_expressions_share_one_binding() {
    let it = item(DType::Int);
    let k2 = || mul(global("k"), global("k"));
    let mut inverted = BitSet::new();
    inverted.insert(1);
    let minus = Node::variadic(
        VariadicOp::Add,
        [k2(), Node::scope_ref(&it)],
        inverted,
        DType::Int,
    );
    let tree = sum("S", &it, mul(add([k2(), Node::scope_ref(&it)]), minus));

    let result = hoist(&tree);
    assert_eq!(result.hoisted, 1);
    assert_eq!(result.deduplicated, 1);
    insta::assert_snapshot!(
        result.node.to_string(),
        @"with(w0 = (k * k); Sum(S, it1 => ((w0 + it1) * (w0 - it1))))"
    );

    let config = HoistConfig {
        dedup: false,
        ..HoistConfig::default()
    };
    let result = hoist_with_config(&tree, &config);
    assert_eq!(result.hoisted, 2);
    assert_eq!(result.deduplicated, 0);
}

#[test]
fn ungrouped_variadics_hoist_operands_one_by_one() {
    let it = item(DType::Int);
    let tree = sum(
        "S",
        &it,
        add([
            mul(global("a"), global("b")),
            mul(global("c"), global("d")),
            Node::scope_ref(&it),
        ]),
    );
    let grouped = hoist(&tree);
    insta::assert_snapshot!(grouped.node.to_string(), @"with(w0 = ((a * b) + (c * d)); Sum(S, it1 => (w0 + it1)))");

    let config = HoistConfig {
        group_variadics: false,
        ..HoistConfig::default()
    };
    let single = hoist_with_config(&tree, &config);
    insta::assert_snapshot!(
        single.node.to_string(),
        @"with(w0 = (a * b); w1 = (c * d); Sum(S, it2 => (w0 + w1 + it2)))"
    );
}

#[test]
fn effects_stay_in_place() {
    let it = item(DType::Int);
    let tree = sum(
        "S",
        &it,
        add([tick(), mul(global("k"), global("k")), Node::scope_ref(&it)]),
    );
    let result = hoist(&tree);
    insta::assert_snapshot!(result.node.to_string(), @"with(w0 = (k * k); Sum(S, it1 => (Tick() + w0 + it1)))");

    let invariant_tick = sum("S", &it, add([tick(), global("k")]));
    assert!(!hoist(&invariant_tick).changed);
}

#[test]
fn erroneous_subtrees_are_untouched() {
    let it = item(DType::Int);
    let tree = sum(
        "S",
        &it,
        add([
            Node::error("bad operand", DType::Int),
            mul(global("k"), global("k")),
            Node::scope_ref(&it),
        ]),
    );
    let result = hoist(&tree);
    assert!(!result.changed);
    assert!(result.node.ptr_eq(&tree));
}

#[test]
fn scope_owner_clauses_hoist_around_their_row_scope() {
    let row_ty = DType::record([("x", DType::Int)]);
    let row = ArgScope::new(ScopeKind::Iter, row_ty.clone());
    let adds = Clause::new([
        (
            "y",
            add([
                Node::get_field(Node::scope_ref(&row), "x"),
                mul(global("k"), global("k")),
            ]),
        ),
        ("z", mul(global("m"), global("m"))),
    ]);
    let tree = Node::set_fields(Node::global("S", DType::seq(row_ty)), row, adds);

    let result = hoist(&tree);
    assert_eq!(result.hoisted, 2);
    insta::assert_snapshot!(
        result.node.to_string(),
        @"with(w0 = (k * k); w1 = (m * m); setfields(S, g2 => {y: (g2.x + w0), z: w1}))"
    );
    assert_eq!(result.node.ty(), tree.ty());
}

#[test]
fn group_by_clauses_hoist_around_their_scopes() {
    let row_ty = DType::record([("k", DType::Int), ("v", DType::Int)]);
    let mapped_ty = DType::record([("v", DType::Int)]);
    let row = item(row_ty.clone());
    let group = ArgScope::new(ScopeKind::Iter, DType::seq(mapped_ty.clone()));
    let member = item(mapped_ty);
    let field = |name: &str| Node::get_field(Node::scope_ref(&row), name);
    let count = Node::call(
        Func::pure("Sum"),
        [Node::scope_ref(&group), mul(global("m"), global("m"))],
        [CallScope {
            scope: member,
            index: None,
            slot: 1,
        }],
        DType::Int,
    );
    let tree = Node::group_by(GroupBy {
        source: Node::global("T", DType::seq(row_ty)),
        item: row.clone(),
        keys: Clause::new([("k", add([field("k"), mul(global("a"), global("b"))]))]),
        maps: Clause::new([("v", mul(field("v"), field("v")))]),
        group,
        aggs: Clause::new([("n", count)]),
    });

    let result = hoist(&tree);
    assert_eq!(result.hoisted, 2);
    insta::assert_snapshot!(
        result.node.to_string(),
        @"with(w0 = (a * b); w1 = (m * m); groupby(T, it2 => keys{k: (it2.k + w0)} maps{v: (it2.v * it2.v)}, g3 => aggs{n: Sum(g3, it4 => w1)}))"
    );
    assert_eq!(result.node.ty(), tree.ty());
    assert_eq!(validate(&result.node, &[]), Ok(()));
    assert!(!hoist(&result.node).changed);
}

#[test]
fn module_projection_keeps_terms_over_its_scope() {
    let module_ty = DType::module([("x", DType::Int)]);
    let this = ArgScope::new(ScopeKind::With, module_ty.clone());
    let it = item(DType::Int);
    let x = || Node::get_field(Node::scope_ref(&this), "x");
    let record = Node::record([
        ("y", add([x(), mul(global("k"), global("k"))])),
        ("z", add([Node::scope_ref(&it), x()])),
    ]);
    let projection = Node::module_projection(Node::global("M", module_ty), this.clone(), record);
    let tree = sum("S", &it, Node::get_field(projection, "y"));

    let result = hoist(&tree);
    assert_eq!(result.hoisted, 1);
    insta::assert_snapshot!(
        result.node.to_string(),
        @"with(w0 = (k * k); Sum(S, it1 => project(M, w2 => {y: (w2.x + w0), z: (it1 + w2.x)}).y))"
    );
    assert_eq!(validate(&result.node, &[]), Ok(()));
    assert!(!hoist(&result.node).changed);
}

#[test]
fn reports_hoists_to_host() {
    #[derive(Default)]
    struct Log {
        associated: Vec<(String, String)>,
    }

    impl ReduceHost for Log {
        fn associate(&mut self, old: &Node, new: &Node) {
            self.associated.push((old.to_string(), new.to_string()));
        }
    }

    let it = item(DType::Int);
    let tree = sum("S", &it, add([mul(global("k"), global("k")), Node::scope_ref(&it)]));
    let mut log = Log::default();
    let result = hoist_with_host(&tree, &HoistConfig::default(), &mut log);
    assert!(result.changed);
    assert_eq!(log.associated, vec![("(k * k)".to_owned(), "w0".to_owned())]);
}

#[test]
fn deep_trees_are_skipped_with_warning() {
    let it = item(DType::Int);
    let tree = sum("S", &it, add([mul(global("k"), global("k")), Node::scope_ref(&it)]));
    let config = HoistConfig {
        max_depth: 2,
        ..HoistConfig::default()
    };
    let mut host = tally_bound::Warnings::default();
    let result = hoist_with_host(&tree, &config, &mut host);
    assert!(!result.changed);
    assert!(result.node.ptr_eq(&tree));
    assert_eq!(
        result.warnings,
        vec!["expression nesting exceeds 2 levels; hoisting skipped".to_owned()]
    );
    assert_eq!(host.messages, result.warnings);
}

/// `Sum(S, it => -(...-it) + k * k)` with `negations` nested negations;
/// the tree is `negations + 3` levels deep.
fn negation_chain(negations: usize) -> Node {
    let it = item(DType::Int);
    let mut chain = Node::scope_ref(&it);
    for _ in 0..negations {
        chain = Node::unary(UnaryOp::Negate, chain);
    }
    sum("S", &it, add([chain, mul(global("k"), global("k"))]))
}

#[test]
fn default_depth_limit_fits_a_standard_thread_stack() {
    let max_depth = HoistConfig::default().max_depth;
    let handle = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(move || {
            let at_limit = hoist(&negation_chain(max_depth - 3));
            assert!(at_limit.warnings.is_empty());
            assert_eq!(at_limit.hoisted, 1);

            let beyond = hoist(&negation_chain(max_depth - 2));
            assert!(!beyond.changed);
            assert_eq!(beyond.warnings.len(), 1);

            let far_beyond = hoist(&negation_chain(1500));
            assert!(!far_beyond.changed);
        })
        .unwrap();
    handle.join().unwrap();
}

#[test]
fn config_deserializes_with_defaults() {
    let config: HoistConfig = serde_json::from_str(r#"{"dedup": false}"#).unwrap();
    assert!(!config.dedup);
    assert!(config.group_variadics);
    assert_eq!(config.max_depth, 256);
}
