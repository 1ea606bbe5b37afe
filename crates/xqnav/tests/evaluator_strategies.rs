use std::sync::Arc;

use rstest::{fixture, rstest};
use xqnav::order::is_sorted_distinct;
use xqnav::store::{Catalog, Data, DbNode, ValueIndexEstimator};
use xqnav::{
    CompileContextBuilder, DynamicContextBuilder, Expr, OptimizerOptions, PathStrategy,
    StepStrategy, XdmItem, XdmNode, compile, parse,
};

const DOC: &str = concat!(
    "<lib>",
    r#"<sec id="s1"><book id="b1"><title>Rust</title><year>2015</year></book>"#,
    r#"<book id="b2"><title>Go</title><year>2009</year></book></sec>"#,
    r#"<sec id="s2"><book id="b3"><title>Zig</title><year>2016</year>"#,
    r#"<note><book id="b4"><title>Nim</title></book></note></book></sec>"#,
    "</lib>",
);

const QUERIES: &[&str] = &[
    "//book",
    "//book/title",
    "//book[2]",
    "//book[last()]",
    "//book[position() <= 2]/title",
    "//sec/book[1]/@id",
    "//title/ancestor::*",
    "//book//title",
    "//book/following-sibling::book",
    "//title/preceding::title",
    "//sec[@id = 's2']//book",
    "//book[title = 'Go']",
    "descendant::book[year > 2010]",
    "//book[@id = 'b4']/ancestor::book",
    "//*[@id]",
    "/lib/sec/book/title/text()",
    "//book[not(note)]",
    "//book/string(@id)",
    "//book/descendant-or-self::book/title",
    "//sec/descendant::book[2]",
    "(//book)[3]",
];

struct Fixture {
    data: Arc<Data>,
    doc: DbNode,
}

#[fixture]
fn lib() -> Fixture {
    let data = Data::from_xml(DOC).unwrap();
    let doc = data.document(0).unwrap();
    Fixture { data, doc }
}

fn compile_with(f: &Fixture, query: &str, options: OptimizerOptions) -> Expr<DbNode> {
    let catalog = Arc::new(Catalog::new().with(f.data.clone()));
    let cx = CompileContextBuilder::new()
        .with_context_value(vec![XdmItem::Node(f.doc.clone())])
        .with_catalog(catalog.clone())
        .with_index_estimator(Arc::new(ValueIndexEstimator::new(catalog)))
        .with_options(options)
        .build();
    compile(query, &cx).unwrap()
}

fn run(f: &Fixture, expr: &Expr<DbNode>) -> Vec<XdmItem<DbNode>> {
    let dcx = DynamicContextBuilder::new()
        .with_context_item(f.doc.clone())
        .with_path_cache_capacity(0)
        .build();
    expr.evaluate_vec(&dcx, &dcx.initial_focus()).unwrap()
}

fn check_node_order(items: &[XdmItem<DbNode>], what: &str) {
    let nodes: Option<Vec<DbNode>> = items.iter().map(|i| i.as_node().cloned()).collect();
    if let Some(nodes) = nodes {
        assert!(is_sorted_distinct(&nodes).unwrap(), "{what}: {nodes:?}");
    }
}

#[rstest]
fn step_strategies_agree(
    lib: Fixture,
    #[values(
        StepStrategy::Plain,
        StepStrategy::Positional,
        StepStrategy::Last,
        StepStrategy::Cached
    )]
    strategy: StepStrategy,
) {
    for query in QUERIES {
        let expected = run(&lib, &parse(query).unwrap());
        let options = OptimizerOptions::default().with_step_strategy(strategy);
        let expr = compile_with(&lib, query, options);
        let got = run(&lib, &expr);
        assert_eq!(got, expected, "{strategy:?}: {query} compiled to {expr}");
        check_node_order(&got, query);
    }
}

#[rstest]
fn path_strategies_agree(
    lib: Fixture,
    #[values(
        PathStrategy::IterativeSingle,
        PathStrategy::IterativeMulti,
        PathStrategy::Cached,
        PathStrategy::Mixed
    )]
    strategy: PathStrategy,
) {
    for query in QUERIES {
        let expected = run(&lib, &parse(query).unwrap());
        let options = OptimizerOptions::default().with_path_strategy(strategy);
        let expr = compile_with(&lib, query, options);
        let got = run(&lib, &expr);
        assert_eq!(got, expected, "{strategy:?}: {query} compiled to {expr}");
        check_node_order(&got, query);
    }
}

#[rstest]
fn unoptimized_paths_are_in_document_order(lib: Fixture) {
    for query in QUERIES {
        let got = run(&lib, &parse(query).unwrap());
        check_node_order(&got, query);
    }
}

#[rstest]
fn iterative_path_streams_lazily(lib: Fixture) {
    let options = OptimizerOptions::default().with_child_rewrite(false);
    let expr = compile_with(&lib, "/lib/sec/book", options);
    let path = expr.as_path().unwrap();
    assert_eq!(path.strategy(), PathStrategy::IterativeMulti, "{expr}");

    let dcx = DynamicContextBuilder::new()
        .with_context_item(lib.doc.clone())
        .build();
    let first = expr
        .evaluate(&dcx, &dcx.initial_focus())
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(first.as_node().unwrap().string_value(), "Rust2015");
}

#[rstest]
fn overlapping_steps_fall_back_to_cached(lib: Fixture) {
    let options = OptimizerOptions::default().with_child_rewrite(false);
    let expr = compile_with(&lib, "//book//title", options);
    let path = expr.as_path().unwrap();
    assert_eq!(path.strategy(), PathStrategy::Cached, "{expr}");
}

#[rstest]
fn last_predicate_picks_last_strategy(lib: Fixture) {
    let expr = compile_with(&lib, "descendant::book[last()]", OptimizerOptions::default());
    let step = expr.as_path().unwrap().axis_step(0).unwrap();
    assert_eq!(step.strategy(), StepStrategy::Last);
    let got = run(&lib, &expr);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].as_node().unwrap().string_value(), "Nim");
}
