use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use xqnav::store::{Catalog, Data, DataBuilder, DbNode, ValueIndexEstimator, doc, elem};
use xqnav::{
    CompileContext, CompileContextBuilder, DynamicContextBuilder, OptimizerOptions, XdmItem,
    compile, parse,
};

fn sample_queries() -> Vec<&'static str> {
    vec![
        "//item",
        "/root/section/item[@type = 'a']/@id",
        "//item[@id = 'item-250']",
        "//section[2]/item[last()]",
        "//item/ancestor::section",
        "//section//item[position() < 5]",
        "count(//item[. = 'value 7'])",
    ]
}

fn build_library() -> Arc<Data> {
    let sections = (0..20).map(|s| {
        elem("section").attr("name", &format!("s{s}")).children((0..50).map(move |i| {
            let n = s * 50 + i;
            elem("item")
                .attr("id", &format!("item-{n}"))
                .attr("type", if n % 3 == 0 { "a" } else { "b" })
                .text(&format!("value {}", n % 10))
        }))
    });
    DataBuilder::new()
        .document(doc().child(elem("root").children(sections)))
        .build()
}

fn compile_context(data: &Arc<Data>, doc: &DbNode) -> CompileContext<DbNode> {
    let catalog = Arc::new(Catalog::new().with(data.clone()));
    CompileContextBuilder::new()
        .with_context_value(vec![XdmItem::Node(doc.clone())])
        .with_catalog(catalog.clone())
        .with_index_estimator(Arc::new(ValueIndexEstimator::new(catalog)))
        .with_options(OptimizerOptions::default())
        .build()
}

fn benchmark_parser(c: &mut Criterion) {
    let queries = sample_queries();
    c.bench_function("parser/parse", |b| {
        b.iter(|| {
            for q in &queries {
                let expr = parse::<DbNode>(black_box(q)).expect("parse failure");
                black_box(expr);
            }
        });
    });
}

fn benchmark_compiler(c: &mut Criterion) {
    let data = build_library();
    let doc = data.document(0).expect("document");
    let cx = compile_context(&data, &doc);
    let queries = sample_queries();
    c.bench_function("compiler/compile", |b| {
        b.iter(|| {
            for q in &queries {
                let expr = compile(black_box(q), &cx).expect("compile failure");
                black_box(expr);
            }
        });
    });
}

fn benchmark_evaluator(c: &mut Criterion) {
    let data = build_library();
    let doc = data.document(0).expect("document");
    let cx = compile_context(&data, &doc);

    let mut group = c.benchmark_group("evaluator/evaluate");
    for q in sample_queries() {
        let plain = parse::<DbNode>(q).expect("parse failure");
        let optimized = compile(q, &cx).expect("compile failure");
        for (label, expr) in [("plain", plain), ("optimized", optimized)] {
            group.bench_with_input(BenchmarkId::new(label, q), &expr, |b, expr| {
                let dcx = DynamicContextBuilder::new()
                    .with_context_item(doc.clone())
                    .with_path_cache_capacity(0)
                    .build();
                b.iter(|| {
                    let out = expr
                        .evaluate_vec(&dcx, &dcx.initial_focus())
                        .expect("eval failure");
                    black_box(out.len());
                });
            });
        }
    }
    group.finish();
}

fn benchmark_path_cache(c: &mut Criterion) {
    let data = build_library();
    let doc = data.document(0).expect("document");
    let expr = parse::<DbNode>("//section//item").expect("parse failure");
    c.bench_function("evaluator/path_cache", |b| {
        let dcx = DynamicContextBuilder::new()
            .with_context_item(doc.clone())
            .build();
        b.iter(|| {
            let out = expr
                .evaluate_vec(&dcx, &dcx.initial_focus())
                .expect("eval failure");
            black_box(out.len());
        });
    });
}

criterion_group!(
    benches,
    benchmark_parser,
    benchmark_compiler,
    benchmark_evaluator,
    benchmark_path_cache
);
criterion_main!(benches);
