use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rstest::rstest;
use xqnav::store::{Data, DbNode};
use xqnav::{
    CompileContextBuilder, DynamicContextBuilder, Error, ErrorCode, Expr, XdmAtomicValue, XdmItem,
    compile, parse,
};

fn doc() -> DbNode {
    Data::from_xml("<a><b>1</b><b>2</b><c><b>3</b></c></a>")
        .unwrap()
        .document(0)
        .unwrap()
}

fn eval_err(expr: &Expr<DbNode>, context: Option<XdmItem<DbNode>>) -> Error {
    let mut builder = DynamicContextBuilder::new();
    if let Some(item) = context {
        builder = builder.with_context_item(item);
    }
    let cx = builder.build();
    expr.evaluate_vec(&cx, &cx.initial_focus()).unwrap_err()
}

#[rstest]
fn enum_roundtrip_known() {
    let codes = [
        ErrorCode::FOER0000,
        ErrorCode::FODC0006,
        ErrorCode::FORG0006,
        ErrorCode::XPDY0002,
        ErrorCode::XPTY0004,
        ErrorCode::XPTY0018,
        ErrorCode::XPTY0019,
        ErrorCode::XPTY0020,
        ErrorCode::XPST0003,
        ErrorCode::XPST0008,
        ErrorCode::XPST0017,
        ErrorCode::XPST0081,
    ];
    for c in codes {
        assert_eq!(ErrorCode::from_code(c.local()), c);
        assert_eq!(ErrorCode::from_code(&format!("err:{}", c.local())), c);
    }
    assert_eq!(ErrorCode::from_code("err:DOESNOTEXIST"), ErrorCode::Unknown);
}

#[rstest]
#[case("child::b")]
#[case("descendant::b/child::text()")]
#[case(".")]
#[case("position()")]
#[case("root()")]
fn absent_context_is_xpdy0002(#[case] query: &str) {
    let expr = parse::<DbNode>(query).unwrap();
    assert_eq!(eval_err(&expr, None).code, ErrorCode::XPDY0002);
}

#[rstest]
fn atomic_context_for_axis_step_is_xpty0020() {
    let expr = parse::<DbNode>("child::b").unwrap();
    let atomic = XdmItem::Atomic(XdmAtomicValue::Integer(1));
    assert_eq!(eval_err(&expr, Some(atomic)).code, ErrorCode::XPTY0020);
}

#[rstest]
fn atomic_root_of_path_is_xpty0019() {
    let expr = parse::<DbNode>("'x'/child::b").unwrap();
    assert_eq!(eval_err(&expr, Some(XdmItem::Node(doc()))).code, ErrorCode::XPTY0019);
}

#[rstest]
fn atomic_step_input_is_xpty0019() {
    let expr = parse::<DbNode>("descendant::b/string()/child::x").unwrap();
    assert_eq!(eval_err(&expr, Some(XdmItem::Node(doc()))).code, ErrorCode::XPTY0019);
}

#[rstest]
fn mixed_last_step_is_xpty0018() {
    let expr = parse::<DbNode>("descendant::b/(., string())").unwrap();
    assert_eq!(eval_err(&expr, Some(XdmItem::Node(doc()))).code, ErrorCode::XPTY0018);
}

#[rstest]
#[case("child::")]
#[case("//")]
#[case("a[")]
#[case("a/@")]
#[case("sideways::a")]
#[case("'unterminated")]
fn syntax_errors_are_xpst0003(#[case] query: &str) {
    let err = parse::<DbNode>(query).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0003, "{query}: {err}");
}

#[rstest]
fn unbound_variable_is_xpst0008() {
    let expr = parse::<DbNode>("$nope/child::b").unwrap();
    assert_eq!(eval_err(&expr, Some(XdmItem::Node(doc()))).code, ErrorCode::XPST0008);
}

#[rstest]
#[case("frobnicate(.)")]
#[case("count()")]
#[case("true(1)")]
fn unknown_function_or_arity_is_xpst0017(#[case] query: &str) {
    assert_eq!(parse::<DbNode>(query).unwrap_err().code, ErrorCode::XPST0017);
}

#[rstest]
fn unbound_prefix_is_xpst0081() {
    assert_eq!(parse::<DbNode>("p:a").unwrap_err().code, ErrorCode::XPST0081);
    let cx = CompileContextBuilder::new()
        .with_namespace("p", "urn:p")
        .build();
    assert!(compile::<DbNode>("p:a", &cx).is_ok());
}

#[rstest]
fn several_numbers_as_predicate_is_forg0006() {
    let expr = parse::<DbNode>("descendant::b[(1, 2)]").unwrap();
    assert_eq!(eval_err(&expr, Some(XdmItem::Node(doc()))).code, ErrorCode::FORG0006);
}

#[rstest]
fn raised_flag_cancels_with_foer0000() {
    let flag = Arc::new(AtomicBool::new(false));
    let expr = parse::<DbNode>("descendant::node()/descendant::node()").unwrap();
    let cx = DynamicContextBuilder::new()
        .with_context_item(doc())
        .with_cancel_flag(flag.clone())
        .build();
    assert!(expr.evaluate_vec(&cx, &cx.initial_focus()).is_ok());

    flag.store(true, Ordering::Relaxed);
    let err = expr.evaluate_vec(&cx, &cx.initial_focus()).unwrap_err();
    assert_eq!(err.code, ErrorCode::FOER0000);
}

#[rstest]
fn cancellation_stops_a_running_stream() {
    let flag = Arc::new(AtomicBool::new(false));
    let xml = format!("<a>{}</a>", "<b/>".repeat(4096));
    let big = Data::from_xml(&xml).unwrap().document(0).unwrap();
    let expr = parse::<DbNode>("descendant::b").unwrap();
    let cx = DynamicContextBuilder::new()
        .with_context_item(big)
        .with_cancel_flag(flag.clone())
        .with_path_cache_capacity(0)
        .build();
    let mut stream = expr.evaluate(&cx, &cx.initial_focus()).unwrap();
    assert!(stream.next().unwrap().is_ok());
    flag.store(true, Ordering::Relaxed);
    let rest: Vec<_> = stream.collect();
    assert!(rest.len() < 4095, "stream ran to completion");
    let last = rest.last().unwrap();
    assert!(last.as_ref().is_err_and(|e| e.code == ErrorCode::FOER0000));
}

#[rstest]
fn error_display_carries_code() {
    let err = parse::<DbNode>("$x[").unwrap_err();
    assert!(err.format_code().contains("XPST0003"), "{err}");
}
