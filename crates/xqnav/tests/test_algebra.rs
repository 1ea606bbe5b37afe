use rstest::{fixture, rstest};
use xqnav::store::{Data, DbNode};
use xqnav::test::NodeTest;
use xqnav::{Axis, NameTest, NodeKind, Test, XdmNode};

#[fixture]
fn nodes() -> Vec<DbNode> {
    let data = Data::from_xml(
        r#"<r xmlns:p="urn:p" id="0"><p:x p:id="1">a</p:x><x id="2"/><y><!--c--><?t v?></y></r>"#,
    )
    .unwrap();
    let doc = data.document(0).unwrap();
    let mut all = vec![doc.clone()];
    for n in Axis::Descendant.iterate(&doc) {
        all.extend(Axis::Attribute.iterate(&n));
        all.extend(Axis::Namespace.iterate(&n));
        all.push(n);
    }
    all
}

fn tests() -> Vec<Test> {
    vec![
        Test::NODE,
        Test::DOCUMENT,
        Test::ELEMENT,
        Test::ATTRIBUTE,
        Test::TEXT,
        Test::COMMENT,
        Test::PI,
        Test::element("x"),
        Test::element("y"),
        Test::attribute("id"),
        Test::Name(NameTest::any_namespace(NodeKind::Element, "x")),
        Test::Name(NameTest::namespace(NodeKind::Element, Some("urn:p"))),
        Test::Name(NameTest::full(NodeKind::Element, "x", Some("urn:p"))),
        Test::Name(NameTest::any_namespace(NodeKind::Attribute, "id")),
        Test::Name(NameTest::wildcard(NodeKind::Attribute)),
        Test::union([Test::element("x"), Test::element("y")]).unwrap(),
        Test::union([Test::element("r"), Test::Name(NameTest::namespace(NodeKind::Element, Some("urn:p")))])
            .unwrap(),
        Test::document(Test::element("r")),
        Test::NAMESPACE,
        Test::Name(NameTest::any_namespace(NodeKind::Namespace, "p")),
        Test::Name(NameTest::any_namespace(NodeKind::Namespace, "q")),
        Test::Name(NameTest::namespace(NodeKind::Namespace, None)),
        Test::Name(NameTest::local(NodeKind::Namespace, "p")),
        Test::Node(NodeTest {
            kind: NodeKind::ProcessingInstruction,
            name: Some(NameTest::any_namespace(NodeKind::ProcessingInstruction, "t")),
            type_ref: None,
        }),
        Test::Name(NameTest::full(NodeKind::ProcessingInstruction, "t", Some("urn:p"))),
    ]
}

#[rstest]
fn intersection_matches_exactly_the_common_nodes(nodes: Vec<DbNode>) {
    for a in tests() {
        for b in tests() {
            match a.intersect(&b) {
                Some(t) => {
                    for n in &nodes {
                        assert_eq!(
                            t.matches(n),
                            a.matches(n) && b.matches(n),
                            "{a} & {b} = {t} on {n:?}"
                        );
                    }
                }
                None => {
                    for n in &nodes {
                        assert!(!(a.matches(n) && b.matches(n)), "{a} & {b} empty, but {n:?}");
                    }
                }
            }
        }
    }
}

#[rstest]
fn instance_of_is_sound(nodes: Vec<DbNode>) {
    for a in tests() {
        for b in tests() {
            if a.instance_of(&b) {
                for n in nodes.iter().filter(|n| a.matches(*n)) {
                    assert!(b.matches(n), "{a} instance of {b}, but {n:?}");
                }
            }
        }
    }
}

#[rstest]
fn intersection_is_commutative_in_effect(nodes: Vec<DbNode>) {
    for a in tests() {
        for b in tests() {
            let ab = a.intersect(&b);
            let ba = b.intersect(&a);
            assert_eq!(ab.is_some(), ba.is_some(), "{a} & {b}");
            if let (Some(ab), Some(ba)) = (ab, ba) {
                for n in &nodes {
                    assert_eq!(ab.matches(n), ba.matches(n));
                }
            }
        }
    }
}

#[rstest]
#[case(Test::element("x"), Test::ELEMENT, true)]
#[case(Test::ELEMENT, Test::element("x"), false)]
#[case(Test::element("x"), Test::NODE, true)]
#[case(Test::Name(NameTest::full(NodeKind::Element, "x", Some("urn:p"))), Test::Name(NameTest::namespace(NodeKind::Element, Some("urn:p"))), true)]
#[case(Test::element("x"), Test::union([Test::element("x"), Test::element("y")]).unwrap(), true)]
#[case(Test::attribute("x"), Test::ELEMENT, false)]
fn instance_of_cases(#[case] a: Test, #[case] b: Test, #[case] expected: bool) {
    assert_eq!(a.instance_of(&b), expected, "{a} instance of {b}");
}

#[rstest]
fn union_of_different_kinds_is_rejected() {
    assert!(Test::union([Test::element("x"), Test::attribute("x")]).is_none());
    assert_eq!(Test::union([Test::element("x")]), Some(Test::element("x")));
}

#[rstest]
fn disjoint_kinds_do_not_intersect() {
    assert!(Test::TEXT.intersect(&Test::COMMENT).is_none());
    assert!(Test::element("x").intersect(&Test::element("y")).is_none());
    assert!(Test::element("x").intersect(&Test::attribute("x")).is_none());
}
