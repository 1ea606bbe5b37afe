use rstest::{fixture, rstest};
use xqnav::store::{Data, DbNode};
use xqnav::{Axis, NodeKind, XdmNode};

#[fixture]
fn nodes() -> Vec<DbNode> {
    let data = Data::from_xml(
        r#"<r xmlns:p="urn:p"><a k="1"><b/>t<c><d/></c></a><!--x--><e><?pi v?><f k="2">u</f></e></r>"#,
    )
    .unwrap();
    let doc = data.document(0).unwrap();
    let mut all = vec![doc.clone()];
    all.extend(Axis::Descendant.iterate(&doc));
    all
}

fn is_tree_node(n: &DbNode) -> bool {
    !matches!(n.kind(), NodeKind::Attribute | NodeKind::Namespace)
}

#[rstest]
fn inversion_is_an_involution_except_attribute_and_namespace() {
    for axis in Axis::ALL {
        match axis {
            Axis::Attribute | Axis::Namespace => {
                assert_eq!(axis.invert(), Axis::Parent);
                assert_eq!(Axis::Parent.invert(), Axis::Child);
            }
            _ => assert_eq!(axis.invert().invert(), axis, "{axis}"),
        }
    }
}

#[rstest]
fn names_round_trip() {
    for axis in Axis::ALL {
        assert_eq!(Axis::from_name(axis.name()), Some(axis));
    }
    assert_eq!(Axis::from_name("sideways"), None);
}

#[rstest]
fn inverse_axis_leads_back(nodes: Vec<DbNode>) {
    for x in nodes.iter().filter(|n| is_tree_node(n)) {
        for axis in Axis::ALL {
            if matches!(axis, Axis::Attribute | Axis::Namespace) {
                continue;
            }
            for y in axis.iterate(x).filter(is_tree_node) {
                let back: Vec<DbNode> = axis.invert().iterate(&y).collect();
                assert!(back.contains(x), "{axis} from {x:?} reached {y:?}, but not back");
            }
        }
    }
}

#[rstest]
fn attributes_lead_back_through_parent(nodes: Vec<DbNode>) {
    for x in &nodes {
        for attr in Axis::Attribute.iterate(x) {
            let parents: Vec<DbNode> = Axis::Parent.iterate(&attr).collect();
            assert_eq!(parents, vec![x.clone()]);
            assert!(Axis::Child.iterate(x).all(|c| c != attr));
        }
    }
}

#[rstest]
fn forward_axes_are_in_document_order(nodes: Vec<DbNode>) {
    for x in &nodes {
        for axis in Axis::ALL.into_iter().filter(|a| !a.is_reverse()) {
            let pres: Vec<u32> = axis.iterate(x).map(|n| n.pre()).collect();
            assert!(pres.windows(2).all(|w| w[0] < w[1]), "{axis} from {x:?}: {pres:?}");
        }
    }
}

#[rstest]
fn reverse_axes_are_nearest_first(nodes: Vec<DbNode>) {
    for x in &nodes {
        for axis in Axis::ALL.into_iter().filter(|a| a.is_reverse()) {
            let pres: Vec<u32> = axis.iterate(x).map(|n| n.pre()).collect();
            assert!(pres.windows(2).all(|w| w[0] > w[1]), "{axis} from {x:?}: {pres:?}");
        }
    }
}

#[rstest]
fn downward_axes_stay_in_the_subtree(nodes: Vec<DbNode>) {
    for x in &nodes {
        for axis in Axis::ALL.into_iter().filter(|a| a.is_downward()) {
            for y in axis.iterate(x) {
                let mut up = Some(y.clone());
                while let Some(n) = up.clone()
                    && n != *x
                {
                    up = n.parent();
                }
                assert_eq!(up.as_ref(), Some(x), "{axis} from {x:?} left the subtree at {y:?}");
            }
        }
    }
}

#[rstest]
fn namespace_axis_reports_in_scope_bindings(nodes: Vec<DbNode>) {
    let f = nodes
        .iter()
        .find(|n| n.name().is_some_and(|q| q.local == "f"))
        .unwrap();
    let prefixes: Vec<String> = Axis::Namespace
        .iterate(f)
        .filter_map(|n| n.name().map(|q| q.local.to_string()))
        .collect();
    assert!(prefixes.iter().any(|p| p == "p"), "{prefixes:?}");
}
