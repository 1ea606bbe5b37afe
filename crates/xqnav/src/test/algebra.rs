use std::sync::Arc;

use compact_str::CompactString;

use super::{NameMode, NameTest, NodeTest, RestrictedDocTest, Test};
use crate::model::NodeKind;
use crate::stats::StoreId;

/// Normalized view of a non-union test as independent constraints.
///
/// Each field is exact, so subset and intersection can be decided per field.
#[derive(Debug, Clone)]
struct Shape {
    kind: Option<NodeKind>,
    local: Option<CompactString>,
    uri: Option<Option<CompactString>>,
    /// The test cannot match any node (unsatisfiable type refinement).
    never: bool,
    doc_child: Option<Arc<Test>>,
    restriction: Option<(StoreId, Arc<[u64]>)>,
}

impl Shape {
    fn of(test: &Test) -> Self {
        let mut shape = Shape {
            kind: test.kind(),
            local: None,
            uri: None,
            never: false,
            doc_child: None,
            restriction: None,
        };
        match test {
            Test::Kind(_) | Test::Union(_) => {}
            Test::Name(n) => shape.apply_name(n),
            Test::Node(NodeTest {
                name, type_ref, ..
            }) => {
                if let Some(n) = name {
                    shape.apply_name(n);
                }
                shape.never = type_ref.as_ref().is_some_and(|t| !t.admits_untyped());
            }
            Test::Doc(d) => shape.doc_child = Some(d.child.clone()),
            Test::RestrictedDoc(r) => {
                shape.doc_child = r.child.clone();
                shape.restriction = Some((r.store, r.roots.clone()));
            }
        }
        shape
    }

    fn apply_name(&mut self, n: &NameTest) {
        self.local = n.local_constraint().cloned();
        self.uri = n.uri_constraint().map(|u| u.cloned());
    }

    fn subset_of(&self, other: &Shape) -> bool {
        if self.never {
            return true;
        }
        if other.never {
            return false;
        }
        let kind = other.kind.is_none() || self.kind == other.kind;
        let local = other.local.is_none() || self.local == other.local;
        let uri = other.uri.is_none() || self.uri == other.uri;
        let doc = match (&self.doc_child, &other.doc_child) {
            (_, None) => true,
            (Some(a), Some(b)) => a.instance_of(b),
            (None, Some(_)) => false,
        };
        let restricted = match (&self.restriction, &other.restriction) {
            (_, None) => true,
            (Some((sa, ra)), Some((sb, rb))) => {
                sa == sb && ra.iter().all(|k| rb.binary_search(k).is_ok())
            }
            (None, Some(_)) => false,
        };
        kind && local && uri && doc && restricted
    }

    fn intersect(&self, other: &Shape) -> Option<Shape> {
        if self.never || other.never {
            return None;
        }
        Some(Shape {
            kind: meet(self.kind, other.kind)?,
            local: meet(self.local.clone(), other.local.clone())?,
            uri: meet(self.uri.clone(), other.uri.clone())?,
            never: false,
            doc_child: match (&self.doc_child, &other.doc_child) {
                (Some(a), Some(b)) => Some(Arc::new(a.intersect(b)?)),
                (a, b) => a.clone().or_else(|| b.clone()),
            },
            restriction: match (&self.restriction, &other.restriction) {
                (Some((sa, ra)), Some((sb, rb))) => {
                    if sa != sb {
                        return None;
                    }
                    let common: Vec<u64> = ra
                        .iter()
                        .copied()
                        .filter(|k| rb.binary_search(k).is_ok())
                        .collect();
                    if common.is_empty() {
                        return None;
                    }
                    Some((*sa, common.into()))
                }
                (a, b) => a.clone().or_else(|| b.clone()),
            },
        })
    }

    /// Test for this shape, `None` when a name constraint has no representation for
    /// the kind.
    fn into_test(self) -> Option<Test> {
        if let Some((store, roots)) = self.restriction {
            return Some(Test::RestrictedDoc(RestrictedDocTest {
                store,
                roots,
                child: self.doc_child,
            }));
        }
        if let Some(child) = self.doc_child {
            return Some(Test::Doc(super::DocTest { child }));
        }
        if self.local.is_none() && self.uri.is_none() {
            return Some(Test::Kind(self.kind));
        }
        match self.kind? {
            NodeKind::ProcessingInstruction => {
                // targets have no namespace
                if matches!(self.uri, Some(Some(_))) {
                    return None;
                }
                let target = self.local?;
                Some(Test::Node(NodeTest {
                    kind: NodeKind::ProcessingInstruction,
                    name: Some(NameTest::any_namespace(
                        NodeKind::ProcessingInstruction,
                        &target,
                    )),
                    type_ref: None,
                }))
            }
            kind @ (NodeKind::Element | NodeKind::Attribute | NodeKind::Namespace) => {
                let mode = match (&self.local, &self.uri) {
                    (Some(_), Some(_)) => NameMode::Full,
                    (Some(_), None) => NameMode::LocalOnly,
                    (None, _) => NameMode::UriOnly,
                };
                Some(Test::Name(NameTest {
                    kind,
                    local: self.local,
                    ns_uri: self.uri.flatten(),
                    prefix: None,
                    mode,
                }))
            }
            NodeKind::Document | NodeKind::Text | NodeKind::Comment => None,
        }
    }
}

/// Meet of two optional constraints: `None` is unconstrained; `Err`-like outer `None`
/// signals conflicting constraints.
fn meet<T: PartialEq>(a: Option<T>, b: Option<T>) -> Option<Option<T>> {
    match (a, b) {
        (Some(x), Some(y)) => (x == y).then_some(Some(x)),
        (Some(x), None) | (None, Some(x)) => Some(Some(x)),
        (None, None) => Some(None),
    }
}

impl Test {
    /// True if every node matched by `self` is matched by `other`.
    ///
    /// Sound but not complete: `false` may also mean "could not be shown". For a union
    /// on the left every member has to qualify; for a union on the right one member
    /// has to cover `self`.
    pub fn instance_of(&self, other: &Test) -> bool {
        if *other == Test::NODE || self == other {
            return true;
        }
        match (self, other) {
            (Test::Union(u), _) => u.members.iter().all(|m| m.instance_of(other)),
            (_, Test::Union(u)) => u.members.iter().any(|m| self.instance_of(m)),
            _ => Shape::of(self).subset_of(&Shape::of(other)),
        }
    }

    /// True if `other` is an instance of one of this test's members (or of this test
    /// itself when it is not a union).
    pub fn covers(&self, other: &Test) -> bool {
        match self {
            Test::Union(u) => u.members.iter().any(|m| other.instance_of(m)),
            _ => other.instance_of(self),
        }
    }

    /// Test matching exactly the nodes matched by both tests, `None` if no node can.
    pub fn intersect(&self, other: &Test) -> Option<Test> {
        if self.instance_of(other) {
            return Some(self.clone());
        }
        if other.instance_of(self) {
            return Some(other.clone());
        }
        match (self, other) {
            (Test::Union(u), _) => Test::union(u.members.iter().filter_map(|m| m.intersect(other))),
            (_, Test::Union(u)) => Test::union(u.members.iter().filter_map(|m| self.intersect(m))),
            _ => Shape::of(self)
                .intersect(&Shape::of(other))
                .and_then(Shape::into_test),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meet_conflicts_yield_none() {
        assert_eq!(meet(Some(1), Some(2)), None);
        assert_eq!(meet(Some(1), None), Some(Some(1)));
        assert_eq!(meet::<u8>(None, None), Some(None));
    }

    #[test]
    fn namespace_names_survive_intersection() {
        let a = Test::Name(NameTest::any_namespace(NodeKind::Namespace, "foo"));
        let b = Test::Name(NameTest::namespace(NodeKind::Namespace, None));
        let Some(Test::Name(n)) = a.intersect(&b) else {
            panic!("expected name test");
        };
        assert_eq!(n.kind, NodeKind::Namespace);
        assert_eq!(n.mode, NameMode::Full);
        assert_eq!(n.local.as_deref(), Some("foo"));
    }

    #[test]
    fn local_and_uri_wildcards_meet_in_full_name() {
        let a = Test::Name(NameTest::any_namespace(NodeKind::Element, "x"));
        let b = Test::Name(NameTest::namespace(NodeKind::Element, Some("urn:a")));
        let Some(Test::Name(n)) = a.intersect(&b) else {
            panic!("expected name test");
        };
        assert_eq!(n.mode, NameMode::Full);
        assert_eq!(n.local.as_deref(), Some("x"));
        assert_eq!(n.ns_uri.as_deref(), Some("urn:a"));
    }

    #[test]
    fn restricted_doc_intersection_keeps_common_roots() {
        let a = Test::RestrictedDoc(RestrictedDocTest::new(StoreId(1), vec![1, 5, 9]));
        let b = Test::RestrictedDoc(RestrictedDocTest::new(StoreId(1), vec![5, 9, 12]));
        let Some(Test::RestrictedDoc(r)) = a.intersect(&b) else {
            panic!("expected restricted doc test");
        };
        assert_eq!(&*r.roots, &[5, 9]);
        let c = Test::RestrictedDoc(RestrictedDocTest::new(StoreId(2), vec![5]));
        assert!(a.intersect(&c).is_none());
    }
}
