//! Node tests: the closed family of single-node predicates a step filters with.
//!
//! Every test is immutable and cheap to clone; composite payloads are shared
//! behind `Arc`. Besides `matches`, the family supports the static reasoning the
//! optimizer needs (`instance_of`, `intersect`), implemented in [`algebra`].

mod algebra;

use core::fmt;
use std::sync::Arc;

use compact_str::CompactString;
use itertools::Itertools;

pub use name::{NameMode, NameTest};

use crate::model::{NodeKind, XdmNode};
use crate::stats::{DataStatistics, StoreId};

/// Schema type refinement of an extended kind test such as `element(*, xs:untyped)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// `xs:anyType`, `xs:anySimpleType`, `xs:anyAtomicType`
    Any,
    /// `xs:untyped`, `xs:untypedAtomic`
    Untyped,
    /// Any other named type. Nodes of an untyped store never carry one.
    Named(CompactString),
}

impl TypeRef {
    pub fn from_name(name: &str) -> Self {
        match name.strip_prefix("xs:").unwrap_or(name) {
            "anyType" | "anySimpleType" | "anyAtomicType" => TypeRef::Any,
            "untyped" | "untypedAtomic" => TypeRef::Untyped,
            _ => TypeRef::Named(name.into()),
        }
    }

    pub fn admits_untyped(&self) -> bool {
        !matches!(self, TypeRef::Named(_))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Any => f.write_str("xs:anyType"),
            TypeRef::Untyped => f.write_str("xs:untyped"),
            TypeRef::Named(n) => f.write_str(n),
        }
    }
}

/// Extended kind test with optional name and type refinement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeTest {
    pub kind: NodeKind,
    /// Element/attribute name, or processing-instruction target (local part only).
    pub name: Option<NameTest>,
    pub type_ref: Option<TypeRef>,
}

impl NodeTest {
    pub fn matches<N: XdmNode>(&self, node: &N) -> bool {
        if node.kind() != self.kind {
            return false;
        }
        if let Some(t) = &self.type_ref
            && !t.admits_untyped()
        {
            return false;
        }
        match &self.name {
            None => true,
            Some(nt) if self.kind == NodeKind::ProcessingInstruction => {
                node.name().map(|q| q.local) == nt.local
            }
            Some(nt) => nt.matches(node),
        }
    }
}

/// `document-node(T)`: a document whose single non-comment, non-PI child matches `T`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocTest {
    pub child: Arc<Test>,
}

impl DocTest {
    pub fn matches<N: XdmNode>(&self, node: &N) -> bool {
        node.kind() == NodeKind::Document && only_content_child_matches(node, &self.child)
    }
}

fn only_content_child_matches<N: XdmNode>(doc: &N, test: &Test) -> bool {
    let mut content = doc.children().filter(|c| {
        !matches!(
            c.kind(),
            NodeKind::Comment | NodeKind::ProcessingInstruction
        )
    });
    match (content.next(), content.next()) {
        (Some(only), None) => test.matches(&only),
        _ => false,
    }
}

/// Document test restricted to a known set of document roots of one store.
///
/// Only produced by the optimizer, when a context covers part of a multi-document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RestrictedDocTest {
    pub store: StoreId,
    /// Sorted `doc_order_key`s of the admitted document nodes.
    pub roots: Arc<[u64]>,
    /// Optional `document-node(T)` refinement.
    pub child: Option<Arc<Test>>,
}

impl RestrictedDocTest {
    pub fn new(store: StoreId, mut roots: Vec<u64>) -> Self {
        roots.sort_unstable();
        roots.dedup();
        Self {
            store,
            roots: roots.into(),
            child: None,
        }
    }

    pub fn matches<N: XdmNode>(&self, node: &N) -> bool {
        if node.kind() != NodeKind::Document || node.store_id() != Some(self.store) {
            return false;
        }
        let Some(key) = node.doc_order_key() else {
            return false;
        };
        self.roots.binary_search(&key).is_ok()
            && self
                .child
                .as_ref()
                .is_none_or(|c| only_content_child_matches(node, c))
    }
}

/// Alternatives of one node kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnionTest {
    pub members: Arc<[Test]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Test {
    /// Kind test; `None` is the universal `node()` test.
    Kind(Option<NodeKind>),
    Name(NameTest),
    Node(NodeTest),
    Doc(DocTest),
    RestrictedDoc(RestrictedDocTest),
    Union(UnionTest),
}

impl Test {
    pub const NODE: Test = Test::Kind(None);
    pub const DOCUMENT: Test = Test::Kind(Some(NodeKind::Document));
    pub const ELEMENT: Test = Test::Kind(Some(NodeKind::Element));
    pub const ATTRIBUTE: Test = Test::Kind(Some(NodeKind::Attribute));
    pub const TEXT: Test = Test::Kind(Some(NodeKind::Text));
    pub const COMMENT: Test = Test::Kind(Some(NodeKind::Comment));
    pub const PI: Test = Test::Kind(Some(NodeKind::ProcessingInstruction));
    pub const NAMESPACE: Test = Test::Kind(Some(NodeKind::Namespace));

    pub fn kind_of(kind: NodeKind) -> Test {
        Test::Kind(Some(kind))
    }

    pub fn element(local: &str) -> Test {
        Test::Name(NameTest::local(NodeKind::Element, local))
    }

    pub fn attribute(local: &str) -> Test {
        Test::Name(NameTest::local(NodeKind::Attribute, local))
    }

    pub fn document(child: Test) -> Test {
        Test::Doc(DocTest {
            child: Arc::new(child),
        })
    }

    /// Union of tests; members must share one node kind. Nested unions are flattened
    /// and a single member is returned as is.
    pub fn union(members: impl IntoIterator<Item = Test>) -> Option<Test> {
        let mut flat: Vec<Test> = Vec::new();
        for m in members {
            match m {
                Test::Union(u) => flat.extend(u.members.iter().cloned()),
                other => flat.push(other),
            }
        }
        flat.dedup();
        let kind = flat.first()?.kind();
        if kind.is_none() || flat.iter().any(|m| m.kind() != kind) {
            return None;
        }
        if flat.len() == 1 {
            return flat.pop();
        }
        Some(Test::Union(UnionTest {
            members: flat.into(),
        }))
    }

    /// Node kind matched by this test, `None` for `node()`.
    pub fn kind(&self) -> Option<NodeKind> {
        match self {
            Test::Kind(k) => *k,
            Test::Name(n) => Some(n.kind),
            Test::Node(n) => Some(n.kind),
            Test::Doc(_) | Test::RestrictedDoc(_) => Some(NodeKind::Document),
            Test::Union(u) => u.members.first().and_then(Test::kind),
        }
    }

    pub fn matches<N: XdmNode>(&self, node: &N) -> bool {
        match self {
            Test::Kind(None) => true,
            Test::Kind(Some(k)) => node.kind() == *k,
            Test::Name(n) => n.matches(node),
            Test::Node(n) => n.matches(node),
            Test::Doc(d) => d.matches(node),
            Test::RestrictedDoc(r) => r.matches(node),
            Test::Union(u) => u.members.iter().any(|m| m.matches(node)),
        }
    }

    /// Whether at most one node with this test can sit on the attribute axis of an element.
    pub(crate) fn names_single_attribute(&self) -> bool {
        matches!(self, Test::Name(n) if n.kind == NodeKind::Attribute && n.mode == NameMode::Full)
    }

    /// Local name required by the test, if any.
    pub fn required_local(&self) -> Option<&str> {
        match self {
            Test::Name(n) => n.local_constraint().map(CompactString::as_str),
            Test::Node(NodeTest { name: Some(n), .. }) => {
                n.local_constraint().map(CompactString::as_str)
            }
            _ => None,
        }
    }

    /// Name tests only: consults the data's name dictionary.
    ///
    /// `None` means the test can never match a node of the data; otherwise the returned
    /// test replaces this one (it may be narrowed to a local-name comparison).
    pub fn optimize(&self, stats: &dyn DataStatistics) -> Option<Test> {
        match self {
            Test::Name(n) if n.local_constraint().is_some() => n.optimize(stats).map(Test::Name),
            _ => Some(self.clone()),
        }
    }
}

impl fmt::Display for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Test::Kind(None) => f.write_str("node()"),
            Test::Kind(Some(k)) => f.write_str(k.test_name()),
            Test::Name(n) => write!(f, "{n}"),
            Test::Node(n) => {
                let kw = n.kind.test_name().trim_end_matches("()");
                match (&n.name, &n.type_ref) {
                    (None, None) => write!(f, "{kw}()"),
                    (Some(nm), None) => write!(f, "{kw}({nm})"),
                    (None, Some(t)) => write!(f, "{kw}(*, {t})"),
                    (Some(nm), Some(t)) => write!(f, "{kw}({nm}, {t})"),
                }
            }
            Test::Doc(d) => write!(f, "document-node({})", d.child),
            Test::RestrictedDoc(r) => {
                write!(f, "document-node(")?;
                if let Some(c) = &r.child {
                    write!(f, "{c}")?;
                }
                write!(f, ")[{} of {}]", r.roots.len(), r.store)
            }
            Test::Union(u) => write!(f, "({})", u.members.iter().join(" | ")),
        }
    }
}
