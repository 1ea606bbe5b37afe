use core::cmp::Ordering;
use core::fmt;

use compact_str::CompactString;

use crate::error::{Error, ErrorCode};
use crate::stats::StoreId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

impl NodeKind {
    /// Kind-test spelling, e.g. `element()` or `document-node()`.
    pub fn test_name(self) -> &'static str {
        match self {
            NodeKind::Document => "document-node()",
            NodeKind::Element => "element()",
            NodeKind::Attribute => "attribute()",
            NodeKind::Text => "text()",
            NodeKind::Comment => "comment()",
            NodeKind::ProcessingInstruction => "processing-instruction()",
            NodeKind::Namespace => "namespace-node()",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<CompactString>,
    pub local: CompactString,
    pub ns_uri: Option<CompactString>,
}

impl QName {
    pub fn local(local: &str) -> Self {
        Self {
            prefix: None,
            local: local.into(),
            ns_uri: None,
        }
    }

    pub fn new(prefix: Option<&str>, local: &str, ns_uri: Option<&str>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()).map(Into::into),
            local: local.into(),
            ns_uri: ns_uri.filter(|u| !u.is_empty()).map(Into::into),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.prefix, &self.ns_uri) {
            (Some(p), _) => write!(f, "{p}:{}", self.local),
            (None, Some(uri)) => write!(f, "Q{{{uri}}}{}", self.local),
            (None, None) => f.write_str(&self.local),
        }
    }
}

/// Document order from ancestry alone, for nodes without an order key.
///
/// An ancestor precedes its descendants. Below the deepest common ancestor the
/// attributes come first, then namespace nodes, then children, each in the order the
/// node yields them. Nodes without a common root have no order here (`err:FOER0000`).
pub fn try_compare_by_ancestry<N: XdmNode>(a: &N, b: &N) -> Result<Ordering, Error> {
    if a == b {
        return Ok(Ordering::Equal);
    }
    fn path_to_root<N: XdmNode>(mut n: N) -> Vec<N> {
        let mut p = vec![n.clone()];
        while let Some(parent) = n.parent() {
            p.push(parent.clone());
            n = parent;
        }
        p.reverse();
        p
    }
    let pa = path_to_root(a.clone());
    let pb = path_to_root(b.clone());
    let mut i = 0usize;
    let len = core::cmp::min(pa.len(), pb.len());
    while i < len && pa[i] == pb[i] {
        i += 1;
    }
    if i == len {
        // shorter path is ancestor
        return Ok(pa.len().cmp(&pb.len()));
    }
    if i == 0 {
        return Err(Error::from_code(
            ErrorCode::FOER0000,
            "document order requires adapter: nodes from different roots",
        ));
    }
    let parent = &pa[i - 1];
    let mut sibs: Vec<N> = Vec::new();
    sibs.extend(parent.attributes());
    sibs.extend(parent.namespaces());
    sibs.extend(parent.children());
    let posa = sibs.iter().position(|n| n == &pa[i]);
    let posb = sibs.iter().position(|n| n == &pb[i]);
    Ok(match (posa, posb) {
        (Some(aidx), Some(bidx)) => aidx.cmp(&bidx),
        _ => Ordering::Equal,
    })
}

/// Node model the path engine navigates.
///
/// Only `kind`, `name`, `string_value`, `parent` and the three child-like iterators are
/// mandatory. The sibling helpers have linear default implementations; stores with a
/// positional layout override them.
pub trait XdmNode: Clone + Eq + fmt::Debug + Send + Sync + 'static {
    type Children<'a>: Iterator<Item = Self> + Send + 'a
    where
        Self: 'a;
    type Attributes<'a>: Iterator<Item = Self> + Send + 'a
    where
        Self: 'a;
    type Namespaces<'a>: Iterator<Item = Self> + Send + 'a
    where
        Self: 'a;

    fn kind(&self) -> NodeKind;
    fn name(&self) -> Option<QName>;
    fn string_value(&self) -> String;

    fn parent(&self) -> Option<Self>;
    fn children(&self) -> Self::Children<'_>;
    fn attributes(&self) -> Self::Attributes<'_>;
    fn namespaces(&self) -> Self::Namespaces<'_>;

    /// Optional hint for document order comparisons. If provided, the engine uses this
    /// value to avoid recomputing ancestry during ordering operations. Keys must be
    /// unique per node and totally ordered across every node the engine may see together.
    fn doc_order_key(&self) -> Option<u64> {
        None
    }

    /// Identity of the storage instance backing this node, if any. Nodes without a
    /// store never take part in statistics-driven rewrites.
    fn store_id(&self) -> Option<StoreId> {
        None
    }

    /// Default document order comparison uses ancestry and sibling order.
    fn compare_document_order(&self, other: &Self) -> Result<Ordering, Error> {
        try_compare_by_ancestry(self, other)
    }

    fn root(&self) -> Self {
        let mut cur = self.clone();
        while let Some(p) = cur.parent() {
            cur = p;
        }
        cur
    }

    fn first_child(&self) -> Option<Self> {
        self.children().next()
    }

    fn last_child(&self) -> Option<Self> {
        self.children().last()
    }

    fn next_sibling(&self) -> Option<Self> {
        if is_attr_or_namespace(self) {
            return None;
        }
        let parent = self.parent()?;
        let mut seen = false;
        for s in parent.children() {
            if seen {
                return Some(s);
            }
            if s == *self {
                seen = true;
            }
        }
        None
    }

    fn prev_sibling(&self) -> Option<Self> {
        if is_attr_or_namespace(self) {
            return None;
        }
        let parent = self.parent()?;
        let mut prev: Option<Self> = None;
        for s in parent.children() {
            if s == *self {
                return prev;
            }
            prev = Some(s);
        }
        None
    }
}

#[inline]
pub(crate) fn is_attr_or_namespace<N: XdmNode>(node: &N) -> bool {
    matches!(node.kind(), NodeKind::Attribute | NodeKind::Namespace)
}

/// Document order comparison preferring `doc_order_key`.
pub fn node_compare<N: XdmNode>(a: &N, b: &N) -> Result<Ordering, Error> {
    match (a.doc_order_key(), b.doc_order_key()) {
        (Some(ak), Some(bk)) => Ok(ak.cmp(&bk)),
        _ => a.compare_document_order(b),
    }
}
