//! Navigational axes and their streaming iterators.

use core::fmt;

use smallvec::SmallVec;
use string_cache::DefaultAtom;

use crate::model::{NodeKind, XdmNode, is_attr_or_namespace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Child,
    Descendant,
    DescendantOrSelf,
    Following,
    FollowingSibling,
    Namespace,
    Parent,
    Preceding,
    PrecedingSibling,
    SelfAxis,
}

impl Axis {
    pub const ALL: [Axis; 13] = [
        Axis::Ancestor,
        Axis::AncestorOrSelf,
        Axis::Attribute,
        Axis::Child,
        Axis::Descendant,
        Axis::DescendantOrSelf,
        Axis::Following,
        Axis::FollowingSibling,
        Axis::Namespace,
        Axis::Parent,
        Axis::Preceding,
        Axis::PrecedingSibling,
        Axis::SelfAxis,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::Attribute => "attribute",
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Following => "following",
            Axis::FollowingSibling => "following-sibling",
            Axis::Namespace => "namespace",
            Axis::Parent => "parent",
            Axis::Preceding => "preceding",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::SelfAxis => "self",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    /// Child-like axes: every result lies inside the subtree of the context node.
    pub fn is_downward(self) -> bool {
        matches!(
            self,
            Axis::Child
                | Axis::Descendant
                | Axis::DescendantOrSelf
                | Axis::Attribute
                | Axis::SelfAxis
        )
    }

    /// Axes whose natural iteration order is reverse document order.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Ancestor
                | Axis::AncestorOrSelf
                | Axis::Parent
                | Axis::Preceding
                | Axis::PrecedingSibling
        )
    }

    /// Inverse direction. Attribute and namespace nodes are reached back through
    /// `parent`, whose own inverse is `child`; all other axes invert pairwise.
    pub fn invert(self) -> Axis {
        match self {
            Axis::Ancestor => Axis::Descendant,
            Axis::AncestorOrSelf => Axis::DescendantOrSelf,
            Axis::Attribute | Axis::Namespace | Axis::Child => Axis::Parent,
            Axis::Descendant => Axis::Ancestor,
            Axis::DescendantOrSelf => Axis::AncestorOrSelf,
            Axis::Following => Axis::Preceding,
            Axis::FollowingSibling => Axis::PrecedingSibling,
            Axis::Parent => Axis::Child,
            Axis::Preceding => Axis::Following,
            Axis::PrecedingSibling => Axis::FollowingSibling,
            Axis::SelfAxis => Axis::SelfAxis,
        }
    }

    /// Node kind selected by a bare name test on this axis.
    pub fn principal_kind(self) -> NodeKind {
        match self {
            Axis::Attribute => NodeKind::Attribute,
            Axis::Namespace => NodeKind::Namespace,
            _ => NodeKind::Element,
        }
    }

    pub fn iterate<N: XdmNode>(self, node: &N) -> AxisIter<N> {
        AxisIter::new(self, node.clone())
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lazy producer for one axis applied to one origin node.
///
/// Forward axes stream in document order, reverse axes nearest-first.
pub struct AxisIter<N> {
    axis: Axis,
    node: N,
    state: AxisState<N>,
}

enum AxisState<N> {
    Init,
    SelfOnce {
        emitted: bool,
    },
    Siblings {
        current: Option<N>,
        forward: bool,
    },
    Attributes {
        buf: SmallVec<[N; 8]>,
        idx: usize,
    },
    Parent {
        done: bool,
    },
    Ancestors {
        current: Option<N>,
    },
    // Pre-order walk bounded by `after`, the first node past the anchor's subtree.
    Descend {
        last: Option<N>,
        after: Option<N>,
    },
    Following {
        next: Option<N>,
    },
    Preceding {
        path: SmallVec<[N; 16]>,
        current: Option<N>,
    },
    Namespaces {
        seen: SmallVec<[DefaultAtom; 8]>,
        current: Option<N>,
        buf: SmallVec<[N; 8]>,
        idx: usize,
    },
    Done,
}

impl<N: XdmNode> AxisIter<N> {
    fn new(axis: Axis, node: N) -> Self {
        Self {
            axis,
            node,
            state: AxisState::Init,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    fn init_state(&mut self) -> Option<N> {
        let (state, first) = match self.axis {
            Axis::SelfAxis => (AxisState::SelfOnce { emitted: false }, None),
            Axis::Child => (
                AxisState::Siblings {
                    current: first_child_in_doc(&self.node),
                    forward: true,
                },
                None,
            ),
            Axis::Attribute => (
                AxisState::Attributes {
                    buf: if matches!(self.node.kind(), NodeKind::Element) {
                        self.node.attributes().collect()
                    } else {
                        SmallVec::new()
                    },
                    idx: 0,
                },
                None,
            ),
            Axis::Parent => (AxisState::Parent { done: false }, None),
            Axis::Ancestor => (
                AxisState::Ancestors {
                    current: self.node.parent(),
                },
                None,
            ),
            Axis::AncestorOrSelf => (
                AxisState::Ancestors {
                    current: Some(self.node.clone()),
                },
                None,
            ),
            Axis::Descendant | Axis::DescendantOrSelf => {
                let after = subtree_successor(&self.node);
                if self.axis == Axis::DescendantOrSelf {
                    (
                        AxisState::Descend {
                            last: Some(self.node.clone()),
                            after,
                        },
                        Some(self.node.clone()),
                    )
                } else {
                    match first_child_in_doc(&self.node) {
                        Some(first) => (
                            AxisState::Descend {
                                last: Some(first.clone()),
                                after,
                            },
                            Some(first),
                        ),
                        None => (AxisState::Done, None),
                    }
                }
            }
            Axis::FollowingSibling => (
                AxisState::Siblings {
                    current: self.node.next_sibling(),
                    forward: true,
                },
                None,
            ),
            Axis::PrecedingSibling => (
                AxisState::Siblings {
                    current: self.node.prev_sibling(),
                    forward: false,
                },
                None,
            ),
            Axis::Following => {
                // attribute/namespace nodes follow from their owner element's content
                let start = if is_attr_or_namespace(&self.node) {
                    self.node.parent().and_then(|p| first_child_in_doc(&p)).or_else(|| {
                        self.node.parent().and_then(|p| subtree_successor(&p))
                    })
                } else {
                    subtree_successor(&self.node)
                };
                (AxisState::Following { next: start }, None)
            }
            Axis::Preceding => {
                let path = path_to_root(self.node.clone());
                let origin = if is_attr_or_namespace(&self.node) {
                    self.node.parent()
                } else {
                    Some(self.node.clone())
                };
                (
                    AxisState::Preceding {
                        path,
                        current: origin.and_then(|o| doc_predecessor(&o)),
                    },
                    None,
                )
            }
            Axis::Namespace => {
                let cur = if matches!(self.node.kind(), NodeKind::Element) {
                    Some(self.node.clone())
                } else {
                    None
                };
                (
                    AxisState::Namespaces {
                        seen: SmallVec::new(),
                        current: cur,
                        buf: SmallVec::new(),
                        idx: 0,
                    },
                    None,
                )
            }
        };
        self.state = state;
        first
    }

    fn advance(&mut self) -> Option<N> {
        if matches!(self.state, AxisState::Init)
            && let Some(first) = self.init_state()
        {
            return Some(first);
        }
        match &mut self.state {
            AxisState::Init | AxisState::Done => None,
            AxisState::SelfOnce { emitted } => {
                if *emitted {
                    return None;
                }
                *emitted = true;
                Some(self.node.clone())
            }
            AxisState::Siblings { current, forward } => {
                let cur = current.take()?;
                *current = if *forward {
                    cur.next_sibling()
                } else {
                    cur.prev_sibling()
                };
                Some(cur)
            }
            AxisState::Attributes { buf, idx } => {
                let n = buf.get(*idx).cloned()?;
                *idx += 1;
                Some(n)
            }
            AxisState::Parent { done } => {
                if *done {
                    return None;
                }
                *done = true;
                self.node.parent()
            }
            AxisState::Ancestors { current } => {
                let cur = current.take()?;
                *current = cur.parent();
                Some(cur)
            }
            AxisState::Descend { last, after } => {
                let prev = last.take()?;
                let succ = doc_successor(&prev)?;
                if after.as_ref() == Some(&succ) {
                    return None;
                }
                *last = Some(succ.clone());
                Some(succ)
            }
            AxisState::Following { next } => {
                let n = next.take()?;
                *next = doc_successor(&n);
                Some(n)
            }
            AxisState::Preceding { path, current } => {
                while let Some(cur) = current.take() {
                    *current = doc_predecessor(&cur);
                    if path.iter().any(|a| a == &cur) {
                        continue;
                    }
                    return Some(cur);
                }
                None
            }
            AxisState::Namespaces {
                seen,
                current,
                buf,
                idx,
            } => {
                if *idx < buf.len() {
                    let n = buf[*idx].clone();
                    *idx += 1;
                    return Some(n);
                }
                while let Some(cur) = current.take() {
                    *current = cur.parent();
                    if !matches!(cur.kind(), NodeKind::Element) {
                        continue;
                    }
                    buf.clear();
                    *idx = 0;
                    for ns in cur.namespaces() {
                        let prefix = ns.name().map(|q| q.local).unwrap_or_default();
                        let atom = DefaultAtom::from(prefix.as_str());
                        if !seen.iter().any(|a| a == &atom) {
                            seen.push(atom);
                            buf.push(ns);
                        }
                    }
                    if !buf.is_empty() {
                        *idx = 1;
                        return Some(buf[0].clone());
                    }
                }
                None
            }
        }
    }
}

impl<N: XdmNode> Iterator for AxisIter<N> {
    type Item = N;

    fn next(&mut self) -> Option<N> {
        self.advance()
    }
}

fn path_to_root<N: XdmNode>(n: N) -> SmallVec<[N; 16]> {
    let mut p: SmallVec<[N; 16]> = SmallVec::new();
    let mut cur = Some(n);
    while let Some(x) = cur {
        cur = x.parent();
        p.push(x);
    }
    p
}

fn first_child_in_doc<N: XdmNode>(node: &N) -> Option<N> {
    if is_attr_or_namespace(node) {
        return None;
    }
    node.first_child()
}

fn last_descendant_in_doc<N: XdmNode>(mut node: N) -> N {
    while let Some(last) = node.last_child() {
        node = last;
    }
    node
}

/// First node after the subtree rooted at `node`, in document order.
fn subtree_successor<N: XdmNode>(node: &N) -> Option<N> {
    let mut cur = node.clone();
    loop {
        if let Some(sib) = cur.next_sibling() {
            return Some(sib);
        }
        cur = cur.parent()?;
    }
}

fn doc_successor<N: XdmNode>(node: &N) -> Option<N> {
    if let Some(c) = first_child_in_doc(node) {
        return Some(c);
    }
    subtree_successor(node)
}

fn doc_predecessor<N: XdmNode>(node: &N) -> Option<N> {
    if let Some(prev_sib) = node.prev_sibling() {
        return Some(last_descendant_in_doc(prev_sib));
    }
    node.parent()
}
