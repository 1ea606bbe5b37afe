use smallvec::SmallVec;

use super::PredicateClass;
use crate::axis::AxisIter;
use crate::context::{DynamicContext, Focus};
use crate::error::Error;
use crate::expr::{Expr, filter_by_predicate};
use crate::model::XdmNode;
use crate::test::Test;
use crate::xdm::XdmItem;

/// Raw axis nodes visited between two cancellation checks.
pub(crate) const POLL_INTERVAL: u32 = 1024;

/// Axis nodes passing the node test. Polls the cancellation flag every
/// [`POLL_INTERVAL`] visited nodes, starting with the first one.
pub(crate) struct Candidates<'a, N: XdmNode> {
    axis: AxisIter<N>,
    test: &'a Test,
    cx: &'a DynamicContext<N>,
    visited: u32,
    failed: bool,
}

impl<'a, N: XdmNode> Candidates<'a, N> {
    pub(crate) fn new(axis: AxisIter<N>, test: &'a Test, cx: &'a DynamicContext<N>) -> Self {
        Self {
            axis,
            test,
            cx,
            visited: 0,
            failed: false,
        }
    }

    fn collect_all(&mut self) -> Result<Vec<N>, Error> {
        self.by_ref().collect()
    }
}

impl<N: XdmNode> Iterator for Candidates<'_, N> {
    type Item = Result<N, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        for node in self.axis.by_ref() {
            if self.visited % POLL_INTERVAL == 0
                && let Err(e) = self.cx.check_cancelled()
            {
                self.failed = true;
                return Some(Err(e));
            }
            self.visited = self.visited.wrapping_add(1);
            if self.test.matches(&node) {
                return Some(Ok(node));
            }
        }
        None
    }
}

fn check<N: XdmNode>(
    pred: &Expr<N>,
    cx: &DynamicContext<N>,
    node: &N,
    position: usize,
) -> Result<bool, Error> {
    let focus = Focus::item(XdmItem::Node(node.clone()), position, 0);
    pred.predicate_matches(cx, &focus)
}

pub(crate) struct PlainIter<'a, N: XdmNode> {
    candidates: Candidates<'a, N>,
    predicates: &'a [Expr<N>],
    counters: SmallVec<[usize; 4]>,
}

impl<'a, N: XdmNode> PlainIter<'a, N> {
    pub(crate) fn new(candidates: Candidates<'a, N>, predicates: &'a [Expr<N>]) -> Self {
        Self {
            candidates,
            predicates,
            counters: SmallVec::from_elem(0, predicates.len()),
        }
    }

    fn passes(&mut self, node: &N) -> Result<bool, Error> {
        for (pred, counter) in self.predicates.iter().zip(self.counters.iter_mut()) {
            *counter += 1;
            if !check(pred, self.candidates.cx, node, *counter)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<N: XdmNode> Iterator for PlainIter<'_, N> {
    type Item = Result<N, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = match self.candidates.next()? {
                Ok(n) => n,
                Err(e) => return Some(Err(e)),
            };
            match self.passes(&node) {
                Ok(true) => return Some(Ok(node)),
                Ok(false) => {}
                Err(e) => {
                    self.candidates.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Positional predicates are decided from their counter; the iterator ends as soon as
/// a counter runs past its range, since no later node can pass that predicate again.
pub(crate) struct PositionalIter<'a, N: XdmNode> {
    candidates: Candidates<'a, N>,
    predicates: &'a [Expr<N>],
    classes: &'a [PredicateClass],
    counters: SmallVec<[usize; 4]>,
    exhausted: bool,
}

impl<'a, N: XdmNode> PositionalIter<'a, N> {
    pub(crate) fn new(
        candidates: Candidates<'a, N>,
        predicates: &'a [Expr<N>],
        classes: &'a [PredicateClass],
    ) -> Self {
        let exhausted = classes
            .iter()
            .any(|c| matches!(c, PredicateClass::Position { min, max } if min > max));
        Self {
            candidates,
            predicates,
            classes,
            counters: SmallVec::from_elem(0, predicates.len()),
            exhausted,
        }
    }

    fn passes(&mut self, node: &N) -> Result<bool, Error> {
        for ((pred, class), counter) in self
            .predicates
            .iter()
            .zip(self.classes)
            .zip(self.counters.iter_mut())
        {
            *counter += 1;
            let pos = *counter;
            match *class {
                PredicateClass::Position { min, max } => {
                    if pos >= max {
                        // the node at `max` may still pass; nothing after it can
                        self.exhausted = true;
                    }
                    if pos < min || pos > max {
                        return Ok(false);
                    }
                }
                _ => {
                    if !check(pred, self.candidates.cx, node, pos)? {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }
}

impl<N: XdmNode> Iterator for PositionalIter<'_, N> {
    type Item = Result<N, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted {
            let node = match self.candidates.next()? {
                Ok(n) => n,
                Err(e) => return Some(Err(e)),
            };
            match self.passes(&node) {
                Ok(true) => return Some(Ok(node)),
                Ok(false) => {}
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

pub(crate) struct LastIter<'a, N: XdmNode> {
    candidates: Option<Candidates<'a, N>>,
}

impl<'a, N: XdmNode> LastIter<'a, N> {
    pub(crate) fn new(candidates: Candidates<'a, N>) -> Self {
        Self {
            candidates: Some(candidates),
        }
    }
}

impl<N: XdmNode> Iterator for LastIter<'_, N> {
    type Item = Result<N, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let candidates = self.candidates.take()?;
        let mut last = None;
        for r in candidates {
            match r {
                Ok(n) => last = Some(n),
                Err(e) => return Some(Err(e)),
            }
        }
        last.map(Ok)
    }
}

/// Materializes the candidates on first use, then filters predicate by predicate with
/// the size of the intermediate result known.
pub(crate) struct CachedIter<'a, N: XdmNode> {
    candidates: Candidates<'a, N>,
    predicates: &'a [Expr<N>],
    buffer: Option<std::vec::IntoIter<N>>,
}

impl<'a, N: XdmNode> CachedIter<'a, N> {
    pub(crate) fn new(candidates: Candidates<'a, N>, predicates: &'a [Expr<N>]) -> Self {
        Self {
            candidates,
            predicates,
            buffer: None,
        }
    }

    fn fill(&mut self) -> Result<Vec<N>, Error> {
        let mut nodes = self.candidates.collect_all()?;
        for pred in self.predicates {
            if nodes.is_empty() {
                break;
            }
            nodes = filter_by_predicate(nodes, pred, self.candidates.cx, |n| {
                XdmItem::Node(n.clone())
            })?;
        }
        Ok(nodes)
    }
}

impl<N: XdmNode> Iterator for CachedIter<'_, N> {
    type Item = Result<N, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_none() {
            match self.fill() {
                Ok(nodes) => self.buffer = Some(nodes.into_iter()),
                Err(e) => {
                    self.buffer = Some(Vec::new().into_iter());
                    return Some(Err(e));
                }
            }
        }
        self.buffer.as_mut()?.next().map(Ok)
    }
}
