use std::sync::Arc;

use super::cache::CacheAction;
use super::{Path, PathStrategy};
use crate::context::{ContextValue, DynamicContext, Focus};
use crate::error::Error;
use crate::model::XdmNode;
use crate::order::sorted_distinct_nodes;
use crate::step::Step;
use crate::xdm::{NodeStream, XdmItem, XdmStream};

impl<N: XdmNode> Path<N> {
    /// Evaluates the path against `focus`.
    ///
    /// Input errors (absent context, non-node context or root items) are reported
    /// before the first item; traversal errors surface from the stream.
    pub fn evaluate<'a>(
        &'a self,
        cx: &'a DynamicContext<N>,
        focus: &Focus<N>,
    ) -> Result<XdmStream<'a, N>, Error> {
        let action = cx.with_path_cache(self.id, |c| {
            c.advance(self.id, self.is_cacheable(), &focus.value)
        });
        match action {
            Some(CacheAction::Serve(items)) => Ok(serve(items)),
            Some(CacheAction::Store) => {
                let items = self
                    .evaluate_uncached(cx, focus)?
                    .collect::<Result<Vec<_>, _>>()?;
                let items: Arc<[XdmItem<N>]> = items.into();
                cx.with_path_cache(self.id, |c| c.store(self.id, items.clone()));
                Ok(serve(items))
            }
            Some(CacheAction::Evaluate) | None => self.evaluate_uncached(cx, focus),
        }
    }

    /// Evaluates the path, bypassing the path cache.
    pub fn evaluate_uncached<'a>(
        &'a self,
        cx: &'a DynamicContext<N>,
        focus: &Focus<N>,
    ) -> Result<XdmStream<'a, N>, Error> {
        let input = self.input(cx, focus)?;
        let strategy = match self.strategy {
            // the static props assume a single context item
            PathStrategy::IterativeSingle | PathStrategy::IterativeMulti
                if input.len() > 1 && self.root_order().is_none_or(|o| o.single) =>
            {
                PathStrategy::Cached
            }
            s => s,
        };
        match (strategy, self.axis_steps()) {
            (PathStrategy::IterativeSingle, Some(steps)) if steps.len() == 1 => {
                let Some(node) = input.into_iter().next() else {
                    return Ok(Box::new(core::iter::empty()));
                };
                Ok(nodes_to_items(steps[0].iter(cx, node)))
            }
            (PathStrategy::IterativeSingle | PathStrategy::IterativeMulti, Some(steps)) => {
                Ok(nodes_to_items(Box::new(IterPath::new(steps, cx, input))))
            }
            (PathStrategy::Cached, Some(steps)) => {
                let nodes = cached(&steps, cx, input)?;
                Ok(Box::new(nodes.into_iter().map(|n| Ok(XdmItem::Node(n)))))
            }
            _ => {
                let items = self.mixed(cx, input)?;
                Ok(Box::new(items.into_iter().map(Ok)))
            }
        }
    }

    /// Input nodes of the first step.
    fn input(&self, cx: &DynamicContext<N>, focus: &Focus<N>) -> Result<Vec<N>, Error> {
        let first = self.steps.first();
        let describe = || -> String {
            first.map_or_else(|| self.to_string(), ToString::to_string)
        };
        match &self.root {
            None => match &focus.value {
                ContextValue::Absent => Err(Error::no_context(describe())),
                ContextValue::Item(XdmItem::Node(n)) => Ok(vec![n.clone()]),
                ContextValue::Item(other) => {
                    Err(Error::context_not_node(describe(), other.type_label()))
                }
                ContextValue::Sequence(items) => items
                    .iter()
                    .map(|i| match i {
                        XdmItem::Node(n) => Ok(n.clone()),
                        other => Err(Error::context_not_node(describe(), other.type_label())),
                    })
                    .collect(),
            },
            Some(root) => {
                let mut nodes = Vec::new();
                for item in root.evaluate(cx, focus)? {
                    match item? {
                        XdmItem::Node(n) => nodes.push(n),
                        other => return Err(Error::path_not_node(describe(), other.type_label())),
                    }
                }
                Ok(nodes)
            }
        }
    }

    fn mixed(&self, cx: &DynamicContext<N>, input: Vec<N>) -> Result<Vec<XdmItem<N>>, Error> {
        let mut items: Vec<XdmItem<N>> = input.into_iter().map(XdmItem::Node).collect();
        for step in &self.steps {
            let size = items.len();
            let mut out = Vec::new();
            let (mut nodes, mut atomics) = (false, false);
            for (i, item) in items.into_iter().enumerate() {
                cx.check_cancelled()?;
                let node = match item {
                    XdmItem::Node(n) => n,
                    other => return Err(Error::path_not_node(step, other.type_label())),
                };
                let inner = Focus::item(XdmItem::Node(node), i + 1, size);
                for r in step.evaluate(cx, &inner)? {
                    let it = r?;
                    match it {
                        XdmItem::Node(_) => nodes = true,
                        XdmItem::Atomic(_) => atomics = true,
                    }
                    out.push(it);
                }
            }
            if nodes && atomics {
                return Err(Error::mixed_path(step));
            }
            items = if atomics {
                out
            } else {
                let nodes: Vec<N> = out.into_iter().filter_map(|i| i.as_node().cloned()).collect();
                sorted_distinct_nodes(nodes)?
                    .into_iter()
                    .map(XdmItem::Node)
                    .collect()
            };
        }
        Ok(items)
    }
}

fn serve<'a, N: XdmNode>(items: Arc<[XdmItem<N>]>) -> XdmStream<'a, N> {
    Box::new((0..items.len()).map(move |i| Ok(items[i].clone())))
}

fn nodes_to_items<N: XdmNode>(nodes: NodeStream<'_, N>) -> XdmStream<'_, N> {
    Box::new(nodes.map(|r| r.map(XdmItem::Node)))
}

fn cached<N: XdmNode>(
    steps: &[&Step<N>],
    cx: &DynamicContext<N>,
    input: Vec<N>,
) -> Result<Vec<N>, Error> {
    let mut nodes = sorted_distinct_nodes(input)?;
    for step in steps {
        let mut out = Vec::new();
        for node in nodes {
            cx.check_cancelled()?;
            for r in step.iter(cx, node) {
                out.push(r?);
            }
        }
        nodes = sorted_distinct_nodes(out)?;
    }
    Ok(nodes)
}

/// Depth-first nesting of lazy step streams. Only used where the step sequence is
/// proven to emit document order without duplicates.
struct IterPath<'a, N: XdmNode> {
    steps: Vec<&'a Step<N>>,
    cx: &'a DynamicContext<N>,
    stack: Vec<NodeStream<'a, N>>,
}

impl<'a, N: XdmNode> IterPath<'a, N> {
    fn new(steps: Vec<&'a Step<N>>, cx: &'a DynamicContext<N>, input: Vec<N>) -> Self {
        let start: NodeStream<'a, N> = Box::new(input.into_iter().map(Ok));
        Self {
            steps,
            cx,
            stack: vec![start],
        }
    }
}

impl<N: XdmNode> Iterator for IterPath<'_, N> {
    type Item = Result<N, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let depth = self.stack.len();
            let top = self.stack.last_mut()?;
            match top.next() {
                None => {
                    self.stack.pop();
                }
                Some(Err(e)) => {
                    self.stack.clear();
                    return Some(Err(e));
                }
                Some(Ok(node)) => {
                    let Some(step) = self.steps.get(depth - 1) else {
                        return Some(Ok(node));
                    };
                    if let Err(e) = self.cx.check_cancelled() {
                        self.stack.clear();
                        return Some(Err(e));
                    }
                    let inner = step.iter(self.cx, node);
                    self.stack.push(inner);
                }
            }
        }
    }
}
