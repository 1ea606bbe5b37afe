//! Location paths: an optional root expression followed by steps.
//!
//! A path picks its runtime strategy when it is built; the optimizer only ever produces
//! new paths, so a compiled path can be shared read-only by concurrent evaluations.

pub mod cache;
mod eval;
mod order;

use core::fmt;

pub use order::OrderProps;

use self::cache::PathId;
use crate::axis::Axis;
use crate::expr::Expr;
use crate::model::{NodeKind, XdmNode};
use crate::stats::{DataStatistics, PathNode, PathNodeId, StructuralSummary};
use crate::step::Step;
use crate::test::{NameMode, Test};
use crate::xdm::{ItemType, Occurrence, SeqType};

/// Runtime strategy of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathStrategy {
    /// Rootless single axis step without positional predicates: the step's own stream.
    IterativeSingle,
    /// Axis steps only, statically proven to produce sorted, duplicate-free output:
    /// nested lazy streams, no buffering.
    IterativeMulti,
    /// Axis steps only; every step result is sorted and deduplicated.
    Cached,
    /// At least one step is not an axis step; results may be atomic values.
    Mixed,
}

#[derive(Debug, Clone)]
pub struct Path<N: XdmNode> {
    /// `None` evaluates the steps against the focus.
    pub root: Option<Expr<N>>,
    pub steps: Vec<Expr<N>>,
    id: PathId,
    strategy: PathStrategy,
    seq_type: SeqType,
    size: Option<u64>,
    cacheable: bool,
}

impl<N: XdmNode> Path<N> {
    pub fn new(root: Option<Expr<N>>, steps: Vec<Expr<N>>) -> Self {
        let strategy = default_strategy(root.as_ref(), &steps);
        let seq_type = compute_type(root.as_ref(), &steps);
        let cacheable = root.iter().chain(steps.iter()).all(|e| {
            !e.has_free_vars() && e.is_deterministic()
        }) && root
            .as_ref()
            .is_none_or(|r| !r.uses_position() && !r.uses_last());
        tracing::trace!(?strategy, "path strategy");
        Self {
            root,
            steps,
            id: PathId::next(),
            strategy,
            seq_type,
            size: None,
            cacheable,
        }
    }

    /// Rootless path of axis steps.
    pub fn relative(steps: impl IntoIterator<Item = Step<N>>) -> Self {
        Self::new(None, steps.into_iter().map(Expr::step).collect())
    }

    /// Path starting at the root of the focus node.
    pub fn absolute(steps: impl IntoIterator<Item = Step<N>>) -> Self {
        Self::new(Some(Expr::Root), steps.into_iter().map(Expr::step).collect())
    }

    pub fn id(&self) -> PathId {
        self.id
    }

    pub fn strategy(&self) -> PathStrategy {
        self.strategy
    }

    pub fn seq_type(&self) -> SeqType {
        self.seq_type
    }

    /// Exact result count, if known statically.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Same path with a statically known result size.
    pub fn with_size(&self, size: u64) -> Self {
        let mut p = self.clone();
        p.size = Some(size);
        p.seq_type = SeqType::new(p.seq_type.item, Occurrence::from_count(size));
        p
    }

    /// Same path evaluated with `strategy`, if the steps allow it.
    pub fn with_strategy(&self, strategy: PathStrategy) -> Option<Self> {
        self.supports(strategy).then(|| {
            let mut p = self.clone();
            p.strategy = strategy;
            p
        })
    }

    pub fn supports(&self, strategy: PathStrategy) -> bool {
        match strategy {
            PathStrategy::Mixed => true,
            PathStrategy::Cached => self.axis_steps().is_some(),
            PathStrategy::IterativeMulti => self.iterative_order().is_some(),
            PathStrategy::IterativeSingle => {
                self.root.is_none()
                    && self.iterative_order().is_some()
                    && matches!(self.steps.as_slice(), [Expr::Step(s)] if !s.has_positional_predicates())
            }
        }
    }

    /// The steps as axis steps, if all of them are.
    pub fn axis_steps(&self) -> Option<Vec<&Step<N>>> {
        self.steps.iter().map(|e| e.as_step().map(|s| &**s)).collect()
    }

    pub fn axis_step(&self, index: usize) -> Option<&Step<N>> {
        self.steps.get(index)?.as_step().map(|s| &**s)
    }

    fn root_order(&self) -> Option<OrderProps> {
        match &self.root {
            None => Some(OrderProps::SINGLE),
            Some(r) => r.node_order(),
        }
    }

    /// Ordering props of the output if the steps can be streamed without a final sort.
    pub fn iterative_order(&self) -> Option<OrderProps> {
        let steps = self.axis_steps()?;
        self.root_order()?.through(steps)
    }

    /// Ordering guarantees of the output.
    pub fn output_order(&self) -> Option<OrderProps> {
        match self.strategy {
            PathStrategy::IterativeSingle | PathStrategy::IterativeMulti => self
                .iterative_order()
                .or(Some(OrderProps::SORTED)),
            PathStrategy::Cached => Some(
                self.iterative_order()
                    .filter(|o| o.single)
                    .unwrap_or(OrderProps::SORTED),
            ),
            PathStrategy::Mixed => None,
        }
    }

    pub(crate) fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    /// Summary nodes reached after step `upto`, starting from the document roots of the
    /// store. Predicates are ignored, so the result is a superset of the real path nodes.
    ///
    /// `None` when the summary is missing or stale, or a step cannot be followed
    /// (non-axis step, axis other than child, descendant, descendant-or-self, attribute
    /// or self, tests other than kind and name tests).
    pub fn path_nodes(&self, stats: &dyn DataStatistics, upto: usize) -> Option<Vec<PathNodeId>> {
        if !stats.up_to_date() {
            return None;
        }
        let summary = stats.summary()?;
        let mut nodes: Vec<PathNodeId> = summary.root_path_nodes().to_vec();
        for index in 0..=upto {
            let step = self.axis_step(index)?;
            nodes = follow(summary, &nodes, step)?;
        }
        Some(nodes)
    }

    /// Whether the steps up to `upto` are child steps with name tests whose names occur
    /// on exactly one summary path each, at the level of the step. The index rewrite
    /// then needs no inverted path to restore the context.
    pub fn pred_steps_unique(&self, stats: &dyn DataStatistics, upto: usize) -> bool {
        let Some(summary) = stats.summary() else {
            return false;
        };
        if !stats.up_to_date() {
            return false;
        }
        for index in (0..=upto).rev() {
            let Some(step) = self.axis_step(index) else {
                return false;
            };
            let wildcard = matches!(&step.test, Test::Name(n) if n.mode == NameMode::Wildcard)
                || step.test == Test::ELEMENT;
            if wildcard && index != upto {
                // the inverted path is the only place its predicates would survive
                if step.axis != Axis::Child || !step.predicates.is_empty() {
                    return false;
                }
                continue;
            }
            let named = matches!(&step.test, Test::Name(n) if n.local_constraint().is_some());
            if !named
                || step.axis != Axis::Child
                || (index != upto && !step.predicates.is_empty())
            {
                return false;
            }
            let matching: Vec<&PathNode> = all_path_nodes(summary)
                .into_iter()
                .map(|id| summary.node(id))
                .filter(|pn| path_node_matches(&step.test, pn) == Some(true))
                .collect();
            let level = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if matching.len() != 1 || matching[0].level != level {
                return false;
            }
        }
        true
    }

    /// Path leading back from the nodes selected by this path to its context.
    ///
    /// For `s0/s1/.../sn`, the result is `new_root/inv(sn)::T(n-1)/.../inv(s1)::T0/inv(s0)::Tc`,
    /// where each step carries the test and predicates of its predecessor and `Tc` is
    /// the test of `terminal`. The predicates of `sn` filter `new_root`. `None` if a step
    /// is not an axis step or a predicate is positional, since positions do not survive
    /// the change of direction.
    pub fn invert(&self, new_root: Option<Expr<N>>, terminal: &Step<N>) -> Option<Path<N>> {
        let steps = self.axis_steps()?;
        let last = steps.last()?;
        if steps.iter().any(|s| s.has_positional_predicates()) || terminal.has_positional_predicates()
        {
            return None;
        }
        let root = match new_root {
            Some(r) if !last.predicates.is_empty() => Some(Expr::Filter {
                base: Box::new(r),
                predicates: last.predicates.clone(),
            }),
            other => other,
        };
        let mut inverted = Vec::with_capacity(steps.len());
        for i in (1..steps.len()).rev() {
            let prev = steps[i - 1];
            inverted.push(Expr::step(Step::new(
                steps[i].axis.invert(),
                prev.test.clone(),
                prev.predicates.clone(),
            )));
        }
        inverted.push(Expr::step(Step::new(
            steps[0].axis.invert(),
            terminal.test.clone(),
            terminal.predicates.clone(),
        )));
        Some(Path::new(root, inverted))
    }
}

fn all_path_nodes(summary: &dyn StructuralSummary) -> Vec<PathNodeId> {
    let mut out = Vec::new();
    for root in summary.root_path_nodes() {
        out.push(*root);
        out.extend(summary.descendants(*root));
    }
    out
}

/// Whether every data node of path node `pn` matches `test`. `None` when the test
/// cannot be decided on the summary alone.
pub(crate) fn path_node_matches(test: &Test, pn: &PathNode) -> Option<bool> {
    match test {
        Test::Kind(None) => Some(true),
        Test::Kind(Some(k)) => Some(pn.kind == *k),
        Test::Name(n) => {
            if pn.kind != n.kind {
                return Some(false);
            }
            let Some(name) = &pn.name else {
                return Some(false);
            };
            let local_ok = n.local_constraint().is_none_or(|l| *l == name.local);
            let uri_ok = n.uri_constraint().is_none_or(|u| u == name.ns_uri.as_ref());
            Some(local_ok && uri_ok)
        }
        Test::Union(u) => {
            let mut any = false;
            for m in u.members.iter() {
                any |= path_node_matches(m, pn)?;
            }
            Some(any)
        }
        Test::Node(_) | Test::Doc(_) | Test::RestrictedDoc(_) => None,
    }
}

fn follow<N: XdmNode>(
    summary: &dyn StructuralSummary,
    nodes: &[PathNodeId],
    step: &Step<N>,
) -> Option<Vec<PathNodeId>> {
    let is_attr = |id: &PathNodeId| summary.node(*id).kind == NodeKind::Attribute;
    let mut out: Vec<PathNodeId> = Vec::new();
    for &n in nodes {
        let candidates: Vec<PathNodeId> = match step.axis {
            Axis::SelfAxis => vec![n],
            Axis::Child => summary.node(n).children.iter().copied().filter(|c| !is_attr(c)).collect(),
            Axis::Attribute => summary.node(n).children.iter().copied().filter(is_attr).collect(),
            Axis::Descendant => summary.descendants(n).into_iter().filter(|c| !is_attr(c)).collect(),
            Axis::DescendantOrSelf => core::iter::once(n)
                .chain(summary.descendants(n))
                .filter(|c| !is_attr(c) || *c == n)
                .collect(),
            _ => return None,
        };
        for c in candidates {
            if path_node_matches(&step.test, summary.node(c))? {
                out.push(c);
            }
        }
    }
    out.sort_unstable();
    out.dedup();
    Some(out)
}

fn default_strategy<N: XdmNode>(root: Option<&Expr<N>>, steps: &[Expr<N>]) -> PathStrategy {
    let axis: Option<Vec<&Step<N>>> = steps.iter().map(|e| e.as_step().map(|s| &**s)).collect();
    let Some(axis) = axis else {
        return PathStrategy::Mixed;
    };
    let root_order = match root {
        None => Some(OrderProps::SINGLE),
        Some(r) => r.node_order(),
    };
    match root_order.and_then(|o| o.through(axis.iter().copied())) {
        Some(_) if root.is_none() && axis.len() == 1 && !axis[0].has_positional_predicates() => {
            PathStrategy::IterativeSingle
        }
        Some(_) => PathStrategy::IterativeMulti,
        None => PathStrategy::Cached,
    }
}

fn compute_type<N: XdmNode>(root: Option<&Expr<N>>, steps: &[Expr<N>]) -> SeqType {
    let start = root.map_or(
        SeqType::new(ItemType::Node(None), Occurrence::ExactlyOne),
        Expr::declared_type,
    );
    steps.iter().fold(start, |acc, step| {
        let t = step.declared_type();
        SeqType::new(t.item, acc.occ.then(t.occ))
    })
}

impl<N: XdmNode> PartialEq for Path<N> {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.steps == other.steps
    }
}

fn write_step<N: XdmNode>(f: &mut fmt::Formatter<'_>, e: &Expr<N>) -> fmt::Result {
    match e {
        Expr::Step(s) => write!(f, "{s}"),
        Expr::Compare { .. } | Expr::And(_) | Expr::Or(_) | Expr::Map { .. } | Expr::Path(_) => {
            write!(f, "({e})")
        }
        _ => write!(f, "{e}"),
    }
}

impl<N: XdmNode> fmt::Display for Path<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Some(Expr::Root) => {
                f.write_str("/")?;
            }
            Some(root) => {
                write_step(f, root)?;
                if !self.steps.is_empty() {
                    f.write_str("/")?;
                }
            }
            None => {}
        }
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write_step(f, step)?;
        }
        Ok(())
    }
}
