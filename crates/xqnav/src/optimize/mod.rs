//! Compile-time rewriting of path expressions.
//!
//! [`optimize`] walks an expression bottom-up and runs every path it meets through a
//! fixed list of [`Pass`]es. Each pass either proves a rewrite safe and returns a new
//! expression, or returns `None`; as soon as one fires, the list starts over on the
//! result. Passes never fail: a rewrite that cannot be justified is skipped.

mod cardinality;
mod children;
mod empty;
mod flatten;
mod index;
mod merge;
mod predicates;
mod simple_map;
mod simplify;
mod strategy;
mod union;

use core::fmt;
use std::sync::Arc;

use crate::context::{CompileContext, common_store};
use crate::expr::Expr;
use crate::model::{NodeKind, XdmNode};
use crate::order::sorted_distinct_nodes;
use crate::path::Path;
use crate::stats::{DataStatistics, StoreId};
use crate::step::Step;
use crate::test::{RestrictedDocTest, Test};
use crate::xdm::XdmItem;

/// One rewrite of the path pipeline, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    /// Redundant self steps, constant predicates, statically empty steps.
    Simplify,
    /// Nested paths used as root or step are inlined.
    Flatten,
    /// `(a, b)/c` becomes `a/c | b/c`.
    ToUnion,
    /// `descendant-or-self::node()/child::x` becomes `descendant::x`, self steps are
    /// folded into their predecessor.
    MergeSteps,
    /// `a[b]/b` becomes `a/b`.
    MovePredicates,
    /// Exact result size from the structural summary.
    Cardinality,
    /// Steps the summary or the name dictionary proves empty.
    RemoveEmpty,
    /// A trailing atomic step becomes a simple map.
    SimpleMap,
    /// Value-index access replaces a filtered traversal.
    Index,
    /// `descendant::x` becomes a chain of child steps.
    Children,
    /// Forced strategies from the optimizer options.
    Strategy,
}

impl Pass {
    pub const ALL: [Pass; 11] = [
        Pass::Simplify,
        Pass::Flatten,
        Pass::ToUnion,
        Pass::MergeSteps,
        Pass::MovePredicates,
        Pass::Cardinality,
        Pass::RemoveEmpty,
        Pass::SimpleMap,
        Pass::Index,
        Pass::Children,
        Pass::Strategy,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Pass::Simplify => "simplify",
            Pass::Flatten => "flatten",
            Pass::ToUnion => "to-union",
            Pass::MergeSteps => "merge-steps",
            Pass::MovePredicates => "move-predicates",
            Pass::Cardinality => "cardinality",
            Pass::RemoveEmpty => "remove-empty",
            Pass::SimpleMap => "simple-map",
            Pass::Index => "index",
            Pass::Children => "descendant-to-child",
            Pass::Strategy => "strategy",
        }
    }

    /// Runs this pass once on `path`. `None` when nothing changed.
    pub fn apply<N: XdmNode>(self, path: &Path<N>, cx: &CompileContext<N>) -> Option<Expr<N>> {
        match self {
            Pass::Simplify => simplify::apply(path, cx),
            Pass::Flatten => flatten::apply(path),
            Pass::ToUnion => union::apply(path),
            Pass::MergeSteps => merge::apply(path),
            Pass::MovePredicates => predicates::apply(path),
            Pass::Cardinality => cardinality::apply(path, cx),
            Pass::RemoveEmpty => empty::apply(path, cx),
            Pass::SimpleMap => simple_map::apply(path),
            Pass::Index => index::apply(path, cx),
            Pass::Children => children::apply(path, cx),
            Pass::Strategy => strategy::apply(path, cx),
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optimizes `expr` and everything nested in it.
pub fn optimize<N: XdmNode>(expr: &Expr<N>, cx: &CompileContext<N>) -> Expr<N> {
    let inner = cx.with_focus(cx.focus.navigated());
    match expr {
        Expr::Path(p) => {
            let root = p.root.as_ref().map(|r| optimize(r, cx));
            let steps = p.steps.iter().map(|s| optimize(s, &inner)).collect();
            optimize_path(Path::new(root, steps), cx)
        }
        Expr::Step(s) => {
            let preds = s.predicates.iter().map(|p| optimize(p, &inner)).collect();
            Expr::step(s.with_predicates(preds))
        }
        Expr::Filter { base, predicates } => Expr::Filter {
            base: Box::new(optimize(base, cx)),
            predicates: predicates.iter().map(|p| optimize(p, &inner)).collect(),
        },
        Expr::Map { input, action } => Expr::Map {
            input: Box::new(optimize(input, cx)),
            action: Box::new(optimize(action, &inner)),
        },
        Expr::Sequence(es) => Expr::Sequence(es.iter().map(|e| optimize(e, cx)).collect()),
        Expr::Union(es) => Expr::Union(es.iter().map(|e| optimize(e, cx)).collect()),
        Expr::And(es) => Expr::And(es.iter().map(|e| optimize(e, cx)).collect()),
        Expr::Or(es) => Expr::Or(es.iter().map(|e| optimize(e, cx)).collect()),
        Expr::Compare { op, lhs, rhs } => Expr::compare(*op, optimize(lhs, cx), optimize(rhs, cx)),
        Expr::Call { func, args } => {
            Expr::call(*func, args.iter().map(|a| optimize(a, cx)).collect())
        }
        other => other.clone(),
    }
}

/// Runs the pass list on one path whose children are already optimized.
pub fn optimize_path<N: XdmNode>(path: Path<N>, cx: &CompileContext<N>) -> Expr<N> {
    let mut current = path;
    let mut rounds = 0;
    'restart: while rounds < cx.options.max_rewrite_rounds {
        for pass in Pass::ALL {
            let Some(next) = pass.apply(&current, cx) else {
                continue;
            };
            rounds += 1;
            tracing::debug!(rewrite = pass.name(), before = %current, after = %next, "path rewrite");
            match next {
                Expr::Path(p) => {
                    current = Arc::unwrap_or_clone(p);
                    continue 'restart;
                }
                other => return revisit(other, cx),
            }
        }
        break;
    }
    Expr::path(current)
}

/// A pass left the path world (union, simple map, empty sequence): the paths inside
/// the result still get their own pipeline run.
fn revisit<N: XdmNode>(expr: Expr<N>, cx: &CompileContext<N>) -> Expr<N> {
    match expr {
        Expr::Path(p) => optimize_path(Arc::unwrap_or_clone(p), cx),
        Expr::Union(es) => Expr::Union(es.into_iter().map(|e| revisit(e, cx)).collect()),
        Expr::Map { input, action } => Expr::Map {
            input: Box::new(revisit(*input, cx)),
            action,
        },
        Expr::Filter { base, predicates } => Expr::Filter {
            base: Box::new(revisit(*base, cx)),
            predicates,
        },
        other => other,
    }
}

/// Document nodes a path starts from, when they are known at compile time and all
/// belong to one store with statistics.
pub(crate) struct DocContext<N: XdmNode> {
    pub store: StoreId,
    pub stats: Arc<dyn DataStatistics>,
    /// Sorted, distinct.
    pub roots: Vec<N>,
    /// The roots are every document of the store.
    pub all: bool,
}

impl<N: XdmNode> DocContext<N> {
    pub fn of(path: &Path<N>, cx: &CompileContext<N>) -> Option<Self> {
        let items: Vec<XdmItem<N>> = match &path.root {
            None => cx.focus.value.clone()?,
            Some(Expr::Root) => {
                let mut roots = Vec::new();
                for item in cx.focus.value.as_ref()? {
                    roots.push(XdmItem::Node(item.as_node()?.root()));
                }
                roots
            }
            Some(Expr::Value(items)) => items.to_vec(),
            Some(_) => return None,
        };
        if items.is_empty() {
            return None;
        }
        let store = common_store(&items)?;
        let mut roots = Vec::with_capacity(items.len());
        for item in items {
            match item {
                XdmItem::Node(n) if n.kind() == NodeKind::Document => roots.push(n),
                _ => return None,
            }
        }
        let roots = sorted_distinct_nodes(roots).ok()?;
        let stats = cx.statistics(store)?;
        let all = roots.len() == stats.document_count();
        Some(Self {
            store,
            stats,
            roots,
            all,
        })
    }

    /// Test matching exactly the context documents.
    pub fn root_test(&self) -> Test {
        if self.all {
            return Test::DOCUMENT;
        }
        let keys: Option<Vec<u64>> = self.roots.iter().map(XdmNode::doc_order_key).collect();
        match keys {
            Some(keys) => Test::RestrictedDoc(RestrictedDocTest::new(self.store, keys)),
            None => Test::DOCUMENT,
        }
    }
}

/// Statistics of the store every input node of the path comes from, and whether
/// those input nodes are known to be document nodes.
pub(crate) fn input_store<N: XdmNode>(
    path: &Path<N>,
    cx: &CompileContext<N>,
) -> Option<(Arc<dyn DataStatistics>, bool)> {
    let documents = |items: &[XdmItem<N>]| -> bool {
        items
            .iter()
            .all(|i| i.as_node().is_some_and(|n| n.kind() == NodeKind::Document))
    };
    let (store, docs) = match &path.root {
        None => {
            let docs = cx.focus.value.as_deref().is_some_and(documents);
            (cx.focus.store?, docs)
        }
        Some(Expr::Root) => (cx.focus.store?, true),
        Some(Expr::Value(items)) => (common_store(items)?, documents(&items[..])),
        Some(_) => return None,
    };
    Some((cx.statistics(store)?, docs))
}

/// Whether every step expression is an axis step.
pub(crate) fn all_axis_steps<N: XdmNode>(steps: &[Expr<N>]) -> bool {
    steps.iter().all(|s| matches!(s, Expr::Step(_)))
}

/// Rootless path or bare step made of axis steps only, as a step list.
pub(crate) fn relative_steps<N: XdmNode>(expr: &Expr<N>) -> Option<Vec<Step<N>>> {
    match expr {
        Expr::Step(s) => Some(vec![(**s).clone()]),
        Expr::Path(p) if p.root.is_none() => {
            p.axis_steps().map(|v| v.into_iter().cloned().collect())
        }
        _ => None,
    }
}
