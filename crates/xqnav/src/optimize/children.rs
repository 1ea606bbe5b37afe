use super::input_store;
use crate::axis::Axis;
use crate::context::CompileContext;
use crate::expr::Expr;
use crate::model::{NodeKind, QName, XdmNode};
use crate::path::Path;
use crate::stats::{DataStatistics, PathNodeId};
use crate::step::Step;
use crate::test::{NameTest, Test};

/// Rewrites the first `descendant::x` whose summary nodes all sit on one level into the
/// chain of child steps leading there from the document root.
pub(super) fn apply<N: XdmNode>(path: &Path<N>, cx: &CompileContext<N>) -> Option<Expr<N>> {
    if !cx.options.enable_child_rewrite {
        return None;
    }
    let (stats, documents) = input_store(path, cx)?;
    if !documents || !stats.up_to_date() {
        return None;
    }
    // several namespaces: names alone do not identify elements
    let uri = stats.global_namespace()?;

    for s in 0..path.steps.len() {
        if s > 0 && path.axis_step(s - 1).is_none_or(|p| !p.predicates.is_empty()) {
            break;
        }
        let Some(cur) = path.axis_step(s) else {
            continue;
        };
        if cur.axis != Axis::Descendant || cur.has_positional_predicates() {
            continue;
        }
        let Some(nodes) = leveled_nodes(path, stats.as_ref(), s) else {
            continue;
        };
        let names = chain(stats.as_ref(), nodes.clone())?;
        let count = names.len();
        let chain_steps: Vec<Step<N>> = names
            .into_iter()
            .rev()
            .map(|name| {
                let test = match name {
                    Some(local) => {
                        Test::Name(NameTest::full(NodeKind::Element, &local, uri.as_deref()))
                    }
                    None => Test::Name(NameTest::wildcard(NodeKind::Element)),
                };
                Step::simple(Axis::Child, test)
            })
            .collect();
        // wildcard levels may admit summary paths the replaced steps never reached
        let reached =
            Path::relative(chain_steps.clone()).path_nodes(stats.as_ref(), count.checked_sub(1)?);
        if reached.as_ref() != Some(&nodes) {
            continue;
        }

        let mut steps: Vec<Expr<N>> = Vec::with_capacity(count + path.steps.len() - s - 1);
        for (t, step) in chain_steps.into_iter().enumerate() {
            let step = if t + 1 == count {
                step.with_predicates(cur.predicates.clone())
            } else {
                step
            };
            steps.push(Expr::step(step));
        }
        steps.extend(path.steps[s + 1..].iter().cloned());
        return Some(Expr::path(Path::new(path.root.clone(), steps)));
    }
    None
}

/// Summary nodes after step `upto`, if every step up to there is a child or descendant
/// step with an element name test and the nodes share one level.
fn leveled_nodes<N: XdmNode>(
    path: &Path<N>,
    stats: &dyn DataStatistics,
    upto: usize,
) -> Option<Vec<PathNodeId>> {
    for i in 0..=upto {
        let step = path.axis_step(i)?;
        let named = matches!(&step.test, Test::Name(n) if n.kind == NodeKind::Element)
            && step.test.required_local().is_some();
        if !named || !matches!(step.axis, Axis::Child | Axis::Descendant) {
            return None;
        }
    }
    let nodes = path.path_nodes(stats, upto)?;
    let summary = stats.summary()?;
    let level = summary.node(*nodes.first()?).level;
    nodes
        .iter()
        .all(|id| summary.node(*id).level == level)
        .then_some(nodes)
}

/// Local names from the level of `nodes` up to (excluding) the document, innermost first.
/// `None` entries stand for levels where the names differ; the whole chain is `None`
/// when a prefixed name is met.
fn chain(stats: &dyn DataStatistics, mut nodes: Vec<PathNodeId>) -> Option<Vec<Option<String>>> {
    let summary = stats.summary()?;
    let mut names = Vec::new();
    loop {
        let first = summary.node(*nodes.first()?);
        if first.parent.is_none() {
            return Some(names);
        }
        let name: &QName = first.name.as_ref()?;
        if name.prefix.is_some() {
            return None;
        }
        let same = nodes
            .iter()
            .all(|id| summary.node(*id).name.as_ref().map(|n| &n.local) == Some(&name.local));
        names.push(same.then(|| name.local.to_string()));
        let mut parents: Vec<PathNodeId> =
            nodes.iter().filter_map(|id| summary.node(*id).parent).collect();
        parents.sort_unstable();
        parents.dedup();
        nodes = parents;
    }
}
