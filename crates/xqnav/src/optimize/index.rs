use super::DocContext;
use crate::axis::Axis;
use crate::context::CompileContext;
use crate::expr::Expr;
use crate::model::XdmNode;
use crate::path::Path;
use crate::stats::IndexCandidate;
use crate::step::Step;
use crate::test::Test;

struct Choice<N: XdmNode> {
    step: usize,
    predicate: usize,
    candidate: IndexCandidate<N>,
}

/// Replaces the traversal up to the cheapest index-accessible step by the index
/// access. The skipped steps come back, inverted, as a predicate on the hits.
pub(super) fn apply<N: XdmNode>(path: &Path<N>, cx: &CompileContext<N>) -> Option<Expr<N>> {
    if !cx.options.enable_index_rewrite {
        return None;
    }
    let estimator = cx.index.as_ref()?;
    let doc = DocContext::of(path, cx)?;

    let mut best: Option<Choice<N>> = None;
    for (s, expr) in path.steps.iter().enumerate() {
        // positions do not survive the inversion: child::x[1] is not parent::x[1]
        let Some(step) = expr.as_step() else {
            break;
        };
        if !step.axis.is_downward() || step.has_positional_predicates() {
            break;
        }
        for (p, pred) in step.predicates.iter().enumerate() {
            let Some(candidate) = estimator.estimate(doc.stats.as_ref(), pred, step) else {
                continue;
            };
            tracing::trace!(step = s, predicate = p, count = candidate.result_count, "index candidate");
            if candidate.result_count == 0 {
                return Some(Expr::Empty);
            }
            if best
                .as_ref()
                .is_none_or(|b| candidate.result_count < b.candidate.result_count)
            {
                best = Some(Choice {
                    step: s,
                    predicate: p,
                    candidate,
                });
            }
        }
    }
    let choice = best?;
    if choice
        .candidate
        .too_expensive(doc.stats.size(), cx.options.index_cost_ratio)
    {
        return None;
    }
    let steps: Vec<&Step<N>> = (0..=choice.step)
        .map(|i| path.axis_step(i))
        .collect::<Option<_>>()?;
    let index_step = steps[choice.step];

    let mut preds: Vec<Expr<N>> = Vec::new();
    let root_test = doc.root_test();
    if root_test != Test::DOCUMENT
        || !doc.stats.up_to_date()
        || !path.pred_steps_unique(doc.stats.as_ref(), choice.step)
    {
        let mut prefix: Vec<Step<N>> = steps[..choice.step].iter().map(|s| (*s).clone()).collect();
        prefix.push(index_step.with_predicates(Vec::new()));
        let terminal = Step::simple(Axis::SelfAxis, root_test.clone());
        let inverted = Path::relative(prefix).invert(None, &terminal)?;
        let mut back = inverted.steps;
        // every stored node has a document ancestor
        if root_test == Test::DOCUMENT
            && matches!(
                steps[0].axis.invert(),
                Axis::Ancestor | Axis::AncestorOrSelf
            )
        {
            back.pop();
        }
        if !back.is_empty() {
            preds.push(Expr::path(Path::new(None, back)));
        }
    }
    preds.extend(
        index_step
            .predicates
            .iter()
            .enumerate()
            .filter(|(p, _)| *p != choice.predicate)
            .map(|(_, e)| e.clone()),
    );

    let (root, mut out) = match &choice.candidate.access {
        Expr::Path(access) if access.root.is_some() => {
            (access.root.clone()?, access.steps.clone())
        }
        other => (other.clone(), Vec::new()),
    };
    if !preds.is_empty() {
        match out.last().and_then(Expr::as_step) {
            Some(last) => {
                let mut all = last.predicates.clone();
                all.extend(preds);
                let step = last.with_predicates(all);
                if let Some(slot) = out.last_mut() {
                    *slot = Expr::step(step);
                }
            }
            None => out.push(Expr::step(Step::new(Axis::SelfAxis, Test::NODE, preds))),
        }
    }
    out.extend(path.steps[choice.step + 1..].iter().cloned());
    if out.is_empty() {
        return Some(root);
    }
    Some(Expr::path(Path::new(Some(root), out)))
}
