use super::DocContext;
use crate::context::CompileContext;
use crate::expr::Expr;
use crate::model::XdmNode;
use crate::path::Path;

/// Annotates the exact result size when the summary covers every input document and
/// no step filters by predicate.
pub(super) fn apply<N: XdmNode>(path: &Path<N>, cx: &CompileContext<N>) -> Option<Expr<N>> {
    let size = size(path, cx)?;
    (path.size() != Some(size)).then(|| Expr::path(path.with_size(size)))
}

fn size<N: XdmNode>(path: &Path<N>, cx: &CompileContext<N>) -> Option<u64> {
    let steps = path.axis_steps()?;
    if steps.is_empty() || steps.iter().any(|s| !s.predicates.is_empty()) {
        return None;
    }
    let doc = DocContext::of(path, cx)?;
    if !doc.all {
        return None;
    }
    let summary = doc.stats.summary()?;
    let nodes = path.path_nodes(doc.stats.as_ref(), steps.len() - 1)?;
    Some(nodes.iter().map(|id| summary.node(*id).stats.count).sum())
}
