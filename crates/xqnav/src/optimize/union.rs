use super::{all_axis_steps, relative_steps};
use crate::expr::Expr;
use crate::model::XdmNode;
use crate::path::Path;

/// Members of a syntactic alternation, if every one of them yields nodes only.
fn node_branches<N: XdmNode>(expr: &Expr<N>) -> Option<&[Expr<N>]> {
    let branches = match expr {
        Expr::Sequence(es) | Expr::Union(es) if es.len() > 1 => es.as_slice(),
        _ => return None,
    };
    branches
        .iter()
        .all(|b| b.declared_type().is_nodes())
        .then_some(branches)
}

pub(super) fn apply<N: XdmNode>(path: &Path<N>) -> Option<Expr<N>> {
    if let Some(root) = &path.root
        && let Some(branches) = node_branches(root)
        && all_axis_steps(&path.steps)
    {
        let paths = branches
            .iter()
            .map(|b| Expr::path(Path::new(Some(b.clone()), path.steps.clone())))
            .collect();
        return Some(Expr::Union(paths));
    }

    // a/(b | c)/d: every branch is a relative axis path that is spliced into place
    for (i, step) in path.steps.iter().enumerate() {
        let Some(branches) = node_branches(step) else {
            continue;
        };
        let others_axis = path
            .steps
            .iter()
            .enumerate()
            .all(|(j, s)| j == i || matches!(s, Expr::Step(_)));
        if !others_axis {
            return None;
        }
        let mut paths = Vec::with_capacity(branches.len());
        for branch in branches {
            let inner = relative_steps(branch)?;
            let mut steps: Vec<Expr<N>> = path.steps[..i].to_vec();
            steps.extend(inner.into_iter().map(Expr::step));
            steps.extend(path.steps[i + 1..].iter().cloned());
            paths.push(Expr::path(Path::new(path.root.clone(), steps)));
        }
        return Some(Expr::Union(paths));
    }
    None
}
