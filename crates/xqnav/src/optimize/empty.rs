use super::input_store;
use crate::context::CompileContext;
use crate::expr::Expr;
use crate::model::XdmNode;
use crate::path::Path;

pub(super) fn apply<N: XdmNode>(path: &Path<N>, cx: &CompileContext<N>) -> Option<Expr<N>> {
    let (stats, documents) = input_store(path, cx)?;

    // a prefix reaching no summary node leaves nothing for the remaining steps
    if documents {
        for s in 0..path.steps.len() {
            match path.path_nodes(stats.as_ref(), s) {
                Some(nodes) if nodes.is_empty() => return Some(Expr::Empty),
                Some(_) => {}
                None => break,
            }
        }
    }

    // axis steps stay inside the store, so its name dictionary bounds each name test
    let mut changed = false;
    let mut steps = Vec::with_capacity(path.steps.len());
    let mut inside = true;
    for expr in &path.steps {
        let step = match expr.as_step() {
            Some(step) if inside => step,
            _ => {
                // nodes produced by other expressions may come from anywhere
                inside = false;
                steps.push(expr.clone());
                continue;
            }
        };
        let Some(test) = step.test.optimize(stats.as_ref()) else {
            return Some(Expr::Empty);
        };
        if test == step.test {
            steps.push(expr.clone());
        } else {
            changed = true;
            steps.push(Expr::step(step.with_test(test)));
        }
    }
    changed.then(|| Expr::path(Path::new(path.root.clone(), steps)))
}
