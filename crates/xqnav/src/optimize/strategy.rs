use crate::context::CompileContext;
use crate::expr::Expr;
use crate::model::XdmNode;
use crate::path::Path;

/// Pins the configured step and path strategies wherever the shapes allow them.
pub(super) fn apply<N: XdmNode>(path: &Path<N>, cx: &CompileContext<N>) -> Option<Expr<N>> {
    let opts = &cx.options;
    let mut changed = false;
    let mut current = path.clone();

    if let Some(forced) = opts.force_step_strategy {
        let mut steps_changed = false;
        let steps: Vec<Expr<N>> = current
            .steps
            .iter()
            .map(|e| match e.as_step() {
                Some(step) if step.strategy() != forced => match step.with_strategy(forced) {
                    Some(pinned) => {
                        steps_changed = true;
                        Expr::step(pinned)
                    }
                    None => e.clone(),
                },
                _ => e.clone(),
            })
            .collect();
        if steps_changed {
            let mut next = Path::new(current.root.clone(), steps);
            if let Some(size) = current.size() {
                next = next.with_size(size);
            }
            current = next;
            changed = true;
        }
    }

    if let Some(forced) = opts.force_path_strategy
        && current.strategy() != forced
        && let Some(pinned) = current.with_strategy(forced)
    {
        current = pinned;
        changed = true;
    }

    changed.then(|| Expr::path(current))
}
