use crate::expr::Expr;
use crate::model::XdmNode;
use crate::path::Path;

pub(super) fn apply<N: XdmNode>(path: &Path<N>) -> Option<Expr<N>> {
    let mut changed = false;
    let mut root = path.root.clone();
    let mut steps: Vec<Expr<N>> = Vec::with_capacity(path.steps.len());

    if let Some(Expr::Path(inner)) = &path.root
        && !inner.steps.is_empty()
    {
        root = inner.root.clone();
        steps.extend(inner.steps.iter().cloned());
        changed = true;
    }

    for step in &path.steps {
        match step {
            Expr::Path(inner) if !inner.steps.is_empty() => {
                match &inner.root {
                    None | Some(Expr::ContextItem) => {}
                    Some(r) => steps.push(r.clone()),
                }
                steps.extend(inner.steps.iter().cloned());
                changed = true;
            }
            other => steps.push(other.clone()),
        }
    }

    changed.then(|| Expr::path(Path::new(root, steps)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use crate::step::Step;
    use crate::store::DbNode;
    use crate::test::Test;

    #[test]
    fn nested_root_path_is_inlined() {
        let inner: Path<DbNode> = Path::absolute([Step::simple(Axis::Child, Test::element("a"))]);
        let outer = Path::new(
            Some(Expr::path(inner)),
            vec![Expr::step(Step::simple(Axis::Child, Test::element("b")))],
        );
        let flat = apply(&outer).expect("flattened");
        assert_eq!(flat.to_string(), "/child::a/child::b");
    }
}
