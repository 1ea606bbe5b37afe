use crate::expr::Expr;
use crate::model::XdmNode;
use crate::path::Path;

/// `p/string()` becomes `p ! string()` when the last step is not navigational and
/// yields atomic values: no document-order bookkeeping is needed for its output.
pub(super) fn apply<N: XdmNode>(path: &Path<N>) -> Option<Expr<N>> {
    let (last, prefix) = path.steps.split_last()?;
    if last.as_step().is_some() || !last.declared_type().item.is_atomic() {
        return None;
    }
    let input = match (&path.root, prefix) {
        (None, []) => return None,
        (Some(root), []) => root.clone(),
        (root, prefix) => Expr::path(Path::new(root.clone(), prefix.to_vec())),
    };
    // non-node input would have been a type error on the path
    if !input.declared_type().item.is_node() {
        return None;
    }
    Some(Expr::Map {
        input: Box::new(input),
        action: Box::new(last.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use crate::expr::Builtin;
    use crate::step::Step;
    use crate::store::DbNode;
    use crate::test::Test;

    #[test]
    fn trailing_string_call_becomes_map() {
        let p: Path<DbNode> = Path::new(
            None,
            vec![
                Expr::step(Step::simple(Axis::Child, Test::element("a"))),
                Expr::call(Builtin::String, Vec::new()),
            ],
        );
        let Some(Expr::Map { input, action }) = apply(&p) else {
            panic!("expected a simple map");
        };
        assert_eq!(input.to_string(), "child::a");
        assert_eq!(action.to_string(), "string()");
    }

    #[test]
    fn node_valued_last_step_is_kept() {
        let p: Path<DbNode> = Path::new(
            None,
            vec![
                Expr::step(Step::simple(Axis::Child, Test::element("a"))),
                Expr::Root,
            ],
        );
        assert!(apply(&p).is_none());
    }
}
