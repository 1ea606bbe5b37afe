use super::relative_steps;
use crate::expr::Expr;
use crate::model::XdmNode;
use crate::path::Path;

/// Drops the last predicate of a step when it only restates the steps that follow:
/// `a[b/c]/b/c` is `a/b/c`, since contexts without a match yield nothing anyway.
pub(super) fn apply<N: XdmNode>(path: &Path<N>) -> Option<Expr<N>> {
    for (i, expr) in path.steps.iter().enumerate() {
        let Some(step) = expr.as_step() else {
            continue;
        };
        let Some(last) = step.predicates.last() else {
            continue;
        };
        let Some(restated) = relative_steps(last) else {
            continue;
        };
        let rest = &path.steps[i + 1..];
        if restated.is_empty() || restated.len() > rest.len() {
            continue;
        }
        let matches = restated
            .iter()
            .zip(rest)
            .all(|(r, s)| s.as_step().is_some_and(|s| **s == *r));
        if !matches {
            continue;
        }
        let mut preds = step.predicates.clone();
        preds.pop();
        let mut steps = path.steps.clone();
        steps[i] = Expr::step(step.with_predicates(preds));
        return Some(Expr::path(Path::new(path.root.clone(), steps)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use crate::step::Step;
    use crate::store::DbNode;
    use crate::test::Test;

    #[test]
    fn restated_predicate_is_dropped() {
        let b = Step::<DbNode>::simple(Axis::Child, Test::element("b"));
        let a = Step::new(
            Axis::Child,
            Test::element("a"),
            vec![Expr::path(Path::relative([b.clone()]))],
        );
        let p = Path::relative([a, b]);
        assert_eq!(apply(&p).expect("rewritten").to_string(), "child::a/child::b");
    }
}
