use crate::axis::Axis;
use crate::expr::Expr;
use crate::model::XdmNode;
use crate::path::Path;
use crate::step::Step;
use crate::test::Test;

/// `descendant-or-self::node()` without predicates.
fn is_dos_node<N: XdmNode>(step: &Step<N>) -> bool {
    step.axis == Axis::DescendantOrSelf && step.test == Test::NODE && step.predicates.is_empty()
}

/// Result of merging `descendant-or-self::node()` with the step after it.
fn merge_descendant<N: XdmNode>(next: &Step<N>) -> Option<Step<N>> {
    if next.has_positional_predicates() {
        return None;
    }
    let axis = match next.axis {
        Axis::Child | Axis::Descendant => Axis::Descendant,
        Axis::DescendantOrSelf | Axis::SelfAxis => Axis::DescendantOrSelf,
        _ => return None,
    };
    Some(next.with_axis(axis))
}

enum Merged<N: XdmNode> {
    Step(Step<N>),
    Empty,
}

/// Folds a predicate-free-position self step into the step before it.
fn merge_self<N: XdmNode>(prev: &Step<N>, cur: &Step<N>) -> Option<Merged<N>> {
    if cur.axis != Axis::SelfAxis
        || cur.is_identity()
        || prev.has_positional_predicates()
        || cur.has_positional_predicates()
    {
        return None;
    }
    let Some(test) = prev.test.intersect(&cur.test) else {
        return Some(Merged::Empty);
    };
    let mut preds = prev.predicates.clone();
    preds.extend(cur.predicates.iter().cloned());
    Some(Merged::Step(Step::new(prev.axis, test, preds)))
}

pub(super) fn apply<N: XdmNode>(path: &Path<N>) -> Option<Expr<N>> {
    let steps = &path.steps;
    for i in 0..steps.len().saturating_sub(1) {
        let (Some(cur), Some(next)) = (steps[i].as_step(), steps[i + 1].as_step()) else {
            continue;
        };
        let merged = if is_dos_node(cur) {
            merge_descendant(next).map(Merged::Step)
        } else {
            merge_self(cur, next)
        };
        let Some(merged) = merged else {
            continue;
        };
        let step = match merged {
            Merged::Empty => return Some(Expr::Empty),
            Merged::Step(s) => s,
        };
        let mut out = Vec::with_capacity(steps.len() - 1);
        out.extend(steps[..i].iter().cloned());
        out.push(Expr::step(step));
        out.extend(steps[i + 2..].iter().cloned());
        return Some(Expr::path(Path::new(path.root.clone(), out)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::store::DbNode;

    fn path(steps: Vec<Step<DbNode>>) -> Path<DbNode> {
        Path::relative(steps)
    }

    #[test]
    fn dos_child_becomes_descendant() {
        let p = path(vec![
            Step::simple(Axis::DescendantOrSelf, Test::NODE),
            Step::simple(Axis::Child, Test::element("b")),
        ]);
        assert_eq!(apply(&p).expect("merged").to_string(), "descendant::b");
    }

    #[test]
    fn positional_child_is_not_merged() {
        let p = path(vec![
            Step::simple(Axis::DescendantOrSelf, Test::NODE),
            Step::new(Axis::Child, Test::element("b"), vec![Expr::integer(1)]),
        ]);
        assert!(apply(&p).is_none());
    }

    #[test]
    fn disjoint_self_step_empties_the_path() {
        let p = path(vec![
            Step::simple(Axis::Child, Test::element("a")),
            Step::simple(Axis::SelfAxis, Test::TEXT),
        ]);
        assert_eq!(apply(&p), Some(Expr::Empty));
    }
}
