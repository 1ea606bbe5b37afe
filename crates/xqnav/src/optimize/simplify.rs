use crate::axis::Axis;
use crate::context::CompileContext;
use crate::expr::{Builtin, Expr};
use crate::model::{NodeKind, XdmNode};
use crate::path::Path;
use crate::step::{PredicateClass, Step};
use crate::test::Test;
use crate::xdm::{ItemType, XdmAtomicValue};

pub(super) fn apply<N: XdmNode>(path: &Path<N>, cx: &CompileContext<N>) -> Option<Expr<N>> {
    if path.root.as_ref().is_some_and(Expr::is_empty_seq) || path.steps.iter().any(Expr::is_empty_seq)
    {
        return Some(Expr::Empty);
    }
    if path.steps.is_empty() {
        return Some(path.root.clone().unwrap_or(Expr::ContextItem));
    }

    let mut changed = false;
    let root = match &path.root {
        Some(Expr::ContextItem) => {
            changed = true;
            None
        }
        other => other.clone(),
    };

    let mut steps: Vec<Expr<N>> = Vec::with_capacity(path.steps.len());
    for expr in &path.steps {
        let expr = match expr {
            Expr::ContextItem => {
                changed = true;
                Expr::step(Step::simple(Axis::SelfAxis, Test::NODE))
            }
            Expr::Filter { base, predicates } if **base == Expr::ContextItem => {
                changed = true;
                Expr::step(Step::new(Axis::SelfAxis, Test::NODE, predicates.clone()))
            }
            Expr::Step(s) => match constant_predicates(s) {
                None => return Some(Expr::Empty),
                Some(Some(step)) => {
                    changed = true;
                    Expr::step(step)
                }
                Some(None) => expr.clone(),
            },
            other => other.clone(),
        };
        steps.push(expr);
    }
    if steps.iter().any(Expr::is_empty_seq) {
        return Some(Expr::Empty);
    }

    let documents = root_is_documents(root.as_ref(), cx);
    for s in 0..steps.len() {
        if empty_step(&steps, s, documents) {
            return Some(Expr::Empty);
        }
    }

    let mut kept: Vec<Expr<N>> = Vec::with_capacity(steps.len());
    for s in 0..steps.len() {
        let redundant = match steps[s].as_step() {
            Some(cur) if cur.axis == Axis::SelfAxis && cur.predicates.is_empty() => {
                let prev = kept.last().and_then(Expr::as_step);
                if cur.is_identity() {
                    prev.is_some()
                        || (kept.is_empty() && steps.get(s + 1).is_some_and(|n| n.as_step().is_some()))
                } else {
                    prev.is_some_and(|p| p.test.instance_of(&cur.test))
                }
            }
            _ => false,
        };
        if redundant {
            changed = true;
        } else {
            kept.push(steps[s].clone());
        }
    }

    changed.then(|| Expr::path(Path::new(root, kept)))
}

/// Outer `None`: the step can never yield anything. Inner `None`: nothing to change.
fn constant_predicates<N: XdmNode>(step: &Step<N>) -> Option<Option<Step<N>>> {
    if step
        .predicate_classes()
        .iter()
        .any(|c| matches!(c, PredicateClass::Position { min, max } if min > max))
    {
        return None;
    }
    let mut kept = Vec::with_capacity(step.predicates.len());
    for pred in &step.predicates {
        match constant_truth(pred) {
            Some(false) => return None,
            Some(true) => {}
            None => kept.push(pred.clone()),
        }
    }
    if kept.len() == step.predicates.len() {
        return Some(None);
    }
    Some(Some(step.with_predicates(kept)))
}

fn constant_truth<N: XdmNode>(pred: &Expr<N>) -> Option<bool> {
    match pred {
        Expr::Literal(XdmAtomicValue::Boolean(b)) => Some(*b),
        Expr::Call {
            func: Builtin::True,
            ..
        } => Some(true),
        Expr::Call {
            func: Builtin::False,
            ..
        } => Some(false),
        Expr::Literal(XdmAtomicValue::String(s)) if s.is_empty() => Some(false),
        Expr::Empty => Some(false),
        _ => None,
    }
}

fn root_is_documents<N: XdmNode>(root: Option<&Expr<N>>, cx: &CompileContext<N>) -> bool {
    match root {
        // stored nodes always live in documents
        Some(Expr::Root) => cx.focus.store.is_some(),
        Some(e @ Expr::Value(_)) => e.declared_type().item == ItemType::Node(Some(NodeKind::Document)),
        Some(_) => false,
        None => cx.focus.value.as_ref().is_some_and(|v| {
            !v.is_empty()
                && v.iter()
                    .all(|i| i.as_node().is_some_and(|n| n.kind() == NodeKind::Document))
        }),
    }
}

/// Node kind a step yields, if it is fixed.
fn output_kind<N: XdmNode>(step: &Step<N>) -> Option<NodeKind> {
    match step.seq_type().item {
        ItemType::Node(k) => k,
        _ => None,
    }
}

fn is_leaf_kind(kind: Option<NodeKind>) -> bool {
    matches!(
        kind,
        Some(
            NodeKind::Attribute
                | NodeKind::Namespace
                | NodeKind::Text
                | NodeKind::Comment
                | NodeKind::ProcessingInstruction
        )
    )
}

fn empty_step<N: XdmNode>(steps: &[Expr<N>], s: usize, documents: bool) -> bool {
    let Some(step) = steps[s].as_step() else {
        return false;
    };
    let kind = step.test.kind();
    if s == 0 {
        if !documents {
            return false;
        }
        return match step.axis {
            Axis::SelfAxis | Axis::AncestorOrSelf => step.test.intersect(&Test::DOCUMENT).is_none(),
            Axis::Child | Axis::Descendant => matches!(
                kind,
                Some(NodeKind::Document | NodeKind::Attribute | NodeKind::Namespace)
            ),
            Axis::DescendantOrSelf => {
                matches!(kind, Some(NodeKind::Attribute | NodeKind::Namespace))
            }
            _ => true,
        };
    }
    let Some(prev) = steps[s - 1].as_step() else {
        return false;
    };
    let prev_kind = output_kind(prev);
    match step.axis {
        Axis::SelfAxis | Axis::DescendantOrSelf => {
            if step.test == Test::NODE {
                return false;
            }
            if matches!(prev_kind, Some(NodeKind::Attribute | NodeKind::Namespace))
                && kind != prev_kind
            {
                return true;
            }
            if prev_kind == Some(NodeKind::Text) && kind != Some(NodeKind::Text) {
                return true;
            }
            step.axis == Axis::SelfAxis && prev.test.intersect(&step.test).is_none()
        }
        Axis::FollowingSibling | Axis::PrecedingSibling => {
            matches!(prev_kind, Some(NodeKind::Attribute | NodeKind::Namespace))
        }
        Axis::Child | Axis::Descendant | Axis::Attribute | Axis::Namespace => {
            is_leaf_kind(prev_kind)
                || (step.axis == Axis::Attribute && kind == Some(NodeKind::Namespace))
        }
        Axis::Parent | Axis::Ancestor => prev_kind == Some(NodeKind::Document),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DbNode;

    fn step(axis: Axis, test: Test) -> Expr<DbNode> {
        Expr::step(Step::simple(axis, test))
    }

    #[test]
    fn attribute_children_are_empty() {
        let steps = [
            step(Axis::Attribute, Test::NODE),
            step(Axis::Child, Test::NODE),
        ];
        assert!(empty_step(&steps, 1, false));
    }

    #[test]
    fn document_has_no_parent() {
        let steps = [step(Axis::Parent, Test::NODE)];
        assert!(empty_step(&steps, 0, true));
        assert!(!empty_step(&steps, 0, false));
    }

    #[test]
    fn self_after_disjoint_name_is_empty() {
        let steps = [
            step(Axis::Child, Test::element("a")),
            step(Axis::SelfAxis, Test::element("b")),
        ];
        assert!(empty_step(&steps, 1, false));
    }
}
