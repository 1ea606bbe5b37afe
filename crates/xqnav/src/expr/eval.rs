use core::cmp::Ordering;
use std::iter;

use super::{Builtin, CompareOp, Expr};
use crate::context::{ContextValue, DynamicContext, Focus};
use crate::error::{Error, ErrorCode};
use crate::model::XdmNode;
use crate::order::sorted_distinct_nodes;
use crate::xdm::{XdmAtomicValue, XdmItem, XdmSequence, XdmStream};

fn once<'a, N: 'a>(item: XdmItem<N>) -> XdmStream<'a, N> {
    Box::new(iter::once(Ok(item)))
}

fn empty<'a, N: 'a>() -> XdmStream<'a, N> {
    Box::new(iter::empty())
}

fn boolean<'a, N: 'a>(b: bool) -> XdmStream<'a, N> {
    once(XdmItem::Atomic(XdmAtomicValue::Boolean(b)))
}

impl<N: XdmNode> Expr<N> {
    /// Evaluates against `focus`, producing a lazy item stream.
    ///
    /// Errors that do not depend on the produced items (missing context, unbound
    /// variables) are reported immediately; the rest surface from the stream.
    pub fn evaluate<'a>(
        &'a self,
        cx: &'a DynamicContext<N>,
        focus: &Focus<N>,
    ) -> Result<XdmStream<'a, N>, Error> {
        match self {
            Expr::Empty => Ok(empty()),
            Expr::Literal(a) => Ok(once(XdmItem::Atomic(a.clone()))),
            Expr::Value(items) => Ok(Box::new(items.iter().cloned().map(Ok))),
            Expr::Sequence(es) => {
                let focus = focus.clone();
                Ok(Box::new(es.iter().flat_map(move |e| {
                    e.evaluate(cx, &focus)
                        .unwrap_or_else(|err| Box::new(iter::once(Err(err))))
                })))
            }
            Expr::Union(es) => {
                let mut nodes = Vec::new();
                for e in es {
                    for item in e.evaluate(cx, focus)? {
                        match item? {
                            XdmItem::Node(n) => nodes.push(n),
                            XdmItem::Atomic(_) => {
                                return Err(Error::from_code(
                                    ErrorCode::XPTY0004,
                                    "union operator requires node sequences",
                                ));
                            }
                        }
                    }
                }
                let sorted = sorted_distinct_nodes(nodes)?;
                Ok(Box::new(sorted.into_iter().map(|n| Ok(XdmItem::Node(n)))))
            }
            Expr::ContextItem => match &focus.value {
                ContextValue::Absent => Err(Error::no_context("'.'")),
                ContextValue::Item(i) => Ok(once(i.clone())),
                ContextValue::Sequence(s) => {
                    let s = s.clone();
                    Ok(Box::new((0..s.len()).map(move |i| Ok(s[i].clone()))))
                }
            },
            Expr::Root => {
                let mut roots = Vec::new();
                for item in focus_items(focus, "root()")? {
                    match item {
                        XdmItem::Node(n) => roots.push(n.root()),
                        other => return Err(Error::context_not_node("root()", other.type_label())),
                    }
                }
                let roots = sorted_distinct_nodes(roots)?;
                Ok(Box::new(roots.into_iter().map(|n| Ok(XdmItem::Node(n)))))
            }
            Expr::Path(p) => p.evaluate(cx, focus),
            Expr::Step(s) => {
                let nodes = s.evaluate(cx, focus)?;
                Ok(Box::new(nodes.map(|r| r.map(XdmItem::Node))))
            }
            Expr::Filter { base, predicates } => {
                let mut items = base.evaluate(cx, focus)?.collect::<Result<Vec<_>, _>>()?;
                for p in predicates {
                    items = filter_by_predicate(items, p, cx, Clone::clone)?;
                }
                Ok(Box::new(items.into_iter().map(Ok)))
            }
            Expr::Compare { op, lhs, rhs } => {
                let l = atomized(lhs, cx, focus)?;
                let r = atomized(rhs, cx, focus)?;
                for a in &l {
                    for b in &r {
                        if compare_atomic(*op, a, b)? {
                            return Ok(boolean(true));
                        }
                    }
                }
                Ok(boolean(false))
            }
            Expr::And(es) => {
                for e in es {
                    if !e.ebv(cx, focus)? {
                        return Ok(boolean(false));
                    }
                }
                Ok(boolean(true))
            }
            Expr::Or(es) => {
                for e in es {
                    if e.ebv(cx, focus)? {
                        return Ok(boolean(true));
                    }
                }
                Ok(boolean(false))
            }
            Expr::Position => {
                if focus.value.is_absent() {
                    return Err(Error::no_context("position()"));
                }
                Ok(once(XdmItem::Atomic(XdmAtomicValue::Integer(as_i64(focus.position)))))
            }
            Expr::Last => {
                if focus.value.is_absent() {
                    return Err(Error::no_context("last()"));
                }
                Ok(once(XdmItem::Atomic(XdmAtomicValue::Integer(as_i64(focus.size)))))
            }
            Expr::Call { func, args } => Self::call_builtin(*func, args, cx, focus),
            Expr::Var(name) => match cx.variable(name) {
                Some(v) => Ok(Box::new(v.iter().cloned().map(Ok))),
                None => Err(Error::from_code(
                    ErrorCode::XPST0008,
                    format!("undeclared variable ${name}"),
                )),
            },
            Expr::Map { input, action } => {
                let items = input.evaluate(cx, focus)?.collect::<Result<Vec<_>, _>>()?;
                let size = items.len();
                Ok(Box::new(items.into_iter().enumerate().flat_map(move |(i, item)| {
                    let inner = Focus::item(item, i + 1, size);
                    action
                        .evaluate(cx, &inner)
                        .unwrap_or_else(|err| Box::new(iter::once(Err(err))))
                })))
            }
            Expr::External(e) => e.evaluate(cx, focus),
        }
    }

    /// Evaluates eagerly into a sequence.
    pub fn evaluate_vec(
        &self,
        cx: &DynamicContext<N>,
        focus: &Focus<N>,
    ) -> Result<XdmSequence<N>, Error> {
        self.evaluate(cx, focus)?.collect()
    }

    /// Effective boolean value.
    pub fn ebv(&self, cx: &DynamicContext<N>, focus: &Focus<N>) -> Result<bool, Error> {
        effective_boolean_value(self.evaluate(cx, focus)?)
    }

    /// Truth value of a predicate: a single numeric value selects by position,
    /// anything else by its effective boolean value.
    #[allow(clippy::cast_precision_loss)]
    pub fn predicate_matches(
        &self,
        cx: &DynamicContext<N>,
        focus: &Focus<N>,
    ) -> Result<bool, Error> {
        let mut stream = self.evaluate(cx, focus)?;
        let Some(first) = stream.next().transpose()? else {
            return Ok(false);
        };
        if let XdmItem::Atomic(a) = &first
            && a.is_numeric()
        {
            if stream.next().is_some() {
                return Err(Error::from_code(
                    ErrorCode::FORG0006,
                    "effective boolean value of a sequence of several numbers",
                ));
            }
            return Ok(a.as_f64() == Some(focus.position as f64));
        }
        effective_boolean_value(Box::new(iter::once(Ok(first)).chain(stream)))
    }

    fn call_builtin<'a>(
        func: Builtin,
        args: &'a [Expr<N>],
        cx: &'a DynamicContext<N>,
        focus: &Focus<N>,
    ) -> Result<XdmStream<'a, N>, Error> {
        let arg = |i: usize| -> Result<XdmStream<'a, N>, Error> {
            match args.get(i) {
                Some(e) => e.evaluate(cx, focus),
                None => Err(Error::from_code(
                    ErrorCode::XPTY0004,
                    format!("{}(): missing argument", func.name()),
                )),
            }
        };
        match func {
            Builtin::True => Ok(boolean(true)),
            Builtin::False => Ok(boolean(false)),
            Builtin::Not => Ok(boolean(!effective_boolean_value(arg(0)?)?)),
            Builtin::Exists => Ok(boolean(arg(0)?.next().transpose()?.is_some())),
            Builtin::Empty => Ok(boolean(arg(0)?.next().transpose()?.is_none())),
            Builtin::Count => {
                let mut n = 0i64;
                for item in arg(0)? {
                    item?;
                    n += 1;
                }
                Ok(once(XdmItem::Atomic(XdmAtomicValue::Integer(n))))
            }
            Builtin::String => {
                let item = if args.is_empty() {
                    match &focus.value {
                        ContextValue::Absent => return Err(Error::no_context("string()")),
                        ContextValue::Item(i) => Some(i.clone()),
                        ContextValue::Sequence(_) => {
                            return Err(Error::from_code(
                                ErrorCode::XPTY0004,
                                "string(): context value is not a single item",
                            ));
                        }
                    }
                } else {
                    let mut s = arg(0)?;
                    let first = s.next().transpose()?;
                    if s.next().is_some() {
                        return Err(Error::from_code(
                            ErrorCode::XPTY0004,
                            "string(): argument is a sequence of more than one item",
                        ));
                    }
                    first
                };
                let text = item.map(|i| i.atomize().to_string()).unwrap_or_default();
                Ok(once(XdmItem::Atomic(XdmAtomicValue::String(text))))
            }
        }
    }
}

fn as_i64(v: usize) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn focus_items<N: XdmNode>(focus: &Focus<N>, what: &str) -> Result<Vec<XdmItem<N>>, Error> {
    if focus.value.is_absent() {
        return Err(Error::no_context(what));
    }
    Ok(focus.value.items())
}

fn atomized<N: XdmNode>(
    e: &Expr<N>,
    cx: &DynamicContext<N>,
    focus: &Focus<N>,
) -> Result<Vec<XdmAtomicValue>, Error> {
    e.evaluate(cx, focus)?
        .map(|r| r.map(|i| i.atomize()))
        .collect()
}

/// General comparison of two atomic values.
fn compare_atomic(op: CompareOp, a: &XdmAtomicValue, b: &XdmAtomicValue) -> Result<bool, Error> {
    use XdmAtomicValue as A;
    let ord = match (a, b) {
        (A::Boolean(x), A::Boolean(y)) => Some(x.cmp(y)),
        (A::Boolean(x), A::UntypedAtomic(s)) | (A::UntypedAtomic(s), A::Boolean(x)) => {
            let y = matches!(s.trim(), "true" | "1");
            let o = x.cmp(&y);
            Some(if matches!(a, A::Boolean(_)) { o } else { o.reverse() })
        }
        _ if a.is_numeric() || b.is_numeric() => {
            let typed_string = matches!(a, A::String(_)) || matches!(b, A::String(_));
            if typed_string || matches!(a, A::Boolean(_)) || matches!(b, A::Boolean(_)) {
                return Err(Error::from_code(
                    ErrorCode::XPTY0004,
                    format!("cannot compare {} with {}", a.type_name(), b.type_name()),
                ));
            }
            match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            }
        }
        (A::String(x) | A::UntypedAtomic(x), A::String(y) | A::UntypedAtomic(y)) => {
            Some(x.as_str().cmp(y.as_str()))
        }
        _ => {
            return Err(Error::from_code(
                ErrorCode::XPTY0004,
                format!("cannot compare {} with {}", a.type_name(), b.type_name()),
            ));
        }
    };
    let Some(ord) = ord else {
        // NaN or unparsable untyped value: only != holds
        return Ok(op == CompareOp::Ne);
    };
    Ok(match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
    })
}

pub(crate) fn effective_boolean_value<N: XdmNode>(
    mut stream: XdmStream<'_, N>,
) -> Result<bool, Error> {
    let Some(first) = stream.next().transpose()? else {
        return Ok(false);
    };
    if let XdmItem::Node(_) = first {
        return Ok(true);
    }
    if stream.next().transpose()?.is_some() {
        return Err(Error::from_code(
            ErrorCode::FORG0006,
            "effective boolean value of a sequence of several atomic values",
        ));
    }
    Ok(match first {
        XdmItem::Atomic(XdmAtomicValue::Boolean(b)) => b,
        XdmItem::Atomic(XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s)) => {
            !s.is_empty()
        }
        XdmItem::Atomic(XdmAtomicValue::Integer(i)) => i != 0,
        XdmItem::Atomic(XdmAtomicValue::Double(d)) => d != 0.0 && !d.is_nan(),
        XdmItem::Node(_) => true,
    })
}

/// Applies one predicate to a materialized sequence, with positions and size taken
/// from that sequence.
pub(crate) fn filter_by_predicate<N: XdmNode, T>(
    items: Vec<T>,
    predicate: &Expr<N>,
    cx: &DynamicContext<N>,
    to_item: impl Fn(&T) -> XdmItem<N>,
) -> Result<Vec<T>, Error> {
    let size = items.len();
    let mut out = Vec::with_capacity(size);
    for (i, t) in items.into_iter().enumerate() {
        cx.check_cancelled()?;
        let focus = Focus::item(to_item(&t), i + 1, size);
        if predicate.predicate_matches(cx, &focus)? {
            out.push(t);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DynamicContextBuilder;
    use crate::store::DbNode;

    #[test]
    fn builtin_calls_evaluate() {
        let cx = DynamicContextBuilder::<DbNode>::new().build();
        let focus = cx.initial_focus();
        let pair = Expr::Sequence(vec![Expr::integer(1), Expr::integer(2)]);
        let count = Expr::call(Builtin::Count, vec![pair.clone()]);
        assert_eq!(
            count.evaluate_vec(&cx, &focus).unwrap(),
            [XdmItem::Atomic(XdmAtomicValue::Integer(2))]
        );
        let not_empty = Expr::call(Builtin::Not, vec![Expr::call(Builtin::Empty, vec![pair])]);
        assert_eq!(
            not_empty.evaluate_vec(&cx, &focus).unwrap(),
            [XdmItem::Atomic(XdmAtomicValue::Boolean(true))]
        );
    }

    #[test]
    fn untyped_compares_numerically_against_numbers() {
        let a = XdmAtomicValue::UntypedAtomic("10".into());
        let b = XdmAtomicValue::Integer(9);
        assert!(compare_atomic(CompareOp::Gt, &a, &b).unwrap());
        assert!(!compare_atomic(CompareOp::Eq, &a, &b).unwrap());
    }

    #[test]
    fn unparsable_untyped_only_satisfies_not_equal() {
        let a = XdmAtomicValue::UntypedAtomic("x".into());
        let b = XdmAtomicValue::Integer(1);
        assert!(!compare_atomic(CompareOp::Eq, &a, &b).unwrap());
        assert!(compare_atomic(CompareOp::Ne, &a, &b).unwrap());
    }

    #[test]
    fn string_against_number_is_a_type_error() {
        let a = XdmAtomicValue::String("1".into());
        let b = XdmAtomicValue::Integer(1);
        let err = compare_atomic(CompareOp::Eq, &a, &b).unwrap_err();
        assert_eq!(err.code, ErrorCode::XPTY0004);
    }
}
