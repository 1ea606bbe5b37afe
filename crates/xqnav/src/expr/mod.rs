//! Generic expression node: the minimal expression language predicates, roots and
//! mapped path steps are written in.

mod eval;

use core::fmt;
use std::sync::Arc;

use compact_str::CompactString;
use itertools::Itertools;

pub(crate) use eval::{effective_boolean_value, filter_by_predicate};

use crate::context::{DynamicContext, Focus};
use crate::error::Error;
use crate::model::{NodeKind, XdmNode};
use crate::path::{OrderProps, Path};
use crate::step::Step;
use crate::xdm::{ItemType, Occurrence, SeqType, XdmAtomicValue, XdmItem, XdmStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Operator with swapped operands: `a < b` is `b > a`.
    pub fn swap(self) -> CompareOp {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            other => other,
        }
    }
}

/// Built-in functions the path sublanguage knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Not,
    Exists,
    Empty,
    Count,
    String,
    True,
    False,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Not => "not",
            Builtin::Exists => "exists",
            Builtin::Empty => "empty",
            Builtin::Count => "count",
            Builtin::String => "string",
            Builtin::True => "true",
            Builtin::False => "false",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "not" => Builtin::Not,
            "exists" => Builtin::Exists,
            "empty" => Builtin::Empty,
            "count" => Builtin::Count,
            "string" => Builtin::String,
            "true" => Builtin::True,
            "false" => Builtin::False,
            _ => return None,
        })
    }

    /// Accepted argument counts.
    pub fn arity(self) -> core::ops::RangeInclusive<usize> {
        match self {
            Builtin::True | Builtin::False => 0..=0,
            Builtin::String => 0..=1,
            _ => 1..=1,
        }
    }
}

/// Expression provided by the embedding engine, e.g. an index access.
pub trait ExternalExpr<N: XdmNode>: fmt::Debug + fmt::Display + Send + Sync {
    fn evaluate<'a>(
        &'a self,
        cx: &'a DynamicContext<N>,
        focus: &Focus<N>,
    ) -> Result<XdmStream<'a, N>, Error>;

    fn declared_type(&self) -> SeqType;

    fn is_deterministic(&self) -> bool {
        true
    }

    /// Whether the expression reads the focus (item, position or size).
    fn uses_focus(&self) -> bool {
        false
    }

    fn has_free_vars(&self) -> bool {
        false
    }

    /// Ordering guarantees of the node output, if known.
    fn node_order(&self) -> Option<OrderProps> {
        None
    }
}

#[derive(Debug, Clone)]
pub enum Expr<N: XdmNode> {
    Empty,
    Literal(XdmAtomicValue),
    /// Constant value computed at compile time.
    Value(Arc<[XdmItem<N>]>),
    Sequence(Vec<Expr<N>>),
    /// Node union: result in document order without duplicates.
    Union(Vec<Expr<N>>),
    ContextItem,
    /// Root of the tree containing the context node.
    Root,
    Path(Arc<Path<N>>),
    Step(Arc<Step<N>>),
    Filter {
        base: Box<Expr<N>>,
        predicates: Vec<Expr<N>>,
    },
    Compare {
        op: CompareOp,
        lhs: Box<Expr<N>>,
        rhs: Box<Expr<N>>,
    },
    And(Vec<Expr<N>>),
    Or(Vec<Expr<N>>),
    Position,
    Last,
    Call {
        func: Builtin,
        args: Vec<Expr<N>>,
    },
    Var(CompactString),
    /// Simple map `input ! action`.
    Map {
        input: Box<Expr<N>>,
        action: Box<Expr<N>>,
    },
    External(Arc<dyn ExternalExpr<N>>),
}

impl<N: XdmNode> Expr<N> {
    pub fn string(s: &str) -> Self {
        Expr::Literal(XdmAtomicValue::String(s.to_string()))
    }

    pub fn integer(i: i64) -> Self {
        Expr::Literal(XdmAtomicValue::Integer(i))
    }

    pub fn compare(op: CompareOp, lhs: Expr<N>, rhs: Expr<N>) -> Self {
        Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn call(func: Builtin, args: Vec<Expr<N>>) -> Self {
        Expr::Call { func, args }
    }

    pub fn value(items: Vec<XdmItem<N>>) -> Self {
        if items.is_empty() {
            Expr::Empty
        } else {
            Expr::Value(items.into())
        }
    }

    pub fn step(step: Step<N>) -> Self {
        Expr::Step(Arc::new(step))
    }

    pub fn path(path: Path<N>) -> Self {
        Expr::Path(Arc::new(path))
    }

    pub fn is_empty_seq(&self) -> bool {
        matches!(self, Expr::Empty)
    }

    pub fn as_step(&self) -> Option<&Arc<Step<N>>> {
        match self {
            Expr::Step(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Arc<Path<N>>> {
        match self {
            Expr::Path(p) => Some(p),
            _ => None,
        }
    }

    /// Static result type.
    pub fn declared_type(&self) -> SeqType {
        match self {
            Expr::Empty => SeqType::EMPTY,
            Expr::Literal(a) => SeqType::new(a.item_type(), Occurrence::ExactlyOne),
            Expr::Value(items) => {
                let item = items
                    .iter()
                    .map(XdmItem::item_type)
                    .reduce(ItemType::union)
                    .unwrap_or(ItemType::Item);
                SeqType::new(item, Occurrence::from_count(items.len() as u64))
            }
            Expr::Sequence(es) => es
                .iter()
                .map(Expr::declared_type)
                .reduce(|a, b| {
                    let item = if a.is_empty() {
                        b.item
                    } else if b.is_empty() {
                        a.item
                    } else {
                        a.item.union(b.item)
                    };
                    SeqType::new(item, a.occ.concat(b.occ))
                })
                .unwrap_or(SeqType::EMPTY),
            Expr::Union(es) => {
                let types: Vec<SeqType> = es.iter().map(Expr::declared_type).collect();
                let item = types
                    .iter()
                    .filter(|t| !t.is_empty())
                    .map(|t| t.item)
                    .reduce(ItemType::union)
                    .unwrap_or(ItemType::Node(None));
                let occ = types
                    .iter()
                    .map(|t| t.occ)
                    .reduce(Occurrence::concat)
                    .unwrap_or(Occurrence::Zero);
                // duplicates collapse, so a single guaranteed member still means "one or more"
                let occ = match occ {
                    Occurrence::ExactlyOne => Occurrence::ExactlyOne,
                    o if o.min() == 1 => Occurrence::OneOrMore,
                    o if o.max() == 0 => Occurrence::Zero,
                    _ => Occurrence::ZeroOrMore,
                };
                SeqType::new(item, occ)
            }
            Expr::ContextItem => SeqType::new(ItemType::Item, Occurrence::ExactlyOne),
            Expr::Root => SeqType::nodes(Some(NodeKind::Document), Occurrence::ExactlyOne),
            Expr::Path(p) => p.seq_type(),
            Expr::Step(s) => s.seq_type(),
            Expr::Filter { base, predicates } => {
                let t = base.declared_type();
                if predicates.is_empty() {
                    t
                } else {
                    SeqType::new(t.item, t.occ.optional())
                }
            }
            Expr::Compare { .. } | Expr::And(_) | Expr::Or(_) => SeqType::BOOLEAN,
            Expr::Position | Expr::Last => SeqType::INTEGER,
            Expr::Call { func, .. } => match func {
                Builtin::Count => SeqType::INTEGER,
                Builtin::String => SeqType::STRING,
                _ => SeqType::BOOLEAN,
            },
            Expr::Var(_) => SeqType::ITEMS,
            Expr::Map { input, action } => {
                let i = input.declared_type();
                let a = action.declared_type();
                SeqType::new(a.item, i.occ.then(a.occ))
            }
            Expr::External(e) => e.declared_type(),
        }
    }

    /// Sub-expressions evaluated against the same focus as `self`.
    fn focus_children(&self) -> Vec<&Expr<N>> {
        match self {
            Expr::Sequence(es) | Expr::Union(es) | Expr::And(es) | Expr::Or(es) => {
                es.iter().collect()
            }
            Expr::Compare { lhs, rhs, .. } => vec![&**lhs, &**rhs],
            Expr::Call { args, .. } => args.iter().collect(),
            Expr::Filter { base, .. } => vec![&**base],
            Expr::Map { input, .. } => vec![&**input],
            Expr::Path(p) => p.root.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Every direct sub-expression, including those with their own focus.
    pub fn children(&self) -> Vec<&Expr<N>> {
        match self {
            Expr::Filter { base, predicates } => {
                let mut v: Vec<&Expr<N>> = vec![&**base];
                v.extend(predicates);
                v
            }
            Expr::Map { input, action } => vec![&**input, &**action],
            Expr::Path(p) => {
                let mut v: Vec<&Expr<N>> = p.root.iter().collect();
                v.extend(p.steps.iter());
                v
            }
            Expr::Step(s) => s.predicates.iter().collect(),
            _ => self.focus_children(),
        }
    }

    /// Reads `position()` of the enclosing focus.
    pub fn uses_position(&self) -> bool {
        match self {
            Expr::Position => true,
            Expr::External(e) => e.uses_focus(),
            _ => self.focus_children().into_iter().any(Expr::uses_position),
        }
    }

    /// Reads `last()` of the enclosing focus.
    pub fn uses_last(&self) -> bool {
        match self {
            Expr::Last => true,
            Expr::External(e) => e.uses_focus(),
            _ => self.focus_children().into_iter().any(Expr::uses_last),
        }
    }

    /// Reads any part of the enclosing focus.
    pub fn uses_focus(&self) -> bool {
        match self {
            Expr::ContextItem | Expr::Root | Expr::Position | Expr::Last | Expr::Step(_) => true,
            Expr::Path(p) if p.root.is_none() => true,
            Expr::Call {
                func: Builtin::String,
                args,
            } if args.is_empty() => true,
            Expr::External(e) => e.uses_focus(),
            _ => self.focus_children().into_iter().any(Expr::uses_focus),
        }
    }

    /// References a variable anywhere inside.
    pub fn has_free_vars(&self) -> bool {
        match self {
            Expr::Var(_) => true,
            Expr::External(e) => e.has_free_vars(),
            _ => self.children().into_iter().any(Expr::has_free_vars),
        }
    }

    /// Same result for the same focus and bindings, every time.
    pub fn is_deterministic(&self) -> bool {
        match self {
            Expr::External(e) => e.is_deterministic(),
            _ => self.children().into_iter().all(Expr::is_deterministic),
        }
    }

    /// Ordering guarantees of the node output of this expression, evaluated once.
    pub fn node_order(&self) -> Option<OrderProps> {
        let t = self.declared_type();
        match self {
            Expr::Empty => Some(OrderProps::SINGLE),
            Expr::Root | Expr::ContextItem if t.is_nodes() => Some(OrderProps::SINGLE),
            Expr::Value(items) if items.len() == 1 && t.is_nodes() => Some(OrderProps::SINGLE),
            Expr::Path(p) => p.output_order(),
            Expr::Union(_) => Some(OrderProps::SORTED),
            Expr::External(e) => e.node_order(),
            _ => None,
        }
    }
}

/// Structural equality; external expressions compare by identity.
impl<N: XdmNode> PartialEq for Expr<N> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expr::Empty, Expr::Empty)
            | (Expr::ContextItem, Expr::ContextItem)
            | (Expr::Root, Expr::Root)
            | (Expr::Position, Expr::Position)
            | (Expr::Last, Expr::Last) => true,
            (Expr::Literal(a), Expr::Literal(b)) => a == b,
            (Expr::Value(a), Expr::Value(b)) => a == b,
            (Expr::Sequence(a), Expr::Sequence(b))
            | (Expr::Union(a), Expr::Union(b))
            | (Expr::And(a), Expr::And(b))
            | (Expr::Or(a), Expr::Or(b)) => a == b,
            (Expr::Path(a), Expr::Path(b)) => Arc::ptr_eq(a, b) || a == b,
            (Expr::Step(a), Expr::Step(b)) => Arc::ptr_eq(a, b) || a == b,
            (
                Expr::Filter {
                    base: ab,
                    predicates: ap,
                },
                Expr::Filter {
                    base: bb,
                    predicates: bp,
                },
            ) => ab == bb && ap == bp,
            (
                Expr::Compare {
                    op: ao,
                    lhs: al,
                    rhs: ar,
                },
                Expr::Compare {
                    op: bo,
                    lhs: bl,
                    rhs: br,
                },
            ) => ao == bo && al == bl && ar == br,
            (Expr::Call { func: af, args: aa }, Expr::Call { func: bf, args: ba }) => {
                af == bf && aa == ba
            }
            (Expr::Var(a), Expr::Var(b)) => a == b,
            (
                Expr::Map {
                    input: ai,
                    action: aa,
                },
                Expr::Map {
                    input: bi,
                    action: ba,
                },
            ) => ai == bi && aa == ba,
            (Expr::External(a), Expr::External(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn write_operand<N: XdmNode>(f: &mut fmt::Formatter<'_>, e: &Expr<N>) -> fmt::Result {
    match e {
        Expr::Compare { .. } | Expr::And(_) | Expr::Or(_) | Expr::Map { .. } => write!(f, "({e})"),
        _ => write!(f, "{e}"),
    }
}

impl<N: XdmNode> fmt::Display for Expr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Empty => f.write_str("()"),
            Expr::Literal(XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s)) => {
                write!(f, "'{}'", s.replace('\'', "''"))
            }
            Expr::Literal(a) => write!(f, "{a}"),
            Expr::Value(items) => write!(f, "value({} items)", items.len()),
            Expr::Sequence(es) => write!(f, "({})", es.iter().join(", ")),
            Expr::Union(es) => write!(f, "({})", es.iter().join(" | ")),
            Expr::ContextItem => f.write_str("."),
            Expr::Root => f.write_str("root()"),
            Expr::Path(p) => write!(f, "{p}"),
            Expr::Step(s) => write!(f, "{s}"),
            Expr::Filter { base, predicates } => {
                write!(f, "({base})")?;
                for p in predicates {
                    write!(f, "[{p}]")?;
                }
                Ok(())
            }
            Expr::Compare { op, lhs, rhs } => {
                write_operand(f, lhs)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, rhs)
            }
            Expr::And(es) => write!(f, "{}", es.iter().join(" and ")),
            Expr::Or(es) => write!(f, "{}", es.iter().join(" or ")),
            Expr::Position => f.write_str("position()"),
            Expr::Last => f.write_str("last()"),
            Expr::Call { func, args } => write!(f, "{}({})", func.name(), args.iter().join(", ")),
            Expr::Var(v) => write!(f, "${v}"),
            Expr::Map { input, action } => {
                write_operand(f, input)?;
                f.write_str(" ! ")?;
                write_operand(f, action)
            }
            Expr::External(e) => write!(f, "{e}"),
        }
    }
}
