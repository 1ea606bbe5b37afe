//! Axis steps: one axis, one node test and zero or more predicates.
//!
//! The predicate list is classified once when the step is built; the classification
//! decides which of the four runtime strategies evaluates the step.

mod iter;

use core::fmt;

use crate::axis::Axis;
use crate::context::{ContextValue, DynamicContext, Focus};
use crate::error::Error;
use crate::expr::{CompareOp, Expr};
use crate::model::{NodeKind, XdmNode};
use crate::test::Test;
use crate::xdm::{ItemType, NodeStream, Occurrence, SeqType, XdmAtomicValue, XdmItem};

/// Runtime strategy of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepStrategy {
    /// Fully lazy: test and predicates applied per node.
    Plain,
    /// Lazy with per-predicate counters; stops once no position can match any more.
    Positional,
    /// Single `last()` predicate: scans the axis and yields the final match.
    Last,
    /// Materializes the axis, then filters batch-wise with a known size.
    Cached,
}

/// Shape of one predicate with respect to the focus position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateClass {
    /// Boolean filter that never reads the position and never yields a number.
    Plain,
    /// Selects the positions `min..=max` (empty when `min > max`).
    Position { min: usize, max: usize },
    /// Selects the last position.
    Last,
    /// May depend on position or size in a way that cannot be streamed.
    PossiblyPositional,
}

impl PredicateClass {
    /// Classifies a predicate expression.
    pub fn of<N: XdmNode>(pred: &Expr<N>) -> PredicateClass {
        match pred {
            Expr::Literal(a) if a.is_numeric() => {
                numeric(a).map_or(PredicateClass::PossiblyPositional, |k| {
                    position_range(CompareOp::Eq, k)
                })
            }
            Expr::Last => PredicateClass::Last,
            Expr::Compare { op, lhs, rhs } => match (&**lhs, &**rhs) {
                (Expr::Position, Expr::Literal(a)) if a.is_numeric() && *op != CompareOp::Ne => {
                    numeric(a).map_or(PredicateClass::PossiblyPositional, |k| {
                        position_range(*op, k)
                    })
                }
                (Expr::Literal(a), Expr::Position) if a.is_numeric() && *op != CompareOp::Ne => {
                    numeric(a).map_or(PredicateClass::PossiblyPositional, |k| {
                        position_range(op.swap(), k)
                    })
                }
                (Expr::Position, Expr::Last) | (Expr::Last, Expr::Position)
                    if *op == CompareOp::Eq =>
                {
                    PredicateClass::Last
                }
                _ => Self::generic(pred),
            },
            _ => Self::generic(pred),
        }
    }

    fn generic<N: XdmNode>(pred: &Expr<N>) -> PredicateClass {
        if pred.uses_position() || pred.uses_last() || pred.declared_type().item.may_be_numeric()
        {
            PredicateClass::PossiblyPositional
        } else {
            PredicateClass::Plain
        }
    }

    /// At most one item passes.
    pub fn selects_single(self) -> bool {
        match self {
            PredicateClass::Position { min, max } => max <= min,
            PredicateClass::Last => true,
            _ => false,
        }
    }

    /// Reads the focus position or size in any way.
    pub fn is_positional(self) -> bool {
        !matches!(self, PredicateClass::Plain)
    }
}

fn numeric(a: &XdmAtomicValue) -> Option<f64> {
    a.as_f64().filter(|v| !v.is_nan())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn position_range(op: CompareOp, k: f64) -> PredicateClass {
    const EMPTY: PredicateClass = PredicateClass::Position { min: 1, max: 0 };
    let to_pos = |v: f64| -> usize { if v <= 0.0 { 0 } else { v as usize } };
    match op {
        CompareOp::Eq => {
            if k >= 1.0 && k.fract() == 0.0 {
                let p = to_pos(k);
                PredicateClass::Position { min: p, max: p }
            } else {
                EMPTY
            }
        }
        CompareOp::Le => PredicateClass::Position {
            min: 1,
            max: to_pos(k.floor()),
        },
        CompareOp::Lt => PredicateClass::Position {
            min: 1,
            max: to_pos(k.ceil() - 1.0),
        },
        CompareOp::Ge => PredicateClass::Position {
            min: to_pos(k.ceil()).max(1),
            max: usize::MAX,
        },
        CompareOp::Gt => PredicateClass::Position {
            min: to_pos(k.floor() + 1.0).max(1),
            max: usize::MAX,
        },
        CompareOp::Ne => PredicateClass::PossiblyPositional,
    }
}

#[derive(Debug, Clone)]
pub struct Step<N: XdmNode> {
    pub axis: Axis,
    pub test: Test,
    pub predicates: Vec<Expr<N>>,
    classes: Vec<PredicateClass>,
    strategy: StepStrategy,
    seq_type: SeqType,
}

impl<N: XdmNode> Step<N> {
    pub fn new(axis: Axis, test: Test, predicates: Vec<Expr<N>>) -> Self {
        let classes: Vec<PredicateClass> = predicates.iter().map(PredicateClass::of).collect();
        let strategy = select_strategy(&classes);
        let seq_type = step_type(axis, &test, &classes);
        Self {
            axis,
            test,
            predicates,
            classes,
            strategy,
            seq_type,
        }
    }

    pub fn simple(axis: Axis, test: Test) -> Self {
        Self::new(axis, test, Vec::new())
    }

    /// Same axis and test, different predicates.
    pub fn with_predicates(&self, predicates: Vec<Expr<N>>) -> Self {
        Self::new(self.axis, self.test.clone(), predicates)
    }

    pub fn with_test(&self, test: Test) -> Self {
        let mut s = Self::new(self.axis, test, self.predicates.clone());
        s.strategy = self.strategy;
        s
    }

    pub fn with_axis(&self, axis: Axis) -> Self {
        Self::new(axis, self.test.clone(), self.predicates.clone())
    }

    /// Pins the runtime strategy, if the predicate shape allows it.
    pub fn with_strategy(&self, strategy: StepStrategy) -> Option<Self> {
        self.supports(strategy).then(|| {
            let mut s = self.clone();
            s.strategy = strategy;
            s
        })
    }

    pub fn strategy(&self) -> StepStrategy {
        self.strategy
    }

    pub fn predicate_classes(&self) -> &[PredicateClass] {
        &self.classes
    }

    pub fn supports(&self, strategy: StepStrategy) -> bool {
        match strategy {
            StepStrategy::Cached => true,
            StepStrategy::Plain => self.classes.iter().all(|c| *c == PredicateClass::Plain),
            StepStrategy::Positional => self
                .classes
                .iter()
                .all(|c| matches!(c, PredicateClass::Plain | PredicateClass::Position { .. })),
            StepStrategy::Last => self.classes == [PredicateClass::Last],
        }
    }

    /// Some predicate reads the position or size.
    pub fn has_positional_predicates(&self) -> bool {
        self.classes.iter().any(|c| c.is_positional())
    }

    pub fn seq_type(&self) -> SeqType {
        self.seq_type
    }

    /// `self::node()` without predicates.
    pub fn is_identity(&self) -> bool {
        self.axis == Axis::SelfAxis && self.test == Test::NODE && self.predicates.is_empty()
    }

    /// Evaluates the step against the focus item.
    pub fn evaluate<'a>(
        &'a self,
        cx: &'a DynamicContext<N>,
        focus: &Focus<N>,
    ) -> Result<NodeStream<'a, N>, Error> {
        match &focus.value {
            ContextValue::Absent => Err(Error::no_context(self)),
            ContextValue::Item(XdmItem::Node(n)) => Ok(self.iter(cx, n.clone())),
            ContextValue::Item(other) => Err(Error::context_not_node(self, other.type_label())),
            ContextValue::Sequence(s) => Err(Error::context_not_node(
                self,
                format!("sequence of {} items", s.len()),
            )),
        }
    }

    /// Streams the step's result for one context node.
    pub fn iter<'a>(&'a self, cx: &'a DynamicContext<N>, node: N) -> NodeStream<'a, N> {
        self.iter_with(cx, node, self.strategy)
    }

    /// Streams the step's result with an explicit strategy. Unsupported strategies
    /// fall back to [`StepStrategy::Cached`], which is valid for every predicate shape.
    pub fn iter_with<'a>(
        &'a self,
        cx: &'a DynamicContext<N>,
        node: N,
        strategy: StepStrategy,
    ) -> NodeStream<'a, N> {
        let strategy = if self.supports(strategy) {
            strategy
        } else {
            StepStrategy::Cached
        };
        let candidates = iter::Candidates::new(self.axis.iterate(&node), &self.test, cx);
        match strategy {
            StepStrategy::Plain => Box::new(iter::PlainIter::new(candidates, &self.predicates)),
            StepStrategy::Positional => Box::new(iter::PositionalIter::new(
                candidates,
                &self.predicates,
                &self.classes,
            )),
            StepStrategy::Last => Box::new(iter::LastIter::new(candidates)),
            StepStrategy::Cached => Box::new(iter::CachedIter::new(candidates, &self.predicates)),
        }
    }
}

fn select_strategy(classes: &[PredicateClass]) -> StepStrategy {
    if classes.iter().all(|c| *c == PredicateClass::Plain) {
        StepStrategy::Plain
    } else if classes == [PredicateClass::Last] {
        StepStrategy::Last
    } else if classes
        .iter()
        .all(|c| matches!(c, PredicateClass::Plain | PredicateClass::Position { .. }))
    {
        StepStrategy::Positional
    } else {
        StepStrategy::Cached
    }
}

fn step_type(axis: Axis, test: &Test, classes: &[PredicateClass]) -> SeqType {
    let kind = test.kind().or(match axis {
        Axis::Attribute => Some(NodeKind::Attribute),
        Axis::Namespace => Some(NodeKind::Namespace),
        _ => None,
    });
    let occ = if axis == Axis::SelfAxis && *test == Test::NODE && classes.is_empty() {
        Occurrence::ExactlyOne
    } else if matches!(axis, Axis::SelfAxis | Axis::Parent)
        || (axis == Axis::Attribute && test.names_single_attribute())
        || classes.iter().any(|c| c.selects_single())
    {
        Occurrence::ZeroOrOne
    } else {
        Occurrence::ZeroOrMore
    };
    SeqType::new(ItemType::Node(kind), occ)
}

impl<N: XdmNode> PartialEq for Step<N> {
    fn eq(&self, other: &Self) -> bool {
        self.axis == other.axis && self.test == other.test && self.predicates == other.predicates
    }
}

impl<N: XdmNode> fmt::Display for Step<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.axis, self.test)?;
        for p in &self.predicates {
            write!(f, "[{p}]")?;
        }
        Ok(())
    }
}
