//! Value index access: equality lookups on text and attribute values.

use core::fmt;
use std::sync::Arc;

use super::catalog::Catalog;
use super::data::Data;
use super::node::DbNode;
use crate::axis::Axis;
use crate::context::{DynamicContext, Focus};
use crate::error::Error;
use crate::expr::{CompareOp, Expr, ExternalExpr};
use crate::model::NodeKind;
use crate::optimize::relative_steps;
use crate::path::{OrderProps, Path};
use crate::stats::{DataStatistics, IndexCandidate, IndexCostEstimator};
use crate::step::Step;
use crate::test::Test;
use crate::xdm::{Occurrence, SeqType, XdmAtomicValue, XdmItem, XdmStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Text,
    Attribute,
}

/// Every text node, or every attribute accepted by `test`, whose value equals `value`.
#[derive(Debug)]
pub struct ValueLookup {
    data: Arc<Data>,
    kind: IndexKind,
    value: String,
    test: Test,
    hits: Vec<u32>,
}

impl ValueLookup {
    pub fn new(data: Arc<Data>, kind: IndexKind, value: &str, test: Test) -> Self {
        let raw = match kind {
            IndexKind::Text => data.text_hits(value),
            IndexKind::Attribute => data.attribute_hits(value),
        };
        let hits = raw
            .iter()
            .copied()
            .filter(|pre| test.matches(&DbNode::new(data.clone(), *pre)))
            .collect();
        Self {
            data,
            kind,
            value: value.to_string(),
            test,
            hits,
        }
    }

    pub fn count(&self) -> usize {
        self.hits.len()
    }
}

impl fmt::Display for ValueLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.value.replace('\'', "''");
        match self.kind {
            IndexKind::Text => write!(f, "text-index('{value}')"),
            IndexKind::Attribute => write!(f, "attribute-index('{value}', {})", self.test),
        }
    }
}

impl ExternalExpr<DbNode> for ValueLookup {
    fn evaluate<'a>(
        &'a self,
        _cx: &'a DynamicContext<DbNode>,
        _focus: &Focus<DbNode>,
    ) -> Result<XdmStream<'a, DbNode>, Error> {
        Ok(Box::new(self.hits.iter().map(|pre| {
            Ok(XdmItem::Node(DbNode::new(self.data.clone(), *pre)))
        })))
    }

    fn declared_type(&self) -> SeqType {
        let kind = match self.kind {
            IndexKind::Text => NodeKind::Text,
            IndexKind::Attribute => NodeKind::Attribute,
        };
        SeqType::nodes(Some(kind), Occurrence::ZeroOrMore)
    }

    fn node_order(&self) -> Option<OrderProps> {
        // leaves: sorted, and none contains another
        Some(OrderProps {
            single: self.hits.len() <= 1,
            antichain: true,
        })
    }
}

/// Cost estimates backed by the value indexes of the stores in a [`Catalog`].
///
/// Recognized predicate shapes, with a string literal on either side of `=`:
/// `X[text() = 'v']`, `X[@a = 'v']`, `text()[. = 'v']`, `@a[. = 'v']`,
/// `X[B/text() = 'v']`, and `X[B = 'v']` when every `B` is a leaf element.
#[derive(Debug, Clone)]
pub struct ValueIndexEstimator {
    catalog: Arc<Catalog>,
}

impl ValueIndexEstimator {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }
}

impl IndexCostEstimator<DbNode> for ValueIndexEstimator {
    fn estimate(
        &self,
        stats: &dyn DataStatistics,
        predicate: &Expr<DbNode>,
        step: &Step<DbNode>,
    ) -> Option<IndexCandidate<DbNode>> {
        let (operand, value) = equality_with_literal(predicate)?;
        let data = self.catalog.data(stats.store_id())?;

        // the step's own nodes carry the value
        if matches!(operand, Expr::ContextItem) {
            let kind = match step.test.kind() {
                Some(NodeKind::Text) => IndexKind::Text,
                Some(NodeKind::Attribute) if step.axis == Axis::Attribute => IndexKind::Attribute,
                _ => return None,
            };
            let lookup = ValueLookup::new(data, kind, value, step.test.clone());
            return Some(candidate(lookup, Vec::new()));
        }

        let steps = relative_steps(operand)?;
        if steps.iter().any(|s| !s.predicates.is_empty()) || step.test.kind() != Some(NodeKind::Element)
        {
            return None;
        }
        let parent = || Step::simple(Axis::Parent, step.test.clone());
        match steps.as_slice() {
            [t] if t.axis == Axis::Child && t.test == Test::TEXT => {
                let lookup = ValueLookup::new(data, IndexKind::Text, value, Test::TEXT);
                Some(candidate(lookup, vec![parent()]))
            }
            [a] if a.axis == Axis::Attribute && a.test.kind() == Some(NodeKind::Attribute) => {
                let lookup = ValueLookup::new(data, IndexKind::Attribute, value, a.test.clone());
                Some(candidate(lookup, vec![parent()]))
            }
            [b, t] if is_child_element(b) && t.axis == Axis::Child && t.test == Test::TEXT => {
                let lookup = ValueLookup::new(data, IndexKind::Text, value, Test::TEXT);
                let up = Step::simple(Axis::Parent, b.test.clone());
                Some(candidate(lookup, vec![up, parent()]))
            }
            [b] if is_child_element(b) && !value.is_empty() && is_leaf(stats, &b.test) => {
                let lookup = ValueLookup::new(data, IndexKind::Text, value, Test::TEXT);
                let up = Step::simple(Axis::Parent, b.test.clone());
                Some(candidate(lookup, vec![up, parent()]))
            }
            _ => None,
        }
    }
}

fn candidate(lookup: ValueLookup, steps: Vec<Step<DbNode>>) -> IndexCandidate<DbNode> {
    let result_count = lookup.count() as u64;
    let source = Expr::External(Arc::new(lookup));
    let access = if steps.is_empty() {
        source
    } else {
        Expr::path(Path::new(Some(source), steps.into_iter().map(Expr::step).collect()))
    };
    IndexCandidate {
        result_count,
        access,
    }
}

/// `operand = 'literal'` or `'literal' = operand`.
fn equality_with_literal(pred: &Expr<DbNode>) -> Option<(&Expr<DbNode>, &str)> {
    let Expr::Compare {
        op: CompareOp::Eq,
        lhs,
        rhs,
    } = pred
    else {
        return None;
    };
    match (&**lhs, &**rhs) {
        (other, Expr::Literal(XdmAtomicValue::String(v)))
        | (Expr::Literal(XdmAtomicValue::String(v)), other) => Some((other, v.as_str())),
        _ => None,
    }
}

fn is_child_element(step: &Step<DbNode>) -> bool {
    step.axis == Axis::Child && step.test.kind() == Some(NodeKind::Element)
}

/// Every element of the data matching `test` is a leaf.
fn is_leaf(stats: &dyn DataStatistics, test: &Test) -> bool {
    let Some(local) = test.required_local() else {
        return false;
    };
    if !stats.up_to_date() {
        return false;
    }
    let Some(summary) = stats.summary() else {
        return false;
    };
    let mut found = false;
    for root in summary.root_path_nodes() {
        for id in summary.descendants(*root) {
            let pn = summary.node(id);
            let named = pn.kind == NodeKind::Element
                && pn.name.as_ref().is_some_and(|n| n.local.as_str() == local);
            if named {
                if !pn.stats.leaf {
                    return false;
                }
                found = true;
            }
        }
    }
    found
}
