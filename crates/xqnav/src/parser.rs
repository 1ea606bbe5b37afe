//! Text front end for the navigational sublanguage.
//!
//! [`parse`] lowers the text into an unoptimized [`Expr`]; [`compile`] also runs the
//! optimizer against a [`CompileContext`].

use std::collections::HashMap;

use compact_str::CompactString;
use pest::Parser as _;
use pest::iterators::{Pair, Pairs};

use crate::axis::Axis;
use crate::context::{CompileContext, XML_NS};
use crate::error::{Error, ErrorCode};
use crate::expr::{Builtin, CompareOp, Expr};
use crate::model::{NodeKind, XdmNode};
use crate::optimize::optimize;
use crate::path::Path;
use crate::step::Step;
use crate::test::{NameTest, NodeTest, Test, TypeRef};
use crate::xdm::XdmAtomicValue;

#[derive(pest_derive::Parser)]
#[grammar = "path.pest"]
pub struct PathParser;

/// Parses `text` with only the `xml` prefix bound.
pub fn parse<N: XdmNode>(text: &str) -> Result<Expr<N>, Error> {
    let namespaces = HashMap::new();
    Builder {
        namespaces: &namespaces,
    }
    .build(text)
}

/// Parses `text` against the prefixes of `cx` and optimizes the result.
pub fn compile<N: XdmNode>(text: &str, cx: &CompileContext<N>) -> Result<Expr<N>, Error> {
    let expr = Builder {
        namespaces: &cx.namespaces,
    }
    .build(text)?;
    Ok(optimize(&expr, cx))
}

struct Builder<'a> {
    namespaces: &'a HashMap<CompactString, CompactString>,
}

fn malformed(pair: &Pair<'_, Rule>) -> Error {
    let (line, col) = pair.line_col();
    Error::from_code(
        ErrorCode::XPST0003,
        format!("unexpected {:?} at {line}:{col}", pair.as_rule()),
    )
}

fn next<'i>(inner: &mut Pairs<'i, Rule>, parent: &Pair<'i, Rule>) -> Result<Pair<'i, Rule>, Error> {
    inner.next().ok_or_else(|| malformed(parent))
}

/// Operator tokens interleaved with operands in chain rules.
fn is_token(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::OP_COMMA | Rule::K_OR | Rule::K_AND | Rule::K_UNION | Rule::OP_PIPE | Rule::OP_BANG
    )
}

fn one_or<N: XdmNode>(mut items: Vec<Expr<N>>, many: fn(Vec<Expr<N>>) -> Expr<N>) -> Expr<N> {
    if items.len() == 1 {
        items.swap_remove(0)
    } else {
        many(items)
    }
}

fn descendant_or_self<N: XdmNode>() -> Expr<N> {
    Expr::step(Step::simple(Axis::DescendantOrSelf, Test::NODE))
}

impl Builder<'_> {
    fn build<N: XdmNode>(&self, text: &str) -> Result<Expr<N>, Error> {
        let mut pairs = PathParser::parse(Rule::xpath, text)?;
        let root = pairs
            .next()
            .ok_or_else(|| Error::from_code(ErrorCode::XPST0003, "empty expression"))?;
        let mut inner = root.clone().into_inner();
        let expr = self.build_expr(next(&mut inner, &root)?)?;
        tracing::trace!(input = text, parsed = %expr, "parsed path expression");
        Ok(expr)
    }

    fn operands<N: XdmNode>(&self, pair: Pair<'_, Rule>) -> Result<Vec<Expr<N>>, Error> {
        pair.into_inner()
            .filter(|p| !is_token(p.as_rule()))
            .map(|p| self.build_expr(p))
            .collect()
    }

    fn build_expr<N: XdmNode>(&self, pair: Pair<'_, Rule>) -> Result<Expr<N>, Error> {
        match pair.as_rule() {
            Rule::expr => Ok(one_or(self.operands(pair)?, Expr::Sequence)),
            Rule::or_expr => Ok(one_or(self.operands(pair)?, Expr::Or)),
            Rule::and_expr => Ok(one_or(self.operands(pair)?, Expr::And)),
            Rule::union_expr => Ok(one_or(self.operands(pair)?, Expr::Union)),
            Rule::map_expr => {
                let mut it = self.operands(pair)?.into_iter();
                let first = it.next().unwrap_or(Expr::Empty);
                Ok(it.fold(first, |input, action| Expr::Map {
                    input: Box::new(input),
                    action: Box::new(action),
                }))
            }
            Rule::comparison_expr => {
                let mut inner = pair.clone().into_inner();
                let lhs = self.build_expr(next(&mut inner, &pair)?)?;
                let Some(op) = inner.next() else {
                    return Ok(lhs);
                };
                let op = compare_op(&op)?;
                let rhs = self.build_expr(next(&mut inner, &pair)?)?;
                Ok(Expr::compare(op, lhs, rhs))
            }
            Rule::path_expr => {
                let mut inner = pair.clone().into_inner();
                self.build_expr(next(&mut inner, &pair)?)
            }
            Rule::absolute_path => self.build_absolute_path(pair),
            Rule::relative_path => {
                let mut steps = self.build_steps(pair)?;
                if steps.len() == 1 && steps[0].as_step().is_none() {
                    return Ok(steps.swap_remove(0));
                }
                let root = steps
                    .first()
                    .is_some_and(|first| first.as_step().is_none())
                    .then(|| steps.remove(0));
                Ok(Expr::path(Path::new(root, steps)))
            }
            Rule::postfix_expr => self.build_postfix(pair),
            Rule::primary_expr => {
                let mut inner = pair.clone().into_inner();
                self.build_primary(next(&mut inner, &pair)?)
            }
            _ => Err(malformed(&pair)),
        }
    }

    fn build_absolute_path<N: XdmNode>(&self, pair: Pair<'_, Rule>) -> Result<Expr<N>, Error> {
        let mut inner = pair.clone().into_inner();
        let op = next(&mut inner, &pair)?;
        let mut steps = Vec::new();
        if op.as_rule() == Rule::OP_DSLASH {
            steps.push(descendant_or_self());
        }
        match inner.next() {
            Some(rel) => steps.extend(self.build_steps(rel)?),
            None => return Ok(Expr::Root),
        }
        Ok(Expr::path(Path::new(Some(Expr::Root), steps)))
    }

    /// Steps of a relative path; `//` contributes a `descendant-or-self::node()` step.
    fn build_steps<N: XdmNode>(&self, pair: Pair<'_, Rule>) -> Result<Vec<Expr<N>>, Error> {
        let mut steps = Vec::new();
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::step_expr => steps.push(self.build_step(p)?),
                Rule::path_sep => {
                    if p.clone().into_inner().any(|t| t.as_rule() == Rule::OP_DSLASH) {
                        steps.push(descendant_or_self());
                    }
                }
                _ => return Err(malformed(&p)),
            }
        }
        Ok(steps)
    }

    fn build_step<N: XdmNode>(&self, pair: Pair<'_, Rule>) -> Result<Expr<N>, Error> {
        let mut inner = pair.clone().into_inner();
        let step = next(&mut inner, &pair)?;
        match step.as_rule() {
            Rule::axis_step => {
                let mut parts = step.clone().into_inner();
                let spec = next(&mut parts, &step)?;
                let axis = Axis::from_name(spec.as_str().trim_end_matches("::"))
                    .ok_or_else(|| malformed(&spec))?;
                let test = self.build_node_test(next(&mut parts, &step)?, axis)?;
                let preds = self.build_predicates(parts)?;
                Ok(Expr::step(Step::new(axis, test, preds)))
            }
            Rule::abbrev_step => {
                let mut parts = step.clone().into_inner();
                let first = parts.next().ok_or_else(|| malformed(&step))?;
                let (axis, test) = match first.as_rule() {
                    Rule::OP_PARENT => (Axis::Parent, Test::NODE),
                    Rule::OP_AT => {
                        let nt = parts.next().ok_or_else(|| malformed(&step))?;
                        (Axis::Attribute, self.build_node_test(nt, Axis::Attribute)?)
                    }
                    _ => {
                        let axis = default_axis(&first);
                        (axis, self.build_node_test(first, axis)?)
                    }
                };
                let preds = parts
                    .map(|p| self.build_predicate(p))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::step(Step::new(axis, test, preds)))
            }
            Rule::postfix_expr => self.build_postfix(step),
            _ => Err(malformed(&step)),
        }
    }

    fn build_postfix<N: XdmNode>(&self, pair: Pair<'_, Rule>) -> Result<Expr<N>, Error> {
        let mut inner = pair.clone().into_inner();
        let primary = next(&mut inner, &pair)?;
        let base = self.build_expr(primary)?;
        let predicates = self.build_predicates(inner)?;
        if predicates.is_empty() {
            return Ok(base);
        }
        Ok(Expr::Filter {
            base: Box::new(base),
            predicates,
        })
    }

    fn build_predicates<N: XdmNode>(&self, pairs: Pairs<'_, Rule>) -> Result<Vec<Expr<N>>, Error> {
        pairs.map(|p| self.build_predicate(p)).collect()
    }

    fn build_predicate<N: XdmNode>(&self, pair: Pair<'_, Rule>) -> Result<Expr<N>, Error> {
        if pair.as_rule() != Rule::predicate {
            return Err(malformed(&pair));
        }
        let mut inner = pair.clone().into_inner();
        self.build_expr(next(&mut inner, &pair)?)
    }

    fn build_primary<N: XdmNode>(&self, pair: Pair<'_, Rule>) -> Result<Expr<N>, Error> {
        match pair.as_rule() {
            Rule::literal => {
                let mut inner = pair.clone().into_inner();
                build_literal(next(&mut inner, &pair)?)
            }
            Rule::var_ref => {
                let name = pair.as_str().trim_start_matches('$').trim();
                Ok(Expr::Var(name.into()))
            }
            Rule::parenthesized_expr => match pair.into_inner().next() {
                Some(e) => self.build_expr(e),
                None => Ok(Expr::Empty),
            },
            Rule::context_item_expr => Ok(Expr::ContextItem),
            Rule::function_call => self.build_function_call(pair),
            _ => Err(malformed(&pair)),
        }
    }

    fn build_function_call<N: XdmNode>(&self, pair: Pair<'_, Rule>) -> Result<Expr<N>, Error> {
        let mut inner = pair.clone().into_inner();
        let name_pair = next(&mut inner, &pair)?;
        let name = name_pair.as_str();
        let local = name.strip_prefix("fn:").unwrap_or(name);
        let args = inner
            .filter(|p| !is_token(p.as_rule()))
            .map(|p| self.build_expr(p))
            .collect::<Result<Vec<Expr<N>>, _>>()?;
        let unknown = || {
            let (line, col) = name_pair.line_col();
            Error::from_code(
                ErrorCode::XPST0017,
                format!("unknown function {name}#{} at {line}:{col}", args.len()),
            )
        };
        match (local, args.len()) {
            ("position", 0) => Ok(Expr::Position),
            ("last", 0) => Ok(Expr::Last),
            ("root", 0) => Ok(Expr::Root),
            _ => {
                let func = Builtin::from_name(local).ok_or_else(unknown)?;
                if !func.arity().contains(&args.len()) {
                    return Err(unknown());
                }
                Ok(Expr::call(func, args))
            }
        }
    }

    fn build_node_test(&self, pair: Pair<'_, Rule>, axis: Axis) -> Result<Test, Error> {
        let mut inner = pair.clone().into_inner();
        let test = next(&mut inner, &pair)?;
        match test.as_rule() {
            Rule::name_test => {
                let kind = axis.principal_kind();
                Ok(Test::Name(self.build_name_test(test, kind)?))
            }
            Rule::kind_test => self.build_kind_test(test),
            _ => Err(malformed(&test)),
        }
    }

    fn build_name_test(&self, pair: Pair<'_, Rule>, kind: NodeKind) -> Result<NameTest, Error> {
        let mut inner = pair.clone().into_inner();
        let name = next(&mut inner, &pair)?;
        match name.as_rule() {
            Rule::any_name => Ok(NameTest::wildcard(kind)),
            Rule::local_wildcard => {
                let local = name.as_str().trim_start_matches("*:");
                Ok(NameTest::any_namespace(kind, local))
            }
            Rule::prefixed_wildcard => {
                let prefix = name.as_str().trim_end_matches(":*");
                let uri = self.resolve(prefix, &name)?;
                Ok(NameTest::namespace(kind, Some(uri)).with_prefix(Some(prefix)))
            }
            Rule::braced_name => {
                let mut parts = name.clone().into_inner();
                let uri = next(&mut parts, &name)?.as_str().trim();
                let uri = (!uri.is_empty()).then_some(uri);
                let local = next(&mut parts, &name)?;
                Ok(match local.as_rule() {
                    Rule::any_name => NameTest::namespace(kind, uri),
                    _ => NameTest::full(kind, local.as_str(), uri),
                })
            }
            Rule::qname => self.build_qname_test(&name, kind),
            _ => Err(malformed(&name)),
        }
    }

    fn build_qname_test(&self, name: &Pair<'_, Rule>, kind: NodeKind) -> Result<NameTest, Error> {
        match name.as_str().split_once(':') {
            Some((prefix, local)) => {
                let uri = self.resolve(prefix, name)?;
                Ok(NameTest::full(kind, local, Some(uri)).with_prefix(Some(prefix)))
            }
            None => Ok(NameTest::local(kind, name.as_str())),
        }
    }

    fn build_kind_test(&self, pair: Pair<'_, Rule>) -> Result<Test, Error> {
        let mut inner = pair.clone().into_inner();
        let test = next(&mut inner, &pair)?;
        match test.as_rule() {
            Rule::any_kind_test => Ok(Test::NODE),
            Rule::text_test => Ok(Test::TEXT),
            Rule::comment_test => Ok(Test::COMMENT),
            Rule::namespace_node_test => Ok(Test::NAMESPACE),
            Rule::pi_test => match test.into_inner().next() {
                None => Ok(Test::PI),
                Some(target) => {
                    let target = target.as_str().trim_matches(|c| c == '\'' || c == '"');
                    Ok(Test::Node(NodeTest {
                        kind: NodeKind::ProcessingInstruction,
                        name: Some(NameTest::local(NodeKind::ProcessingInstruction, target)),
                        type_ref: None,
                    }))
                }
            },
            Rule::element_test => self.build_named_kind_test(test, NodeKind::Element),
            Rule::attribute_test => self.build_named_kind_test(test, NodeKind::Attribute),
            Rule::document_test => match test.into_inner().next() {
                None => Ok(Test::DOCUMENT),
                Some(elem) => Ok(Test::document(
                    self.build_named_kind_test(elem, NodeKind::Element)?,
                )),
            },
            _ => Err(malformed(&test)),
        }
    }

    /// `element(...)` and `attribute(...)`.
    fn build_named_kind_test(&self, pair: Pair<'_, Rule>, kind: NodeKind) -> Result<Test, Error> {
        let mut inner = pair.into_inner().filter(|p| p.as_rule() != Rule::OP_COMMA);
        let name = match inner.next() {
            None => return Ok(Test::kind_of(kind)),
            Some(n) => {
                let mut parts = n.clone().into_inner();
                let n = next(&mut parts, &n)?;
                match n.as_rule() {
                    Rule::any_name => None,
                    _ => Some(self.build_qname_test(&n, kind)?),
                }
            }
        };
        let type_ref = inner.next().map(|t| TypeRef::from_name(t.as_str()));
        Ok(match (name, type_ref) {
            (None, None) => Test::kind_of(kind),
            (Some(name), None) => Test::Name(name),
            (name, type_ref) => Test::Node(NodeTest {
                kind,
                name,
                type_ref,
            }),
        })
    }

    fn resolve<'s>(&'s self, prefix: &str, at: &Pair<'_, Rule>) -> Result<&'s str, Error> {
        if prefix == "xml" {
            return Ok(XML_NS);
        }
        self.namespaces
            .get(prefix)
            .map(CompactString::as_str)
            .ok_or_else(|| {
                let (line, col) = at.line_col();
                Error::from_code(
                    ErrorCode::XPST0081,
                    format!("unbound namespace prefix '{prefix}' at {line}:{col}"),
                )
            })
    }
}

/// Axis of an abbreviated step: `attribute()` and `namespace-node()` tests imply their axis.
fn default_axis(node_test: &Pair<'_, Rule>) -> Axis {
    let kind = node_test
        .clone()
        .into_inner()
        .next()
        .filter(|t| t.as_rule() == Rule::kind_test)
        .and_then(|t| t.into_inner().next())
        .map(|t| t.as_rule());
    match kind {
        Some(Rule::attribute_test) => Axis::Attribute,
        Some(Rule::namespace_node_test) => Axis::Namespace,
        _ => Axis::Child,
    }
}

fn compare_op(pair: &Pair<'_, Rule>) -> Result<CompareOp, Error> {
    let token = pair.clone().into_inner().next().ok_or_else(|| malformed(pair))?;
    Ok(match token.as_rule() {
        Rule::OP_EQ => CompareOp::Eq,
        Rule::OP_NE => CompareOp::Ne,
        Rule::OP_LT => CompareOp::Lt,
        Rule::OP_LTE => CompareOp::Le,
        Rule::OP_GT => CompareOp::Gt,
        Rule::OP_GTE => CompareOp::Ge,
        _ => return Err(malformed(&token)),
    })
}

fn build_literal<N: XdmNode>(pair: Pair<'_, Rule>) -> Result<Expr<N>, Error> {
    let raw = pair.as_str();
    let value = match pair.as_rule() {
        Rule::integer_literal => match raw.parse::<i64>() {
            Ok(v) => XdmAtomicValue::Integer(v),
            // out of range for xs:integer here: keep the magnitude as a double
            Err(_) => XdmAtomicValue::Double(raw.parse().map_err(|_| malformed(&pair))?),
        },
        Rule::decimal_literal | Rule::double_literal => {
            XdmAtomicValue::Double(raw.parse().map_err(|_| malformed(&pair))?)
        }
        Rule::string_literal => {
            let content = pair.clone().into_inner().next().ok_or_else(|| malformed(&pair))?;
            let s = match content.as_rule() {
                Rule::dbl_string_inner => content.as_str().replace("\"\"", "\""),
                _ => content.as_str().replace("''", "'"),
            };
            XdmAtomicValue::String(s)
        }
        _ => return Err(malformed(&pair)),
    };
    Ok(Expr::Literal(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DbNode;

    fn show(text: &str) -> String {
        parse::<DbNode>(text).map(|e| e.to_string()).unwrap_or_else(|e| e.to_string())
    }

    #[test]
    fn abbreviations_expand() {
        assert_eq!(show("a/@b"), "child::a/attribute::b");
        assert_eq!(show("//b"), "/descendant-or-self::node()/child::b");
        assert_eq!(show("../c"), "parent::node()/child::c");
    }

    #[test]
    fn kind_tests() {
        assert_eq!(show("text()"), "child::text()");
        assert_eq!(show("attribute()"), "attribute::attribute()");
        assert_eq!(show("self::document-node(element(a))"), "self::document-node(a)");
    }

    #[test]
    fn name_test_forms() {
        assert_eq!(show("*:a"), "child::*:a");
        assert_eq!(show("Q{urn:x}a"), "child::Q{urn:x}a");
        assert_eq!(show("xml:*"), "child::xml:*");
    }

    #[test]
    fn unbound_prefix_is_rejected() {
        let err = parse::<DbNode>("p:a").err();
        assert_eq!(err.map(|e| e.code), Some(ErrorCode::XPST0081));
    }

    #[test]
    fn unknown_function_is_rejected() {
        let err = parse::<DbNode>("a[frobnicate()]").err();
        assert_eq!(err.map(|e| e.code), Some(ErrorCode::XPST0017));
    }

    #[test]
    fn predicates_keep_their_shape() {
        assert_eq!(
            show("a[@id = 'x' and position() < 3]"),
            "child::a[attribute::id = 'x' and position() < 3]"
        );
    }
}
