//! XPath construction and evaluation over a [`UiTree`].
//!
//! The evaluator understands the subset the engine itself emits plus the
//! forms commonly typed by hand:
//!
//! - absolute index paths: `/hierarchy/node[1]/node[2]`
//! - descendant steps with attribute predicates:
//!   `//node[@resource-id='com.demo:id/ok' and @text='OK']`
//! - `contains(@attr,'v')`, `starts-with(@attr,'v')`, `@attr!='v'`, `@attr`
//! - positional predicates and a top-level `(expr)[n]` selection
//! - `concat('It',"'",'s')` literals for values holding both quote kinds
//!
//! The grammar lives in `xpath.pest`.

use locus_common::protocol::{XPathAction, XPathRequest};
use locus_common::{NodeId, UiTree};
use pest::Parser;
use pest::error::InputLocation;
use pest::iterators::Pair;
use pest_derive::Parser;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XPathError {
    #[error("Empty XPath expression")]
    Empty,
    #[error("XPath syntax error at {pos}: {message}")]
    Syntax { pos: usize, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Equals(String, String),
    NotEquals(String, String),
    Contains(String, String),
    StartsWith(String, String),
    Exists(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Position(usize),
    All(Vec<Condition>),
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    name: Option<String>,
    predicates: Vec<Predicate>,
}

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    steps: Vec<Step>,
    /// 1-based pick over the whole result, from `(expr)[n]`.
    select: Option<usize>,
}

impl XPath {
    pub fn parse(expr: &str) -> Result<Self, XPathError> {
        if expr.trim().is_empty() {
            return Err(XPathError::Empty);
        }
        let mut pairs = XPathParser::parse(Rule::xpath, expr)?;
        let mut xpath = XPath {
            steps: Vec::new(),
            select: None,
        };

        if let Some(root) = pairs.next() {
            for inner in root.into_inner() {
                match inner.as_rule() {
                    Rule::path => xpath.steps = parse_path(inner)?,
                    Rule::selection => {
                        for part in inner.into_inner() {
                            match part.as_rule() {
                                Rule::path => xpath.steps = parse_path(part)?,
                                Rule::index => xpath.select = Some(parse_index(&part)?),
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(xpath)
    }

    /// Matching nodes in document order.
    pub fn evaluate(&self, tree: &UiTree) -> Vec<NodeId> {
        // `None` is the document node above the root element.
        let mut context: Vec<Option<NodeId>> = vec![None];

        for step in &self.steps {
            let mut next: Vec<NodeId> = Vec::new();
            for ctx in &context {
                let parents: Vec<Option<NodeId>> = match step.axis {
                    Axis::Child => vec![*ctx],
                    Axis::Descendant => {
                        let mut all = vec![*ctx];
                        let below = match ctx {
                            Some(id) => tree.descendants(*id),
                            None => tree.document_order().to_vec(),
                        };
                        all.extend(below.into_iter().map(Some));
                        all
                    }
                };
                for parent in parents {
                    let group: Vec<NodeId> = children_of(tree, parent)
                        .into_iter()
                        .filter(|c| name_matches(tree, *c, step.name.as_deref()))
                        .collect();
                    next.extend(apply_predicates(tree, group, &step.predicates));
                }
            }
            next.sort_by_key(|id| tree.position(*id));
            next.dedup();
            context = next.into_iter().map(Some).collect();
        }

        let mut result: Vec<NodeId> = context.into_iter().flatten().collect();
        if let Some(n) = self.select {
            result = result.get(n - 1).copied().into_iter().collect();
        }
        result
    }
}

/// Parse and evaluate in one call.
pub fn evaluate(tree: &UiTree, expr: &str) -> Result<Vec<NodeId>, XPathError> {
    Ok(XPath::parse(expr)?.evaluate(tree))
}

fn children_of(tree: &UiTree, parent: Option<NodeId>) -> Vec<NodeId> {
    match parent {
        Some(id) => tree.children(id).to_vec(),
        None => vec![tree.root()],
    }
}

fn name_matches(tree: &UiTree, id: NodeId, name: Option<&str>) -> bool {
    match name {
        None => true,
        Some(n) => tree.node(id).tag == n,
    }
}

fn apply_predicates(tree: &UiTree, mut group: Vec<NodeId>, predicates: &[Predicate]) -> Vec<NodeId> {
    for predicate in predicates {
        group = match predicate {
            Predicate::Position(n) => group.get(n - 1).copied().into_iter().collect(),
            Predicate::All(conditions) => group
                .into_iter()
                .filter(|id| conditions.iter().all(|c| condition_holds(tree, *id, c)))
                .collect(),
        };
    }
    group
}

fn condition_holds(tree: &UiTree, id: NodeId, condition: &Condition) -> bool {
    let node = tree.node(id);
    match condition {
        Condition::Equals(attr, value) => node.attr(attr) == Some(value.as_str()),
        Condition::NotEquals(attr, value) => node.attr(attr) != Some(value.as_str()),
        Condition::Contains(attr, value) => node.attr(attr).is_some_and(|v| v.contains(value.as_str())),
        Condition::StartsWith(attr, value) => {
            node.attr(attr).is_some_and(|v| v.starts_with(value.as_str()))
        }
        Condition::Exists(attr) => node.attr(attr).is_some(),
    }
}

#[derive(Parser)]
#[grammar = "xpath.pest"]
struct XPathParser;

impl From<pest::error::Error<Rule>> for XPathError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        let pos = match e.location {
            InputLocation::Pos(p) => p,
            InputLocation::Span((start, _)) => start,
        };
        XPathError::Syntax {
            pos,
            message: e.variant.message().into_owned(),
        }
    }
}

fn syntax(pair: &Pair<Rule>, message: &str) -> XPathError {
    XPathError::Syntax {
        pos: pair.as_span().start(),
        message: message.to_string(),
    }
}

fn parse_path(pair: Pair<Rule>) -> Result<Vec<Step>, XPathError> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::step)
        .map(parse_step)
        .collect()
}

fn parse_step(pair: Pair<Rule>) -> Result<Step, XPathError> {
    let mut axis = Axis::Child;
    let mut name = None;
    let mut predicates = Vec::new();

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::axis => {
                if inner.as_str() == "//" {
                    axis = Axis::Descendant;
                }
            }
            Rule::node_test => {
                name = inner
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::name)
                    .map(|p| p.as_str().to_string());
            }
            Rule::predicate => {
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::index => predicates.push(Predicate::Position(parse_index(&part)?)),
                        Rule::conditions => predicates.push(Predicate::All(
                            part.into_inner()
                                .map(parse_condition)
                                .collect::<Result<_, _>>()?,
                        )),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    Ok(Step {
        axis,
        name,
        predicates,
    })
}

fn parse_condition(pair: Pair<Rule>) -> Result<Condition, XPathError> {
    let rule = pair.as_rule();
    let mut attr = None;
    let mut value = None;
    for inner in pair.clone().into_inner() {
        match inner.as_rule() {
            Rule::attribute => attr = Some(parse_attribute(inner)),
            Rule::quoted => value = Some(parse_quoted(inner)),
            Rule::concat => value = Some(inner.into_inner().map(parse_quoted).collect()),
            _ => {}
        }
    }

    let attr = attr.ok_or_else(|| syntax(&pair, "expected an attribute"))?;
    if rule == Rule::exists {
        return Ok(Condition::Exists(attr));
    }
    let value = value.ok_or_else(|| syntax(&pair, "expected a quoted literal"))?;
    match rule {
        Rule::equals => Ok(Condition::Equals(attr, value)),
        Rule::not_equals => Ok(Condition::NotEquals(attr, value)),
        Rule::contains => Ok(Condition::Contains(attr, value)),
        Rule::starts_with => Ok(Condition::StartsWith(attr, value)),
        _ => Err(syntax(&pair, "unsupported condition")),
    }
}

fn parse_attribute(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .find(|p| p.as_rule() == Rule::name)
        .map(|p| p.as_str().to_string())
        .unwrap_or_default()
}

/// Literal content without its quotes. No escapes exist in XPath 1.0.
fn parse_quoted(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|p| p.as_str().to_string())
        .unwrap_or_default()
}

fn parse_index(pair: &Pair<Rule>) -> Result<usize, XPathError> {
    match pair.as_str().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(syntax(pair, "expected a positive index")),
    }
}

/// Index path from the root, e.g. `/hierarchy/node[1]/node[3]`.
///
/// Positions count same-tag siblings only, as XPath does.
pub fn absolute_xpath(tree: &UiTree, id: NodeId) -> String {
    let mut chain: Vec<NodeId> = tree.ancestors(id).collect();
    chain.reverse();
    chain.push(id);

    let mut out = String::new();
    for node_id in chain {
        let tag = &tree.node(node_id).tag;
        out.push('/');
        out.push_str(tag);
        if let Some(parent) = tree.parent(node_id) {
            let position = tree
                .children(parent)
                .iter()
                .filter(|c| tree.node(**c).tag == *tag)
                .position(|c| *c == node_id)
                .unwrap_or(0);
            out.push_str(&format!("[{}]", position + 1));
        }
    }
    out
}

/// `//node[@a='x' and @b='y']` from the node's non-empty values for `attrs`.
/// Falls back to the absolute path when none of them carry a value.
pub fn attribute_xpath(tree: &UiTree, id: NodeId, attrs: &[&str]) -> String {
    let node = tree.node(id);
    let conditions: Vec<String> = attrs
        .iter()
        .filter_map(|a| node.non_empty(a).map(|v| format!("@{}={}", a, quote_literal(v))))
        .collect();
    if conditions.is_empty() {
        return absolute_xpath(tree, id);
    }
    format!("//{}[{}]", node.tag, conditions.join(" and "))
}

/// `//node[...]` built from criteria values rather than a live node, for
/// strategies that need an expression when only values were authored.
pub fn values_xpath(values: &BTreeMap<String, String>, attrs: &[&str]) -> Option<String> {
    let conditions: Vec<String> = attrs
        .iter()
        .filter_map(|a| {
            values
                .get(*a)
                .filter(|v| !v.is_empty())
                .map(|v| format!("@{}={}", a, quote_literal(v)))
        })
        .collect();
    if conditions.is_empty() {
        None
    } else {
        Some(format!("//node[{}]", conditions.join(" and ")))
    }
}

/// Wrap an expression so only its first match is taken.
pub fn first_match(expr: &str) -> String {
    format!("({})[1]", expr)
}

/// Quote a literal, switching quote style when the value contains one.
/// Values holding both quote kinds become a `concat(...)` of pieces.
pub fn quote_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }
    let mut parts = Vec::new();
    for (i, chunk) in value.split('\'').enumerate() {
        if i > 0 {
            parts.push("\"'\"".to_string());
        }
        if !chunk.is_empty() {
            parts.push(format!("'{}'", chunk));
        }
    }
    format!("concat({})", parts.join(","))
}

/// Action for a direct XPath step, inferred from its name and type.
pub fn infer_action(step_name: &str, step_type: &str) -> XPathAction {
    let haystack = format!("{} {}", step_name, step_type).to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| haystack.contains(w));

    if has(&["long_press", "long-press", "longpress", "长按"]) {
        XPathAction::LongPress
    } else if has(&["click", "tap", "点击"]) {
        XPathAction::Click
    } else if has(&["input", "text", "type", "输入"]) {
        XPathAction::Text
    } else {
        XPathAction::Click
    }
}

/// Request for the direct XPath boundary. Rejects expressions the evaluator
/// cannot parse so nothing invalid crosses the boundary.
pub fn build_request(
    device_id: &str,
    xpath_expr: &str,
    step_name: &str,
    step_type: &str,
) -> Result<XPathRequest, XPathError> {
    XPath::parse(xpath_expr)?;
    Ok(XPathRequest {
        device_id: device_id.to_string(),
        xpath_expr: xpath_expr.to_string(),
        action: infer_action(step_name, step_type),
    })
}
