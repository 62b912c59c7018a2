//! Evaluation of [`MatchCriteria`] against a snapshot.
//!
//! Besides plain node attributes, a few derived fields describe a node by its
//! surroundings: `child-text`, `parent-class`, `region-resource-id`,
//! `neighbor-text`, and `xpath`.

use crate::xpath::{self, XPath};
use locus_common::protocol::{
    FIELD_CHILD_TEXT, FIELD_INDEX, FIELD_NEIGHBOR_TEXT, FIELD_PARENT_CLASS,
    FIELD_REGION_RESOURCE_ID, FIELD_XPATH,
};
use locus_common::{FieldMatchMode, MatchCriteria, MatchError, NodeId, UiTree};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

/// Value of `field` for `id`, or `None` when the node has nothing for it.
pub fn field_value(tree: &UiTree, id: NodeId, field: &str) -> Option<String> {
    let node = tree.node(id);
    match field {
        FIELD_CHILD_TEXT => tree
            .descendants(id)
            .into_iter()
            .find_map(|d| tree.node(d).non_empty("text").map(str::to_string)),
        FIELD_PARENT_CLASS => tree
            .parent(id)
            .and_then(|p| tree.node(p).non_empty("class"))
            .map(str::to_string),
        FIELD_REGION_RESOURCE_ID => tree
            .ancestors(id)
            .find_map(|a| tree.node(a).non_empty("resource-id").map(str::to_string)),
        FIELD_NEIGHBOR_TEXT => neighbor_text(tree, id),
        FIELD_XPATH => Some(xpath::absolute_xpath(tree, id)),
        FIELD_INDEX => node.attr(FIELD_INDEX).map(str::to_string),
        other => node.attr(other).map(str::to_string),
    }
}

/// Text of the closest sibling that has any, preferring earlier siblings.
fn neighbor_text(tree: &UiTree, id: NodeId) -> Option<String> {
    let parent = tree.parent(id)?;
    let siblings = tree.children(parent);
    let me = siblings.iter().position(|s| *s == id)?;
    let mut order: Vec<NodeId> = Vec::with_capacity(siblings.len());
    for dist in 1..siblings.len() {
        if me >= dist {
            order.push(siblings[me - dist]);
        }
        if me + dist < siblings.len() {
            order.push(siblings[me + dist]);
        }
    }
    order
        .into_iter()
        .find_map(|s| tree.node(s).non_empty("text").map(str::to_string))
}

struct FieldRule {
    field: String,
    expected: Option<Expected>,
    includes: Vec<String>,
    excludes: Vec<String>,
    regex_includes: Vec<Regex>,
    regex_excludes: Vec<Regex>,
}

enum Expected {
    Equals(String),
    Contains(String),
    Regex(Regex),
    XPath(HashSet<NodeId>),
}

/// Criteria with regexes and XPath expressions compiled once per snapshot.
pub struct CompiledCriteria {
    rules: Vec<FieldRule>,
}

impl CompiledCriteria {
    pub fn compile(criteria: &MatchCriteria, tree: &UiTree) -> Result<Self, MatchError> {
        let mut rules = Vec::with_capacity(criteria.fields.len());
        for field in &criteria.fields {
            let expected = match criteria.value(field) {
                None => None,
                Some(v) if field == FIELD_XPATH => {
                    let parsed = XPath::parse(v)
                        .map_err(|e| MatchError::InvalidCriteria(format!("xpath: {}", e)))?;
                    Some(Expected::XPath(parsed.evaluate(tree).into_iter().collect()))
                }
                // Keyword-only fields carry their anchored pattern in
                // regexIncludes; the raw value is not itself a pattern.
                Some(_)
                    if criteria.mode_for(field) == FieldMatchMode::Regex
                        && criteria.regex_includes.get(field).is_some_and(|r| !r.is_empty()) =>
                {
                    None
                }
                Some(v) => Some(match criteria.mode_for(field) {
                    FieldMatchMode::Equals => Expected::Equals(v.to_string()),
                    FieldMatchMode::Contains => Expected::Contains(v.to_string()),
                    FieldMatchMode::Regex => Expected::Regex(compile_regex(field, v)?),
                }),
            };

            let list = |m: &BTreeMap<String, Vec<String>>| -> Vec<String> {
                m.get(field)
                    .map(|v| v.iter().filter(|s| !s.is_empty()).cloned().collect())
                    .unwrap_or_default()
            };
            let regexes = |m: &BTreeMap<String, Vec<String>>| -> Result<Vec<Regex>, MatchError> {
                m.get(field)
                    .map(|v| {
                        v.iter()
                            .filter(|s| !s.is_empty())
                            .map(|p| compile_regex(field, p))
                            .collect()
                    })
                    .unwrap_or_else(|| Ok(vec![]))
            };

            rules.push(FieldRule {
                field: field.clone(),
                expected,
                includes: list(&criteria.includes),
                excludes: list(&criteria.excludes),
                regex_includes: regexes(&criteria.regex_includes)?,
                regex_excludes: regexes(&criteria.regex_excludes)?,
            });
        }
        Ok(Self { rules })
    }

    pub fn matches(&self, tree: &UiTree, id: NodeId) -> bool {
        self.rules.iter().all(|rule| rule_holds(rule, tree, id))
    }
}

fn compile_regex(field: &str, pattern: &str) -> Result<Regex, MatchError> {
    Regex::new(pattern)
        .map_err(|e| MatchError::InvalidCriteria(format!("regex for '{}': {}", field, e)))
}

fn rule_holds(rule: &FieldRule, tree: &UiTree, id: NodeId) -> bool {
    if let Some(Expected::XPath(set)) = &rule.expected {
        return set.contains(&id);
    }

    let actual = field_value(tree, id, &rule.field).unwrap_or_default();
    let value_ok = match &rule.expected {
        None | Some(Expected::XPath(_)) => true,
        Some(Expected::Equals(v)) => actual == *v,
        Some(Expected::Contains(v)) => actual.contains(v.as_str()),
        Some(Expected::Regex(re)) => re.is_match(&actual),
    };

    value_ok
        && rule.includes.iter().all(|w| actual.contains(w.as_str()))
        && !rule.excludes.iter().any(|w| actual.contains(w.as_str()))
        && rule.regex_includes.iter().all(|re| re.is_match(&actual))
        && !rule.regex_excludes.iter().any(|re| re.is_match(&actual))
}

/// Nodes satisfying every field rule, in document order. The synthetic root
/// is never a candidate.
pub fn find_candidates(tree: &UiTree, criteria: &MatchCriteria) -> Result<Vec<NodeId>, MatchError> {
    let compiled = CompiledCriteria::compile(criteria, tree)?;
    Ok(tree.elements().filter(|id| compiled.matches(tree, *id)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_common::Strategy;

    fn sample() -> (UiTree, NodeId, NodeId, NodeId) {
        let mut b = UiTree::builder("hierarchy");
        let list = b.node(
            b.root(),
            &[("resource-id", "com.demo:id/feed"), ("class", "androidx.recyclerview.widget.RecyclerView")],
        );
        let row = b.node(list, &[("class", "android.widget.LinearLayout"), ("clickable", "true")]);
        let title = b.node(row, &[("text", "Alice"), ("class", "android.widget.TextView")]);
        let follow = b.node(
            row,
            &[("text", "关注"), ("class", "android.widget.Button"), ("clickable", "true")],
        );
        (b.build(), row, title, follow)
    }

    fn criteria(fields: &[(&str, &str)]) -> MatchCriteria {
        let mut c = MatchCriteria::new(Strategy::Custom);
        for (f, v) in fields {
            c.fields.push(f.to_string());
            c.values.insert(f.to_string(), v.to_string());
        }
        c
    }

    #[test]
    fn test_derived_fields() {
        let (tree, row, title, follow) = sample();
        assert_eq!(field_value(&tree, row, FIELD_CHILD_TEXT).as_deref(), Some("Alice"));
        assert_eq!(
            field_value(&tree, follow, FIELD_PARENT_CLASS).as_deref(),
            Some("android.widget.LinearLayout")
        );
        assert_eq!(
            field_value(&tree, follow, FIELD_REGION_RESOURCE_ID).as_deref(),
            Some("com.demo:id/feed")
        );
        assert_eq!(field_value(&tree, follow, FIELD_NEIGHBOR_TEXT).as_deref(), Some("Alice"));
        assert_eq!(field_value(&tree, title, FIELD_NEIGHBOR_TEXT).as_deref(), Some("关注"));
    }

    #[test]
    fn test_equals_contains_regex_modes() {
        let (tree, _, _, follow) = sample();
        let exact = criteria(&[("text", "关注")]);
        assert_eq!(find_candidates(&tree, &exact).unwrap(), vec![follow]);

        let mut contains = criteria(&[("class", "Button")]);
        assert!(find_candidates(&tree, &contains).unwrap().is_empty());
        contains.match_mode.insert("class".into(), FieldMatchMode::Contains);
        assert_eq!(find_candidates(&tree, &contains).unwrap(), vec![follow]);

        let mut regex = criteria(&[("text", "^A.*e$")]);
        regex.match_mode.insert("text".into(), FieldMatchMode::Regex);
        assert_eq!(find_candidates(&tree, &regex).unwrap().len(), 1);
    }

    #[test]
    fn test_includes_and_excludes() {
        let (tree, row, ..) = sample();
        let mut c = criteria(&[("clickable", "true")]);
        c.fields.push("class".into());
        c.excludes.insert("class".into(), vec!["Button".into()]);
        assert_eq!(find_candidates(&tree, &c).unwrap(), vec![row]);

        c.includes.insert("class".into(), vec!["Linear".into()]);
        c.regex_excludes.insert("class".into(), vec!["Layout$".into()]);
        assert!(find_candidates(&tree, &c).unwrap().is_empty());
    }

    #[test]
    fn test_xpath_field_and_invalid_patterns() {
        let (tree, _, _, follow) = sample();
        let path = xpath::absolute_xpath(&tree, follow);
        let c = criteria(&[("xpath", path.as_str())]);
        assert_eq!(find_candidates(&tree, &c).unwrap(), vec![follow]);

        let mut bad = criteria(&[("text", "(")]);
        bad.match_mode.insert("text".into(), FieldMatchMode::Regex);
        assert!(matches!(find_candidates(&tree, &bad), Err(MatchError::InvalidCriteria(_))));
    }
}
