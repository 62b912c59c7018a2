//! Per-strategy candidate search.
//!
//! The fallback executor hands each plan entry to a [`StrategyRunner`]. The
//! local runner evaluates the entry against the snapshot and, when a device
//! backend is attached, confirms the projected criteria on the device; that
//! round-trip is the part bounded by the entry's time budget.

use super::plan::PlanEntry;
use crate::backend::{BackendError, DeviceBackend};
use crate::hidden_parent::{self, HiddenParentConfig};
use crate::matcher::find_candidates;
use crate::normalizer::{self, RawCriteria};
use crate::xpath;
use async_trait::async_trait;
use locus_common::error_mapping::map_device_response;
use locus_common::protocol::{
    FIELD_CONTENT_DESC, FIELD_RESOURCE_ID, FIELD_TEXT, FIELD_XPATH, POSITIONAL_FIELDS,
};
use locus_common::{FieldMatchMode, MatchCriteria, MatchError, NodeId, Strategy, UiTree};
use tracing::{debug, trace};

/// Candidates found by one strategy, and how much the strategy trusts them.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyRun {
    pub candidates: Vec<NodeId>,
    pub confidence: f64,
}

impl StrategyRun {
    pub fn certain(candidates: Vec<NodeId>) -> Self {
        Self {
            candidates,
            confidence: 1.0,
        }
    }
}

#[async_trait]
pub trait StrategyRunner: Send {
    async fn run(
        &mut self,
        entry: &PlanEntry,
        criteria: &MatchCriteria,
        tree: &UiTree,
    ) -> Result<StrategyRun, MatchError>;
}

/// Re-express `criteria` in terms of `strategy`'s field preset.
///
/// Entries using the authored strategy get the criteria unchanged. Xpath
/// strategies without an authored expression get one built from the values.
pub fn project(criteria: &MatchCriteria, strategy: Strategy) -> Result<MatchCriteria, MatchError> {
    if strategy == criteria.strategy || strategy == Strategy::Custom {
        return Ok(criteria.clone());
    }

    if strategy.is_xpath() {
        let expr = match criteria.value(FIELD_XPATH) {
            Some(expr) => expr.to_string(),
            None => xpath::values_xpath(
                &criteria.values,
                &[FIELD_RESOURCE_ID, FIELD_TEXT, FIELD_CONTENT_DESC],
            )
            .ok_or_else(|| {
                MatchError::InvalidCriteria(format!("no values to build an xpath for '{}'", strategy))
            })?,
        };
        let expr = if strategy == Strategy::XpathFirstIndex && !expr.starts_with('(') {
            xpath::first_match(&expr)
        } else {
            expr
        };
        let mut projected = MatchCriteria::new(strategy);
        projected.fields.push(FIELD_XPATH.to_string());
        projected.values.insert(FIELD_XPATH.to_string(), expr);
        return Ok(projected);
    }

    let preset = normalizer::preset_fields(strategy);
    let mut raw = RawCriteria::from(criteria.clone());
    raw.strategy = Some(strategy);
    raw.fields.retain(|f| preset.contains(&f.as_str()));
    let projected = normalizer::normalize(raw);
    if projected.fields.is_empty() {
        return Err(MatchError::InvalidCriteria(format!(
            "criteria carry none of the fields '{}' uses",
            strategy
        )));
    }
    Ok(projected)
}

fn without_positional(criteria: &MatchCriteria) -> MatchCriteria {
    let mut raw = RawCriteria::from(criteria.clone());
    raw.fields.retain(|f| !POSITIONAL_FIELDS.contains(&f.as_str()));
    normalizer::normalize(raw)
}

/// Exact values become case-insensitive substring patterns.
fn case_insensitive(criteria: &MatchCriteria) -> MatchCriteria {
    let mut relaxed = criteria.clone();
    for field in &criteria.fields {
        if field == FIELD_XPATH || criteria.mode_for(field) != FieldMatchMode::Equals {
            continue;
        }
        if criteria.regex_includes.contains_key(field) {
            continue;
        }
        if let Some(value) = criteria.value(field) {
            relaxed
                .values
                .insert(field.clone(), format!("(?i){}", regex::escape(value)));
            relaxed.match_mode.insert(field.clone(), FieldMatchMode::Regex);
        }
    }
    relaxed
}

fn push_unique(out: &mut Vec<NodeId>, id: NodeId) {
    if !out.contains(&id) {
        out.push(id);
    }
}

/// Evaluates strategies against the snapshot, optionally confirming on a
/// device.
pub struct LocalStrategyRunner {
    hidden: HiddenParentConfig,
    backend: Option<Box<dyn DeviceBackend>>,
}

impl Default for LocalStrategyRunner {
    fn default() -> Self {
        Self::new(HiddenParentConfig::default())
    }
}

impl LocalStrategyRunner {
    pub fn new(hidden: HiddenParentConfig) -> Self {
        Self {
            hidden,
            backend: None,
        }
    }

    pub fn with_backend(mut self, backend: Box<dyn DeviceBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Snapshot-only evaluation of one strategy.
    pub fn evaluate(
        &self,
        strategy: Strategy,
        criteria: &MatchCriteria,
        tree: &UiTree,
    ) -> Result<StrategyRun, MatchError> {
        let run = match strategy {
            Strategy::Standard | Strategy::Positionless => {
                StrategyRun::certain(find_candidates(tree, &without_positional(criteria))?)
            }
            Strategy::Relaxed => StrategyRun::certain(find_candidates(tree, &case_insensitive(criteria))?),
            Strategy::ParentClickable => {
                let mut out = Vec::new();
                for id in find_candidates(tree, criteria)? {
                    let clickable = if tree.node(id).is_clickable() {
                        Some(id)
                    } else {
                        tree.ancestors(id).find(|a| tree.node(*a).is_clickable())
                    };
                    if let Some(target) = clickable {
                        push_unique(&mut out, target);
                    }
                }
                StrategyRun::certain(out)
            }
            Strategy::HiddenElementParent => self.escalate_hidden(criteria, tree)?,
            Strategy::XpathFirstIndex => {
                let mut found = find_candidates(tree, criteria)?;
                found.truncate(1);
                StrategyRun::certain(found)
            }
            _ => StrategyRun::certain(find_candidates(tree, criteria)?),
        };
        trace!(%strategy, candidates = run.candidates.len(), "Evaluated strategy");
        Ok(run)
    }

    fn escalate_hidden(&self, criteria: &MatchCriteria, tree: &UiTree) -> Result<StrategyRun, MatchError> {
        let target = criteria
            .value(FIELD_TEXT)
            .or_else(|| criteria.value(FIELD_CONTENT_DESC))
            .unwrap_or("");
        let nodes: Vec<NodeId> = tree.elements().collect();
        let mut out = Vec::new();
        let mut confidence: f64 = 1.0;

        for id in find_candidates(tree, criteria)? {
            if !hidden_parent::detect(tree.node(id)) {
                push_unique(&mut out, id);
                continue;
            }
            if let Some(found) =
                hidden_parent::find_clickable_parent(tree, id, &nodes, target, &self.hidden)
            {
                push_unique(&mut out, found.node);
                confidence = confidence.min(found.confidence);
            }
        }
        Ok(StrategyRun {
            candidates: out,
            confidence,
        })
    }
}

#[async_trait]
impl StrategyRunner for LocalStrategyRunner {
    async fn run(
        &mut self,
        entry: &PlanEntry,
        criteria: &MatchCriteria,
        tree: &UiTree,
    ) -> Result<StrategyRun, MatchError> {
        let projected = project(criteria, entry.strategy)?;
        let run = self.evaluate(entry.strategy, &projected, tree)?;
        if run.candidates.is_empty() {
            return Err(MatchError::no_match(format!("'{}' matched nothing", entry.id)));
        }

        if let Some(backend) = self.backend.as_mut() {
            let resp = backend.confirm(&projected).await.map_err(|e| match e {
                BackendError::Timeout => MatchError::TimeBudgetExceeded {
                    strategy: entry.strategy,
                    budget_ms: entry.time_budget_ms,
                },
                other => MatchError::no_match(format!("device: {}", other)),
            })?;
            if let Some(err) = map_device_response(&resp, entry.strategy, entry.time_budget_ms) {
                return Err(err);
            }
            debug!(entry = %entry.id, total = ?resp.total, "Device confirmed criteria");
        }
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_common::ErrorKind;

    fn feed() -> (UiTree, NodeId, NodeId, NodeId) {
        let mut b = UiTree::builder("hierarchy");
        let card = b.node(
            b.root(),
            &[
                ("class", "android.widget.LinearLayout"),
                ("clickable", "true"),
                ("bounds", "[0,200][1080,400]"),
            ],
        );
        let title = b.node(
            card,
            &[
                ("class", "android.widget.TextView"),
                ("text", "Follow"),
                ("resource-id", "com.demo:id/title"),
                ("bounds", "[40,220][400,280]"),
            ],
        );
        let label = b.node(
            card,
            &[
                ("class", "android.widget.TextView"),
                ("text", "Follow"),
                ("clickable", "true"),
                ("bounds", "[500,220][700,280]"),
            ],
        );
        (b.build(), card, title, label)
    }

    fn text_criteria(strategy: Strategy, text: &str) -> MatchCriteria {
        let mut c = MatchCriteria::new(strategy);
        c.fields.push(FIELD_TEXT.into());
        c.values.insert(FIELD_TEXT.into(), text.into());
        c
    }

    #[test]
    fn test_relaxed_ignores_case() {
        let (tree, _, title, label) = feed();
        let runner = LocalStrategyRunner::default();
        let c = text_criteria(Strategy::Relaxed, "follow");
        let run = runner.evaluate(Strategy::Relaxed, &c, &tree).unwrap();
        assert_eq!(run.candidates, vec![title, label]);

        let strict = runner.evaluate(Strategy::SelfAnchor, &c, &tree).unwrap();
        assert!(strict.candidates.is_empty());
    }

    #[test]
    fn test_parent_clickable_escalates() {
        let (tree, card, _, label) = feed();
        let runner = LocalStrategyRunner::default();
        let c = text_criteria(Strategy::ParentClickable, "Follow");
        let run = runner.evaluate(Strategy::ParentClickable, &c, &tree).unwrap();
        assert_eq!(run.candidates, vec![card, label]);
    }

    #[test]
    fn test_standard_ignores_positional_fields() {
        let (tree, _, title, _) = feed();
        let runner = LocalStrategyRunner::default();
        let mut c = text_criteria(Strategy::Standard, "Follow");
        c.fields.push("resource-id".into());
        c.values.insert("resource-id".into(), "com.demo:id/title".into());
        c.fields.push("bounds".into());
        c.values.insert("bounds".into(), "[1,1][2,2]".into());
        let run = runner.evaluate(Strategy::Standard, &c, &tree).unwrap();
        assert_eq!(run.candidates, vec![title]);
    }

    #[test]
    fn test_projection() {
        let mut c = text_criteria(Strategy::Absolute, "Follow");
        c.fields.push("bounds".into());
        c.values.insert("bounds".into(), "[40,220][400,280]".into());

        let anchored = project(&c, Strategy::SelfAnchor).unwrap();
        assert_eq!(anchored.strategy, Strategy::SelfAnchor);
        assert_eq!(anchored.fields, vec!["text".to_string()]);
        assert!(!anchored.values.contains_key("bounds"));

        let xp = project(&c, Strategy::XpathFirstIndex).unwrap();
        assert_eq!(xp.value("xpath"), Some("(//node[@text='Follow'])[1]"));

        let err = project(&c, Strategy::NeighborRelative).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCriteria);
    }

    #[test]
    fn test_hidden_parent_lowers_confidence() {
        let mut b = UiTree::builder("hierarchy");
        let row = b.node(
            b.root(),
            &[("index", "0"), ("class", "android.widget.LinearLayout"), ("bounds", "[0,300][1080,420]")],
        );
        b.node(row, &[("index", "0"), ("text", "设置"), ("bounds", "[0,0][0,0]")]);
        let tree = b.build();

        let runner = LocalStrategyRunner::default();
        let c = text_criteria(Strategy::HiddenElementParent, "设置");
        let run = runner.evaluate(Strategy::HiddenElementParent, &c, &tree).unwrap();
        assert_eq!(run.candidates, vec![row]);
        assert!(run.confidence < 0.7);
    }

    #[tokio::test]
    async fn test_run_reports_empty_as_no_match() {
        let (tree, _, _, _) = feed();
        let mut runner = LocalStrategyRunner::default();
        let entry = PlanEntry::new("self_id", Strategy::SelfAnchor, 100, 1);
        let err = runner
            .run(&entry, &text_criteria(Strategy::SelfAnchor, "Unfollow"), &tree)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoMatch);
    }
}
