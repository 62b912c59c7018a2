use locus_common::Strategy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    pub id: String,
    pub strategy: Strategy,
    #[serde(default)]
    pub description: String,
    pub time_budget_ms: u64,
    /// Lower runs first; equal priorities keep list order.
    pub priority: u32,
}

impl PlanEntry {
    pub fn new(id: &str, strategy: Strategy, time_budget_ms: u64, priority: u32) -> Self {
        Self {
            id: id.to_string(),
            strategy,
            description: String::new(),
            time_budget_ms,
            priority,
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("Fallback plan has no entries")]
    Empty,

    #[error("Plan with non-absolute strategy '{0}' needs at least one fallback entry")]
    NoRecoveryPath(Strategy),

    #[error("Duplicate plan entry id '{0}'")]
    DuplicateId(String),

    #[error("Plan entry '{0}' has a zero time budget")]
    ZeroBudget(String),
}

/// Strategies that address one exact node and so need no recovery path.
fn is_absolute(strategy: Strategy) -> bool {
    matches!(strategy, Strategy::Absolute | Strategy::XpathDirect)
}

/// Ordered strategy entries tried by the fallback executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackPlan {
    entries: Vec<PlanEntry>,
}

impl FallbackPlan {
    pub fn new(mut entries: Vec<PlanEntry>) -> Result<Self, PlanError> {
        if entries.is_empty() {
            return Err(PlanError::Empty);
        }
        let mut ids = HashSet::new();
        for entry in &entries {
            if !ids.insert(entry.id.as_str()) {
                return Err(PlanError::DuplicateId(entry.id.clone()));
            }
            if entry.time_budget_ms == 0 {
                return Err(PlanError::ZeroBudget(entry.id.clone()));
            }
        }
        if entries.len() < 2
            && let Some(e) = entries.iter().find(|e| !is_absolute(e.strategy))
        {
            return Err(PlanError::NoRecoveryPath(e.strategy));
        }
        // Stable: list order breaks priority ties.
        entries.sort_by_key(|e| e.priority);
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The general-purpose chain, from the most semantic description down to
    /// a positional path.
    pub fn standard(budget_ms: u64) -> Self {
        let entries = vec![
            PlanEntry::new("self_id", Strategy::SelfAnchor, budget_ms, 1)
                .describe("resource-id, text and description of the node itself"),
            PlanEntry::new("region_text_to_parent", Strategy::ParentClickable, budget_ms, 2)
                .describe("text match escalated to the nearest clickable container"),
            PlanEntry::new("region_local_index_with_check", Strategy::RegionScoped, budget_ms, 3)
                .describe("text and class inside the enclosing identified region"),
            PlanEntry::new("neighbor_relative", Strategy::NeighborRelative, budget_ms, 4)
                .describe("anchored on the text of an adjacent sibling"),
            PlanEntry::new("global_index_with_strong_checks", Strategy::IndexFallback, budget_ms, 5)
                .describe("class and sibling index"),
            PlanEntry::new("absolute_xpath", Strategy::XpathDirect, budget_ms, 6)
                .describe("direct XPath expression"),
        ];
        Self { entries }
    }

    /// `primary` first, then the standard chain without duplicating it.
    pub fn starting_with(primary: Strategy, budget_ms: u64) -> Self {
        let mut entries = vec![PlanEntry::new(primary.as_str(), primary, budget_ms, 0)
            .describe("authored strategy")];
        entries.extend(
            Self::standard(budget_ms)
                .entries
                .into_iter()
                .filter(|e| e.strategy != primary),
        );
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_non_absolute_entry_is_rejected() {
        let err = FallbackPlan::new(vec![PlanEntry::new("self_id", Strategy::SelfAnchor, 500, 1)]);
        assert_eq!(err, Err(PlanError::NoRecoveryPath(Strategy::SelfAnchor)));

        let ok = FallbackPlan::new(vec![PlanEntry::new("absolute_xpath", Strategy::XpathDirect, 500, 1)]);
        assert!(ok.is_ok());
        assert_eq!(FallbackPlan::new(vec![]), Err(PlanError::Empty));
    }

    #[test]
    fn test_priority_order_with_stable_ties() {
        let plan = FallbackPlan::new(vec![
            PlanEntry::new("c", Strategy::XpathDirect, 100, 2),
            PlanEntry::new("a", Strategy::SelfAnchor, 100, 1),
            PlanEntry::new("b", Strategy::Relaxed, 100, 1),
        ])
        .unwrap();
        let ids: Vec<&str> = plan.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_invalid_entries() {
        let dup = FallbackPlan::new(vec![
            PlanEntry::new("a", Strategy::SelfAnchor, 100, 1),
            PlanEntry::new("a", Strategy::XpathDirect, 100, 2),
        ]);
        assert_eq!(dup, Err(PlanError::DuplicateId("a".into())));

        let zero = FallbackPlan::new(vec![
            PlanEntry::new("a", Strategy::SelfAnchor, 0, 1),
            PlanEntry::new("b", Strategy::XpathDirect, 100, 2),
        ]);
        assert_eq!(zero, Err(PlanError::ZeroBudget("a".into())));
    }

    #[test]
    fn test_starting_with_skips_duplicate_strategy() {
        let plan = FallbackPlan::starting_with(Strategy::SelfAnchor, 300);
        assert_eq!(plan.entries()[0].strategy, Strategy::SelfAnchor);
        assert_eq!(plan.len(), 6);
        assert_eq!(
            plan.entries().iter().filter(|e| e.strategy == Strategy::SelfAnchor).count(),
            1
        );
        assert_eq!(FallbackPlan::standard(300).len(), 6);
    }
}
