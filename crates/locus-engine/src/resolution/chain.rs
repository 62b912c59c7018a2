//! Fallback chain execution.
//!
//! Each resolution walks the plan in priority order:
//! `Pending -> Trying(i) -> Succeeded | Trying(i+1) | Exhausted`. After a
//! first exhaustion the criteria may be narrowed to semantic fields and the
//! plan walked once more.

use super::plan::{FallbackPlan, PlanEntry};
use super::result::ChainOutcome;
use super::runner::StrategyRunner;
use crate::config::LocusConfig;
use crate::fingerprint::FingerprintMatcher;
use crate::normalizer::{self, RawCriteria};
use crate::selection::{self, Selection, SelectionContext, SelectionMode};
use locus_common::error::AttemptOutcome;
use locus_common::protocol::SEMANTIC_FIELDS;
use locus_common::{ErrorKind, MatchCriteria, MatchError, NodeId, StrategyAttempt, UiTree};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// When the narrowed semantic-field pass runs after the plan is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticRetryPolicy {
    Never,
    /// Only when no attempt failed on ambiguity or low confidence.
    OnNoMatch,
    #[default]
    OnAnyFailure,
}

enum Walk {
    Found {
        selection: Selection,
        entry: usize,
        confidence: f64,
    },
    Exhausted,
    Cancelled,
}

pub struct FallbackExecutor<R: StrategyRunner> {
    runner: R,
    selection: SelectionContext,
    min_confidence: f64,
    semantic_retry: SemanticRetryPolicy,
}

impl<R: StrategyRunner> FallbackExecutor<R> {
    pub fn new(runner: R) -> Self {
        Self::from_config(runner, &LocusConfig::default())
    }

    pub fn from_config(runner: R, config: &LocusConfig) -> Self {
        Self {
            runner,
            selection: SelectionContext {
                dedupe_tolerance_px: config.selection.dedupe_tolerance_px,
                matcher: FingerprintMatcher::from_config(&config.fingerprint),
            },
            min_confidence: config.fallback.min_confidence,
            semantic_retry: config.fallback.semantic_retry,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_semantic_retry(mut self, policy: SemanticRetryPolicy) -> Self {
        self.semantic_retry = policy;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Resolve `criteria` against `tree` by walking `plan`.
    ///
    /// Criteria with no usable field are rejected up front. On exhaustion the
    /// error is `NoMatch` carrying every attempt with its failure reason.
    pub async fn execute(
        &mut self,
        plan: &FallbackPlan,
        criteria: &MatchCriteria,
        tree: &UiTree,
        mode: &SelectionMode,
        cancel: &CancellationToken,
    ) -> Result<ChainOutcome, MatchError> {
        normalizer::validate(criteria)?;
        let mut attempts = Vec::new();

        info!(strategy = %criteria.strategy, entries = plan.len(), mode = mode.name(), "Resolving criteria");

        let mut semantic_retry = false;
        let mut walk = self.walk(plan, criteria, tree, mode, cancel, false, &mut attempts).await;

        if matches!(walk, Walk::Exhausted)
            && self.should_retry(&attempts)
            && let Some(narrowed) = narrow_to_semantic(criteria)
        {
            info!(fields = ?narrowed.fields, "Retrying with semantic fields only");
            semantic_retry = true;
            walk = self.walk(plan, &narrowed, tree, mode, cancel, true, &mut attempts).await;
        }

        match walk {
            Walk::Found {
                selection,
                entry,
                confidence,
            } => {
                let entry = &plan.entries()[entry];
                info!(entry = %entry.id, confidence, attempts = attempts.len(), "Resolved");
                Ok(ChainOutcome {
                    selection,
                    entry_id: entry.id.clone(),
                    strategy: entry.strategy,
                    confidence,
                    attempts,
                    semantic_retry,
                })
            }
            Walk::Cancelled => {
                info!(attempts = attempts.len(), "Resolution cancelled");
                Err(MatchError::Cancelled { attempts })
            }
            Walk::Exhausted => {
                warn!(attempts = attempts.len(), "All strategies failed");
                Err(MatchError::NoMatch {
                    message: format!("all {} attempts failed", attempts.len()),
                    attempts,
                })
            }
        }
    }

    fn should_retry(&self, attempts: &[StrategyAttempt]) -> bool {
        match self.semantic_retry {
            SemanticRetryPolicy::Never => false,
            SemanticRetryPolicy::OnAnyFailure => true,
            SemanticRetryPolicy::OnNoMatch => attempts.iter().all(|a| {
                !matches!(
                    a.failure_kind(),
                    Some(ErrorKind::MultiMatchAmbiguous | ErrorKind::LowConfidence)
                )
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn walk(
        &mut self,
        plan: &FallbackPlan,
        criteria: &MatchCriteria,
        tree: &UiTree,
        mode: &SelectionMode,
        cancel: &CancellationToken,
        retry: bool,
        attempts: &mut Vec<StrategyAttempt>,
    ) -> Walk {
        for (index, entry) in plan.entries().iter().enumerate() {
            if cancel.is_cancelled() {
                return Walk::Cancelled;
            }
            debug!(entry = %entry.id, strategy = %entry.strategy, retry, "Trying strategy");

            let started = Instant::now();
            let budget = Duration::from_millis(entry.time_budget_ms);
            let run = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Walk::Cancelled,
                run = tokio::time::timeout(budget, self.runner.run(entry, criteria, tree)) => run,
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;
            if cancel.is_cancelled() {
                return Walk::Cancelled;
            }

            let result = match run {
                Err(_) => Err(MatchError::TimeBudgetExceeded {
                    strategy: entry.strategy,
                    budget_ms: entry.time_budget_ms,
                }),
                Ok(Err(e)) => Err(e),
                Ok(Ok(run)) => self.accept(tree, &run.candidates, run.confidence, mode),
            };

            match result {
                Ok((selection, confidence)) => {
                    attempts.push(attempt(
                        entry,
                        AttemptOutcome::Succeeded {
                            candidates: selection.nodes().len(),
                            confidence,
                        },
                        elapsed_ms,
                        retry,
                    ));
                    return Walk::Found {
                        selection,
                        entry: index,
                        confidence,
                    };
                }
                Err(e) => {
                    debug!(entry = %entry.id, kind = %e.kind(), "Strategy failed: {}", e);
                    attempts.push(attempt(
                        entry,
                        AttemptOutcome::Failed {
                            kind: e.kind(),
                            reason: e.to_string(),
                        },
                        elapsed_ms,
                        retry,
                    ));
                }
            }
        }
        Walk::Exhausted
    }

    /// Selection mode, then the confidence gate.
    fn accept(
        &self,
        tree: &UiTree,
        candidates: &[NodeId],
        run_confidence: f64,
        mode: &SelectionMode,
    ) -> Result<(Selection, f64), MatchError> {
        let selection = selection::resolve(tree, candidates, mode, &self.selection)?;
        let confidence = run_confidence.min(selection.confidence());
        if confidence < self.min_confidence {
            return Err(MatchError::LowConfidence {
                confidence,
                threshold: self.min_confidence,
            });
        }
        Ok((selection, confidence))
    }
}

fn attempt(entry: &PlanEntry, outcome: AttemptOutcome, elapsed_ms: u64, retry: bool) -> StrategyAttempt {
    StrategyAttempt {
        entry_id: entry.id.clone(),
        strategy: entry.strategy,
        outcome,
        elapsed_ms,
        semantic_retry: retry,
    }
}

/// Criteria restricted to semantic fields, or `None` when that changes
/// nothing or leaves nothing.
pub fn narrow_to_semantic(criteria: &MatchCriteria) -> Option<MatchCriteria> {
    let mut raw = RawCriteria::from(criteria.clone());
    raw.strategy = None;
    raw.fields.retain(|f| SEMANTIC_FIELDS.contains(&f.as_str()));
    if raw.fields.is_empty() || raw.fields.len() == criteria.fields.len() {
        return None;
    }
    Some(normalizer::normalize(raw))
}
