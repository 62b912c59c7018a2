use crate::protocol::Strategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NoMatch,
    MultiMatchAmbiguous,
    LowConfidence,
    FingerprintMiss,
    InvalidCriteria,
    TimeBudgetExceeded,
    Cancelled,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NoMatch => "NO_MATCH",
            ErrorKind::MultiMatchAmbiguous => "MULTI_MATCH_AMBIGUOUS",
            ErrorKind::LowConfidence => "LOW_CONFIDENCE",
            ErrorKind::FingerprintMiss => "FINGERPRINT_MISS",
            ErrorKind::InvalidCriteria => "INVALID_CRITERIA",
            ErrorKind::TimeBudgetExceeded => "TIME_BUDGET_EXCEEDED",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One strategy tried by the fallback chain and what happened to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyAttempt {
    pub entry_id: String,
    pub strategy: Strategy,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
    /// Set on attempts made during the narrowed semantic-field retry.
    #[serde(default)]
    pub semantic_retry: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded { candidates: usize, confidence: f64 },
    Failed { kind: ErrorKind, reason: String },
}

impl StrategyAttempt {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Succeeded { .. })
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            AttemptOutcome::Failed { kind, .. } => Some(*kind),
            AttemptOutcome::Succeeded { .. } => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("No element matched: {message}")]
    NoMatch {
        message: String,
        attempts: Vec<StrategyAttempt>,
    },

    #[error("Ambiguous target matches {count} elements equally well")]
    MultiMatchAmbiguous { count: usize, candidates: Vec<usize> },

    #[error("Best candidate confidence {confidence:.2} is below threshold {threshold:.2}")]
    LowConfidence { confidence: f64, threshold: f64 },

    #[error("No candidate resembles the original element (best similarity {best_similarity:.2}, need {threshold:.2})")]
    FingerprintMiss { best_similarity: f64, threshold: f64 },

    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error("Strategy '{strategy}' exceeded its {budget_ms}ms budget")]
    TimeBudgetExceeded { strategy: Strategy, budget_ms: u64 },

    #[error("Resolution cancelled")]
    Cancelled { attempts: Vec<StrategyAttempt> },
}

impl MatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchError::NoMatch { .. } => ErrorKind::NoMatch,
            MatchError::MultiMatchAmbiguous { .. } => ErrorKind::MultiMatchAmbiguous,
            MatchError::LowConfidence { .. } => ErrorKind::LowConfidence,
            MatchError::FingerprintMiss { .. } => ErrorKind::FingerprintMiss,
            MatchError::InvalidCriteria(_) => ErrorKind::InvalidCriteria,
            MatchError::TimeBudgetExceeded { .. } => ErrorKind::TimeBudgetExceeded,
            MatchError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Strategies attempted before the error surfaced, if any were recorded.
    pub fn attempts(&self) -> &[StrategyAttempt] {
        match self {
            MatchError::NoMatch { attempts, .. } | MatchError::Cancelled { attempts } => attempts,
            _ => &[],
        }
    }

    pub fn no_match(message: impl Into<String>) -> Self {
        MatchError::NoMatch {
            message: message.into(),
            attempts: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_codes() {
        assert_eq!(MatchError::no_match("x").kind().code(), "NO_MATCH");
        assert_eq!(
            MatchError::InvalidCriteria("empty".into()).kind().code(),
            "INVALID_CRITERIA"
        );
        let err = MatchError::TimeBudgetExceeded {
            strategy: Strategy::XpathDirect,
            budget_ms: 500,
        };
        assert_eq!(err.kind(), ErrorKind::TimeBudgetExceeded);
        assert_eq!(err.to_string(), "Strategy 'xpath-direct' exceeded its 500ms budget");
    }

    #[test]
    fn test_attempt_serialization() {
        let attempt = StrategyAttempt {
            entry_id: "self_id".into(),
            strategy: Strategy::SelfAnchor,
            outcome: AttemptOutcome::Failed {
                kind: ErrorKind::NoMatch,
                reason: "0 candidates".into(),
            },
            elapsed_ms: 3,
            semantic_retry: false,
        };
        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["kind"], "NO_MATCH");
        assert_eq!(json["entryId"], "self_id");
    }
}
