use crate::selection::Selection;
use locus_common::{NodeId, Strategy, StrategyAttempt};

/// Successful fallback chain resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome {
    pub selection: Selection,
    /// Plan entry that produced the selection.
    pub entry_id: String,
    pub strategy: Strategy,
    pub confidence: f64,
    /// Every attempt made, including the successful one, in order.
    pub attempts: Vec<StrategyAttempt>,
    /// Found during the narrowed semantic-field pass.
    pub semantic_retry: bool,
}

impl ChainOutcome {
    pub fn nodes(&self) -> Vec<NodeId> {
        self.selection.nodes()
    }

    /// Ids of the entries tried, in order.
    pub fn tried(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.entry_id.as_str()).collect()
    }
}
