//! Strategy scoring.
//!
//! Ranks the strategies that could describe a node, picks the one worth
//! applying, and trims its field preset to what is likely to stay stable.

pub mod id_stability;
pub mod optimizer;
pub mod scorer;
pub mod weights;

use locus_common::Strategy;
use serde::{Deserialize, Serialize};

pub use optimizer::optimize_fields;
pub use scorer::{AppliedCriteria, OptimalChoice, StrategyScorer};
pub use weights::ScoringWeights;

/// Whether scoring drives the criteria or only advises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Apply the optimal strategy and its optimized field set.
    #[default]
    Intelligent,
    /// Keep the caller's explicit strategy; scores are advisory.
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetailedStrategyScore {
    pub total: f64,
    pub performance: f64,
    pub stability: f64,
    pub compatibility: f64,
    pub uniqueness: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedStrategyRecommendation {
    pub strategy: Strategy,
    pub score: DetailedStrategyScore,
    pub reason: String,
}
