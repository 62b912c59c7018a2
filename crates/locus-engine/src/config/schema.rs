use crate::hidden_parent::HiddenParentConfig;
use crate::resolution::chain::SemanticRetryPolicy;
use crate::scoring::{ScoringMode, ScoringWeights};
use crate::selection::BatchConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocusConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
    #[serde(default)]
    pub hidden_parent: HiddenParentConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: ScoringWeights,
    #[serde(default)]
    pub mode: ScoringMode,
    /// Texts longer than this are left out of optimized field sets.
    #[serde(default = "default_max_text_len")]
    pub max_text_len: usize,
    /// Combined `total*0.6 + confidence*0.4` below this falls back to self-anchor.
    #[serde(default = "default_quality_floor")]
    pub quality_floor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            mode: ScoringMode::default(),
            max_text_len: default_max_text_len(),
            quality_floor: default_quality_floor(),
        }
    }
}

fn default_max_text_len() -> usize {
    50
}

fn default_quality_floor() -> f64 {
    0.65
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintConfig {
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            min_similarity: default_min_similarity(),
        }
    }
}

fn default_min_similarity() -> f64 {
    0.7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Candidates whose bounds centres lie within this many pixels collapse into one.
    #[serde(default = "default_dedupe_tolerance_px")]
    pub dedupe_tolerance_px: i32,
    #[serde(default)]
    pub batch: BatchConfig,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            dedupe_tolerance_px: default_dedupe_tolerance_px(),
            batch: BatchConfig::default(),
        }
    }
}

fn default_dedupe_tolerance_px() -> i32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default = "default_time_budget_ms")]
    pub default_time_budget_ms: u64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default)]
    pub semantic_retry: SemanticRetryPolicy,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            default_time_budget_ms: default_time_budget_ms(),
            min_confidence: default_min_confidence(),
            semantic_retry: SemanticRetryPolicy::default(),
        }
    }
}

fn default_time_budget_ms() -> u64 {
    5000
}

fn default_min_confidence() -> f64 {
    0.5
}
