use super::batch::BatchConfig;
use super::dedupe::dedupe_by_center;
use crate::fingerprint::{ElementFingerprint, FingerprintMatcher};
use locus_common::{MatchError, NodeId, UiTree};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How a multi-candidate match becomes 0..N targets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SelectionMode {
    #[default]
    First,
    Last,
    Random {
        #[serde(default)]
        seed: Option<u64>,
    },
    All {
        #[serde(default)]
        batch: BatchConfig,
    },
    MatchOriginal {
        fingerprint: Box<ElementFingerprint>,
        #[serde(default)]
        fallback_to_first: bool,
    },
    /// Decided per resolution: one candidate acts as `first`, several as a
    /// batch-safe `all`.
    Auto {
        #[serde(default)]
        batch: BatchConfig,
    },
}

impl SelectionMode {
    pub fn name(&self) -> &'static str {
        match self {
            SelectionMode::First => "first",
            SelectionMode::Last => "last",
            SelectionMode::Random { .. } => "random",
            SelectionMode::All { .. } => "all",
            SelectionMode::MatchOriginal { .. } => "match-original",
            SelectionMode::Auto { .. } => "auto",
        }
    }
}

/// The terminal outcome of resolving a selection mode. `Auto` never appears
/// here; it always becomes one of the two.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Single {
        node: NodeId,
        /// 1.0 for positional picks, the similarity for fingerprint matches.
        confidence: f64,
        /// Fingerprint matching missed and `first` was used instead.
        degraded: bool,
    },
    Batch {
        nodes: Vec<NodeId>,
        batch: BatchConfig,
    },
}

impl Selection {
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            Selection::Single { node, .. } => vec![*node],
            Selection::Batch { nodes, .. } => nodes.clone(),
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Selection::Single { confidence, .. } => *confidence,
            Selection::Batch { .. } => 1.0,
        }
    }
}

/// Everything `resolve` needs besides the candidates, passed explicitly.
#[derive(Debug, Clone)]
pub struct SelectionContext {
    pub dedupe_tolerance_px: i32,
    pub matcher: FingerprintMatcher,
}

impl Default for SelectionContext {
    fn default() -> Self {
        Self {
            dedupe_tolerance_px: 10,
            matcher: FingerprintMatcher::default(),
        }
    }
}

fn single(node: NodeId) -> Selection {
    Selection::Single {
        node,
        confidence: 1.0,
        degraded: false,
    }
}

/// Turn a strategy's candidate list into targets.
///
/// Near-identical candidates are collapsed first. An empty list is always
/// `NoMatch`.
pub fn resolve(
    tree: &UiTree,
    candidates: &[NodeId],
    mode: &SelectionMode,
    ctx: &SelectionContext,
) -> Result<Selection, MatchError> {
    let unique = dedupe_by_center(tree, candidates, ctx.dedupe_tolerance_px);
    let (Some(first), Some(last)) = (unique.first().copied(), unique.last().copied()) else {
        return Err(MatchError::no_match("strategy produced no candidates"));
    };
    if unique.len() < candidates.len() {
        debug!(before = candidates.len(), after = unique.len(), "Collapsed overlapping candidates");
    }

    let selection = match mode {
        SelectionMode::First => single(first),
        SelectionMode::Last => single(last),
        SelectionMode::Random { seed } => {
            let mut rng = match seed {
                Some(s) => StdRng::seed_from_u64(*s),
                None => StdRng::from_entropy(),
            };
            single(unique[rng.gen_range(0..unique.len())])
        }
        SelectionMode::All { batch } => Selection::Batch {
            nodes: unique,
            batch: batch.clone(),
        },
        SelectionMode::Auto { batch } => {
            if unique.len() == 1 {
                single(first)
            } else {
                Selection::Batch {
                    nodes: unique,
                    batch: batch.batch_safe(),
                }
            }
        }
        SelectionMode::MatchOriginal {
            fingerprint,
            fallback_to_first,
        } => match ctx.matcher.match_against(fingerprint, tree, &unique) {
            Ok(found) => Selection::Single {
                node: found.node,
                confidence: found.similarity,
                degraded: false,
            },
            Err(MatchError::FingerprintMiss { best_similarity, .. }) if *fallback_to_first => {
                warn!(best_similarity, "Fingerprint miss, falling back to first candidate");
                Selection::Single {
                    node: first,
                    confidence: 1.0,
                    degraded: true,
                }
            }
            Err(e) => return Err(e),
        },
    };
    Ok(selection)
}
