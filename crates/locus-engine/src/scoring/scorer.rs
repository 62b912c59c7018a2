use super::id_stability::{self, IdStability};
use super::optimizer::optimize_fields;
use super::{DetailedStrategyRecommendation, DetailedStrategyScore, ScoringMode, ScoringWeights};
use crate::config::schema::ScoringConfig;
use crate::matcher::{self, field_value};
use crate::normalizer::{self, RawCriteria};
use locus_common::protocol::{
    FIELD_CHILD_TEXT, FIELD_NEIGHBOR_TEXT, FIELD_REGION_RESOURCE_ID,
};
use locus_common::{MatchCriteria, NodeId, Strategy, UiTree};
use std::cmp::Ordering;
use tracing::debug;

/// Strategies considered for recommendation, in tie-break order.
const CANDIDATES: &[Strategy] = &[
    Strategy::SelfAnchor,
    Strategy::Strict,
    Strategy::Standard,
    Strategy::Positionless,
    Strategy::Relaxed,
    Strategy::HiddenElementParent,
    Strategy::ParentClickable,
    Strategy::ChildAnchor,
    Strategy::RegionScoped,
    Strategy::NeighborRelative,
    Strategy::XpathDirect,
    Strategy::XpathFirstIndex,
    Strategy::XpathAllElements,
    Strategy::Absolute,
    Strategy::IndexFallback,
];

/// Weight of the score total when picking the strategy to apply.
const TOTAL_SHARE: f64 = 0.6;
const CONFIDENCE_SHARE: f64 = 0.4;

/// Uniqueness assumed when the tree is not consulted.
const UNKNOWN_UNIQUENESS: f64 = 0.5;

/// What the scorer knows about the target before ranking.
struct NodeFacts {
    text: Option<String>,
    desc: Option<String>,
    rid: Option<IdStability>,
    clickable: bool,
    hidden: bool,
    valid_bounds: bool,
    long_text: bool,
    child_text: bool,
    clickable_ancestor: bool,
    region: bool,
    neighbor: bool,
}

impl NodeFacts {
    fn gather(tree: &UiTree, id: NodeId, max_text_len: usize, hierarchy_aware: bool) -> Self {
        let node = tree.node(id);
        let text = node.non_empty("text").map(str::to_string);
        let long_text = text
            .as_ref()
            .is_some_and(|t| t.chars().count() > max_text_len);
        let present = |f: &str| hierarchy_aware && field_value(tree, id, f).is_some_and(|v| !v.is_empty());
        Self {
            long_text,
            text,
            desc: node.non_empty("content-desc").map(str::to_string),
            rid: node.non_empty("resource-id").map(id_stability::assess),
            clickable: node.is_clickable(),
            hidden: node.is_hidden(),
            valid_bounds: node.bounds().is_some_and(|b| b.is_valid()),
            child_text: present(FIELD_CHILD_TEXT),
            clickable_ancestor: hierarchy_aware
                && tree.ancestors(id).any(|a| tree.node(a).is_clickable()),
            region: present(FIELD_REGION_RESOURCE_ID),
            neighbor: present(FIELD_NEIGHBOR_TEXT),
        }
    }

    fn trusted_rid(&self) -> bool {
        self.rid.as_ref().is_some_and(|r| r.should_trust())
    }

    fn semantic(&self) -> bool {
        self.rid.is_some() || self.text.is_some() || self.desc.is_some()
    }
}

/// Per-strategy scores before uniqueness is known.
struct Profile {
    performance: f64,
    stability: f64,
    compatibility: f64,
    confidence: f64,
    reason: String,
}

fn profile(strategy: Strategy, f: &NodeFacts) -> Option<Profile> {
    let rid_factor = match &f.rid {
        Some(r) => 0.6 + 0.4 * r.score,
        None => 0.9,
    };
    let text_penalty = if f.long_text { 0.15 } else { 0.0 };
    let semantic_confidence = 0.4
        + if f.trusted_rid() { 0.3 } else { 0.0 }
        + if f.text.is_some() { 0.2 } else { 0.0 }
        + if f.desc.is_some() { 0.1 } else { 0.0 };

    let p = |performance: f64, stability: f64, compatibility: f64, confidence: f64, reason: String| {
        Some(Profile {
            performance,
            stability: stability.clamp(0.0, 1.0),
            compatibility,
            confidence: confidence.clamp(0.0, 1.0),
            reason,
        })
    };

    match strategy {
        Strategy::SelfAnchor | Strategy::Strict | Strategy::Standard | Strategy::Positionless
            if f.semantic() && !f.hidden =>
        {
            let (perf, stab, compat) = match strategy {
                Strategy::SelfAnchor => (0.8, 0.85, 0.85),
                Strategy::Strict => (0.75, 0.8, 0.75),
                Strategy::Standard => (0.7, 0.75, 0.85),
                _ => (0.7, 0.72, 0.88),
            };
            let bonus = if strategy == Strategy::Strict && f.clickable { 0.05 } else { 0.0 };
            p(
                perf,
                stab * rid_factor - text_penalty,
                compat,
                semantic_confidence + bonus,
                semantic_reason(f),
            )
        }
        Strategy::Relaxed if f.semantic() && !f.hidden => p(
            0.6,
            0.6 * rid_factor - text_penalty,
            0.8,
            semantic_confidence * 0.85,
            "contains-match on semantic fields tolerates small text changes".to_string(),
        ),
        Strategy::HiddenElementParent if f.hidden && (f.text.is_some() || f.desc.is_some()) => p(
            0.4,
            0.65,
            0.7,
            0.85,
            "element has zero-area bounds; escalate to a visible clickable parent".to_string(),
        ),
        Strategy::ParentClickable if !f.clickable && f.clickable_ancestor && (f.text.is_some() || f.desc.is_some()) => p(
            0.5,
            0.7 - text_penalty,
            0.75,
            0.8,
            "element is not clickable itself but sits inside a clickable container".to_string(),
        ),
        Strategy::ChildAnchor if f.child_text => p(
            0.55,
            0.7,
            0.75,
            if f.text.is_some() { 0.5 } else { 0.75 },
            "anchored on the text of a child element".to_string(),
        ),
        Strategy::RegionScoped if f.region && f.text.is_some() => p(
            0.55,
            0.7 - text_penalty,
            0.7,
            0.7,
            "text scoped to an enclosing region with a resource-id".to_string(),
        ),
        Strategy::NeighborRelative if f.neighbor => p(
            0.45,
            0.55,
            0.6,
            0.6,
            "located relative to a sibling's text".to_string(),
        ),
        Strategy::XpathDirect | Strategy::XpathFirstIndex | Strategy::XpathAllElements => {
            let attributed = f.trusted_rid() || f.text.is_some() || f.desc.is_some();
            let (perf, stab, compat) = match strategy {
                Strategy::XpathDirect => (0.9, 0.35, 0.4),
                Strategy::XpathFirstIndex => (0.85, 0.45, 0.5),
                _ => (0.8, 0.5, 0.55),
            };
            let (stab, conf) = if attributed { (stab + 0.25, 0.7) } else { (stab - 0.15, 0.5) };
            p(
                perf,
                stab,
                compat,
                conf,
                if attributed {
                    "XPath over stable attributes".to_string()
                } else {
                    "XPath by structural position only".to_string()
                },
            )
        }
        Strategy::Absolute if f.valid_bounds && !f.hidden => p(
            0.95,
            0.15,
            0.1,
            0.9,
            "exact bounds and index; breaks on any layout or resolution change".to_string(),
        ),
        Strategy::IndexFallback => p(
            0.65,
            0.2,
            0.35,
            0.4,
            "class and sibling index; last resort when nothing semantic exists".to_string(),
        ),
        _ => None,
    }
}

fn semantic_reason(f: &NodeFacts) -> String {
    let mut parts = Vec::new();
    match &f.rid {
        Some(r) if r.should_trust() => parts.push("stable resource-id".to_string()),
        Some(r) => parts.push(format!("resource-id looks auto-generated ({})", r.reasons.join(", "))),
        None => {}
    }
    if f.text.is_some() {
        parts.push(if f.long_text {
            "long text that may change".to_string()
        } else {
            "semantic text".to_string()
        });
    }
    if f.desc.is_some() {
        parts.push("content-desc".to_string());
    }
    parts.join(", ")
}

fn fallback_recommendation() -> DetailedStrategyRecommendation {
    DetailedStrategyRecommendation {
        strategy: Strategy::SelfAnchor,
        score: DetailedStrategyScore {
            total: 0.2,
            performance: 0.5,
            stability: 0.2,
            compatibility: 0.2,
            uniqueness: 0.0,
            confidence: 0.1,
        },
        reason: "no strategy fits this element; low-confidence default".to_string(),
    }
}

/// Outcome of optimal-strategy selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimalChoice {
    pub strategy: Strategy,
    /// `total * 0.6 + confidence * 0.4` of the best recommendation.
    pub combined: f64,
    /// True when the best combined figure missed the quality floor.
    pub fell_back: bool,
}

#[derive(Debug, Clone)]
pub struct AppliedCriteria {
    pub criteria: MatchCriteria,
    pub recommendations: Vec<DetailedStrategyRecommendation>,
    pub choice: Option<OptimalChoice>,
}

#[derive(Debug, Clone)]
pub struct StrategyScorer {
    weights: ScoringWeights,
    max_text_len: usize,
    quality_floor: f64,
}

impl Default for StrategyScorer {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

impl StrategyScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self {
            weights,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self {
            weights: config.weights,
            max_text_len: config.max_text_len,
            quality_floor: config.quality_floor,
        }
    }

    /// Ranked strategies for `id`, using the whole tree for hierarchy-based
    /// strategies and a dry-run uniqueness count. Never empty.
    pub fn recommend(&self, tree: &UiTree, id: NodeId) -> Vec<DetailedStrategyRecommendation> {
        self.rank(tree, id, true)
    }

    /// Ranking from the node's own attributes only.
    pub fn recommend_isolated(&self, tree: &UiTree, id: NodeId) -> Vec<DetailedStrategyRecommendation> {
        self.rank(tree, id, false)
    }

    fn rank(&self, tree: &UiTree, id: NodeId, hierarchy_aware: bool) -> Vec<DetailedStrategyRecommendation> {
        let facts = NodeFacts::gather(tree, id, self.max_text_len, hierarchy_aware);

        let mut ranked: Vec<(usize, DetailedStrategyRecommendation)> = Vec::new();
        for (order, strategy) in CANDIDATES.iter().copied().enumerate() {
            let Some(prof) = profile(strategy, &facts) else {
                continue;
            };
            let (uniqueness, count) = if hierarchy_aware {
                match dry_run_count(tree, id, strategy) {
                    Some(0) | None => (0.0, 0),
                    Some(n) => (1.0 / n as f64, n),
                }
            } else {
                (UNKNOWN_UNIQUENESS, 0)
            };

            let total = self
                .weights
                .combine(prof.performance, prof.stability, prof.compatibility, uniqueness);
            let reason = if hierarchy_aware {
                format!("{}; matches {} element(s)", prof.reason, count)
            } else {
                prof.reason
            };

            ranked.push((
                order,
                DetailedStrategyRecommendation {
                    strategy,
                    score: DetailedStrategyScore {
                        total,
                        performance: prof.performance,
                        stability: prof.stability,
                        compatibility: prof.compatibility,
                        uniqueness,
                        confidence: prof.confidence,
                    },
                    reason,
                },
            ));
        }

        ranked.sort_by(|(oa, a), (ob, b)| {
            b.score
                .total
                .partial_cmp(&a.score.total)
                .unwrap_or(Ordering::Equal)
                .then(oa.cmp(ob))
        });

        let mut recommendations: Vec<_> = ranked.into_iter().map(|(_, r)| r).collect();
        if recommendations.is_empty() {
            recommendations.push(fallback_recommendation());
        }
        debug!(
            node = id.0,
            top = %recommendations[0].strategy,
            total = recommendations[0].score.total,
            "Ranked strategies"
        );
        recommendations
    }

    /// Best recommendation by `total*0.6 + confidence*0.4`, or `self-anchor`
    /// when that figure is below the quality floor.
    pub fn select_optimal(&self, recommendations: &[DetailedStrategyRecommendation]) -> OptimalChoice {
        let best = recommendations
            .iter()
            .map(|r| {
                (
                    r.strategy,
                    r.score.total * TOTAL_SHARE + r.score.confidence * CONFIDENCE_SHARE,
                )
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

        match best {
            Some((strategy, combined)) if combined >= self.quality_floor => OptimalChoice {
                strategy,
                combined,
                fell_back: false,
            },
            Some((_, combined)) => OptimalChoice {
                strategy: Strategy::SelfAnchor,
                combined,
                fell_back: true,
            },
            None => OptimalChoice {
                strategy: Strategy::SelfAnchor,
                combined: 0.0,
                fell_back: true,
            },
        }
    }

    /// Build criteria for `id`.
    ///
    /// In intelligent mode the optimal strategy is applied with its optimized
    /// field set. In static mode `explicit` is kept (standard when absent) with
    /// its full preset, and the recommendations are advisory.
    pub fn apply(
        &self,
        tree: &UiTree,
        id: NodeId,
        mode: ScoringMode,
        explicit: Option<Strategy>,
    ) -> AppliedCriteria {
        let recommendations = self.recommend(tree, id);
        match mode {
            ScoringMode::Intelligent => {
                let choice = self.select_optimal(&recommendations);
                let fields = optimize_fields(tree, id, choice.strategy, self.max_text_len);
                let criteria = if choice.strategy.is_xpath() {
                    normalizer::criteria_for_node(tree, id, choice.strategy)
                } else {
                    let mut raw = RawCriteria {
                        strategy: Some(choice.strategy),
                        ..RawCriteria::default()
                    };
                    for field in fields {
                        if let Some(v) = field_value(tree, id, &field) {
                            raw.values.insert(field.clone(), v);
                        }
                        raw.fields.push(field);
                    }
                    match normalizer::normalize(raw) {
                        c if c.fields.is_empty() => {
                            debug!(strategy = %choice.strategy, "No field carries a value, using a direct path");
                            normalizer::criteria_for_node(tree, id, Strategy::XpathDirect)
                        }
                        c => c,
                    }
                };
                debug!(strategy = %choice.strategy, fell_back = choice.fell_back, "Applied optimal strategy");
                AppliedCriteria {
                    criteria,
                    recommendations,
                    choice: Some(choice),
                }
            }
            ScoringMode::Static => {
                let strategy = explicit.unwrap_or(Strategy::Standard);
                AppliedCriteria {
                    criteria: normalizer::criteria_for_node(tree, id, strategy),
                    recommendations,
                    choice: None,
                }
            }
        }
    }
}

fn dry_run_count(tree: &UiTree, id: NodeId, strategy: Strategy) -> Option<usize> {
    let criteria = normalizer::criteria_for_node(tree, id, strategy);
    if criteria.fields.is_empty() {
        return None;
    }
    matcher::find_candidates(tree, &criteria).ok().map(|c| c.len())
}
