//! Structural fingerprints for re-identifying an element across snapshots.

use crate::config::schema::FingerprintConfig;
use locus_common::{Bounds, MatchError, NodeId, UiTree};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::cmp::Ordering;
use tracing::debug;

/// Ancestor classes kept in the chain, counting the node itself.
const CLASS_CHAIN_LEN: usize = 5;

/// Scale applied to bounds distance before inversion.
const DISTANCE_SCALE: f64 = 5.0;

/// Scores closer than this are treated as a tie.
const TIE_EPSILON: f64 = 1e-9;

/// Bounds as fractions of the screen, so they survive resolution changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBounds {
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedBounds {
    pub fn from_bounds(b: &Bounds, screen: &Bounds) -> Option<Self> {
        if !b.is_valid() || !screen.is_valid() {
            return None;
        }
        let sw = screen.width() as f64;
        let sh = screen.height() as f64;
        let (cx, cy) = b.center();
        Some(Self {
            center_x: (cx - screen.left) as f64 / sw,
            center_y: (cy - screen.top) as f64 / sh,
            width: b.width() as f64 / sw,
            height: b.height() as f64 / sh,
        })
    }

    fn distance(&self, other: &Self) -> f64 {
        ((self.center_x - other.center_x).powi(2)
            + (self.center_y - other.center_y).powi(2)
            + (self.width - other.width).powi(2)
            + (self.height - other.height).powi(2))
        .sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementFingerprint {
    /// Hex SHA-1 of the text, empty when the element has no text.
    pub text_hash: String,
    pub text: String,
    /// The element's class followed by its ancestors' classes.
    pub class_chain: Vec<String>,
    pub resource_id_suffix: Option<String>,
    pub bounds: Option<NormalizedBounds>,
    pub parent_class: Option<String>,
    pub sibling_count: usize,
    pub child_count: usize,
    pub depth: usize,
    pub relative_index: usize,
    pub clickable: bool,
    pub enabled: bool,
    pub selected: bool,
}

pub fn text_hash(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Capture `id` as it looks now. `screen` defaults to the widest bounds in
/// the tree.
pub fn capture(tree: &UiTree, id: NodeId, screen: Option<Bounds>) -> ElementFingerprint {
    let node = tree.node(id);
    let screen = screen.or_else(|| tree.screen_bounds());

    let class_chain: Vec<String> = std::iter::once(id)
        .chain(tree.ancestors(id))
        .filter(|a| *a != tree.root())
        .take(CLASS_CHAIN_LEN)
        .map(|a| tree.node(a).class().to_string())
        .collect();

    let resource_id_suffix = node
        .non_empty("resource-id")
        .map(|rid| rid.rsplit('/').next().unwrap_or(rid).to_string());

    let bounds = match (node.bounds(), screen) {
        (Some(b), Some(s)) => NormalizedBounds::from_bounds(&b, &s),
        _ => None,
    };

    ElementFingerprint {
        text_hash: text_hash(node.text()),
        text: node.text().to_string(),
        class_chain,
        resource_id_suffix,
        bounds,
        parent_class: tree
            .parent(id)
            .and_then(|p| tree.node(p).non_empty("class"))
            .map(str::to_string),
        sibling_count: tree.siblings(id).len(),
        child_count: tree.children(id).len(),
        depth: tree.depth(id),
        relative_index: tree.child_position(id),
        clickable: node.is_clickable(),
        enabled: node.is_enabled(),
        selected: node.is_selected(),
    }
}

/// Per-feature weights; renormalized over the features that apply to a pair.
#[derive(Debug, Clone, Copy)]
struct FeatureWeights {
    text: f64,
    resource_id: f64,
    class_chain: f64,
    bounds: f64,
    structure: f64,
    flags: f64,
}

const WEIGHTS: FeatureWeights = FeatureWeights {
    text: 0.35,
    resource_id: 0.2,
    class_chain: 0.15,
    bounds: 0.15,
    structure: 0.1,
    flags: 0.05,
};

fn closeness(a: usize, b: usize) -> f64 {
    1.0 / (1.0 + a.abs_diff(b) as f64)
}

/// Similarity of a captured fingerprint to a fresh capture, in `[0,1]`.
pub fn similarity(original: &ElementFingerprint, candidate: &ElementFingerprint) -> f64 {
    let mut sum = 0.0;
    let mut weight = 0.0;
    let mut add = |w: f64, score: f64| {
        sum += w * score;
        weight += w;
    };

    if !original.text.is_empty() || !candidate.text.is_empty() {
        let score = if original.text_hash == candidate.text_hash {
            1.0
        } else {
            // Partial credit for edited text, capped below an exact match.
            strsim::normalized_levenshtein(&original.text, &candidate.text) * 0.8
        };
        add(WEIGHTS.text, score);
    }

    if original.resource_id_suffix.is_some() || candidate.resource_id_suffix.is_some() {
        let same = original.resource_id_suffix == candidate.resource_id_suffix;
        add(WEIGHTS.resource_id, if same { 1.0 } else { 0.0 });
    }

    let longest = original.class_chain.len().max(candidate.class_chain.len());
    if longest > 0 {
        let shared = original
            .class_chain
            .iter()
            .zip(&candidate.class_chain)
            .filter(|(a, b)| a == b)
            .count();
        add(WEIGHTS.class_chain, shared as f64 / longest as f64);
    }

    if let (Some(a), Some(b)) = (&original.bounds, &candidate.bounds) {
        add(WEIGHTS.bounds, 1.0 / (1.0 + DISTANCE_SCALE * a.distance(b)));
    }

    let structure = (closeness(original.sibling_count, candidate.sibling_count)
        + closeness(original.child_count, candidate.child_count)
        + closeness(original.depth, candidate.depth)
        + closeness(original.relative_index, candidate.relative_index))
        / 4.0;
    add(WEIGHTS.structure, structure);

    let flags = [
        original.clickable == candidate.clickable,
        original.enabled == candidate.enabled,
        original.selected == candidate.selected,
    ]
    .iter()
    .filter(|same| **same)
    .count() as f64
        / 3.0;
    add(WEIGHTS.flags, flags);

    if weight <= 0.0 {
        0.0
    } else {
        (sum / weight).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingerprintMatch {
    pub node: NodeId,
    pub similarity: f64,
}

#[derive(Debug, Clone)]
pub struct FingerprintMatcher {
    min_similarity: f64,
}

impl Default for FingerprintMatcher {
    fn default() -> Self {
        Self::from_config(&FingerprintConfig::default())
    }
}

impl FingerprintMatcher {
    pub fn new(min_similarity: f64) -> Self {
        Self { min_similarity }
    }

    pub fn from_config(config: &FingerprintConfig) -> Self {
        Self::new(config.min_similarity)
    }

    pub fn min_similarity(&self) -> f64 {
        self.min_similarity
    }

    /// Every candidate with its similarity, best first.
    pub fn rank(
        &self,
        original: &ElementFingerprint,
        tree: &UiTree,
        candidates: &[NodeId],
    ) -> Vec<FingerprintMatch> {
        let screen = tree.screen_bounds();
        let mut scored: Vec<FingerprintMatch> = candidates
            .iter()
            .map(|id| FingerprintMatch {
                node: *id,
                similarity: similarity(original, &capture(tree, *id, screen)),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then(tree.position(a.node).cmp(&tree.position(b.node)))
        });
        scored
    }

    /// The candidate most similar to `original`.
    ///
    /// Fails with `FingerprintMiss` when nothing reaches the minimum
    /// similarity, and with `MultiMatchAmbiguous` when several candidates tie
    /// for the best score.
    pub fn match_against(
        &self,
        original: &ElementFingerprint,
        tree: &UiTree,
        candidates: &[NodeId],
    ) -> Result<FingerprintMatch, MatchError> {
        let ranked = self.rank(original, tree, candidates);
        let Some(best) = ranked.first().copied() else {
            return Err(MatchError::FingerprintMiss {
                best_similarity: 0.0,
                threshold: self.min_similarity,
            });
        };

        debug!(
            node = best.node.0,
            similarity = best.similarity,
            candidates = candidates.len(),
            "Best fingerprint candidate"
        );

        if best.similarity < self.min_similarity {
            return Err(MatchError::FingerprintMiss {
                best_similarity: best.similarity,
                threshold: self.min_similarity,
            });
        }

        let tied: Vec<usize> = ranked
            .iter()
            .take_while(|m| (best.similarity - m.similarity).abs() < TIE_EPSILON)
            .map(|m| m.node.0)
            .collect();
        if tied.len() > 1 {
            return Err(MatchError::MultiMatchAmbiguous {
                count: tied.len(),
                candidates: tied,
            });
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(first_text: &str, shift: i32) -> (UiTree, Vec<NodeId>) {
        let mut b = UiTree::builder("hierarchy");
        let list = b.node(
            b.root(),
            &[("class", "androidx.recyclerview.widget.RecyclerView"), ("bounds", "[0,0][1080,2400]")],
        );
        let mut ids = Vec::new();
        for (i, text) in [first_text, "Bob", "Carol"].iter().enumerate() {
            let top = 200 + shift + i as i32 * 300;
            let bounds = format!("[0,{}][1080,{}]", top, top + 280);
            let rid = format!("com.demo:id/row_title_{}", i);
            ids.push(b.node(
                list,
                &[
                    ("text", *text),
                    ("resource-id", rid.as_str()),
                    ("class", "android.widget.TextView"),
                    ("clickable", "true"),
                    ("bounds", bounds.as_str()),
                ],
            ));
        }
        (b.build(), ids)
    }

    #[test]
    fn test_capture_normalizes_bounds() {
        let (tree, ids) = feed("Alice", 0);
        let fp = capture(&tree, ids[0], None);
        let b = fp.bounds.unwrap();
        assert!((b.center_x - 0.5).abs() < 1e-9);
        assert!((b.width - 1.0).abs() < 1e-9);
        assert_eq!(fp.class_chain.len(), 2);
        assert_eq!(fp.resource_id_suffix.as_deref(), Some("row_title_0"));
        assert_eq!(fp.text_hash, text_hash("Alice"));
        assert_eq!(fp.sibling_count, 2);
    }

    #[test]
    fn test_reidentifies_after_layout_shift() {
        let (before, ids) = feed("Alice", 0);
        let fp = capture(&before, ids[1], None);

        let (after, new_ids) = feed("Alice", 40);
        let found = FingerprintMatcher::default()
            .match_against(&fp, &after, &new_ids)
            .unwrap();
        assert_eq!(found.node, new_ids[1]);
        assert!(found.similarity > 0.85);
    }

    #[test]
    fn test_identical_capture_scores_one() {
        let (tree, ids) = feed("Alice", 0);
        let fp = capture(&tree, ids[2], None);
        assert!((similarity(&fp, &fp) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_miss_below_threshold() {
        let (tree, ids) = feed("Alice", 0);
        let fp = capture(&tree, ids[0], None);
        let matcher = FingerprintMatcher::new(0.99);
        let err = matcher.match_against(&fp, &tree, &ids[1..]).unwrap_err();
        assert!(matches!(err, MatchError::FingerprintMiss { threshold, .. } if threshold == 0.99));
        assert!(matches!(
            matcher.match_against(&fp, &tree, &[]),
            Err(MatchError::FingerprintMiss { .. })
        ));
    }

    #[test]
    fn test_exact_duplicates_are_ambiguous() {
        let mut b = UiTree::builder("hierarchy");
        let mut likes = Vec::new();
        for _ in 0..2 {
            let row = b.node(b.root(), &[("class", "android.widget.LinearLayout")]);
            likes.push(b.node(row, &[("text", "Like"), ("class", "android.widget.Button")]));
        }
        let tree = b.build();
        let (a, c) = (likes[0], likes[1]);
        // No bounds, so the two rows are indistinguishable.
        let fp = capture(&tree, a, None);
        let err = FingerprintMatcher::default()
            .match_against(&fp, &tree, &[a, c])
            .unwrap_err();
        assert_eq!(err.kind().code(), "MULTI_MATCH_AMBIGUOUS");
    }
}
