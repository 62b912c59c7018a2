//! Escalation from zero-area elements to a visible, clickable stand-in.
//!
//! Semantic labels inside larger tap targets are often dumped with bounds
//! `[0,0][0,0]`. The dump does not reliably expose the real parent in that
//! case, so candidates are found by proximity in document order and by text.

use locus_common::{NodeId, UiNode, UiTree};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiddenParentConfig {
    /// How many nodes before the hidden one are searched for a container.
    #[serde(default = "default_lookback_window")]
    pub lookback_window: usize,
    /// Class-name fragments that suggest a tappable element.
    #[serde(default = "default_clickable_indicators")]
    pub clickable_indicators: Vec<String>,
    /// Class-name fragments that rule a node out (scroll containers).
    #[serde(default = "default_exclude_indicators")]
    pub exclude_indicators: Vec<String>,
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f64,
}

impl Default for HiddenParentConfig {
    fn default() -> Self {
        Self {
            lookback_window: default_lookback_window(),
            clickable_indicators: default_clickable_indicators(),
            exclude_indicators: default_exclude_indicators(),
            high_confidence: default_high_confidence(),
        }
    }
}

fn default_lookback_window() -> usize {
    20
}

fn default_clickable_indicators() -> Vec<String> {
    ["Button", "ImageButton", "TextView", "LinearLayout", "RelativeLayout"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude_indicators() -> Vec<String> {
    ["ScrollView", "ListView", "RecyclerView"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_high_confidence() -> f64 {
    0.7
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    /// Found, but the caller decides whether to accept it.
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ParentMatch {
    pub node: NodeId,
    pub confidence: f64,
    pub level: ConfidenceLevel,
}

/// True iff the bounds attribute is exactly `[0,0][0,0]`.
pub fn detect(node: &UiNode) -> bool {
    node.is_hidden()
}

fn mentions(node: &UiNode, target: &str) -> bool {
    node.text().contains(target) || node.content_desc().contains(target)
}

fn looks_clickable(node: &UiNode, config: &HiddenParentConfig) -> bool {
    let class = node.class();
    if config.exclude_indicators.iter().any(|i| class.contains(i.as_str())) {
        return false;
    }
    match node.bounds_str() {
        None | Some("") => return false,
        Some(_) if node.is_hidden() => return false,
        Some(_) => {}
    }
    node.is_clickable()
        || config.clickable_indicators.iter().any(|i| class.contains(i.as_str()))
        || class.to_lowercase().contains("button")
}

/// The dumper's sibling index suggests `candidate` encloses `hidden`.
fn index_suggests_ancestor(candidate: &UiNode, hidden: &UiNode) -> bool {
    candidate.index_attr().unwrap_or(0) <= hidden.index_attr().unwrap_or(0)
}

fn confidence(candidate: &UiNode, target: &str, before_hidden: bool) -> f64 {
    let mut score = 0.0;
    if candidate.text().contains(target) {
        score += 0.4;
    }
    if candidate.content_desc().contains(target) {
        score += 0.3;
    }
    let clickable = candidate.is_clickable();
    if clickable {
        score += 0.2;
    }
    let class = candidate.class();
    if class.contains("Button") {
        score += 0.3;
    } else if class.contains("Text") && clickable {
        score += 0.2;
    } else if class.contains("Layout") && clickable {
        score += 0.1;
    }
    if before_hidden {
        score += 0.1;
    }
    f64::min(score, 1.0)
}

/// Find a visible clickable node that stands in for `hidden`.
///
/// `nodes` is the snapshot in document order. Returns `None` for a blank
/// `target_text`, when `hidden` does not itself mention it, or when no
/// candidate qualifies.
pub fn find_clickable_parent(
    tree: &UiTree,
    hidden: NodeId,
    nodes: &[NodeId],
    target_text: &str,
    config: &HiddenParentConfig,
) -> Option<ParentMatch> {
    if target_text.trim().is_empty() {
        debug!(node = hidden.0, "No target text to anchor a parent on");
        return None;
    }
    let hidden_node = tree.node(hidden);
    if !mentions(hidden_node, target_text) {
        debug!(node = hidden.0, "Hidden element does not mention target text");
        return None;
    }

    let mut candidates: Vec<NodeId> = Vec::new();
    let hidden_pos = nodes.iter().position(|id| *id == hidden);

    if let Some(pos) = hidden_pos {
        let start = pos.saturating_sub(config.lookback_window);
        for id in &nodes[start..pos] {
            let node = tree.node(*id);
            if looks_clickable(node, config) && index_suggests_ancestor(node, hidden_node) {
                candidates.push(*id);
            }
        }
    }

    let target_lower = target_text.to_lowercase();
    for id in nodes {
        if *id == hidden {
            continue;
        }
        let node = tree.node(*id);
        let related = mentions(node, target_text)
            || node.resource_id().to_lowercase().contains(&target_lower);
        if related && looks_clickable(node, config) {
            candidates.push(*id);
        }
    }

    // Same bounds, resource-id and text count as one element.
    let mut seen: HashSet<(Option<&str>, &str, &str)> = HashSet::new();
    candidates.retain(|id| {
        let n = tree.node(*id);
        seen.insert((n.bounds_str(), n.resource_id(), n.text()))
    });

    let position_of = |id: &NodeId| nodes.iter().position(|n| n == id);
    let mut scored: Vec<(NodeId, f64, usize)> = candidates
        .into_iter()
        .map(|id| {
            let pos = position_of(&id).unwrap_or(usize::MAX);
            let before = matches!(hidden_pos, Some(h) if pos < h);
            (id, confidence(tree.node(id), target_text, before), pos)
        })
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.2.cmp(&b.2))
    });

    let (node, confidence, _) = scored.first().copied()?;
    let level = if confidence >= config.high_confidence {
        ConfidenceLevel::High
    } else {
        ConfidenceLevel::Low
    };
    debug!(
        hidden = hidden.0,
        parent = node.0,
        confidence,
        candidates = scored.len(),
        "Escalated hidden element"
    );
    Some(ParentMatch {
        node,
        confidence,
        level,
    })
}

/// [`find_clickable_parent`] over the whole tree.
pub fn find_in_tree(
    tree: &UiTree,
    hidden: NodeId,
    target_text: &str,
    config: &HiddenParentConfig,
) -> Option<ParentMatch> {
    let nodes: Vec<NodeId> = tree.elements().collect();
    find_clickable_parent(tree, hidden, &nodes, target_text, config)
}
