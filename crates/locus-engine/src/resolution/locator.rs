use crate::fingerprint::{self, ElementFingerprint, FingerprintMatcher};
use crate::matcher::find_candidates;
use crate::xpath;
use locus_common::{MatchCriteria, MatchError, NodeId, UiTree};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A prior resolution, kept so the same logical node can be re-selected
/// when a fresh snapshot arrives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    /// Verbatim bounds string of the resolved node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<ElementFingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<MatchCriteria>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelocatedBy {
    Xpath,
    Bounds,
    Fingerprint,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relocated {
    pub node: NodeId,
    pub by: RelocatedBy,
}

impl Locator {
    pub fn capture(tree: &UiTree, id: NodeId, criteria: Option<MatchCriteria>) -> Self {
        Self {
            xpath: Some(xpath::absolute_xpath(tree, id)),
            bounds: tree.node(id).bounds_str().map(str::to_string),
            fingerprint: Some(fingerprint::capture(tree, id, tree.screen_bounds())),
            criteria,
        }
    }

    /// Find the node this locator described in `tree`.
    ///
    /// Tries the absolute path (checked against the stored bounds when both
    /// exist), then a unique exact bounds match, then the fingerprint over
    /// the criteria's candidates or, without criteria, every element.
    pub fn relocate(&self, tree: &UiTree, matcher: &FingerprintMatcher) -> Result<Relocated, MatchError> {
        if let Some(expr) = &self.xpath
            && let Ok(found) = xpath::evaluate(tree, expr)
            && let [node] = found.as_slice()
        {
            let bounds_agree = match &self.bounds {
                Some(b) => tree.node(*node).bounds_str() == Some(b.as_str()),
                None => true,
            };
            if bounds_agree {
                return Ok(Relocated {
                    node: *node,
                    by: RelocatedBy::Xpath,
                });
            }
            debug!(xpath = %expr, "Absolute path resolves to a moved node");
        }

        if let Some(bounds) = &self.bounds {
            let same: Vec<NodeId> = tree
                .elements()
                .filter(|id| tree.node(*id).bounds_str() == Some(bounds.as_str()))
                .collect();
            if let [node] = same.as_slice() {
                return Ok(Relocated {
                    node: *node,
                    by: RelocatedBy::Bounds,
                });
            }
        }

        let Some(fp) = &self.fingerprint else {
            return Err(MatchError::no_match("locator no longer resolves"));
        };
        let candidates = match &self.criteria {
            Some(c) => match find_candidates(tree, c)? {
                found if found.is_empty() => tree.elements().collect(),
                found => found,
            },
            None => tree.elements().collect(),
        };
        let found = matcher.match_against(fp, tree, &candidates)?;
        Ok(Relocated {
            node: found.node,
            by: RelocatedBy::Fingerprint,
        })
    }
}
