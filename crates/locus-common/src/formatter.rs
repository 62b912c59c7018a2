use crate::error::{AttemptOutcome, MatchError, StrategyAttempt};
use crate::error_mapping::hint_for_kind;
use crate::protocol::{FIELD_CONTENT_DESC, FIELD_RESOURCE_ID, FIELD_TEXT, MatchCriteria};
use crate::tree::{NodeId, UiTree};

/// Longest text shown inline before it is cut with an ellipsis.
const MAX_INLINE_TEXT: usize = 40;

/// One-line description of a node, e.g.
/// `[12] Button "关注" #btn_follow @ [864,2240][1080,2358] {clickable}`.
pub fn format_node(tree: &UiTree, id: NodeId) -> String {
    let node = tree.node(id);
    let mut output = format!("[{}] {}", id.0, node.short_class());

    let label = node
        .non_empty("text")
        .or_else(|| node.non_empty("content-desc"));
    if let Some(label) = label {
        output.push_str(&format!(" {:?}", truncate(label, MAX_INLINE_TEXT)));
    }

    if let Some(rid) = node.non_empty("resource-id") {
        let short = rid.rsplit('/').next().unwrap_or(rid);
        output.push_str(&format!(" #{}", short));
    }

    match node.bounds_str() {
        Some(b) if node.is_hidden() => output.push_str(&format!(" @ {} (hidden)", b)),
        Some(b) => output.push_str(&format!(" @ {}", b)),
        None => {}
    }

    let mut flags = Vec::new();
    if node.is_clickable() {
        flags.push("clickable");
    }
    if node.is_selected() {
        flags.push("selected");
    }
    if node.is_scrollable() {
        flags.push("scrollable");
    }
    if !flags.is_empty() {
        output.push_str(&format!(" {{{}}}", flags.join(", ")));
    }

    output
}

/// One line per attempt, in the order they ran.
pub fn format_attempts(attempts: &[StrategyAttempt]) -> String {
    let mut output = String::new();
    for (i, attempt) in attempts.iter().enumerate() {
        let retry = if attempt.semantic_retry { " (semantic retry)" } else { "" };
        let line = match &attempt.outcome {
            AttemptOutcome::Succeeded {
                candidates,
                confidence,
            } => format!(
                "{}. {} [{}]{} ok: {} candidate(s), confidence {:.2}, {}ms",
                i + 1,
                attempt.entry_id,
                attempt.strategy,
                retry,
                candidates,
                confidence,
                attempt.elapsed_ms
            ),
            AttemptOutcome::Failed { kind, reason } => format!(
                "{}. {} [{}]{} {}: {}, {}ms",
                i + 1,
                attempt.entry_id,
                attempt.strategy,
                retry,
                kind,
                reason,
                attempt.elapsed_ms
            ),
        };
        output.push_str(&line);
        output.push('\n');
    }
    output
}

/// Error message, recovery hint, and the attempt log when one was recorded.
pub fn format_error(err: &MatchError) -> String {
    let kind = err.kind();
    let mut output = format!("Error [{}]: {}\nHint: {}\n", kind.code(), err, hint_for_kind(kind));
    let attempts = err.attempts();
    if !attempts.is_empty() {
        output.push_str("Attempts:\n");
        output.push_str(&format_attempts(attempts));
    }
    output
}

/// Suggestions for making `criteria` more robust.
///
/// `generated_id` is the caller's verdict on whether the criteria's
/// resource-id looks auto-generated.
pub fn remedy_hints(criteria: &MatchCriteria, generated_id: bool) -> Vec<String> {
    let mut hints = Vec::new();
    let has_text = criteria.value(FIELD_TEXT).is_some();
    let has_desc = criteria.value(FIELD_CONTENT_DESC).is_some();

    if generated_id && criteria.has_field(FIELD_RESOURCE_ID) {
        if has_text || has_desc {
            hints.push("resource-id looks auto-generated, consider dropping it".to_string());
        } else {
            hints.push("resource-id looks auto-generated, consider adding text".to_string());
        }
    }
    if criteria.has_field("bounds") || criteria.has_field("index") {
        hints.push("bounds/index break on layout changes, prefer a positionless strategy".to_string());
    }
    if let Some(text) = criteria.value(FIELD_TEXT)
        && text.chars().count() > 50
    {
        hints.push("text is long and likely dynamic, match a keyword instead".to_string());
    }
    if criteria.fields.len() == 1 && criteria.has_field("class") {
        hints.push("class alone rarely identifies one element, add text or content-desc".to_string());
    }
    hints
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::protocol::Strategy;

    #[test]
    fn test_format_node_line() {
        let mut b = UiTree::builder("hierarchy");
        let id = b.node(
            b.root(),
            &[
                ("text", "关注"),
                ("resource-id", "com.demo:id/btn_follow"),
                ("class", "android.widget.Button"),
                ("clickable", "true"),
                ("bounds", "[864,2240][1080,2358]"),
            ],
        );
        let tree = b.build();
        assert_eq!(
            format_node(&tree, id),
            "[1] Button \"关注\" #btn_follow @ [864,2240][1080,2358] {clickable}"
        );
    }

    #[test]
    fn test_format_error_includes_hint_and_attempts() {
        let err = MatchError::NoMatch {
            message: "chain exhausted".into(),
            attempts: vec![StrategyAttempt {
                entry_id: "self_id".into(),
                strategy: Strategy::SelfAnchor,
                outcome: AttemptOutcome::Failed {
                    kind: ErrorKind::TimeBudgetExceeded,
                    reason: "budget 500ms".into(),
                },
                elapsed_ms: 500,
                semantic_retry: false,
            }],
        };
        let out = format_error(&err);
        assert!(out.starts_with("Error [NO_MATCH]"));
        assert!(out.contains("Hint:"));
        assert!(out.contains("1. self_id [self-anchor] TIME_BUDGET_EXCEEDED: budget 500ms, 500ms"));
    }

    #[test]
    fn test_remedy_hint_for_generated_id() {
        let mut criteria = MatchCriteria::new(Strategy::Standard);
        criteria.fields = vec!["resource-id".into(), "class".into()];
        criteria.values.insert("resource-id".into(), "com.x:id/a1".into());
        let hints = remedy_hints(&criteria, true);
        assert_eq!(hints[0], "resource-id looks auto-generated, consider adding text");
        assert!(remedy_hints(&criteria, false).is_empty());
    }

    #[test]
    fn test_truncate_keeps_char_boundaries() {
        assert_eq!(truncate("关注关注", 2), "关注…");
        assert_eq!(truncate("ok", 5), "ok");
    }
}
