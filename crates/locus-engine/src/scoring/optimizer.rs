use super::id_stability;
use crate::matcher::field_value;
use crate::normalizer::preset_fields;
use locus_common::protocol::{FIELD_CLASS, FIELD_RESOURCE_ID, FIELD_TEXT, FIELD_XPATH};
use locus_common::{NodeId, Strategy, UiTree};

/// Narrow `strategy`'s preset to the fields worth keeping for this node.
///
/// `text` stays only when present and at most `max_text_len` characters,
/// `resource-id` only when it does not look auto-generated, and any other
/// field only when the node has a value for it. When that leaves nothing,
/// `class` is used if the node has one, then the first preset field the node
/// has any value for. Empty only when the node carries none of the preset's
/// fields.
pub fn optimize_fields(tree: &UiTree, id: NodeId, strategy: Strategy, max_text_len: usize) -> Vec<String> {
    if strategy.is_xpath() {
        return vec![FIELD_XPATH.to_string()];
    }

    let mut fields = Vec::new();
    for field in preset_fields(strategy) {
        let value = field_value(tree, id, field).filter(|v| !v.trim().is_empty());
        let keep = match (*field, value) {
            (_, None) => false,
            (FIELD_TEXT, Some(text)) => text.chars().count() <= max_text_len,
            (FIELD_RESOURCE_ID, Some(rid)) => id_stability::assess(&rid).should_trust(),
            (_, Some(_)) => true,
        };
        if keep {
            fields.push(field.to_string());
        }
    }

    if fields.is_empty() {
        let has_value = |f: &str| field_value(tree, id, f).is_some_and(|v| !v.trim().is_empty());
        let fallback = std::iter::once(FIELD_CLASS)
            .chain(preset_fields(strategy).iter().copied())
            .find(|f| has_value(f));
        fields.extend(fallback.map(str::to_string));
    }
    fields
}
