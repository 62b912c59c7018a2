//! Criteria normalization.
//!
//! Every criteria value handed to matching or to the device layer passes
//! through [`normalize`]. Its output satisfies:
//!
//! - no field is selected without a value or a constraint
//! - every key in `values`, `includes`, `excludes`, `matchMode`,
//!   `regexIncludes`, `regexExcludes` names a selected field
//! - `normalize(normalize(x)) == normalize(x)`

use crate::matcher::{self, field_value};
use crate::xpath;
use locus_common::protocol::{
    FIELD_BOUNDS, FIELD_CHILD_TEXT, FIELD_CLASS, FIELD_CLICKABLE, FIELD_CONTENT_DESC, FIELD_INDEX,
    FIELD_NEIGHBOR_TEXT, FIELD_PACKAGE, FIELD_REGION_RESOURCE_ID, FIELD_RESOURCE_ID, FIELD_TEXT,
    FIELD_XPATH, TEXTUAL_FIELDS,
};
use locus_common::{FieldMatchMode, MatchCriteria, MatchError, NodeId, Strategy, UiTree};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Field presets per strategy, in the order fields are listed to users.
const PRESETS: &[(Strategy, &[&str])] = &[
    (
        Strategy::Absolute,
        &[
            FIELD_RESOURCE_ID,
            FIELD_TEXT,
            FIELD_CONTENT_DESC,
            FIELD_CLASS,
            FIELD_PACKAGE,
            FIELD_BOUNDS,
            FIELD_INDEX,
        ],
    ),
    (
        Strategy::Strict,
        &[
            FIELD_RESOURCE_ID,
            FIELD_TEXT,
            FIELD_CONTENT_DESC,
            FIELD_CLASS,
            FIELD_PACKAGE,
            FIELD_CLICKABLE,
        ],
    ),
    (
        Strategy::Standard,
        &[FIELD_RESOURCE_ID, FIELD_TEXT, FIELD_CONTENT_DESC, FIELD_CLASS, FIELD_PACKAGE],
    ),
    (
        Strategy::Positionless,
        &[FIELD_RESOURCE_ID, FIELD_TEXT, FIELD_CONTENT_DESC, FIELD_CLASS],
    ),
    (Strategy::Relaxed, &[FIELD_RESOURCE_ID, FIELD_TEXT, FIELD_CLASS]),
    (Strategy::SelfAnchor, &[FIELD_RESOURCE_ID, FIELD_TEXT, FIELD_CONTENT_DESC]),
    (Strategy::ParentClickable, &[FIELD_TEXT, FIELD_CONTENT_DESC]),
    (Strategy::ChildAnchor, &[FIELD_CLASS, FIELD_CHILD_TEXT]),
    (Strategy::RegionScoped, &[FIELD_REGION_RESOURCE_ID, FIELD_TEXT, FIELD_CLASS]),
    (Strategy::NeighborRelative, &[FIELD_NEIGHBOR_TEXT, FIELD_CLASS]),
    (Strategy::IndexFallback, &[FIELD_CLASS, FIELD_INDEX]),
    (Strategy::XpathDirect, &[FIELD_XPATH]),
    (Strategy::XpathFirstIndex, &[FIELD_XPATH]),
    (Strategy::XpathAllElements, &[FIELD_XPATH]),
    (Strategy::HiddenElementParent, &[FIELD_TEXT]),
];

/// Strategies that a bare field set can be recognised as. The xpath variants
/// share one field set, and hidden-element-parent is chosen from node state,
/// never from fields.
const INFERABLE: &[Strategy] = &[
    Strategy::Absolute,
    Strategy::Strict,
    Strategy::Standard,
    Strategy::Positionless,
    Strategy::Relaxed,
    Strategy::SelfAnchor,
    Strategy::ParentClickable,
    Strategy::ChildAnchor,
    Strategy::RegionScoped,
    Strategy::NeighborRelative,
    Strategy::IndexFallback,
    Strategy::XpathDirect,
];

/// Baseline fields for `strategy`. `custom` starts from the standard preset.
pub fn preset_fields(strategy: Strategy) -> &'static [&'static str] {
    let wanted = if strategy == Strategy::Custom {
        Strategy::Standard
    } else {
        strategy
    };
    PRESETS
        .iter()
        .find(|(s, _)| *s == wanted)
        .map(|(_, fields)| *fields)
        .unwrap_or(&[])
}

/// Map a field set to the preset with exactly those fields, ignoring order.
/// Anything else is `custom`.
pub fn infer_strategy_from_fields<S: AsRef<str>>(fields: &[S]) -> Strategy {
    let wanted: BTreeSet<&str> = fields.iter().map(|f| f.as_ref()).collect();
    if wanted.is_empty() {
        return Strategy::Custom;
    }
    INFERABLE
        .iter()
        .copied()
        .find(|s| preset_fields(*s).iter().copied().collect::<BTreeSet<_>>() == wanted)
        .unwrap_or(Strategy::Custom)
}

/// User intent before normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCriteria {
    /// Preset the caller chose, if any. Inferred from `fields` otherwise.
    #[serde(default)]
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    #[serde(default)]
    pub includes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub excludes: BTreeMap<String, Vec<String>>,
    #[serde(default, alias = "match_mode")]
    pub match_mode: BTreeMap<String, FieldMatchMode>,
    #[serde(default, alias = "regex_includes")]
    pub regex_includes: BTreeMap<String, Vec<String>>,
    #[serde(default, alias = "regex_excludes")]
    pub regex_excludes: BTreeMap<String, Vec<String>>,
    /// Textual fields that must match the whole value, not a substring.
    #[serde(default, alias = "keyword_only")]
    pub keyword_only: BTreeSet<String>,
}

impl From<MatchCriteria> for RawCriteria {
    fn from(c: MatchCriteria) -> Self {
        Self {
            strategy: Some(c.strategy),
            fields: c.fields,
            values: c.values,
            includes: c.includes,
            excludes: c.excludes,
            match_mode: c.match_mode,
            regex_includes: c.regex_includes,
            regex_excludes: c.regex_excludes,
            keyword_only: BTreeSet::new(),
        }
    }
}

/// Whole-value pattern stored in `regexIncludes` for a keyword-only field.
fn keyword_pattern(value: &str) -> String {
    format!("^{}$", regex::escape(value))
}

fn clean_lists(map: BTreeMap<String, Vec<String>>) -> BTreeMap<String, Vec<String>> {
    map.into_iter()
        .filter_map(|(k, v)| {
            let mut kept: Vec<String> = Vec::with_capacity(v.len());
            for item in v {
                if !item.trim().is_empty() && !kept.contains(&item) {
                    kept.push(item);
                }
            }
            (!kept.is_empty()).then_some((k, kept))
        })
        .collect()
}

pub fn normalize(raw: RawCriteria) -> MatchCriteria {
    let includes = clean_lists(raw.includes);
    let excludes = clean_lists(raw.excludes);
    let mut regex_includes = clean_lists(raw.regex_includes);
    let regex_excludes = clean_lists(raw.regex_excludes);
    let mut match_mode = raw.match_mode;
    let values = raw.values;

    let constrained = |f: &str| {
        includes.contains_key(f)
            || excludes.contains_key(f)
            || regex_includes.contains_key(f)
            || regex_excludes.contains_key(f)
    };

    let mut fields: Vec<String> = Vec::with_capacity(raw.fields.len());
    for field in raw.fields {
        let field = field.trim().to_string();
        if field.is_empty() || fields.contains(&field) {
            continue;
        }
        let has_value = values.get(&field).is_some_and(|v| !v.trim().is_empty());
        if !has_value && !constrained(&field) {
            debug!(field = %field, "Dropping field without value or constraint");
            continue;
        }
        fields.push(field);
    }

    for field in &raw.keyword_only {
        if !TEXTUAL_FIELDS.contains(&field.as_str()) || !fields.contains(field) {
            continue;
        }
        if let Some(v) = values.get(field).filter(|v| !v.trim().is_empty()) {
            let anchored = keyword_pattern(v);
            let list = regex_includes.entry(field.clone()).or_default();
            if !list.contains(&anchored) {
                list.push(anchored);
            }
            match_mode.insert(field.clone(), FieldMatchMode::Regex);
        }
    }

    let keep = |k: &String| fields.contains(k);
    let strategy = raw
        .strategy
        .unwrap_or_else(|| infer_strategy_from_fields(&fields));

    MatchCriteria {
        strategy,
        values: values
            .into_iter()
            .filter(|(k, v)| keep(k) && !v.trim().is_empty())
            .collect(),
        includes: includes.into_iter().filter(|(k, _)| keep(k)).collect(),
        excludes: excludes.into_iter().filter(|(k, _)| keep(k)).collect(),
        match_mode: match_mode
            .into_iter()
            .filter(|(k, m)| keep(k) && *m != FieldMatchMode::Equals)
            .collect(),
        regex_includes: regex_includes.into_iter().filter(|(k, _)| keep(k)).collect(),
        regex_excludes: regex_excludes.into_iter().filter(|(k, _)| keep(k)).collect(),
        fields,
    }
}

/// Re-run normalization on an existing criteria value.
pub fn renormalize(criteria: &MatchCriteria) -> MatchCriteria {
    normalize(RawCriteria::from(criteria.clone()))
}

/// Reject criteria that would silently match anything, or whose patterns
/// do not compile.
pub fn validate(criteria: &MatchCriteria) -> Result<(), MatchError> {
    if criteria.fields.is_empty() {
        return Err(MatchError::InvalidCriteria(
            "no field with a value or constraint remains".to_string(),
        ));
    }
    let tree = UiTree::builder("hierarchy").build();
    matcher::CompiledCriteria::compile(criteria, &tree)?;
    Ok(())
}

/// A user edit to existing criteria.
#[derive(Debug, Clone, PartialEq)]
pub enum CriteriaEdit {
    SetValue { field: String, value: String },
    SetIncludes { field: String, words: Vec<String> },
    SetExcludes { field: String, words: Vec<String> },
    SetMatchMode { field: String, mode: FieldMatchMode },
    ToggleField { field: String, enabled: bool },
}

/// Apply an edit and renormalize.
///
/// Changing a value or an include/exclude list turns the criteria into
/// `custom`; a preset is only a starting point. Toggling fields re-infers the
/// preset unless the criteria is already custom.
pub fn edit(criteria: &MatchCriteria, change: CriteriaEdit) -> MatchCriteria {
    let mut raw = RawCriteria::from(criteria.clone());
    let ensure_field = |raw: &mut RawCriteria, field: &str| {
        if !raw.fields.iter().any(|f| f == field) {
            raw.fields.push(field.to_string());
        }
    };

    match change {
        CriteriaEdit::SetValue { field, value } => {
            ensure_field(&mut raw, &field);
            // A keyword-only field keeps its old value's anchor; re-anchor on
            // the new one.
            if let Some(old) = raw.values.get(&field) {
                let anchored = keyword_pattern(old);
                if let Some(list) = raw.regex_includes.get_mut(&field)
                    && let Some(pos) = list.iter().position(|p| *p == anchored)
                {
                    list.remove(pos);
                    if list.is_empty() {
                        raw.match_mode.remove(&field);
                    }
                    raw.keyword_only.insert(field.clone());
                }
            }
            raw.values.insert(field, value);
            raw.strategy = Some(Strategy::Custom);
        }
        CriteriaEdit::SetIncludes { field, words } => {
            ensure_field(&mut raw, &field);
            raw.includes.insert(field, words);
            raw.strategy = Some(Strategy::Custom);
        }
        CriteriaEdit::SetExcludes { field, words } => {
            ensure_field(&mut raw, &field);
            raw.excludes.insert(field, words);
            raw.strategy = Some(Strategy::Custom);
        }
        CriteriaEdit::SetMatchMode { field, mode } => {
            raw.match_mode.insert(field, mode);
        }
        CriteriaEdit::ToggleField { field, enabled } => {
            if enabled {
                ensure_field(&mut raw, &field);
            } else {
                raw.fields.retain(|f| *f != field);
            }
            if criteria.strategy != Strategy::Custom {
                raw.strategy = None;
            }
        }
    }

    normalize(raw)
}

/// Criteria for `strategy` filled with `id`'s own values.
pub fn criteria_for_node(tree: &UiTree, id: NodeId, strategy: Strategy) -> MatchCriteria {
    let mut raw = RawCriteria {
        strategy: Some(strategy),
        ..RawCriteria::default()
    };

    if strategy.is_xpath() {
        let base = xpath::attribute_xpath(
            tree,
            id,
            &[FIELD_RESOURCE_ID, FIELD_TEXT, FIELD_CONTENT_DESC],
        );
        let expr = if strategy == Strategy::XpathFirstIndex {
            xpath::first_match(&base)
        } else {
            base
        };
        raw.fields.push(FIELD_XPATH.to_string());
        raw.values.insert(FIELD_XPATH.to_string(), expr);
        return normalize(raw);
    }

    for field in preset_fields(strategy) {
        if let Some(value) = field_value(tree, id, field) {
            raw.fields.push(field.to_string());
            raw.values.insert(field.to_string(), value);
        }
    }
    normalize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(fields: &[&str], values: &[(&str, &str)]) -> RawCriteria {
        RawCriteria {
            fields: fields.iter().map(|s| s.to_string()).collect(),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..RawCriteria::default()
        }
    }

    #[test]
    fn test_empty_value_field_is_dropped() {
        let criteria = normalize(raw(&["text"], &[]));
        assert!(criteria.fields.is_empty());
        assert_eq!(
            validate(&criteria).unwrap_err().kind().code(),
            "INVALID_CRITERIA"
        );
    }

    #[test]
    fn test_constraint_keeps_field_without_value() {
        let mut r = raw(&["text", "class"], &[("class", "android.widget.Button")]);
        r.excludes.insert("text".into(), vec!["广告".into(), "".into()]);
        let criteria = normalize(r);
        assert_eq!(criteria.fields, vec!["text", "class"]);
        assert_eq!(criteria.excludes["text"], vec!["广告".to_string()]);
        assert!(validate(&criteria).is_ok());
    }

    #[test]
    fn test_orphans_are_pruned() {
        let mut r = raw(&["text"], &[("text", "OK"), ("bounds", "[0,0][1,1]")]);
        r.includes.insert("class".into(), vec!["Button".into()]);
        r.match_mode.insert("content-desc".into(), FieldMatchMode::Contains);
        r.regex_excludes.insert("resource-id".into(), vec!["tmp".into()]);
        let c = normalize(r);
        for key in c
            .values
            .keys()
            .chain(c.includes.keys())
            .chain(c.excludes.keys())
            .chain(c.match_mode.keys())
            .chain(c.regex_includes.keys())
            .chain(c.regex_excludes.keys())
        {
            assert!(c.fields.contains(key), "orphan key {}", key);
        }
    }

    #[test]
    fn test_keyword_only_anchors_text() {
        let mut r = raw(&["text", "class"], &[("text", "关注(1)"), ("class", "Button")]);
        r.keyword_only.insert("text".into());
        r.keyword_only.insert("class".into());
        let c = normalize(r);
        assert_eq!(c.mode_for("text"), FieldMatchMode::Regex);
        assert_eq!(c.regex_includes["text"], vec![r"^关注\(1\)$".to_string()]);
        assert_eq!(c.mode_for("class"), FieldMatchMode::Equals);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut r = raw(
            &["resource-id", "text", "text", "bounds"],
            &[("resource-id", "com.demo:id/ok"), ("text", "OK"), ("bounds", "")],
        );
        r.keyword_only.insert("text".into());
        r.includes.insert("resource-id".into(), vec!["ok".into()]);
        let once = normalize(r);
        let twice = renormalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_infer_strategy_from_fields() {
        assert_eq!(
            infer_strategy_from_fields(&["text", "resource-id", "content-desc"]),
            Strategy::SelfAnchor
        );
        assert_eq!(infer_strategy_from_fields(&["xpath"]), Strategy::XpathDirect);
        assert_eq!(infer_strategy_from_fields(&["text", "bounds"]), Strategy::Custom);
        assert_eq!(infer_strategy_from_fields::<&str>(&[]), Strategy::Custom);
    }

    #[test]
    fn test_inferable_presets_are_distinct() {
        for (i, a) in INFERABLE.iter().enumerate() {
            for b in &INFERABLE[i + 1..] {
                let fa: BTreeSet<_> = preset_fields(*a).iter().collect();
                let fb: BTreeSet<_> = preset_fields(*b).iter().collect();
                assert_ne!(fa, fb, "{} and {} share a field set", a, b);
            }
            assert_eq!(infer_strategy_from_fields(preset_fields(*a)), *a);
        }
    }

    #[test]
    fn test_editing_a_preset_forces_custom() {
        let c = normalize(RawCriteria {
            strategy: Some(Strategy::Standard),
            ..raw(&["text", "class"], &[("text", "OK"), ("class", "Button")])
        });
        assert_eq!(c.strategy, Strategy::Standard);

        let edited = edit(
            &c,
            CriteriaEdit::SetValue {
                field: "text".into(),
                value: "Okay".into(),
            },
        );
        assert_eq!(edited.strategy, Strategy::Custom);
        assert_eq!(edited.values["text"], "Okay");

        let excluded = edit(
            &c,
            CriteriaEdit::SetExcludes {
                field: "content-desc".into(),
                words: vec!["ad".into()],
            },
        );
        assert_eq!(excluded.strategy, Strategy::Custom);
        assert!(excluded.has_field("content-desc"));
    }

    #[test]
    fn test_editing_keyword_only_value_moves_the_anchor() {
        let mut b = UiTree::builder("hierarchy");
        let ok = b.node(b.root(), &[("text", "OK")]);
        let cancel = b.node(b.root(), &[("text", "Cancel")]);
        let tree = b.build();

        let mut r = raw(&["text"], &[("text", "OK")]);
        r.keyword_only.insert("text".into());
        let c = normalize(r);
        assert_eq!(matcher::find_candidates(&tree, &c).unwrap(), vec![ok]);

        let edited = edit(
            &c,
            CriteriaEdit::SetValue {
                field: "text".into(),
                value: "Cancel".into(),
            },
        );
        assert_eq!(edited.regex_includes["text"], vec!["^Cancel$".to_string()]);
        assert_eq!(edited.mode_for("text"), FieldMatchMode::Regex);
        assert_eq!(matcher::find_candidates(&tree, &edited).unwrap(), vec![cancel]);

        // A hand-written pattern next to the anchor survives the edit.
        let mut extra = c.clone();
        extra.regex_includes.get_mut("text").unwrap().push("^[A-Z]".into());
        let edited = edit(
            &extra,
            CriteriaEdit::SetValue {
                field: "text".into(),
                value: "Cancel".into(),
            },
        );
        assert_eq!(
            edited.regex_includes["text"],
            vec!["^[A-Z]".to_string(), "^Cancel$".to_string()]
        );
    }

    #[test]
    fn test_toggle_field_reinfers_preset() {
        let c = normalize(raw(
            &["resource-id", "text"],
            &[("resource-id", "com.demo:id/ok"), ("text", "OK"), ("content-desc", "ok")],
        ));
        assert_eq!(c.strategy, Strategy::Custom);
        let mut with_desc = c.clone();
        with_desc.strategy = Strategy::Relaxed;
        with_desc.values.insert("content-desc".into(), "confirm".into());
        let toggled = edit(
            &with_desc,
            CriteriaEdit::ToggleField {
                field: "content-desc".into(),
                enabled: true,
            },
        );
        assert_eq!(toggled.strategy, Strategy::SelfAnchor);
    }

    #[test]
    fn test_criteria_for_node_uses_preset_values() {
        let mut b = UiTree::builder("hierarchy");
        let id = b.node(
            b.root(),
            &[
                ("resource-id", "com.demo:id/btn_follow"),
                ("text", "关注"),
                ("class", "android.widget.Button"),
                ("bounds", "[864,2240][1080,2358]"),
            ],
        );
        let tree = b.build();

        let c = criteria_for_node(&tree, id, Strategy::Absolute);
        assert_eq!(c.fields, vec!["resource-id", "text", "class", "bounds"]);
        assert_eq!(c.values["bounds"], "[864,2240][1080,2358]");

        let x = criteria_for_node(&tree, id, Strategy::XpathFirstIndex);
        assert_eq!(
            x.values["xpath"],
            "(//node[@resource-id='com.demo:id/btn_follow' and @text='关注'])[1]"
        );
    }
}
