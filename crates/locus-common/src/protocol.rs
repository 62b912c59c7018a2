use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const FIELD_RESOURCE_ID: &str = "resource-id";
pub const FIELD_TEXT: &str = "text";
pub const FIELD_CONTENT_DESC: &str = "content-desc";
pub const FIELD_CLASS: &str = "class";
pub const FIELD_PACKAGE: &str = "package";
pub const FIELD_BOUNDS: &str = "bounds";
pub const FIELD_INDEX: &str = "index";
pub const FIELD_CLICKABLE: &str = "clickable";
pub const FIELD_CHECKABLE: &str = "checkable";
pub const FIELD_XPATH: &str = "xpath";
pub const FIELD_CHILD_TEXT: &str = "child-text";
pub const FIELD_PARENT_CLASS: &str = "parent-class";
pub const FIELD_REGION_RESOURCE_ID: &str = "region-resource-id";
pub const FIELD_NEIGHBOR_TEXT: &str = "neighbor-text";

/// Fields that survive the narrowed retry after a total failure.
pub const SEMANTIC_FIELDS: &[&str] = &[
    FIELD_RESOURCE_ID,
    FIELD_TEXT,
    FIELD_CONTENT_DESC,
    FIELD_CLASS,
    FIELD_PACKAGE,
    FIELD_CHECKABLE,
];

/// Layout-dependent fields.
pub const POSITIONAL_FIELDS: &[&str] = &[FIELD_BOUNDS, FIELD_INDEX];

/// Fields whose values are free text; keyword-only mode anchors them.
pub const TEXTUAL_FIELDS: &[&str] = &[FIELD_TEXT, FIELD_CONTENT_DESC];

/// Named approach for describing which node to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Standard,
    Strict,
    Relaxed,
    Positionless,
    Absolute,
    SelfAnchor,
    ChildAnchor,
    ParentClickable,
    RegionScoped,
    NeighborRelative,
    IndexFallback,
    XpathDirect,
    XpathFirstIndex,
    XpathAllElements,
    HiddenElementParent,
    Custom,
}

impl Strategy {
    pub const ALL: [Strategy; 16] = [
        Strategy::Standard,
        Strategy::Strict,
        Strategy::Relaxed,
        Strategy::Positionless,
        Strategy::Absolute,
        Strategy::SelfAnchor,
        Strategy::ChildAnchor,
        Strategy::ParentClickable,
        Strategy::RegionScoped,
        Strategy::NeighborRelative,
        Strategy::IndexFallback,
        Strategy::XpathDirect,
        Strategy::XpathFirstIndex,
        Strategy::XpathAllElements,
        Strategy::HiddenElementParent,
        Strategy::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Standard => "standard",
            Strategy::Strict => "strict",
            Strategy::Relaxed => "relaxed",
            Strategy::Positionless => "positionless",
            Strategy::Absolute => "absolute",
            Strategy::SelfAnchor => "self-anchor",
            Strategy::ChildAnchor => "child-anchor",
            Strategy::ParentClickable => "parent-clickable",
            Strategy::RegionScoped => "region-scoped",
            Strategy::NeighborRelative => "neighbor-relative",
            Strategy::IndexFallback => "index-fallback",
            Strategy::XpathDirect => "xpath-direct",
            Strategy::XpathFirstIndex => "xpath-first-index",
            Strategy::XpathAllElements => "xpath-all-elements",
            Strategy::HiddenElementParent => "hidden-element-parent",
            Strategy::Custom => "custom",
        }
    }

    pub fn is_xpath(&self) -> bool {
        matches!(
            self,
            Strategy::XpathDirect | Strategy::XpathFirstIndex | Strategy::XpathAllElements
        )
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        Strategy::ALL
            .iter()
            .find(|st| st.as_str() == wanted)
            .copied()
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldMatchMode {
    #[default]
    Equals,
    Contains,
    Regex,
}

/// Canonical matching criteria, also the payload handed to the device layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCriteria {
    pub strategy: Strategy,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub includes: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub excludes: BTreeMap<String, Vec<String>>,
    #[serde(default, alias = "match_mode", skip_serializing_if = "BTreeMap::is_empty")]
    pub match_mode: BTreeMap<String, FieldMatchMode>,
    #[serde(default, alias = "regex_includes", skip_serializing_if = "BTreeMap::is_empty")]
    pub regex_includes: BTreeMap<String, Vec<String>>,
    #[serde(default, alias = "regex_excludes", skip_serializing_if = "BTreeMap::is_empty")]
    pub regex_excludes: BTreeMap<String, Vec<String>>,
}

impl MatchCriteria {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            fields: vec![],
            values: BTreeMap::new(),
            includes: BTreeMap::new(),
            excludes: BTreeMap::new(),
            match_mode: BTreeMap::new(),
            regex_includes: BTreeMap::new(),
            regex_excludes: BTreeMap::new(),
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn value(&self, field: &str) -> Option<&str> {
        self.values
            .get(field)
            .map(|v| v.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn mode_for(&self, field: &str) -> FieldMatchMode {
        self.match_mode.get(field).copied().unwrap_or_default()
    }

    /// True when some include/exclude/regex constraint exists for `field`.
    pub fn has_constraints(&self, field: &str) -> bool {
        let non_empty = |m: &BTreeMap<String, Vec<String>>| m.get(field).is_some_and(|v| !v.is_empty());
        non_empty(&self.includes)
            || non_empty(&self.excludes)
            || non_empty(&self.regex_includes)
            || non_empty(&self.regex_excludes)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Preview attached to a device confirmation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchPreview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<String>,
}

/// Response from the device-command boundary after a criteria hand-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub ok: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<MatchPreview>,
    /// Taxonomy code reported by the device when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl DeviceResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            total: None,
            matched_index: None,
            preview: None,
            code: None,
        }
    }

    pub fn failed(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            total: None,
            matched_index: None,
            preview: None,
            code: Some(code.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XPathAction {
    Click,
    Text,
    LongPress,
}

/// Direct XPath execution request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XPathRequest {
    pub device_id: String,
    pub xpath_expr: String,
    pub action: XPathAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffError {
    #[error("Bounds changed during hand-off: '{before}' became '{after}'")]
    BoundsChanged { before: String, after: String },

    #[error("Bounds '{0}' is not in [left,top][right,bottom] form")]
    Malformed(String),
}

/// Reject any hand-off that altered the bounds text. The string must survive
/// byte for byte; a parse-equal but reformatted rectangle is still an error.
pub fn verify_bounds_handoff(before: &str, after: &str) -> Result<(), HandoffError> {
    if crate::bounds::Bounds::parse(before).is_none() {
        return Err(HandoffError::Malformed(before.to_string()));
    }
    if before != after {
        return Err(HandoffError::BoundsChanged {
            before: before.to_string(),
            after: after.to_string(),
        });
    }
    Ok(())
}
