//! Heuristics for whether a resource-id will survive app updates.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// Below this score a resource-id "looks auto-generated".
pub const TRUST_THRESHOLD: f64 = 0.6;

lazy_static! {
    static ref LONG_DIGIT_RUN: Regex = Regex::new(r"\d{10,}").unwrap();
    static ref NUMERIC_SUFFIX: Regex = Regex::new(r"_\d{3,}$").unwrap();
    static ref CAMEL_HUMP: Regex = Regex::new(r"[a-z][A-Z]").unwrap();
}

const GENERIC_CONTAINERS: &[&str] = &[
    "container", "wrapper", "layout", "frame", "root", "content", "main", "holder", "parent",
    "child",
];

const SEMANTIC_KEYWORDS: &[&str] = &[
    "btn", "button", "text", "image", "icon", "title", "desc", "header", "footer", "nav", "menu",
    "tab", "list", "item", "card", "avatar", "name", "info", "detail", "action", "follow", "like",
    "search", "input", "send", "confirm", "cancel",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdStability {
    pub score: f64,
    pub obfuscated: bool,
    pub dynamic: bool,
    pub generic_container: bool,
    pub reasons: Vec<String>,
}

impl IdStability {
    pub fn should_trust(&self) -> bool {
        self.score >= TRUST_THRESHOLD
    }

    pub fn looks_generated(&self) -> bool {
        !self.should_trust()
    }
}

/// Name part of a resource-id (`com.app:id/btn_ok` -> `btn_ok`).
pub fn id_name(resource_id: &str) -> &str {
    match resource_id.rsplit_once(":id/") {
        Some((_, name)) => name,
        None => resource_id,
    }
}

pub fn assess(resource_id: &str) -> IdStability {
    let resource_id = resource_id.trim();
    if resource_id.is_empty() || resource_id == "NO_ID" {
        return IdStability {
            score: 0.0,
            obfuscated: false,
            dynamic: false,
            generic_container: false,
            reasons: vec!["no resource-id".to_string()],
        };
    }

    let name = id_name(resource_id);
    let mut score = 1.0;
    let mut reasons = Vec::new();

    let obfuscated = obfuscation(name);
    if let Some(reason) = &obfuscated {
        score *= 0.2;
        reasons.push(reason.clone());
    }

    let dynamic = dynamic_pattern(name);
    if let Some(reason) = &dynamic {
        score *= 0.3;
        reasons.push(reason.clone());
    }

    let lower = name.to_lowercase();
    let container = GENERIC_CONTAINERS
        .iter()
        .find(|g| lower == **g || lower.ends_with(*g));
    if let Some(g) = container {
        score *= 0.6;
        reasons.push(format!("generic container name '{}'", g));
    }

    let (quality, note) = naming_quality(name);
    score *= quality;
    if let Some(note) = note {
        reasons.push(note.to_string());
    }

    IdStability {
        score,
        obfuscated: obfuscated.is_some(),
        dynamic: dynamic.is_some(),
        generic_container: container.is_some(),
        reasons,
    }
}

fn obfuscation(name: &str) -> Option<String> {
    if name.contains("obfuscated") {
        return Some("marked as obfuscated".to_string());
    }
    if name.starts_with("0_") || name.starts_with("1_") {
        return Some(format!("starts with '{}'", &name[..2]));
    }
    if looks_like_hash(name) {
        return Some("looks like a hash".to_string());
    }
    if name.len() <= 2 && name.chars().all(|c| c.is_ascii_lowercase()) {
        return Some(format!("'{}' is too short, likely minified", name));
    }
    None
}

fn looks_like_hash(name: &str) -> bool {
    name.len() >= 16
        && name.chars().any(|c| c.is_ascii_alphabetic())
        && name.chars().any(|c| c.is_ascii_digit())
        && !name.contains('_')
        && !CAMEL_HUMP.is_match(name)
}

fn dynamic_pattern(name: &str) -> Option<String> {
    if LONG_DIGIT_RUN.is_match(name) {
        return Some("contains a timestamp-like digit run".to_string());
    }
    if name.len() > 20 && name.split('-').count() >= 4 {
        return Some("contains a UUID".to_string());
    }
    if NUMERIC_SUFFIX.is_match(name) {
        return Some("ends with a numeric suffix".to_string());
    }
    None
}

fn naming_quality(name: &str) -> (f64, Option<&'static str>) {
    let snake = name.contains('_') && name.len() > 3;
    let camel = name.chars().any(|c| c.is_ascii_uppercase());
    if !snake && !camel && name.len() <= 5 {
        return (0.7, Some("short name without structure"));
    }
    let lower = name.to_lowercase();
    if SEMANTIC_KEYWORDS.iter().any(|k| lower.contains(k)) {
        (1.0, None)
    } else {
        (0.85, Some("name carries no semantic keyword"))
    }
}
