//! Provenance markings for generated text.
//!
//! Every free-text value a skill produces carries an inline tag saying where
//! it came from:
//!
//! - `[FROM_PLAN]`: taken from user-supplied material
//! - `[SUGGESTED]`: generated speculatively
//! - `[ASSUMED]`: an unverified assumption
//!
//! Any other bracketed upper-case tag is a validation failure.

use crate::error::OrchestratorError;
use crate::task::Markings;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::LazyLock;

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([A-Z][A-Z0-9_]*)\]").expect("tag pattern is a valid regex")
});

/// The closed set of provenance tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvenanceTag {
    FromPlan,
    Suggested,
    Assumed,
}

impl ProvenanceTag {
    pub const ALL: [ProvenanceTag; 3] = [
        ProvenanceTag::FromPlan,
        ProvenanceTag::Suggested,
        ProvenanceTag::Assumed,
    ];

    /// Tag name without brackets.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvenanceTag::FromPlan => "FROM_PLAN",
            ProvenanceTag::Suggested => "SUGGESTED",
            ProvenanceTag::Assumed => "ASSUMED",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.as_str() == name)
    }
}

impl fmt::Display for ProvenanceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.as_str())
    }
}

/// Prefixes `text` with `tag`. Already-tagged text is returned unchanged.
pub fn mark(tag: ProvenanceTag, text: &str) -> String {
    if tags_in(text).any(|t| t == tag.as_str()) {
        return text.to_string();
    }
    format!("{} {}", tag, text)
}

pub fn mark_from_plan(text: &str) -> String {
    mark(ProvenanceTag::FromPlan, text)
}

pub fn mark_suggested(text: &str) -> String {
    mark(ProvenanceTag::Suggested, text)
}

pub fn mark_assumed(text: &str) -> String {
    mark(ProvenanceTag::Assumed, text)
}

fn tags_in(text: &str) -> impl Iterator<Item = &str> {
    TAG_PATTERN
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
}

/// Recognised tags on a single string. Unknown tags are skipped.
pub fn tags_of(text: &str) -> Vec<ProvenanceTag> {
    tags_in(text).filter_map(ProvenanceTag::parse).collect()
}

/// Rejects a single string carrying a tag outside the closed set.
pub fn validate_text(text: &str) -> Result<(), OrchestratorError> {
    match tags_in(text).find(|name| ProvenanceTag::parse(name).is_none()) {
        Some(unknown) => Err(OrchestratorError::InvalidProvenance(format!(
            "unknown tag [{}] in \"{}\"",
            unknown, text
        ))),
        None => Ok(()),
    }
}

/// Walks every string in `data` (object values, array items, nested) and
/// validates its tags.
pub fn validate(data: &JsonValue) -> Result<(), OrchestratorError> {
    let mut result = Ok(());
    visit_strings(data, &mut |text| {
        if result.is_ok() {
            result = validate_text(text);
        }
    });
    result
}

/// Builds metadata markings by classifying every tagged string in `data`.
///
/// A string with several recognised tags is listed under each of them.
pub fn collect_markings(data: &JsonValue) -> Markings {
    let mut markings = Markings::default();
    visit_strings(data, &mut |text| {
        for tag in tags_of(text) {
            let bucket = match tag {
                ProvenanceTag::FromPlan => &mut markings.from_plan,
                ProvenanceTag::Suggested => &mut markings.suggestions,
                ProvenanceTag::Assumed => &mut markings.assumptions,
            };
            if !bucket.iter().any(|s| s == text) {
                bucket.push(text.to_string());
            }
        }
    });
    markings
}

fn visit_strings(value: &JsonValue, f: &mut dyn FnMut(&str)) {
    match value {
        JsonValue::String(s) => f(s),
        JsonValue::Array(items) => items.iter().for_each(|v| visit_strings(v, f)),
        JsonValue::Object(map) => map.values().for_each(|v| visit_strings(v, f)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mark_helpers() {
        assert_eq!(mark_from_plan("Bakery in Lyon"), "[FROM_PLAN] Bakery in Lyon");
        assert_eq!(mark_suggested("Add catering"), "[SUGGESTED] Add catering");
        assert_eq!(mark_assumed("5% growth"), "[ASSUMED] 5% growth");
    }

    #[test]
    fn test_mark_is_idempotent() {
        let once = mark_assumed("5% growth");
        assert_eq!(mark_assumed(&once), once);
    }

    #[test]
    fn test_validate_accepts_known_tags_and_plain_text() {
        let data = json!({
            "summary": "[FROM_PLAN] Bakery",
            "ideas": ["[SUGGESTED] Catering", "no tag at all"],
            "nested": {"growth": "[ASSUMED] 5%"},
            "count": 3
        });
        assert!(validate(&data).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_tag() {
        let data = json!({"nested": {"list": ["[GUESSED] Something"]}});
        let err = validate(&data).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidProvenance(_)));
        assert!(err.to_string().contains("GUESSED"));
    }

    #[test]
    fn test_lowercase_brackets_are_not_tags() {
        assert!(validate_text("see [appendix a] for details").is_ok());
    }

    #[test]
    fn test_collect_markings() {
        let data = json!({
            "a": "[FROM_PLAN] Bakery",
            "b": ["[SUGGESTED] Catering", "[ASSUMED] 5% growth"],
            "c": "untagged"
        });
        let markings = collect_markings(&data);

        assert_eq!(markings.from_plan, vec!["[FROM_PLAN] Bakery"]);
        assert_eq!(markings.suggestions, vec!["[SUGGESTED] Catering"]);
        assert_eq!(markings.assumptions, vec!["[ASSUMED] 5% growth"]);
    }

    #[test]
    fn test_collect_markings_empty() {
        assert!(collect_markings(&json!({"x": "plain"})).is_empty());
    }
}
