//! Analysis prompt template
//!
//! The system prompt is a template with a `{{KNOWN_ENUMS_JSON}}` placeholder
//! that receives the catalog. The template text is hashed into a prompt
//! version, which is part of every cache fingerprint.

use crate::models::VocabularyCatalog;
use enumdiff_common::hash::{sha256_hex, short};
use enumdiff_common::{Error, Result};
use std::path::Path;

/// Placeholder replaced by the catalog JSON
pub const CATALOG_PLACEHOLDER: &str = "{{KNOWN_ENUMS_JSON}}";

/// Prefix added to the user message when nothing mentions JSON
const JSON_GUARD_PREFIX: &str = "Analyze this paragraph and return valid JSON: ";

/// Built-in system prompt
pub const DEFAULT_TEMPLATE: &str = r#"You review paragraphs from German nature-reserve ordinances (Naturschutzgebietsverordnungen).
Each paragraph states a rule: a prohibited or permitted activity, the protection zone it applies to, and the location within the reserve.

Your task is to detect vocabulary values that the rule uses but that are missing from the known catalog below.
Be conservative. Prefer mapping to an existing value over proposing a new one.

Known catalog values per type:
{{KNOWN_ENUMS_JSON}}

For each vocabulary type (activity, zone, location) that the paragraph mentions, return at most one proposal.
Decisions:
- MAP_TO_EXISTING: the paragraph names something covered by an existing value; put that value in target_or_key
- ADD_NEW: the paragraph names something no existing value covers and it is a reusable category, not a one-off phrase
- IGNORE: the mention is too specific, incidental or not a vocabulary value
- UNSURE: you cannot decide

Answer with a single JSON object and nothing else:
{"proposals": [{"type": "activity|zone|location", "candidate": "<term as written>", "decision": "ADD_NEW|MAP_TO_EXISTING|IGNORE|UNSURE", "target_or_key": "<existing value or empty>", "reason": "<one sentence>", "citation": "<verbatim quote from the paragraph>", "confidence": 0.0}]}
Return {"proposals": []} if the paragraph names no vocabulary value.
"#;

/// System prompt template with its content-derived version
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    text: String,
    version: String,
}

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if !text.contains(CATALOG_PLACEHOLDER) {
            return Err(Error::Config(format!(
                "Prompt template lacks the {} placeholder",
                CATALOG_PLACEHOLDER
            )));
        }
        let version = short(&sha256_hex(&text)).to_string();
        Ok(Self { text, version })
    }

    pub fn builtin() -> Self {
        let version = short(&sha256_hex(DEFAULT_TEMPLATE)).to_string();
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
            version,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read prompt template {} failed: {}", path.display(), e))
        })?;
        Self::new(text)
    }

    /// Short content hash of the template text
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// System prompt with the catalog embedded
    pub fn render_system(&self, catalog: &VocabularyCatalog) -> String {
        self.text.replace(CATALOG_PLACEHOLDER, &catalog.to_prompt_json())
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::builtin()
    }
}

/// User message for one paragraph.
///
/// JSON response mode requires the word "json" somewhere in the
/// conversation; if neither the system prompt nor the paragraph has it, the
/// paragraph gets an explicit instruction prefix.
pub fn user_message(system_prompt: &str, paragraph: &str) -> String {
    let mentions_json = |s: &str| s.to_lowercase().contains("json");
    if mentions_json(system_prompt) || mentions_json(paragraph) {
        paragraph.to_string()
    } else {
        format!("{}{}", JSON_GUARD_PREFIX, paragraph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> VocabularyCatalog {
        VocabularyCatalog::from_json_str(r#"{"aktivitaet": ["Reiten"], "zone": ["Kernzone"]}"#)
            .unwrap()
    }

    #[test]
    fn test_builtin_renders_catalog() {
        let prompt = PromptTemplate::builtin();
        let rendered = prompt.render_system(&catalog());
        assert!(!rendered.contains(CATALOG_PLACEHOLDER));
        assert!(rendered.contains("\"Reiten\""));
        assert!(rendered.contains("\"activity\""));
    }

    #[test]
    fn test_version_tracks_text() {
        let a = PromptTemplate::new("A {{KNOWN_ENUMS_JSON}}").unwrap();
        let b = PromptTemplate::new("B {{KNOWN_ENUMS_JSON}}").unwrap();
        assert_ne!(a.version(), b.version());
        assert_eq!(a.version(), PromptTemplate::new("A {{KNOWN_ENUMS_JSON}}").unwrap().version());
        assert_eq!(PromptTemplate::builtin().version().len(), 12);
    }

    #[test]
    fn test_template_requires_placeholder() {
        assert!(PromptTemplate::new("no placeholder").is_err());
    }

    #[test]
    fn test_json_guard() {
        assert_eq!(user_message("Return JSON.", "Text"), "Text");
        assert_eq!(user_message("Analyze.", "Ein json Absatz"), "Ein json Absatz");
        assert_eq!(
            user_message("Analyze.", "Reiten ist verboten."),
            "Analyze this paragraph and return valid JSON: Reiten ist verboten."
        );
    }
}
