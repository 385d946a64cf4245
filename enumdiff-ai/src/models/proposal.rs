//! Candidate proposals and per-paragraph analysis results
//!
//! A [`TierResponse`] is the validated form of one analysis service answer and
//! is what the response cache stores. The analyzer turns it into
//! [`CandidateProposal`]s by attaching provenance (document, locator, tier,
//! escalation, retries). Proposals are never edited afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of controlled values checked for gaps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocabularyType {
    #[serde(alias = "aktivitaet")]
    Activity,
    Zone,
    #[serde(alias = "ort")]
    Location,
}

impl VocabularyType {
    pub const ALL: [VocabularyType; 3] = [
        VocabularyType::Activity,
        VocabularyType::Zone,
        VocabularyType::Location,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VocabularyType::Activity => "activity",
            VocabularyType::Zone => "zone",
            VocabularyType::Location => "location",
        }
    }

    /// Parse a type name, accepting the German catalog keys as aliases
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "activity" | "aktivitaet" | "aktivität" => Some(VocabularyType::Activity),
            "zone" => Some(VocabularyType::Zone),
            "location" | "ort" => Some(VocabularyType::Location),
            _ => None,
        }
    }
}

impl fmt::Display for VocabularyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision tag carried by proposals and review records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    AddNew,
    MapToExisting,
    Ignore,
    Unsure,
}

impl Decision {
    pub const ALL: [Decision; 4] = [
        Decision::AddNew,
        Decision::MapToExisting,
        Decision::Ignore,
        Decision::Unsure,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::AddNew => "ADD_NEW",
            Decision::MapToExisting => "MAP_TO_EXISTING",
            Decision::Ignore => "IGNORE",
            Decision::Unsure => "UNSURE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().replace(['-', ' '], "_").as_str() {
            "ADD_NEW" => Some(Decision::AddNew),
            "MAP_TO_EXISTING" => Some(Decision::MapToExisting),
            "IGNORE" => Some(Decision::Ignore),
            "UNSURE" => Some(Decision::Unsure),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Analysis service quality/cost level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Fast default tier
    Chat,
    /// Slower, deeper tier used for escalation
    Reasoner,
}

impl ModelTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelTier::Chat => "chat",
            ModelTier::Reasoner => "reasoner",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated proposal as returned by the service, before provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalDraft {
    pub vocabulary_type: VocabularyType,
    pub candidate: String,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_target: Option<String>,
    pub justification: String,
    pub quote: String,
    pub confidence: f64,
}

/// Validated answer of one tier for one paragraph; the cached payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierResponse {
    pub proposals: Vec<ProposalDraft>,
}

/// Candidate proposal for one vocabulary type from one paragraph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProposal {
    pub doc_id: String,
    pub locator: String,
    pub vocabulary_type: VocabularyType,
    pub candidate: String,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_target: Option<String>,
    pub justification: String,
    pub quote: String,
    /// In [0, 1]
    pub confidence: f64,
    pub tier: ModelTier,
    /// Set when the chat answer was replaced by a reasoner answer
    pub escalated: bool,
    /// Retries spent by the call that produced this proposal
    pub retries: u32,
}

impl CandidateProposal {
    /// Placeholder emitted when a tier could not produce a valid answer
    pub fn degraded(
        doc_id: &str,
        locator: &str,
        vocabulary_type: VocabularyType,
        tier: ModelTier,
        retries: u32,
        diagnostic: &str,
    ) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            locator: locator.to_string(),
            vocabulary_type,
            candidate: String::new(),
            decision: Decision::Unsure,
            mapping_target: None,
            justification: format!("analysis failed: {}", diagnostic),
            quote: String::new(),
            confidence: 0.0,
            tier,
            escalated: false,
            retries,
        }
    }

    /// True for placeholders produced by [`CandidateProposal::degraded`]
    pub fn is_degraded(&self) -> bool {
        self.candidate.trim().is_empty()
            && self.decision == Decision::Unsure
            && self.confidence == 0.0
    }

    /// Whether this chat-tier proposal warrants a reasoner attempt
    pub fn needs_escalation(&self, threshold: f64) -> bool {
        self.decision == Decision::Unsure || self.confidence < threshold
    }
}

/// How a tier answer was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptSource {
    /// Durable cache entry from an earlier computation
    CacheHit,
    /// Reused the in-flight result of a concurrent identical request
    SharedInFlight,
    /// Called the analysis service
    ServiceCall,
}

/// Result of one tier attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Valid { proposals: usize },
    Degraded { reason: String },
}

/// Record of one tier attempt for a paragraph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierAttempt {
    pub tier: ModelTier,
    pub source: AttemptSource,
    pub retries: u32,
    pub outcome: AttemptOutcome,
}

/// Final analysis of one paragraph, with its attempt history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphAnalysis {
    pub doc_id: String,
    pub locator: String,
    pub proposals: Vec<CandidateProposal>,
    pub attempts: Vec<TierAttempt>,
    pub escalated: bool,
}

impl ParagraphAnalysis {
    /// Whether any attempt on `tier` is on record
    pub fn attempted(&self, tier: ModelTier) -> bool {
        self.attempts.iter().any(|a| a.tier == tier)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(
            self.attempts.last().map(|a| &a.outcome),
            Some(AttemptOutcome::Degraded { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_type_aliases() {
        assert_eq!(VocabularyType::parse("aktivitaet"), Some(VocabularyType::Activity));
        assert_eq!(VocabularyType::parse(" Ort "), Some(VocabularyType::Location));
        assert_eq!(VocabularyType::parse("zone"), Some(VocabularyType::Zone));
        assert_eq!(VocabularyType::parse("species"), None);

        let parsed: VocabularyType = serde_json::from_str("\"ort\"").unwrap();
        assert_eq!(parsed, VocabularyType::Location);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"location\"");
    }

    #[test]
    fn test_decision_parse_and_serde() {
        assert_eq!(Decision::parse("add_new"), Some(Decision::AddNew));
        assert_eq!(Decision::parse("Map-To-Existing"), Some(Decision::MapToExisting));
        assert_eq!(Decision::parse("maybe"), None);
        assert_eq!(
            serde_json::to_string(&Decision::MapToExisting).unwrap(),
            "\"MAP_TO_EXISTING\""
        );
    }

    #[test]
    fn test_degraded_proposal() {
        let p = CandidateProposal::degraded(
            "NSG-1",
            "p1",
            VocabularyType::Zone,
            ModelTier::Chat,
            3,
            "rate limited",
        );
        assert!(p.is_degraded());
        assert_eq!(p.decision, Decision::Unsure);
        assert_eq!(p.confidence, 0.0);
        assert!(p.justification.contains("rate limited"));
        assert!(p.needs_escalation(0.65));
    }

    #[test]
    fn test_needs_escalation() {
        let mut p = CandidateProposal::degraded("d", "l", VocabularyType::Activity, ModelTier::Chat, 0, "");
        p.candidate = "reiten".into();
        p.decision = Decision::AddNew;
        p.confidence = 0.9;
        assert!(!p.needs_escalation(0.65));
        p.confidence = 0.64;
        assert!(p.needs_escalation(0.65));
        p.confidence = 0.95;
        p.decision = Decision::Unsure;
        assert!(p.needs_escalation(0.65));
    }
}
