//! Post-analysis types: aggregated groups, clusters and review records
//!
//! Groups and clusters live only for the duration of a run. Review records are
//! the artifact handed to the external writers (review table, schema patch,
//! change summary).

use crate::models::{CandidateProposal, Decision, VocabularyType};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Proposals sharing a vocabulary type and normalized candidate string
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedGroup {
    pub vocabulary_type: VocabularyType,
    /// Normalized candidate string (grouping key)
    pub normalized: String,
    /// Most frequent raw spelling among members
    pub display: String,
    pub members: Vec<CandidateProposal>,
    /// Distinct source documents among members
    pub doc_count: usize,
    /// Arithmetic mean of member confidences
    pub confidence_avg: f64,
    /// Quote of the highest-confidence member
    pub best_quote: String,
}

impl AggregatedGroup {
    /// Member carrying the best evidence
    pub fn best_member(&self) -> Option<&CandidateProposal> {
        self.members.iter().min_by(|a, b| evidence_order(a, b))
    }
}

/// Ordering that puts the strongest evidence first: highest confidence, then
/// a non-empty quote, then the shorter quote, then lexical order
pub fn evidence_order(a: &CandidateProposal, b: &CandidateProposal) -> Ordering {
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.quote.trim().is_empty().cmp(&b.quote.trim().is_empty()))
        .then_with(|| a.quote.len().cmp(&b.quote.len()))
        .then_with(|| a.quote.cmp(&b.quote))
        .then_with(|| a.doc_id.cmp(&b.doc_id))
        .then_with(|| a.locator.cmp(&b.locator))
}

/// Near-duplicate groups merged into one reviewable entry
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub vocabulary_type: VocabularyType,
    /// Normalized string of the seeding group
    pub representative: String,
    /// Seeding group first, then merged groups in visitation order
    pub groups: Vec<AggregatedGroup>,
    /// Sum of constituent doc_counts
    pub doc_count: usize,
    /// Constituent confidence_avg weighted by constituent doc_count
    pub confidence_avg: f64,
}

impl Cluster {
    pub fn seed(group: AggregatedGroup) -> Self {
        Self {
            vocabulary_type: group.vocabulary_type,
            representative: group.normalized.clone(),
            doc_count: group.doc_count,
            confidence_avg: group.confidence_avg,
            groups: vec![group],
        }
    }

    /// Absorb a group, updating the combined statistics
    pub fn merge(&mut self, group: AggregatedGroup) {
        let total = self.doc_count + group.doc_count;
        if total > 0 {
            self.confidence_avg = (self.confidence_avg * self.doc_count as f64
                + group.confidence_avg * group.doc_count as f64)
                / total as f64;
        }
        self.doc_count = total;
        self.groups.push(group);
    }

    /// Raw spelling of the representative group
    pub fn display(&self) -> &str {
        self.groups
            .first()
            .map(|g| g.display.as_str())
            .unwrap_or(self.representative.as_str())
    }

    pub fn proposals(&self) -> impl Iterator<Item = &CandidateProposal> {
        self.groups.iter().flat_map(|g| g.members.iter())
    }

    /// Strongest evidence across all constituents
    pub fn best_member(&self) -> Option<&CandidateProposal> {
        self.proposals().min_by(|a, b| evidence_order(a, b))
    }

    /// Display spellings of all constituent groups
    pub fn variants(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.display.clone()).collect()
    }
}

/// Final, externally consumed decision for one cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub vocabulary_type: VocabularyType,
    pub decision: Decision,
    /// Representative candidate spelling
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_target: Option<String>,
    pub doc_count: usize,
    pub confidence_avg: f64,
    pub example_quote: String,
    /// Justification of the strongest member
    pub justification: String,
    /// All spellings merged into this record
    pub variants: Vec<String>,
    /// Which policy rule produced the decision
    pub rationale: String,
}
