//! Cross-document candidate aggregation
//!
//! Groups proposals by (vocabulary type, normalized candidate). IGNORE
//! proposals and degraded placeholders carry no evidence for a new value and
//! are counted instead of grouped.

use crate::models::review::evidence_order;
use crate::models::{AggregatedGroup, CandidateProposal, Decision, VocabularyType};
use enumdiff_common::text::normalize_vocabulary;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Groups plus what was left out
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    /// Ordered by vocabulary type, then normalized candidate
    pub groups: Vec<AggregatedGroup>,
    pub ignored: usize,
    pub degraded: usize,
    /// Candidates that normalize to nothing (pure punctuation)
    pub empty: usize,
}

pub fn aggregate<'a, I>(proposals: I) -> Aggregation
where
    I: IntoIterator<Item = &'a CandidateProposal>,
{
    let mut buckets: BTreeMap<(VocabularyType, String), Vec<CandidateProposal>> = BTreeMap::new();
    let mut result = Aggregation::default();

    for proposal in proposals {
        if proposal.is_degraded() {
            result.degraded += 1;
            continue;
        }
        if proposal.decision == Decision::Ignore {
            result.ignored += 1;
            continue;
        }

        let normalized = normalize_vocabulary(&proposal.candidate);
        if normalized.is_empty() {
            tracing::debug!(
                doc_id = %proposal.doc_id,
                candidate = %proposal.candidate,
                "Candidate normalizes to empty string, skipping"
            );
            result.empty += 1;
            continue;
        }

        buckets
            .entry((proposal.vocabulary_type, normalized))
            .or_default()
            .push(proposal.clone());
    }

    result.groups = buckets
        .into_iter()
        .map(|((vocabulary_type, normalized), members)| build_group(vocabulary_type, normalized, members))
        .collect();

    tracing::debug!(
        groups = result.groups.len(),
        ignored = result.ignored,
        degraded = result.degraded,
        "Aggregated candidate proposals"
    );

    result
}

fn build_group(
    vocabulary_type: VocabularyType,
    normalized: String,
    mut members: Vec<CandidateProposal>,
) -> AggregatedGroup {
    // Fixed member order keeps the float sum reproducible
    members.sort_by(evidence_order);

    let doc_count = members
        .iter()
        .map(|m| m.doc_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    let confidence_avg = if members.is_empty() {
        0.0
    } else {
        members.iter().map(|m| m.confidence).sum::<f64>() / members.len() as f64
    };

    let best_quote = members.first().map(|m| m.quote.clone()).unwrap_or_default();

    AggregatedGroup {
        vocabulary_type,
        display: most_frequent_spelling(&members).unwrap_or_else(|| normalized.clone()),
        normalized,
        members,
        doc_count,
        confidence_avg,
        best_quote,
    }
}

/// Most common trimmed raw spelling; ties go to the lexically smallest
fn most_frequent_spelling(members: &[CandidateProposal]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for m in members {
        *counts.entry(m.candidate.trim()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
        .map(|(spelling, _)| spelling.to_string())
}
