//! Decision policy: one review decision per cluster
//!
//! Rules, first match wins:
//! 1. Consistent MAP_TO_EXISTING target among members, or a representative
//!    that already is a catalog value → MAP_TO_EXISTING
//! 2. doc_count below the minimum → IGNORE
//! 3. confidence_avg at or above the floor → ADD_NEW
//! 4. Otherwise → UNSURE
//!
//! Conflicting mapping targets are logged and fall through to rules 2-4.
//!
//! ADD_NEW therefore always has at least `min_doc_count` documents behind it.

use crate::models::{Cluster, Decision, PolicyParameters, ReviewRecord, VocabularyCatalog};
use enumdiff_common::text::normalize_vocabulary;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    min_doc_count: usize,
    confidence_floor: f64,
}

/// Mapping evidence found among a cluster's members
enum MappingEvidence {
    None,
    Consistent { target: String, supporters: usize },
    Conflicting(Vec<String>),
}

impl DecisionPolicy {
    pub fn new(min_doc_count: usize, confidence_floor: f64) -> Self {
        Self {
            min_doc_count,
            confidence_floor,
        }
    }

    pub fn from_parameters(params: &PolicyParameters) -> Self {
        Self::new(params.min_doc_count, params.confidence_floor)
    }

    pub fn decide(&self, cluster: &Cluster, catalog: &VocabularyCatalog) -> ReviewRecord {
        let (decision, mapping_target, rationale) = self.evaluate(cluster, catalog);

        let best = cluster.best_member();
        ReviewRecord {
            vocabulary_type: cluster.vocabulary_type,
            decision,
            candidate: cluster.display().to_string(),
            mapping_target,
            doc_count: cluster.doc_count,
            confidence_avg: cluster.confidence_avg,
            example_quote: best.map(|m| m.quote.clone()).unwrap_or_default(),
            justification: best.map(|m| m.justification.clone()).unwrap_or_default(),
            variants: cluster.variants(),
            rationale,
        }
    }

    fn evaluate(&self, cluster: &Cluster, catalog: &VocabularyCatalog) -> (Decision, Option<String>, String) {
        let evidence = mapping_evidence(cluster, catalog);

        if let MappingEvidence::Consistent { target, supporters } = &evidence {
            return (
                Decision::MapToExisting,
                Some(target.clone()),
                format!("{} proposal(s) consistently map to `{}`", supporters, target),
            );
        }

        if matches!(evidence, MappingEvidence::None) {
            if let Some(existing) = catalog.find_existing(cluster.vocabulary_type, &cluster.representative) {
                return (
                    Decision::MapToExisting,
                    Some(existing.to_string()),
                    format!("representative already in catalog as `{}`", existing),
                );
            }
        }

        if cluster.doc_count < self.min_doc_count {
            return (
                Decision::Ignore,
                None,
                format!(
                    "doc_count {} below minimum {}",
                    cluster.doc_count, self.min_doc_count
                ),
            );
        }

        let conflict_note = match &evidence {
            MappingEvidence::Conflicting(targets) => {
                tracing::info!(
                    vocabulary_type = %cluster.vocabulary_type,
                    candidate = %cluster.representative,
                    targets = ?targets,
                    "Conflicting mapping targets, deciding on thresholds"
                );
                format!("; conflicting mapping targets: {}", targets.join(", "))
            }
            _ => String::new(),
        };

        if cluster.confidence_avg >= self.confidence_floor {
            (
                Decision::AddNew,
                None,
                format!(
                    "{} documents, confidence {:.2} meets floor {:.2}{}",
                    cluster.doc_count, cluster.confidence_avg, self.confidence_floor, conflict_note
                ),
            )
        } else {
            (
                Decision::Unsure,
                None,
                format!(
                    "confidence {:.2} below floor {:.2}{}",
                    cluster.confidence_avg, self.confidence_floor, conflict_note
                ),
            )
        }
    }
}

/// Collect MAP_TO_EXISTING targets, compared after normalization
fn mapping_evidence(cluster: &Cluster, catalog: &VocabularyCatalog) -> MappingEvidence {
    // normalized target → raw spellings with counts
    let mut targets: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    let mut supporters = 0usize;

    for member in cluster.proposals() {
        if member.decision != Decision::MapToExisting {
            continue;
        }
        let Some(target) = member.mapping_target.as_deref() else {
            continue;
        };
        let normalized = normalize_vocabulary(target);
        if normalized.is_empty() {
            continue;
        }
        supporters += 1;
        *targets
            .entry(normalized)
            .or_default()
            .entry(target.trim().to_string())
            .or_default() += 1;
    }

    match targets.len() {
        0 => MappingEvidence::None,
        1 => {
            let (normalized, spellings) = targets.into_iter().next().unwrap_or_default();
            // Prefer the catalog's own spelling, else the most used one
            let target = catalog
                .find_existing(cluster.vocabulary_type, &normalized)
                .map(str::to_string)
                .or_else(|| {
                    spellings
                        .into_iter()
                        .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
                        .map(|(s, _)| s)
                })
                .unwrap_or(normalized);
            MappingEvidence::Consistent { target, supporters }
        }
        _ => MappingEvidence::Conflicting(
            targets
                .into_values()
                .filter_map(|spellings| spellings.into_keys().next())
                .collect(),
        ),
    }
}
