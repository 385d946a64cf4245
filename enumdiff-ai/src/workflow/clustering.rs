//! Greedy fuzzy clustering of aggregated groups
//!
//! Groups of one vocabulary type are visited by doc_count descending, then
//! normalized string ascending. Each group joins the most similar existing
//! cluster if that similarity reaches the threshold, otherwise it seeds a
//! new cluster. The result depends on visitation order, which the sort key
//! fixes.

use crate::models::{AggregatedGroup, Cluster, SimilarityMetric, VocabularyType};
use std::collections::BTreeMap;

/// Similarities closer than this count as a tie
const TIE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct ClusteringEngine {
    metric: SimilarityMetric,
    threshold: f64,
}

impl ClusteringEngine {
    pub fn new(metric: SimilarityMetric, threshold: f64) -> Self {
        Self { metric, threshold }
    }

    /// Similarity in [0, 1] of two normalized strings
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        match self.metric {
            SimilarityMetric::TokenSort => {
                strsim::normalized_levenshtein(&sorted_tokens(a), &sorted_tokens(b))
            }
            SimilarityMetric::Levenshtein => strsim::normalized_levenshtein(a, b),
            SimilarityMetric::JaroWinkler => strsim::jaro_winkler(a, b),
        }
    }

    /// Partition `groups` into clusters, per vocabulary type.
    ///
    /// Output is ordered by vocabulary type, then cluster creation order.
    pub fn cluster(&self, groups: Vec<AggregatedGroup>) -> Vec<Cluster> {
        let mut by_type: BTreeMap<VocabularyType, Vec<AggregatedGroup>> = BTreeMap::new();
        for group in groups {
            by_type.entry(group.vocabulary_type).or_default().push(group);
        }

        by_type
            .into_values()
            .flat_map(|groups| self.cluster_type(groups))
            .collect()
    }

    fn cluster_type(&self, mut groups: Vec<AggregatedGroup>) -> Vec<Cluster> {
        groups.sort_by(|a, b| {
            b.doc_count
                .cmp(&a.doc_count)
                .then_with(|| a.normalized.cmp(&b.normalized))
        });

        let mut clusters: Vec<Cluster> = Vec::new();

        for group in groups {
            let mut best: Option<(usize, f64)> = None;

            for (idx, cluster) in clusters.iter().enumerate() {
                let score = self.similarity(&group.normalized, &cluster.representative);
                if score < self.threshold {
                    continue;
                }
                match best {
                    Some((best_idx, best_score)) if (score - best_score).abs() <= TIE_EPSILON => {
                        tracing::info!(
                            vocabulary_type = %group.vocabulary_type,
                            candidate = %group.normalized,
                            kept = %clusters[best_idx].representative,
                            other = %cluster.representative,
                            score,
                            "Clustering tie, keeping the earlier cluster"
                        );
                    }
                    Some((_, best_score)) if score <= best_score => {}
                    _ => best = Some((idx, score)),
                }
            }

            match best {
                Some((idx, score)) => {
                    tracing::debug!(
                        vocabulary_type = %group.vocabulary_type,
                        candidate = %group.normalized,
                        representative = %clusters[idx].representative,
                        score,
                        "Merging group into cluster"
                    );
                    clusters[idx].merge(group);
                }
                None => clusters.push(Cluster::seed(group)),
            }
        }

        clusters
    }
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}
