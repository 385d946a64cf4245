//! Run parameters: provider mode, thresholds and scheduling width
//!
//! Every threshold is a configurable default. The values below are the
//! policy's starting point, not fixed constants.

use enumdiff_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which model tiers the analyzer may use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ProviderMode {
    /// Always the fast tier
    Chat,
    /// Always the slow tier
    Reasoner,
    /// Fast tier first, escalate uncertain answers
    #[default]
    Auto,
}

impl ProviderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderMode::Chat => "chat",
            ProviderMode::Reasoner => "reasoner",
            ProviderMode::Auto => "auto",
        }
    }
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "chat" => Ok(ProviderMode::Chat),
            "reasoner" => Ok(ProviderMode::Reasoner),
            "auto" => Ok(ProviderMode::Auto),
            other => Err(Error::Config(format!(
                "Unknown provider mode `{}` (expected chat, reasoner or auto)",
                other
            ))),
        }
    }
}

/// String-similarity metric used by the clustering engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Whitespace tokens sorted, then normalized Levenshtein
    #[default]
    TokenSort,
    /// Normalized Levenshtein on the strings as given
    Levenshtein,
    /// Jaro-Winkler
    JaroWinkler,
}

impl SimilarityMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            SimilarityMetric::TokenSort => "token_sort",
            SimilarityMetric::Levenshtein => "levenshtein",
            SimilarityMetric::JaroWinkler => "jaro_winkler",
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "token_sort" | "token_sort_ratio" => Ok(SimilarityMetric::TokenSort),
            "levenshtein" | "ratio" => Ok(SimilarityMetric::Levenshtein),
            "jaro_winkler" => Ok(SimilarityMetric::JaroWinkler),
            other => Err(Error::Config(format!(
                "Unknown similarity metric `{}` (expected token_sort, levenshtein or jaro_winkler)",
                other
            ))),
        }
    }
}

/// Escalation, clustering and decision thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyParameters {
    /// Minimum distinct-document evidence for ADD_NEW (default: 5)
    #[serde(default = "default_min_doc_count")]
    pub min_doc_count: usize,

    /// Minimum cluster confidence for ADD_NEW (default: 0.65)
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,

    /// Chat answers below this confidence escalate in auto mode (default: 0.65)
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: f64,

    /// Minimum similarity to merge into a cluster (default: 0.80)
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default)]
    pub similarity_metric: SimilarityMetric,
}

impl PolicyParameters {
    /// Reject values outside their valid ranges
    pub fn validate(&self) -> Result<()> {
        if self.min_doc_count == 0 {
            return Err(Error::Config("min_doc_count must be at least 1".to_string()));
        }
        for (name, value) in [
            ("confidence_floor", self.confidence_floor),
            ("escalation_threshold", self.escalation_threshold),
            ("similarity_threshold", self.similarity_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

impl Default for PolicyParameters {
    fn default() -> Self {
        Self {
            min_doc_count: default_min_doc_count(),
            confidence_floor: default_confidence_floor(),
            escalation_threshold: default_escalation_threshold(),
            similarity_threshold: default_similarity_threshold(),
            similarity_metric: SimilarityMetric::default(),
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerParameters {
    /// Number of parallel workers (default: 4)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pending-paragraph queue bound (default: 4 × concurrency)
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

impl SchedulerParameters {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            queue_capacity: None,
        }
    }

    /// Effective queue bound, never below 1
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or(self.concurrency.saturating_mul(4))
            .max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        if self.queue_capacity == Some(0) {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for SchedulerParameters {
    fn default() -> Self {
        Self::new(default_concurrency())
    }
}

// Default value functions
fn default_min_doc_count() -> usize {
    5
}

fn default_confidence_floor() -> f64 {
    0.65
}

fn default_escalation_threshold() -> f64 {
    0.65
}

fn default_similarity_threshold() -> f64 {
    0.80
}

fn default_concurrency() -> usize {
    4
}
