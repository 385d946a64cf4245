//! Data model for the candidate-analysis pipeline

pub mod catalog;
pub mod paragraph;
pub mod parameters;
pub mod proposal;
pub mod review;

pub use catalog::VocabularyCatalog;
pub use paragraph::{parse_paragraphs, read_paragraphs, ParagraphRecord};
pub use parameters::{PolicyParameters, ProviderMode, SchedulerParameters, SimilarityMetric};
pub use proposal::{
    AttemptOutcome, AttemptSource, CandidateProposal, Decision, ModelTier, ParagraphAnalysis,
    ProposalDraft, TierAttempt, TierResponse, VocabularyType,
};
pub use review::{AggregatedGroup, Cluster, ReviewRecord};
