//! Analysis services
//!
//! - `prompt`: system prompt template and JSON guard
//! - `analysis_client`: the [`AnalysisService`] seam and the DeepSeek client
//! - `response_parser`: boundary validation of service answers
//! - `retry`: exponential backoff around one service call
//! - `adaptive_analyzer`: cache-first, tier-escalating paragraph analysis

pub mod adaptive_analyzer;
pub mod analysis_client;
pub mod prompt;
pub mod response_parser;
pub mod retry;

pub use adaptive_analyzer::{AdaptiveAnalyzer, AnalyzerSettings};
pub use analysis_client::{
    AnalysisRequest, AnalysisService, ClientSettings, DeepSeekClient, TierSettings,
};
pub use prompt::PromptTemplate;
pub use response_parser::parse_tier_response;
pub use retry::{call_with_retry, RetryOutcome, RetryPolicy, RetryState};
