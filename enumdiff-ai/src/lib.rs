//! enumdiff-ai library interface
//!
//! Candidate-analysis and decision pipeline: paragraphs go through a
//! cache-first, tier-escalating analyzer on a bounded worker pool; the
//! resulting proposals are aggregated, fuzzily clustered and decided under
//! evidence thresholds.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod output;
pub mod services;
pub mod utils;
pub mod workflow;

pub use crate::error::{CacheError, ErrorKind, MalformedResponse, RunError, ServiceError};
pub use crate::workflow::{Pipeline, PipelineConfig, RunFailure, RunReport, RunStatus};
