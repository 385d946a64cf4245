//! Run orchestration
//!
//! - `scheduler`: bounded worker pool driving the analyzer
//! - `aggregator`: cross-document grouping of proposals
//! - `clustering`: greedy fuzzy merge of near-duplicate groups
//! - `decision_policy`: evidence thresholds, one decision per cluster
//! - `pipeline`: the above in sequence, with a barrier after analysis
//! - `statistics`: shared run counters

pub mod aggregator;
pub mod clustering;
pub mod decision_policy;
pub mod pipeline;
pub mod scheduler;
pub mod statistics;

pub use aggregator::{aggregate, Aggregation};
pub use clustering::ClusteringEngine;
pub use decision_policy::DecisionPolicy;
pub use pipeline::{
    AggregationCounts, Pipeline, PipelineConfig, RunFailure, RunReport, RunStatus,
};
pub use scheduler::{Scheduler, SchedulerFailure, SchedulerOutcome};
pub use statistics::{RunStatistics, StatisticsSnapshot};
