//! End-to-end run: analysis, then aggregation, clustering and decisions
//!
//! The post-analysis stages wait for the worker pool to drain (barrier). A
//! stopped run returns its partial analyses and statistics but no review
//! records, since decisions over a partial corpus would undercount evidence.

use crate::cache::{CacheStore, ResponseCache};
use crate::error::{ErrorKind, RunError};
use crate::models::{
    ParagraphAnalysis, ParagraphRecord, PolicyParameters, ProviderMode, ReviewRecord,
    SchedulerParameters, VocabularyCatalog,
};
use crate::services::{
    AdaptiveAnalyzer, AnalysisService, AnalyzerSettings, PromptTemplate, RetryPolicy,
};
use crate::workflow::aggregator::aggregate;
use crate::workflow::clustering::ClusteringEngine;
use crate::workflow::decision_policy::DecisionPolicy;
use crate::workflow::scheduler::{Scheduler, SchedulerFailure};
use crate::workflow::statistics::{RunStatistics, StatisticsSnapshot};
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Everything that shapes one run
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub mode: ProviderMode,
    pub policy: PolicyParameters,
    pub scheduler: SchedulerParameters,
    pub retry: RetryPolicy,
    /// Bypass durable cache lookups (results are still stored)
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Stopped,
    /// Halted by a run-level failure (only appears in summaries)
    Aborted,
}

/// Post-analysis counts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregationCounts {
    pub proposals: usize,
    pub groups: usize,
    pub clusters: usize,
    pub ignored_proposals: usize,
    pub degraded_proposals: usize,
    pub empty_candidates: usize,
}

/// Result of a run that was not halted by a run-level failure
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Sorted by doc_id, then locator
    pub analyses: Vec<ParagraphAnalysis>,
    /// Sorted by vocabulary type, doc_count descending, candidate
    pub review_records: Vec<ReviewRecord>,
    pub counts: AggregationCounts,
    pub statistics: StatisticsSnapshot,
}

/// Run halted by a fatal service error or an unavailable cache
#[derive(Debug, Error)]
#[error("run {run_id} aborted after {completed} paragraph(s): {error}")]
pub struct RunFailure {
    pub run_id: Uuid,
    pub error: RunError,
    pub completed: usize,
    pub statistics: StatisticsSnapshot,
}

pub struct Pipeline {
    service: Arc<dyn AnalysisService>,
    store: Arc<dyn CacheStore>,
    catalog: Arc<VocabularyCatalog>,
    prompt: PromptTemplate,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        service: Arc<dyn AnalysisService>,
        store: Arc<dyn CacheStore>,
        catalog: Arc<VocabularyCatalog>,
        prompt: PromptTemplate,
        config: PipelineConfig,
    ) -> Self {
        Self {
            service,
            store,
            catalog,
            prompt,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Analyze `input` and decide over the results.
    ///
    /// `stop` halts dispatch; in-flight paragraphs finish first.
    pub async fn run<S>(&self, input: S, stop: CancellationToken) -> Result<RunReport, RunFailure>
    where
        S: Stream<Item = ParagraphRecord> + Send + 'static,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let stats = Arc::new(RunStatistics::new());

        tracing::info!(
            run_id = %run_id,
            mode = %self.config.mode,
            concurrency = self.config.scheduler.concurrency,
            catalog_version = self.catalog.version(),
            prompt_version = self.prompt.version(),
            force = self.config.force,
            "Starting enumdiff run"
        );

        let cache = Arc::new(ResponseCache::new(Arc::clone(&self.store), self.config.force));
        let analyzer = Arc::new(AdaptiveAnalyzer::new(
            Arc::clone(&self.service),
            cache,
            Arc::clone(&self.catalog),
            self.prompt.clone(),
            AnalyzerSettings {
                mode: self.config.mode,
                escalation_threshold: self.config.policy.escalation_threshold,
                retry: self.config.retry.clone(),
            },
            Arc::clone(&stats),
        ));

        let scheduler = Scheduler::new(analyzer, self.config.scheduler.clone(), Arc::clone(&stats));

        let outcome = match scheduler.run(input, &stop).await {
            Ok(outcome) => outcome,
            Err(SchedulerFailure { error, analyses }) => {
                // Service failures were tallied per attempt already
                if let RunError::CacheUnavailable(_) = &error {
                    stats.record_error(ErrorKind::CacheUnavailable);
                }
                let statistics = stats.snapshot();
                tracing::error!(
                    run_id = %run_id,
                    error = %error,
                    completed = analyses.len(),
                    errors = ?statistics.errors,
                    "Run aborted"
                );
                return Err(RunFailure {
                    run_id,
                    error,
                    completed: analyses.len(),
                    statistics,
                });
            }
        };

        let mut analyses = outcome.analyses;
        analyses.sort_by(|a, b| a.doc_id.cmp(&b.doc_id).then_with(|| a.locator.cmp(&b.locator)));

        let (status, review_records, counts) = if outcome.stopped {
            tracing::warn!(
                run_id = %run_id,
                completed = analyses.len(),
                "Run stopped before all paragraphs were analyzed; skipping decisions"
            );
            (RunStatus::Stopped, Vec::new(), AggregationCounts::default())
        } else {
            let (records, counts) = self.decide(&analyses);
            (RunStatus::Completed, records, counts)
        };

        let statistics = stats.snapshot();
        tracing::info!(
            run_id = %run_id,
            status = ?status,
            paragraphs = analyses.len(),
            review_records = review_records.len(),
            service_calls = statistics.service_calls,
            cache_hits = statistics.cache_hits,
            escalations = statistics.escalations,
            "Run finished"
        );

        Ok(RunReport {
            run_id,
            status,
            started_at,
            finished_at: Utc::now(),
            analyses,
            review_records,
            counts,
            statistics,
        })
    }

    /// Aggregate, cluster and decide
    fn decide(&self, analyses: &[ParagraphAnalysis]) -> (Vec<ReviewRecord>, AggregationCounts) {
        let proposals: Vec<_> = analyses.iter().flat_map(|a| a.proposals.iter()).collect();
        let aggregation = aggregate(proposals.iter().copied());

        let mut counts = AggregationCounts {
            proposals: proposals.len(),
            groups: aggregation.groups.len(),
            ignored_proposals: aggregation.ignored,
            degraded_proposals: aggregation.degraded,
            empty_candidates: aggregation.empty,
            ..AggregationCounts::default()
        };

        let engine = ClusteringEngine::new(
            self.config.policy.similarity_metric,
            self.config.policy.similarity_threshold,
        );
        let clusters = engine.cluster(aggregation.groups);
        counts.clusters = clusters.len();

        let policy = DecisionPolicy::from_parameters(&self.config.policy);
        let mut records: Vec<ReviewRecord> = clusters
            .iter()
            .map(|cluster| policy.decide(cluster, &self.catalog))
            .collect();

        records.sort_by(|a, b| {
            a.vocabulary_type
                .cmp(&b.vocabulary_type)
                .then_with(|| b.doc_count.cmp(&a.doc_count))
                .then_with(|| a.candidate.cmp(&b.candidate))
        });

        (records, counts)
    }
}

impl RunReport {
    /// Review records carrying `decision`
    pub fn count_decisions(&self, decision: crate::models::Decision) -> usize {
        self.review_records.iter().filter(|r| r.decision == decision).count()
    }
}
