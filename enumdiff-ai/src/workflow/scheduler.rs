//! Bounded worker pool over the paragraph stream
//!
//! A feeder task moves paragraphs from the input stream into a bounded
//! channel; `concurrency` analyses run at once via `buffer_unordered`.
//! Results are collected in completion order. A stop request or the first
//! fatal error halts dispatch; analyses already in flight run to completion
//! (and are cached). A stop that arrives after the last paragraph was
//! dispatched leaves the run complete.

use crate::error::RunError;
use crate::models::{ParagraphAnalysis, ParagraphRecord, SchedulerParameters};
use crate::services::AdaptiveAnalyzer;
use crate::workflow::statistics::RunStatistics;
use futures::stream::{self, Stream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What the pool produced before it drained
#[derive(Debug)]
pub struct SchedulerOutcome {
    pub analyses: Vec<ParagraphAnalysis>,
    /// An external stop request left paragraphs undispatched
    pub stopped: bool,
}

/// Failure that halted the pool, with whatever completed before it
#[derive(Debug)]
pub struct SchedulerFailure {
    pub error: RunError,
    pub analyses: Vec<ParagraphAnalysis>,
}

pub struct Scheduler {
    analyzer: Arc<AdaptiveAnalyzer>,
    params: SchedulerParameters,
    stats: Arc<RunStatistics>,
}

impl Scheduler {
    pub fn new(
        analyzer: Arc<AdaptiveAnalyzer>,
        params: SchedulerParameters,
        stats: Arc<RunStatistics>,
    ) -> Self {
        Self {
            analyzer,
            params,
            stats,
        }
    }

    /// Analyze every paragraph of `input` until it ends, `stop` fires or a
    /// fatal error occurs
    pub async fn run<S>(
        &self,
        input: S,
        stop: &CancellationToken,
    ) -> Result<SchedulerOutcome, SchedulerFailure>
    where
        S: Stream<Item = ParagraphRecord> + Send + 'static,
    {
        let concurrency = self.params.concurrency.max(1);
        let (tx, rx) = mpsc::channel::<ParagraphRecord>(self.params.effective_queue_capacity());

        // Cancelled on stop or on the first fatal error
        let abort = stop.child_token();

        // Returns (paragraphs fed, input exhausted)
        let feeder_abort = abort.clone();
        let feeder = tokio::spawn(async move {
            let mut input = Box::pin(input);
            let mut fed = 0usize;
            loop {
                // An input that has already ended counts as exhausted even after abort
                let next = tokio::select! {
                    biased;
                    next = input.next() => next,
                    _ = feeder_abort.cancelled() => return (fed, false),
                };
                let Some(paragraph) = next else {
                    return (fed, true);
                };
                tokio::select! {
                    biased;
                    _ = feeder_abort.cancelled() => return (fed, false),
                    sent = tx.send(paragraph) => {
                        if sent.is_err() {
                            return (fed, false);
                        }
                        fed += 1;
                    }
                }
            }
        });
        let dispatched = Arc::new(AtomicUsize::new(0));

        tracing::info!(
            concurrency,
            queue_capacity = self.params.effective_queue_capacity(),
            "Starting analysis workers"
        );

        let queue = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|paragraph| (paragraph, rx))
        });

        let results: Vec<Result<ParagraphAnalysis, RunError>> = queue
            .take_until(abort.clone().cancelled_owned())
            .map(|paragraph| {
                let analyzer = Arc::clone(&self.analyzer);
                let stats = Arc::clone(&self.stats);
                let abort = abort.clone();
                let dispatched = Arc::clone(&dispatched);

                async move {
                    // Pulled before the abort took effect
                    if abort.is_cancelled() {
                        return None;
                    }

                    dispatched.fetch_add(1, Ordering::SeqCst);
                    stats.record_dispatched();
                    let result = analyzer.analyze(&paragraph).await;

                    match &result {
                        Ok(analysis) => {
                            let done = stats.record_completed();
                            tracing::debug!(
                                doc_id = %paragraph.doc_id,
                                locator = %paragraph.locator,
                                proposals = analysis.proposals.len(),
                                escalated = analysis.escalated,
                                "Paragraph analyzed"
                            );
                            if done % 50 == 0 {
                                tracing::info!(completed = done, "Analysis progress");
                            }
                        }
                        Err(e) => {
                            tracing::error!(
                                doc_id = %paragraph.doc_id,
                                locator = %paragraph.locator,
                                error = %e,
                                "Run-level failure, halting dispatch"
                            );
                            abort.cancel();
                        }
                    }

                    Some(result)
                }
            })
            .buffer_unordered(concurrency)
            .filter_map(futures::future::ready)
            .collect()
            .await;

        // Unblock the feeder if it is still waiting on a full queue
        abort.cancel();
        let (fed, exhausted) = match feeder.await {
            Ok((fed, exhausted)) => {
                tracing::debug!(fed, exhausted, "Paragraph feeder finished");
                (fed, exhausted)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Paragraph feeder task failed");
                (0, false)
            }
        };

        let dispatched = dispatched.load(Ordering::SeqCst);
        let drained = exhausted && dispatched == fed;
        let stopped = stop.is_cancelled() && !drained;
        if stop.is_cancelled() && drained {
            tracing::info!(dispatched, "Stop requested after the last paragraph was dispatched");
        }

        let mut analyses = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(analysis) => analyses.push(analysis),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => tracing::debug!(error = %e, "Additional run-level failure"),
            }
        }

        match first_error {
            Some(error) => Err(SchedulerFailure { error, analyses }),
            None => Ok(SchedulerOutcome {
                analyses,
                stopped,
            }),
        }
    }
}
