//! Adaptive analyzer: one paragraph in, candidate proposals out
//!
//! Each tier answer is resolved through the response cache, which only
//! invokes the service (with retry) on a miss. In `auto` mode an uncertain
//! chat answer is replaced by a reasoner answer. Escalation only ever goes
//! from chat to reasoner.

use crate::cache::{ComputeOutcome, Fingerprint, ResponseCache};
use crate::error::{RunError, ServiceError};
use crate::models::{
    AttemptOutcome, AttemptSource, CandidateProposal, ModelTier, ParagraphAnalysis,
    ParagraphRecord, ProviderMode, TierAttempt, TierResponse, VocabularyCatalog,
};
use crate::services::analysis_client::{AnalysisRequest, AnalysisService};
use crate::services::prompt::{user_message, PromptTemplate};
use crate::services::response_parser::parse_tier_response;
use crate::services::retry::{call_with_retry, RetryPolicy, RetryState};
use crate::workflow::statistics::RunStatistics;
use std::sync::Arc;

/// Analyzer knobs
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub mode: ProviderMode,
    /// Chat proposals below this confidence trigger escalation
    pub escalation_threshold: f64,
    pub retry: RetryPolicy,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            mode: ProviderMode::Auto,
            escalation_threshold: 0.65,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of one tier for one paragraph
struct TierRun {
    attempt: TierAttempt,
    proposals: Vec<CandidateProposal>,
}

pub struct AdaptiveAnalyzer {
    service: Arc<dyn AnalysisService>,
    cache: Arc<ResponseCache>,
    catalog: Arc<VocabularyCatalog>,
    prompt: PromptTemplate,
    /// Prompt with the catalog embedded, rendered once per run
    system_prompt: String,
    settings: AnalyzerSettings,
    stats: Arc<RunStatistics>,
}

impl AdaptiveAnalyzer {
    pub fn new(
        service: Arc<dyn AnalysisService>,
        cache: Arc<ResponseCache>,
        catalog: Arc<VocabularyCatalog>,
        prompt: PromptTemplate,
        settings: AnalyzerSettings,
        stats: Arc<RunStatistics>,
    ) -> Self {
        let system_prompt = prompt.render_system(&catalog);
        Self {
            service,
            cache,
            catalog,
            prompt,
            system_prompt,
            settings,
            stats,
        }
    }

    pub fn mode(&self) -> ProviderMode {
        self.settings.mode
    }

    /// Analyze one paragraph.
    ///
    /// Service failures that survive the retry budget degrade the tier to
    /// UNSURE placeholders. Only fatal service errors and cache failures are
    /// returned as errors.
    pub async fn analyze(&self, paragraph: &ParagraphRecord) -> Result<ParagraphAnalysis, RunError> {
        let first_tier = match self.settings.mode {
            ProviderMode::Reasoner => ModelTier::Reasoner,
            ProviderMode::Chat | ProviderMode::Auto => ModelTier::Chat,
        };

        let first = self.run_tier(paragraph, first_tier).await?;

        let uncertain = first
            .proposals
            .iter()
            .any(|p| p.needs_escalation(self.settings.escalation_threshold));

        if self.settings.mode != ProviderMode::Auto || !uncertain {
            return Ok(ParagraphAnalysis {
                doc_id: paragraph.doc_id.clone(),
                locator: paragraph.locator.clone(),
                proposals: first.proposals,
                attempts: vec![first.attempt],
                escalated: false,
            });
        }

        tracing::debug!(
            doc_id = %paragraph.doc_id,
            locator = %paragraph.locator,
            "Escalating uncertain chat answer to reasoner"
        );
        self.stats.record_escalation();

        let second = self.run_tier(paragraph, ModelTier::Reasoner).await?;
        let proposals = second
            .proposals
            .into_iter()
            .map(|mut p| {
                p.escalated = true;
                p
            })
            .collect();

        Ok(ParagraphAnalysis {
            doc_id: paragraph.doc_id.clone(),
            locator: paragraph.locator.clone(),
            proposals,
            attempts: vec![first.attempt, second.attempt],
            escalated: true,
        })
    }

    async fn run_tier(&self, paragraph: &ParagraphRecord, tier: ModelTier) -> Result<TierRun, RunError> {
        let text = paragraph.normalized_text();
        let fingerprint = Fingerprint::compute(
            &text,
            self.catalog.version(),
            tier,
            self.service.model_for(tier),
            self.prompt.version(),
        );

        let resolved = self
            .cache
            .resolve(&fingerprint, || self.compute(paragraph, &text, tier))
            .await?;

        match resolved.source {
            AttemptSource::CacheHit => self.stats.record_cache_hit(),
            AttemptSource::SharedInFlight => self.stats.record_shared(),
            AttemptSource::ServiceCall => {}
        }

        let retries = resolved.outcome.retries();
        match resolved.outcome {
            ComputeOutcome::Valid { response, .. } => {
                let proposals = self.attach(paragraph, tier, retries, response);
                Ok(TierRun {
                    attempt: TierAttempt {
                        tier,
                        source: resolved.source,
                        retries,
                        outcome: AttemptOutcome::Valid { proposals: proposals.len() },
                    },
                    proposals,
                })
            }
            ComputeOutcome::Degraded { reason, .. } => {
                self.stats.record_degraded();
                tracing::warn!(
                    doc_id = %paragraph.doc_id,
                    locator = %paragraph.locator,
                    tier = %tier,
                    reason = %reason,
                    "Analysis degraded to UNSURE"
                );
                let proposals = self
                    .catalog
                    .types()
                    .map(|ty| {
                        CandidateProposal::degraded(
                            &paragraph.doc_id,
                            &paragraph.locator,
                            ty,
                            tier,
                            retries,
                            &reason,
                        )
                    })
                    .collect();
                Ok(TierRun {
                    attempt: TierAttempt {
                        tier,
                        source: resolved.source,
                        retries,
                        outcome: AttemptOutcome::Degraded { reason },
                    },
                    proposals,
                })
            }
            ComputeOutcome::Fatal { error, .. } => Err(RunError::FatalService {
                error,
                doc_id: paragraph.doc_id.clone(),
                locator: paragraph.locator.clone(),
            }),
        }
    }

    /// Call the service with retry and validate the answer
    async fn compute(&self, paragraph: &ParagraphRecord, text: &str, tier: ModelTier) -> ComputeOutcome {
        let request = AnalysisRequest {
            tier,
            system_prompt: self.system_prompt.clone(),
            user_content: user_message(&self.system_prompt, text),
        };
        let operation = format!("{}:{} ({})", paragraph.doc_id, paragraph.locator, tier);

        let outcome = call_with_retry(&self.settings.retry, &operation, |attempt| {
            let request = &request;
            async move {
                tracing::debug!(
                    doc_id = %paragraph.doc_id,
                    locator = %paragraph.locator,
                    tier = %tier,
                    attempt,
                    "Calling analysis service"
                );
                let content = self.service.complete(request).await?;
                parse_tier_response(&content).map_err(ServiceError::from)
            }
        })
        .await;

        self.stats.record_service_call(outcome.attempts, &outcome.failures);
        let retries = outcome.retries();

        match outcome.state {
            RetryState::Success(response) => ComputeOutcome::Valid { response, retries },
            RetryState::Exhausted(error) => ComputeOutcome::Degraded {
                reason: error.to_string(),
                retries,
            },
            RetryState::Fatal(error) => ComputeOutcome::Fatal { error, retries },
        }
    }

    /// Attach provenance to a validated answer
    fn attach(
        &self,
        paragraph: &ParagraphRecord,
        tier: ModelTier,
        retries: u32,
        response: TierResponse,
    ) -> Vec<CandidateProposal> {
        response
            .proposals
            .into_iter()
            .map(|draft| CandidateProposal {
                doc_id: paragraph.doc_id.clone(),
                locator: paragraph.locator.clone(),
                vocabulary_type: draft.vocabulary_type,
                candidate: draft.candidate,
                decision: draft.decision,
                mapping_target: draft.mapping_target,
                justification: draft.justification,
                quote: draft.quote,
                confidence: draft.confidence,
                tier,
                escalated: false,
                retries,
            })
            .collect()
    }
}
