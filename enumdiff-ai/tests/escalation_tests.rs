//! Adaptive escalation tests
//!
//! Auto mode answers with the chat tier first and hands uncertain paragraphs
//! to the reasoner tier. Fixed modes never switch tiers.

mod helpers;

use enumdiff_ai::cache::MemoryStore;
use enumdiff_ai::models::{AttemptSource, Decision, ModelTier, ProviderMode};
use enumdiff_ai::ServiceError;
use helpers::*;
use std::sync::Arc;

/// Chat answers with `chat`, reasoner answers with `reasoner`
fn tiered_service(chat: String, reasoner: String) -> ScriptedService {
    ScriptedService::new(move |request, _| match request.tier {
        ModelTier::Chat => Ok(chat.clone()),
        ModelTier::Reasoner => Ok(reasoner.clone()),
    })
}

fn config_for(mode: ProviderMode) -> enumdiff_ai::PipelineConfig {
    let mut config = fast_config();
    config.mode = mode;
    config
}

fn one_paragraph() -> Vec<enumdiff_ai::models::ParagraphRecord> {
    vec![paragraph("NSG-7", "§ 4 Nr. 12", "Das Befahren mit Stand-Up-Paddle-Boards ist verboten.")]
}

#[tokio::test]
async fn test_low_confidence_escalates_to_reasoner() {
    let service = Arc::new(tiered_service(
        response_content(vec![proposal("aktivitaet", "Paddeln", "ADD_NEW", 0.5)]),
        response_content(vec![proposal("aktivitaet", "Stand-Up-Paddling", "ADD_NEW", 0.9)]),
    ));
    let pipeline = pipeline(service.clone(), Arc::new(MemoryStore::new()), config_for(ProviderMode::Auto));

    let report = run_all(&pipeline, one_paragraph()).await.unwrap();

    assert_eq!(service.calls_for(ModelTier::Chat), 1);
    assert_eq!(service.calls_for(ModelTier::Reasoner), 1);

    let analysis = &report.analyses[0];
    assert!(analysis.escalated);
    assert_eq!(analysis.attempts.len(), 2);
    assert_eq!(analysis.attempts[0].tier, ModelTier::Chat);
    assert_eq!(analysis.attempts[1].tier, ModelTier::Reasoner);
    assert!(analysis.attempted(ModelTier::Chat));
    assert!(analysis.attempted(ModelTier::Reasoner));

    assert_eq!(analysis.proposals.len(), 1);
    let proposal = &analysis.proposals[0];
    assert_eq!(proposal.candidate, "Stand-Up-Paddling");
    assert_eq!(proposal.tier, ModelTier::Reasoner);
    assert!(proposal.escalated);
    assert_eq!(report.statistics.escalations, 1);
}

#[tokio::test]
async fn test_unsure_decision_escalates_despite_high_confidence() {
    let service = Arc::new(tiered_service(
        response_content(vec![proposal("zone", "Ruhezone", "UNSURE", 0.95)]),
        response_content(vec![proposal("zone", "Ruhezone", "ADD_NEW", 0.8)]),
    ));
    let pipeline = pipeline(service.clone(), Arc::new(MemoryStore::new()), config_for(ProviderMode::Auto));

    let report = run_all(&pipeline, one_paragraph()).await.unwrap();

    assert_eq!(service.calls_for(ModelTier::Reasoner), 1);
    assert!(report.analyses[0].escalated);
    assert_eq!(report.analyses[0].proposals[0].decision, Decision::AddNew);
}

#[tokio::test]
async fn test_confident_chat_answer_is_kept() {
    let service = Arc::new(tiered_service(
        response_content(vec![
            proposal("aktivitaet", "Paddeln", "ADD_NEW", 0.9),
            proposal("zone", "Kernzone", "IGNORE", 0.8),
        ]),
        response_content(vec![]),
    ));
    let pipeline = pipeline(service.clone(), Arc::new(MemoryStore::new()), config_for(ProviderMode::Auto));

    let report = run_all(&pipeline, one_paragraph()).await.unwrap();

    assert_eq!(service.calls_for(ModelTier::Reasoner), 0);
    let analysis = &report.analyses[0];
    assert!(!analysis.escalated);
    assert!(!analysis.attempted(ModelTier::Reasoner));
    assert!(analysis.proposals.iter().all(|p| p.tier == ModelTier::Chat && !p.escalated));
    assert_eq!(report.statistics.escalations, 0);
}

#[tokio::test]
async fn test_chat_mode_never_escalates() {
    let service = Arc::new(tiered_service(
        response_content(vec![proposal("aktivitaet", "Paddeln", "UNSURE", 0.2)]),
        response_content(vec![proposal("aktivitaet", "Paddeln", "ADD_NEW", 0.9)]),
    ));
    let pipeline = pipeline(service.clone(), Arc::new(MemoryStore::new()), config_for(ProviderMode::Chat));

    let report = run_all(&pipeline, one_paragraph()).await.unwrap();

    assert_eq!(service.calls_for(ModelTier::Chat), 1);
    assert_eq!(service.calls_for(ModelTier::Reasoner), 0);
    assert!(!report.analyses[0].escalated);
    assert_eq!(report.analyses[0].proposals[0].decision, Decision::Unsure);
}

#[tokio::test]
async fn test_reasoner_mode_uses_only_reasoner() {
    let service = Arc::new(tiered_service(
        response_content(vec![proposal("aktivitaet", "Paddeln", "ADD_NEW", 0.9)]),
        response_content(vec![proposal("aktivitaet", "Paddeln", "UNSURE", 0.3)]),
    ));
    let pipeline = pipeline(service.clone(), Arc::new(MemoryStore::new()), config_for(ProviderMode::Reasoner));

    let report = run_all(&pipeline, one_paragraph()).await.unwrap();

    assert_eq!(service.calls_for(ModelTier::Chat), 0);
    assert_eq!(service.calls_for(ModelTier::Reasoner), 1);
    let analysis = &report.analyses[0];
    assert!(!analysis.escalated);
    assert!(!analysis.attempted(ModelTier::Chat));
    assert_eq!(analysis.proposals[0].tier, ModelTier::Reasoner);
    assert!(!analysis.proposals[0].escalated);
}

#[tokio::test]
async fn test_reasoner_answer_is_adopted_even_if_less_confident() {
    let service = Arc::new(tiered_service(
        response_content(vec![proposal("aktivitaet", "Paddeln", "UNSURE", 0.6)]),
        response_content(vec![proposal("aktivitaet", "Paddeln", "UNSURE", 0.4)]),
    ));
    let pipeline = pipeline(service.clone(), Arc::new(MemoryStore::new()), config_for(ProviderMode::Auto));

    let report = run_all(&pipeline, one_paragraph()).await.unwrap();

    // One escalation at most, the reasoner answer is final
    assert_eq!(service.call_count(), 2);
    assert!(report.analyses[0].attempted(ModelTier::Reasoner));
    let proposal = &report.analyses[0].proposals[0];
    assert_eq!(proposal.tier, ModelTier::Reasoner);
    assert!((proposal.confidence - 0.4).abs() < 1e-9);
}

#[tokio::test]
async fn test_degraded_chat_answer_escalates() {
    let reasoner = response_content(vec![proposal("aktivitaet", "Paddeln", "ADD_NEW", 0.9)]);
    let service = Arc::new(ScriptedService::new(move |request, _| match request.tier {
        ModelTier::Chat => Err(ServiceError::Server {
            status: 503,
            message: "overloaded".to_string(),
        }),
        ModelTier::Reasoner => Ok(reasoner.clone()),
    }));
    let pipeline = pipeline(service.clone(), Arc::new(MemoryStore::new()), config_for(ProviderMode::Auto));

    let report = run_all(&pipeline, one_paragraph()).await.unwrap();

    // 1 attempt + 3 retries on chat, then the reasoner
    assert_eq!(service.calls_for(ModelTier::Chat), 4);
    assert_eq!(service.calls_for(ModelTier::Reasoner), 1);

    let analysis = &report.analyses[0];
    assert!(analysis.escalated);
    assert!(!analysis.is_degraded());
    assert_eq!(analysis.attempts[0].retries, 3);
    assert_eq!(analysis.proposals[0].candidate, "Paddeln");
    assert_eq!(report.statistics.degraded_attempts, 1);
}

#[tokio::test]
async fn test_escalated_paragraph_replays_from_cache() {
    let chat = response_content(vec![proposal("aktivitaet", "Paddeln", "ADD_NEW", 0.5)]);
    let reasoner = response_content(vec![proposal("aktivitaet", "Stand-Up-Paddling", "ADD_NEW", 0.9)]);
    let store = Arc::new(MemoryStore::new());

    let first_service = Arc::new(tiered_service(chat.clone(), reasoner.clone()));
    let first = pipeline(first_service.clone(), store.clone(), config_for(ProviderMode::Auto));
    run_all(&first, one_paragraph()).await.unwrap();
    assert_eq!(first_service.call_count(), 2);
    assert_eq!(store.len().await, 2);

    let second_service = Arc::new(tiered_service(chat, reasoner));
    let second = pipeline(second_service.clone(), store.clone(), config_for(ProviderMode::Auto));
    let report = run_all(&second, one_paragraph()).await.unwrap();

    assert_eq!(second_service.call_count(), 0);
    let analysis = &report.analyses[0];
    assert!(analysis.escalated);
    assert!(analysis.attempts.iter().all(|a| a.source == AttemptSource::CacheHit));
    assert_eq!(analysis.proposals[0].candidate, "Stand-Up-Paddling");
    assert_eq!(report.statistics.cache_hits, 2);
}
