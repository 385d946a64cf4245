//! Fixtures: catalogs, paragraphs, response bodies and cache stores

use async_trait::async_trait;
use enumdiff_ai::cache::{CacheEntry, CacheStore, Fingerprint, SqliteStore};
use enumdiff_ai::db::init_cache_pool;
use enumdiff_ai::models::{ParagraphRecord, VocabularyCatalog};
use enumdiff_ai::services::{AnalysisService, PromptTemplate, RetryPolicy};
use enumdiff_ai::{CacheError, Pipeline, PipelineConfig, RunFailure, RunReport};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Catalog with the three vocabulary types
pub fn standard_catalog() -> Arc<VocabularyCatalog> {
    let catalog = VocabularyCatalog::from_json_str(
        r#"{
            "aktivitaet": ["Reiten", "Zelten", "Baden"],
            "zone": ["Kernzone", "Pflegezone"],
            "ort": ["Uferbereich", "Wege"]
        }"#,
    )
    .unwrap();
    Arc::new(catalog)
}

pub fn paragraph(doc_id: &str, locator: &str, text: &str) -> ParagraphRecord {
    ParagraphRecord::new(doc_id, locator, text)
}

/// One proposal object as the service would emit it
pub fn proposal(ty: &str, candidate: &str, decision: &str, confidence: f64) -> Value {
    json!({
        "type": ty,
        "candidate": candidate,
        "decision": decision,
        "reason": format!("{} erwähnt", candidate),
        "citation": format!("... {} ...", candidate),
        "confidence": confidence,
    })
}

/// Message content wrapping the given proposals
pub fn response_content(proposals: Vec<Value>) -> String {
    json!({ "proposals": proposals }).to_string()
}

/// Millisecond backoffs so retry tests stay fast
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        multiplier: 2.0,
    }
}

pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        retry: fast_retry(),
        ..PipelineConfig::default()
    }
}

pub fn pipeline(
    service: Arc<dyn AnalysisService>,
    store: Arc<dyn CacheStore>,
    config: PipelineConfig,
) -> Pipeline {
    Pipeline::new(
        service,
        store,
        standard_catalog(),
        PromptTemplate::builtin(),
        config,
    )
}

/// Run over an in-memory list without an external stop
pub async fn run_all(
    pipeline: &Pipeline,
    paragraphs: Vec<ParagraphRecord>,
) -> Result<RunReport, RunFailure> {
    pipeline
        .run(futures::stream::iter(paragraphs), CancellationToken::new())
        .await
}

/// SQLite-backed store in a temp dir; keep the TempDir alive for the test
pub async fn temp_sqlite_store() -> (TempDir, Arc<SqliteStore>) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_cache_pool(&temp_dir.path().join("cache.sqlite"))
        .await
        .unwrap();
    (temp_dir, Arc::new(SqliteStore::new(pool)))
}

/// Store whose every operation fails like a broken database file
pub struct FailingStore;

#[async_trait]
impl CacheStore for FailingStore {
    async fn lookup(&self, _fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        Err(CacheError::Database("disk I/O error".to_string()))
    }

    async fn store(&self, _fingerprint: &Fingerprint, _payload: &str) -> Result<(), CacheError> {
        Err(CacheError::Database("disk I/O error".to_string()))
    }
}
