//! Response cache
//!
//! Content-addressable store of validated analysis answers keyed by a
//! request [`Fingerprint`]. Two layers:
//! - a durable [`CacheStore`] shared across runs (SQLite in production)
//! - a run-scoped claim table that makes concurrent identical requests share
//!   one computation, and memoizes successful results for the rest of the run
//!
//! Only valid answers are persisted. Degraded and fatal outcomes are handed
//! to the waiters of that claim and then forgotten, so a later request for
//! the same fingerprint tries again.

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;

use crate::error::{CacheError, ServiceError};
use crate::models::{AttemptSource, ModelTier, TierResponse};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use enumdiff_common::hash::{sha256_fields, short};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// SHA-256 key of one analysis request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint over everything that determines the answer: paragraph
    /// text, catalog version, model identity and prompt version
    pub fn compute(
        normalized_text: &str,
        catalog_version: &str,
        tier: ModelTier,
        model: &str,
        prompt_version: &str,
    ) -> Self {
        Self(sha256_fields([
            normalized_text,
            catalog_version,
            tier.as_str(),
            model,
            prompt_version,
        ]))
    }

    /// Wrap an existing hex digest (as read back from storage)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log fields
    pub fn short(&self) -> &str {
        short(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stored answer for one fingerprint
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    /// Serialized [`TierResponse`]
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// Durable storage backend
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert or replace the entry for `fingerprint`
    async fn store(&self, fingerprint: &Fingerprint, payload: &str) -> Result<(), CacheError>;
}

/// Result of computing one tier answer
#[derive(Debug, Clone, PartialEq)]
pub enum ComputeOutcome {
    /// Validated answer, persisted by the cache
    Valid { response: TierResponse, retries: u32 },
    /// Retries exhausted or request rejected; never persisted
    Degraded { reason: String, retries: u32 },
    /// Run-halting service failure; never persisted
    Fatal { error: ServiceError, retries: u32 },
}

impl ComputeOutcome {
    pub fn retries(&self) -> u32 {
        match self {
            ComputeOutcome::Valid { retries, .. }
            | ComputeOutcome::Degraded { retries, .. }
            | ComputeOutcome::Fatal { retries, .. } => *retries,
        }
    }

    fn is_valid(&self) -> bool {
        matches!(self, ComputeOutcome::Valid { .. })
    }
}

/// A resolved request and how it was served
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub source: AttemptSource,
    pub outcome: ComputeOutcome,
}

type Claim = Arc<OnceCell<ComputeOutcome>>;

/// Run-scoped response cache handed to every worker
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    /// Skip durable lookups (results are still stored)
    force: bool,
    claims: Mutex<HashMap<Fingerprint, Claim>>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, force: bool) -> Self {
        Self {
            store,
            force,
            claims: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_force(&self) -> bool {
        self.force
    }

    /// Resolve `fingerprint`, running `compute` only if no durable entry,
    /// in-flight claim or memoized result exists.
    ///
    /// Concurrent callers with the same fingerprint wait for the first
    /// caller's computation and receive its outcome as
    /// [`AttemptSource::SharedInFlight`]. A store failure is returned as
    /// [`CacheError`].
    pub async fn resolve<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        compute: F,
    ) -> Result<Resolved, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ComputeOutcome>,
    {
        let existing = self.claims.lock().await.get(fingerprint).cloned();

        if let Some(claim) = existing.as_ref() {
            if let Some(outcome) = claim.get() {
                return Ok(Resolved {
                    source: AttemptSource::SharedInFlight,
                    outcome: outcome.clone(),
                });
            }
        } else if !self.force {
            if let Some(response) = self.lookup_valid(fingerprint).await? {
                return Ok(Resolved {
                    source: AttemptSource::CacheHit,
                    outcome: ComputeOutcome::Valid { response, retries: 0 },
                });
            }
        }

        let claim = match existing {
            Some(claim) => claim,
            None => self
                .claims
                .lock()
                .await
                .entry(fingerprint.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone(),
        };

        let mut computed = false;
        let outcome = claim
            .get_or_init(|| {
                computed = true;
                compute()
            })
            .await
            .clone();

        if !computed {
            tracing::debug!(
                fingerprint = fingerprint.short(),
                "Reused in-flight result for identical request"
            );
            return Ok(Resolved {
                source: AttemptSource::SharedInFlight,
                outcome,
            });
        }

        if let ComputeOutcome::Valid { response, .. } = &outcome {
            let payload = serde_json::to_string(response)
                .map_err(|e| CacheError::Database(format!("Serialize cache payload failed: {}", e)))?;
            self.store.store(fingerprint, &payload).await?;
            tracing::debug!(fingerprint = fingerprint.short(), "Stored analysis result");
        } else {
            self.release(fingerprint, &claim).await;
        }

        Ok(Resolved {
            source: AttemptSource::ServiceCall,
            outcome,
        })
    }

    /// Durable lookup; an undecodable payload counts as a miss
    async fn lookup_valid(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<TierResponse>, CacheError> {
        let Some(entry) = self.store.lookup(fingerprint).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<TierResponse>(&entry.payload) {
            Ok(response) => {
                tracing::debug!(
                    fingerprint = fingerprint.short(),
                    created_at = %entry.created_at,
                    "Cache hit"
                );
                Ok(Some(response))
            }
            Err(e) => {
                tracing::warn!(
                    fingerprint = fingerprint.short(),
                    error = %e,
                    "Ignoring undecodable cache entry"
                );
                Ok(None)
            }
        }
    }

    /// Drop a non-valid claim so the fingerprint can be computed again
    async fn release(&self, fingerprint: &Fingerprint, claim: &Claim) {
        let mut claims = self.claims.lock().await;
        let same = claims
            .get(fingerprint)
            .map(|current| Arc::ptr_eq(current, claim))
            .unwrap_or(false);
        if same && !claim.get().map(ComputeOutcome::is_valid).unwrap_or(false) {
            claims.remove(fingerprint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Decision, ProposalDraft, VocabularyType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn response(candidate: &str) -> TierResponse {
        TierResponse {
            proposals: vec![ProposalDraft {
                vocabulary_type: VocabularyType::Activity,
                candidate: candidate.to_string(),
                decision: Decision::AddNew,
                mapping_target: None,
                justification: "genannt".to_string(),
                quote: "Drohnenflug ist verboten".to_string(),
                confidence: 0.9,
            }],
        }
    }

    fn fp(text: &str) -> Fingerprint {
        Fingerprint::compute(text, "v1", ModelTier::Chat, "deepseek-chat", "p1")
    }

    #[test]
    fn test_fingerprint_depends_on_every_field() {
        let base = fp("text");
        assert_eq!(base, fp("text"));
        assert_ne!(
            base,
            Fingerprint::compute("text", "v2", ModelTier::Chat, "deepseek-chat", "p1")
        );
        assert_ne!(
            base,
            Fingerprint::compute("text", "v1", ModelTier::Reasoner, "deepseek-chat", "p1")
        );
        assert_ne!(
            base,
            Fingerprint::compute("text", "v1", ModelTier::Chat, "other", "p1")
        );
        assert_ne!(
            base,
            Fingerprint::compute("text", "v1", ModelTier::Chat, "deepseek-chat", "p2")
        );
        assert_eq!(base.as_str().len(), 64);
        assert_eq!(base.short().len(), 12);
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::new(store.clone(), false);
        assert!(!cache.is_force());
        let key = fp("a");

        let first = cache
            .resolve(&key, || async {
                ComputeOutcome::Valid { response: response("Drohnenflug"), retries: 1 }
            })
            .await
            .unwrap();
        assert_eq!(first.source, AttemptSource::ServiceCall);
        assert_eq!(store.len().await, 1);

        // Fresh run over the same store
        let cache = ResponseCache::new(store, false);
        let second = cache
            .resolve(&key, || async { panic!("must not compute on a warm cache") })
            .await
            .unwrap();
        assert_eq!(second.source, AttemptSource::CacheHit);
        assert_eq!(
            second.outcome,
            ComputeOutcome::Valid { response: response("Drohnenflug"), retries: 0 }
        );
    }

    #[tokio::test]
    async fn test_force_skips_lookup_but_memoizes_within_run() {
        let store = Arc::new(MemoryStore::new());
        let key = fp("a");
        store.store(&key, &serde_json::to_string(&response("alt")).unwrap()).await.unwrap();

        let cache = ResponseCache::new(store.clone(), true);
        assert!(cache.is_force());
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            cache
                .resolve(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    ComputeOutcome::Valid { response: response("neu"), retries: 0 }
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stored = store.lookup(&key).await.unwrap().unwrap();
        assert!(stored.payload.contains("neu"));
    }

    #[tokio::test]
    async fn test_degraded_outcome_not_stored_or_memoized() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::new(store.clone(), false);
        let key = fp("a");
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let resolved = cache
                .resolve(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    ComputeOutcome::Degraded { reason: "timeout".into(), retries: 3 }
                })
                .await
                .unwrap();
            assert_eq!(resolved.source, AttemptSource::ServiceCall);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_identical_requests_share_one_computation() {
        let cache = Arc::new(ResponseCache::new(Arc::new(MemoryStore::new()), false));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = fp("same");

        let mut set = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let key = key.clone();
            set.spawn(async move {
                cache
                    .resolve(&key, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        ComputeOutcome::Valid { response: response("x"), retries: 0 }
                    })
                    .await
                    .unwrap()
                    .source
            });
        }

        let mut sources = Vec::new();
        while let Some(res) = set.join_next().await {
            sources.push(res.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            sources.iter().filter(|s| **s == AttemptSource::ServiceCall).count(),
            1
        );
        assert_eq!(
            sources.iter().filter(|s| **s == AttemptSource::SharedInFlight).count(),
            7
        );
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        let key = fp("a");
        store.store(&key, "not json").await.unwrap();

        let cache = ResponseCache::new(store, false);
        let resolved = cache
            .resolve(&key, || async {
                ComputeOutcome::Valid { response: response("y"), retries: 0 }
            })
            .await
            .unwrap();
        assert_eq!(resolved.source, AttemptSource::ServiceCall);
    }
}
