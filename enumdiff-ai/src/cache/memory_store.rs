//! In-memory cache backend

use super::{CacheEntry, CacheStore, Fingerprint};
use crate::error::CacheError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local store; contents vanish with the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().await.get(fingerprint).cloned())
    }

    async fn store(&self, fingerprint: &Fingerprint, payload: &str) -> Result<(), CacheError> {
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            payload: payload.to_string(),
            created_at: Utc::now(),
        };
        self.entries.write().await.insert(fingerprint.clone(), entry);
        Ok(())
    }
}
