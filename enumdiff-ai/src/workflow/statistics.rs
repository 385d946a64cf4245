//! Run counters shared by all workers
//!
//! Plain atomics: workers only ever increment, the summary reads a snapshot
//! once the pool has drained.

use crate::error::ErrorKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct RunStatistics {
    paragraphs_dispatched: AtomicUsize,
    paragraphs_completed: AtomicUsize,
    service_calls: AtomicUsize,
    retries: AtomicUsize,
    cache_hits: AtomicUsize,
    shared_results: AtomicUsize,
    escalations: AtomicUsize,
    degraded_attempts: AtomicUsize,
    errors: [AtomicUsize; ErrorKind::ALL.len()],
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatched(&self) {
        self.paragraphs_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the new completed count
    pub fn record_completed(&self) -> usize {
        self.paragraphs_completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// One retried service call: every attempt counts as a call, every
    /// failed attempt is tallied by kind
    pub fn record_service_call(&self, attempts: u32, failures: &[ErrorKind]) {
        let attempts = attempts as usize;
        self.service_calls.fetch_add(attempts, Ordering::Relaxed);
        self.retries
            .fetch_add(attempts.saturating_sub(1), Ordering::Relaxed);
        for kind in failures {
            self.record_error(*kind);
        }
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shared(&self) {
        self.shared_results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_escalation(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_degraded(&self) {
        self.degraded_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, kind: ErrorKind) {
        self.errors[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn service_calls(&self) -> usize {
        self.service_calls.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let errors = ErrorKind::ALL
            .iter()
            .map(|kind| (*kind, self.errors[kind.index()].load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect();

        StatisticsSnapshot {
            paragraphs_dispatched: self.paragraphs_dispatched.load(Ordering::Relaxed),
            paragraphs_completed: self.paragraphs_completed.load(Ordering::Relaxed),
            service_calls: self.service_calls.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            shared_results: self.shared_results.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            degraded_attempts: self.degraded_attempts.load(Ordering::Relaxed),
            errors,
        }
    }
}

/// Point-in-time copy of [`RunStatistics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub paragraphs_dispatched: usize,
    pub paragraphs_completed: usize,
    /// Every attempt against the service, retries included
    pub service_calls: usize,
    pub retries: usize,
    pub cache_hits: usize,
    /// Answers reused from a concurrent identical request or earlier in the run
    pub shared_results: usize,
    pub escalations: usize,
    pub degraded_attempts: usize,
    /// Failures per kind; kinds that never occurred are omitted
    pub errors: BTreeMap<ErrorKind, usize>,
}

impl StatisticsSnapshot {
    pub fn error_count(&self, kind: ErrorKind) -> usize {
        self.errors.get(&kind).copied().unwrap_or(0)
    }
}
