//! Test Helper Utilities
//!
//! Shared utilities for testing enumdiff-ai: a scripted analysis service,
//! response builders, catalog/paragraph fixtures and cache stores.

#![allow(dead_code)]

pub mod fixtures;
pub mod scripted_service;

// Re-export commonly used items
pub use fixtures::{
    fast_config, fast_retry, paragraph, pipeline, proposal, response_content, run_all,
    standard_catalog, temp_sqlite_store, FailingStore,
};
pub use scripted_service::{RecordedCall, ScriptedService};
