//! # enumdiff Common Library
//!
//! Shared code for the enumdiff workspace:
//! - Error types (`Error`, `Result`)
//! - TOML configuration model and config-file discovery
//! - Vocabulary text normalization
//! - Content hashing helpers

pub mod config;
pub mod error;
pub mod hash;
pub mod text;

pub use error::{Error, Result};
