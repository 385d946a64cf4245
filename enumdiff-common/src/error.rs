//! Common error types for enumdiff

use thiserror::Error;

/// Common result type for enumdiff operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the enumdiff crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or input record
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
