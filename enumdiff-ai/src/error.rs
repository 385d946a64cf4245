//! Error types for enumdiff-ai
//!
//! Three layers, from the outside in:
//! - [`ServiceError`]: one failed call to the analysis service, classified as
//!   transient, permanent or fatal
//! - [`CacheError`]: the durable response cache could not be read or written
//! - [`RunError`]: a failure that aborts the whole run

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Analysis service response failed boundary validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedResponse {
    /// Service returned no content at all
    #[error("empty response content")]
    Empty,

    /// Body or content is not the expected JSON document
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),

    /// Envelope lacks a required field
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A proposal carries a value outside the schema
    #[error("proposal {index}: invalid {field} `{value}`")]
    InvalidValue {
        index: usize,
        field: &'static str,
        value: String,
    },
}

/// Failure of a single analysis service call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    /// Request exceeded its timeout
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// HTTP 429
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// HTTP 408 or 5xx
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Response failed validation
    #[error("malformed response: {0}")]
    Malformed(#[from] MalformedResponse),

    /// Other 4xx: this request will never succeed, but others may
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// HTTP 401/403
    #[error("authentication failed ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// HTTP 402 (insufficient balance / quota)
    #[error("quota exhausted ({status}): {message}")]
    QuotaExceeded { status: u16, message: String },
}

/// How the retry layer treats a [`ServiceError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retry with backoff
    Transient,
    /// Give up on this request immediately, run continues
    Permanent,
    /// Halt the run; every subsequent call would fail the same way
    Fatal,
}

/// Error kinds tallied in the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Network,
    RateLimited,
    ServerError,
    MalformedResponse,
    Rejected,
    Authentication,
    Quota,
    CacheUnavailable,
}

impl ErrorKind {
    /// All kinds, in summary order
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::Timeout,
        ErrorKind::Network,
        ErrorKind::RateLimited,
        ErrorKind::ServerError,
        ErrorKind::MalformedResponse,
        ErrorKind::Rejected,
        ErrorKind::Authentication,
        ErrorKind::Quota,
        ErrorKind::CacheUnavailable,
    ];

    /// Position in [`ErrorKind::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::ServerError => "server_error",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Rejected => "rejected",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Quota => "quota",
            ErrorKind::CacheUnavailable => "cache_unavailable",
        }
    }
}

impl ServiceError {
    /// Classify for retry purposes
    pub fn class(&self) -> FailureClass {
        match self {
            ServiceError::Timeout
            | ServiceError::Network(_)
            | ServiceError::RateLimited { .. }
            | ServiceError::Server { .. }
            | ServiceError::Malformed(_) => FailureClass::Transient,
            ServiceError::Rejected { .. } => FailureClass::Permanent,
            ServiceError::Unauthorized { .. } | ServiceError::QuotaExceeded { .. } => {
                FailureClass::Fatal
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Timeout => ErrorKind::Timeout,
            ServiceError::Network(_) => ErrorKind::Network,
            ServiceError::RateLimited { .. } => ErrorKind::RateLimited,
            ServiceError::Server { .. } => ErrorKind::ServerError,
            ServiceError::Malformed(_) => ErrorKind::MalformedResponse,
            ServiceError::Rejected { .. } => ErrorKind::Rejected,
            ServiceError::Unauthorized { .. } => ErrorKind::Authentication,
            ServiceError::QuotaExceeded { .. } => ErrorKind::Quota,
        }
    }

    /// Server-provided delay hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ServiceError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Durable cache failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(String),

    #[error("cache I/O error: {0}")]
    Io(String),
}

impl CacheError {
    /// SQLite reports writer contention as "database is locked"
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, CacheError::Database(msg) if msg.contains("database is locked"))
    }
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        CacheError::Database(err.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(err.to_string())
    }
}

/// Run-level failure: the run stops, no further paragraphs are dispatched
#[derive(Debug, Error)]
pub enum RunError {
    /// Authentication/authorization/quota failure from the analysis service
    #[error("fatal analysis service error while analyzing {doc_id}:{locator}: {error}")]
    FatalService {
        error: ServiceError,
        doc_id: String,
        locator: String,
    },

    /// Response cache could not be read or written
    #[error("response cache unavailable: {0}")]
    CacheUnavailable(#[from] CacheError),

    /// Input, configuration or output failure
    #[error(transparent)]
    Common(#[from] enumdiff_common::Error),
}

impl RunError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RunError::FatalService { error, .. } => Some(error.kind()),
            RunError::CacheUnavailable(_) => Some(ErrorKind::CacheUnavailable),
            RunError::Common(_) => None,
        }
    }
}
