//! Core error taxonomy.
//!
//! One error kind per failure class; the HTTP layer ([`crate::api::error`])
//! and the MCP layer convert these to their protocol-specific formats.

use thiserror::Error;

/// Result type for core operations.
pub type EngramResult<T> = Result<T, EngramError>;

/// Unified error type for engine, store, and pipeline operations.
#[derive(Debug, Error)]
pub enum EngramError {
    /// Schema or field-type violation; the message enumerates offending paths.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or bad API key.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Witness check failed. Retrieval endpoints prefer returning NotFound
    /// so existence is not leaked.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("rate limited; retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    /// Deadline expired. Safe to retry on reads, unsafe on writes.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Transient backend failure; retry with backoff.
    #[error("storage error: {0}")]
    Storage(String),

    /// Embedder or curator call failed.
    #[error("upstream error: {0}")]
    Upstream(String),
}

impl EngramError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound(format!("{entity} {id}"))
    }

    /// Stable machine-readable code for the `error.code` response field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout(_) => "timeout",
            Self::Storage(_) => "storage_error",
            Self::Upstream(_) => "upstream_error",
        }
    }

    /// HTTP status for this error kind.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::AlreadyExists(_) => 409,
            Self::RateLimited { .. } => 429,
            Self::Timeout(_) => 504,
            Self::Storage(_) => 503,
            Self::Upstream(_) => 502,
        }
    }
}

impl From<rusqlite::Error> for EngramError {
    fn from(e: rusqlite::Error) -> Self {
        EngramError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for EngramError {
    fn from(e: serde_json::Error) -> Self {
        EngramError::Storage(format!("serialization: {e}"))
    }
}

impl From<reqwest::Error> for EngramError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EngramError::Timeout(e.to_string())
        } else {
            EngramError::Upstream(e.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for EngramError {
    fn from(e: tokio::task::JoinError) -> Self {
        EngramError::Storage(format!("worker task failed: {e}"))
    }
}
