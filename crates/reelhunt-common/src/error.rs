//! Unified error type for reelhunt.
//!
//! Every failure during resolution funnels into [`Error`]. Each variant maps to
//! a stable [`ErrorKind`] code (stored on failed jobs and returned to clients)
//! and to an HTTP status via [`Error::http_status`].

use crate::ids::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, serializable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    ValidationFailure,
    QuotaExceeded,
    AuthFailure,
    TransientNetwork,
    JobNotFound,
    CacheUnavailable,
    InvalidRequest,
    Database,
    Io,
    Internal,
}

impl ErrorKind {
    /// Snake-case code as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::ValidationFailure => "validation_failure",
            Self::QuotaExceeded => "quota_exceeded",
            Self::AuthFailure => "auth_failure",
            Self::TransientNetwork => "transient_network",
            Self::JobNotFound => "job_not_found",
            Self::CacheUnavailable => "cache_unavailable",
            Self::InvalidRequest => "invalid_request",
            Self::Database => "database",
            Self::Io => "io",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type covering every failure mode of source resolution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No candidate was found in any backend.
    #[error("No source found: {0}")]
    NotFound(String),

    /// Candidates were found but every one failed the quality gate.
    #[error("All {rejected} candidate(s) failed the quality gate")]
    ValidationFailure {
        /// Number of rejected candidates.
        rejected: usize,
    },

    /// The cloud backend refused the request because of quota or rate limits.
    #[error("Cloud backend quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The cloud backend rejected our credentials.
    #[error("Cloud backend authentication failed: {0}")]
    AuthFailure(String),

    /// A retryable network failure (timeout, connection reset, 5xx).
    #[error("Network error: {0}")]
    TransientNetwork(String),

    /// The job is unknown, most likely reaped after its client stopped polling.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// The resolution cache could not be read or written.
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// The caller sent a malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new JobNotFound error.
    pub fn job_not_found(id: JobId) -> Self {
        Self::JobNotFound(id)
    }

    /// Create a new Database error.
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new InvalidRequest error.
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new TransientNetwork error.
    pub fn transient<S: Into<String>>(msg: S) -> Self {
        Self::TransientNetwork(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// The stable code for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ValidationFailure { .. } => ErrorKind::ValidationFailure,
            Self::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            Self::AuthFailure(_) => ErrorKind::AuthFailure,
            Self::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Self::JobNotFound(_) => ErrorKind::JobNotFound,
            Self::CacheUnavailable(_) => ErrorKind::CacheUnavailable,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Database(_) => ErrorKind::Database,
            Self::Io(_) => ErrorKind::Io,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the operation may succeed if attempted again.
    ///
    /// Only network hiccups are retried; quota and auth rejections are terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }

    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::ValidationFailure { .. } => 422,
            Self::QuotaExceeded(_) => 429,
            Self::AuthFailure(_) => 502,
            Self::TransientNetwork(_) => 503,
            Self::JobNotFound(_) => 404,
            Self::CacheUnavailable(_) => 503,
            Self::InvalidRequest(_) => 400,
            Self::Database(_) => 500,
            Self::Io(_) => 500,
            Self::Internal(_) => 500,
        }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
