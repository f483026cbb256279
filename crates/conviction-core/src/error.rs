//! Error taxonomy for capability calls and persistence.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed classification for failed capability calls.
///
/// Every failure that leaves the executor carries exactly one of these codes.
/// Retry decisions are made from the code alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Upstream throttled us. Retryable after a delay.
    RateLimited,
    /// No data exists upstream for the requested entity.
    NotFound,
    /// The call exceeded its deadline. Retryable.
    Timeout,
    /// Credentials rejected. Never retryable.
    AuthFailed,
    /// Upstream refuses to serve us, or the capability is disabled.
    Blocked,
    /// The response arrived but could not be understood.
    ParseError,
    /// An unrecognized capability name, or anything that fits no other
    /// bucket.
    Unknown,
}

impl ErrorCode {
    /// Whether a retry of the same call may reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::AuthFailed => "auth_failed",
            Self::Blocked => "blocked",
            Self::ParseError => "parse_error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a provider while talking to its upstream.
///
/// Providers report what happened; classification into [`ErrorCode`] is done
/// once, here, so every adapter maps the same way.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("upstream throttled the request")]
    Throttled,
    #[error("no data found for the requested entity")]
    NotFound,
    #[error("request timed out")]
    Timeout,
    #[error("authentication rejected by upstream")]
    Auth,
    #[error("access blocked by upstream")]
    Blocked,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("{0}")]
    Other(String),
}

impl SourceError {
    /// Map an HTTP status to the matching variant.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::Throttled,
            401 | 403 => Self::Auth,
            404 => Self::NotFound,
            451 => Self::Blocked,
            other => Self::Status(other),
        }
    }

    /// Classify into the closed taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Throttled => ErrorCode::RateLimited,
            Self::NotFound => ErrorCode::NotFound,
            Self::Timeout => ErrorCode::Timeout,
            Self::Auth => ErrorCode::AuthFailed,
            Self::Blocked => ErrorCode::Blocked,
            Self::Malformed(_) => ErrorCode::ParseError,
            Self::Transport(_) | Self::Status(_) | Self::Other(_) => ErrorCode::Unknown,
        }
    }
}

/// Terminal error returned to executor callers.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{capability} failed ({code}): {message}")]
pub struct ToolError {
    /// Wire name of the capability that failed.
    pub capability: String,
    pub code: ErrorCode,
    pub message: String,
    /// Attempts consumed, including the first call.
    pub attempts: u32,
}

impl ToolError {
    pub fn new(capability: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            code,
            message: message.into(),
            attempts: 1,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// A name that resolves to no registered capability.
    ///
    /// Carries [`ErrorCode::Unknown`] so a bad name is never mistaken for an
    /// entity missing upstream.
    pub fn unknown_capability(name: &str) -> Self {
        Self::new(name, ErrorCode::Unknown, "no such capability registered")
    }

    /// A capability whose effective configuration disables it.
    pub fn disabled(name: &str) -> Self {
        Self::new(name, ErrorCode::Blocked, "capability is disabled")
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

/// Persistence-layer failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("store backend failure: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rate_limited_and_timeout_are_retryable() {
        assert!(ErrorCode::RateLimited.is_retryable());
        assert!(ErrorCode::Timeout.is_retryable());
        assert!(!ErrorCode::NotFound.is_retryable());
        assert!(!ErrorCode::AuthFailed.is_retryable());
        assert!(!ErrorCode::Blocked.is_retryable());
        assert!(!ErrorCode::ParseError.is_retryable());
        assert!(!ErrorCode::Unknown.is_retryable());
    }

    #[test]
    fn source_errors_classify_into_closed_codes() {
        assert_eq!(SourceError::Throttled.code(), ErrorCode::RateLimited);
        assert_eq!(SourceError::NotFound.code(), ErrorCode::NotFound);
        assert_eq!(SourceError::Timeout.code(), ErrorCode::Timeout);
        assert_eq!(SourceError::Auth.code(), ErrorCode::AuthFailed);
        assert_eq!(SourceError::Blocked.code(), ErrorCode::Blocked);
        assert_eq!(
            SourceError::Malformed("bad json".into()).code(),
            ErrorCode::ParseError
        );
        assert_eq!(
            SourceError::Transport("reset".into()).code(),
            ErrorCode::Unknown
        );
        assert_eq!(SourceError::Status(500).code(), ErrorCode::Unknown);
    }

    #[test]
    fn http_statuses_map_to_variants() {
        assert_eq!(SourceError::from_status(429).code(), ErrorCode::RateLimited);
        assert_eq!(SourceError::from_status(401).code(), ErrorCode::AuthFailed);
        assert_eq!(SourceError::from_status(403).code(), ErrorCode::AuthFailed);
        assert_eq!(SourceError::from_status(404).code(), ErrorCode::NotFound);
        assert_eq!(SourceError::from_status(451).code(), ErrorCode::Blocked);
        assert_eq!(SourceError::from_status(500).code(), ErrorCode::Unknown);
    }

    #[test]
    fn boundary_constructors_fix_their_codes() {
        let unknown = ToolError::unknown_capability("no_such_capability");
        assert_eq!(unknown.code, ErrorCode::Unknown);
        assert!(!unknown.is_retryable());

        let disabled = ToolError::disabled("news_digest");
        assert_eq!(disabled.code, ErrorCode::Blocked);
        assert!(!disabled.is_retryable());
    }

    #[test]
    fn tool_error_display_names_capability_and_code() {
        let err = ToolError::new("news_digest", ErrorCode::Timeout, "deadline exceeded")
            .with_attempts(3);
        let text = err.to_string();
        assert!(text.contains("news_digest"));
        assert!(text.contains("timeout"));
        assert_eq!(err.attempts, 3);
    }
}
