//! # Error classification.
//!
//! [`ErrorClassifier::classify`] maps an [`OpError`] to an [`ErrorContext`]:
//! a coarse [`ErrorCategory`] plus the retry hint the orchestrator should honor.
//! It is a pure function: no I/O, no shared state.
//!
//! ## Precedence
//! ```text
//! explicit category  (OpError::category, set by typed callers and TransportError)
//!   └─► status code  (429 → RateLimited, >= 500 → ServerError, anything else → Unknown)
//!         └─► message patterns (only when no status is attached)
//!               └─► Unknown
//! ```
//!
//! A status code is authoritative: a 404 whose message mentions a timeout is
//! still `Unknown`, so client errors are never retried by accident.
//!
//! Message patterns are a compatibility path for opaque third-party errors;
//! callers that can should attach a category instead.

use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::OpError;

/// `Retry-After: 5`, `retry-after=5`, `retry after 5s`.
static RETRY_AFTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry[-_ ]after\D{0,3}(\d+)").expect("retry-after pattern is valid")
});

/// Coarse failure taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Timeout,
    RateLimited,
    ConnectionRefused,
    ConnectionReset,
    ServerError,
    NetworkError,
    Unknown,
}

impl ErrorCategory {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::ConnectionRefused => "connection_refused",
            ErrorCategory::ConnectionReset => "connection_reset",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// `true` for every category except [`ErrorCategory::Unknown`].
    pub fn is_transient(&self) -> bool {
        !matches!(self, ErrorCategory::Unknown)
    }
}

/// One classified failure. Created per failed attempt, never retained.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorContext {
    pub category: ErrorCategory,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
    /// 1-based attempt number.
    pub attempt: u32,
    pub retry_after_hint: Option<Duration>,
    pub status_code: Option<u16>,
}

/// Stateless classifier.
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classifies `error` observed on `attempt` (1-based; `0` is bumped to `1`).
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use resilvisor::{ErrorCategory, ErrorClassifier, OpError};
    ///
    /// let ctx = ErrorClassifier::classify(
    ///     &OpError::new("HTTP 429 Too Many Requests, Retry-After: 5"),
    ///     1,
    /// );
    /// assert_eq!(ctx.category, ErrorCategory::RateLimited);
    /// assert_eq!(ctx.retry_after_hint, Some(Duration::from_secs(5)));
    /// ```
    pub fn classify(error: &OpError, attempt: u32) -> ErrorContext {
        let category = error.category.unwrap_or_else(|| match error.status {
            Some(status) => Self::from_status(status).unwrap_or(ErrorCategory::Unknown),
            None => Self::from_message(&error.message),
        });

        ErrorContext {
            category,
            message: error.message.clone(),
            occurred_at: Utc::now(),
            attempt: attempt.max(1),
            retry_after_hint: error
                .retry_after
                .or_else(|| Self::parse_retry_after(&error.message)),
            status_code: error.status,
        }
    }

    /// Category implied by a status code alone, if any.
    pub fn from_status(status: u16) -> Option<ErrorCategory> {
        match status {
            429 => Some(ErrorCategory::RateLimited),
            s if s >= 500 => Some(ErrorCategory::ServerError),
            _ => None,
        }
    }

    /// Category implied by message patterns.
    pub fn from_message(message: &str) -> ErrorCategory {
        let msg = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

        if has(&["timeout", "timed out"]) {
            ErrorCategory::Timeout
        } else if has(&["econnrefused", "connection refused"]) {
            ErrorCategory::ConnectionRefused
        } else if has(&["econnreset", "connection reset"]) {
            ErrorCategory::ConnectionReset
        } else if has(&["429", "too many"]) {
            ErrorCategory::RateLimited
        } else if has(&["network", "connection"]) {
            ErrorCategory::NetworkError
        } else {
            ErrorCategory::Unknown
        }
    }

    /// Extracts a whole-second delay following a `Retry-After` marker.
    pub fn parse_retry_after(message: &str) -> Option<Duration> {
        RETRY_AFTER
            .captures(message)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}
