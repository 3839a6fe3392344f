//! Error types used by the transport and by caller-supplied operations.
//!
//! This module defines two types:
//!
//! - [`TransportError`]: failures of the retrying HTTP transport.
//! - [`OpError`]: the failure returned by any [`Operation`](crate::Operation)
//!   or [`Executor`](crate::Executor). It optionally carries an explicit
//!   [`ErrorCategory`], status code and retry hint; when those are absent the
//!   [`ErrorClassifier`](crate::ErrorClassifier) falls back to message patterns.
//!
//! Both provide `as_label` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

use crate::classify::ErrorCategory;

/// # Errors produced by the retrying transport.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The attempt exceeded its per-attempt timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The server kept answering with a retryable status until retries ran out.
    #[error("server returned retryable status {status}")]
    Status {
        /// Last observed status code.
        status: u16,
        /// Value of the `Retry-After` header, if the server sent one.
        retry_after: Option<Duration>,
    },

    /// The connection could not be established (refused, unreachable, DNS).
    #[error("connection refused: {message}")]
    Connect {
        /// Underlying error description.
        message: String,
    },

    /// The connection was reset or dropped mid-request.
    #[error("connection reset: {message}")]
    Reset {
        /// Underlying error description.
        message: String,
    },

    /// Any other request failure (invalid URL, redirect loop, body error).
    /// Never retried.
    #[error("request failed: {message}")]
    Request {
        /// Underlying error description.
        message: String,
    },

    /// The connection pool was closed while the request waited for a slot.
    #[error("connection pool closed")]
    Closed,
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use resilvisor::TransportError;
    /// use std::time::Duration;
    ///
    /// let err = TransportError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "transport_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Timeout { .. } => "transport_timeout",
            TransportError::Status { .. } => "transport_status",
            TransportError::Connect { .. } => "transport_connect",
            TransportError::Reset { .. } => "transport_reset",
            TransportError::Request { .. } => "transport_request",
            TransportError::Closed => "transport_closed",
        }
    }

    /// Indicates whether another attempt may succeed.
    ///
    /// Returns `true` for timeouts, refused/reset connections and retryable
    /// statuses; `false` for definitive request errors.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout { .. }
                | TransportError::Status { .. }
                | TransportError::Connect { .. }
                | TransportError::Reset { .. }
        )
    }

    /// Structured category of this failure.
    pub fn category(&self) -> ErrorCategory {
        match self {
            TransportError::Timeout { .. } => ErrorCategory::Timeout,
            TransportError::Status { status: 429, .. } => ErrorCategory::RateLimited,
            TransportError::Status { status, .. } if *status >= 500 => ErrorCategory::ServerError,
            TransportError::Status { .. } => ErrorCategory::Unknown,
            TransportError::Connect { .. } => ErrorCategory::ConnectionRefused,
            TransportError::Reset { .. } => ErrorCategory::ConnectionReset,
            TransportError::Request { .. } | TransportError::Closed => ErrorCategory::Unknown,
        }
    }
}

/// # Failure of a caller-supplied operation.
///
/// Construct with [`OpError::new`] (opaque, classified by message) and refine
/// with the `with_*` builders when the caller knows more.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use resilvisor::{ErrorCategory, OpError};
///
/// let err = OpError::new("quota exceeded")
///     .with_category(ErrorCategory::RateLimited)
///     .with_retry_after(Duration::from_secs(2));
/// assert_eq!(err.category, Some(ErrorCategory::RateLimited));
/// assert_eq!(err.to_string(), "quota exceeded");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct OpError {
    /// Human-readable description.
    pub message: String,
    /// Explicit category, if known.
    pub category: Option<ErrorCategory>,
    /// HTTP status associated with the failure, if any.
    pub status: Option<u16>,
    /// Server-provided retry delay, if any.
    pub retry_after: Option<Duration>,
}

impl OpError {
    /// Creates an opaque error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category: None,
            status: None,
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self.category {
            Some(c) => c.as_label(),
            None => "op_error",
        }
    }
}

impl From<TransportError> for OpError {
    fn from(err: TransportError) -> Self {
        let mut op = OpError::new(err.to_string()).with_category(err.category());
        if let TransportError::Status {
            status,
            retry_after,
        } = err
        {
            op.status = Some(status);
            op.retry_after = retry_after;
        }
        op
    }
}

impl From<String> for OpError {
    fn from(message: String) -> Self {
        OpError::new(message)
    }
}

impl From<&str> for OpError {
    fn from(message: &str) -> Self {
        OpError::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_carries_structured_fields() {
        let op: OpError = TransportError::Status {
            status: 429,
            retry_after: Some(Duration::from_secs(7)),
        }
        .into();
        assert_eq!(op.category, Some(ErrorCategory::RateLimited));
        assert_eq!(op.status, Some(429));
        assert_eq!(op.retry_after, Some(Duration::from_secs(7)));
    }

    #[test]
    fn request_errors_are_not_transient() {
        let err = TransportError::Request {
            message: "relative URL without a base".into(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.category(), ErrorCategory::Unknown);
        assert!(TransportError::Reset {
            message: "peer".into()
        }
        .is_transient());
    }

    #[test]
    fn server_status_maps_to_server_error() {
        let err = TransportError::Status {
            status: 503,
            retry_after: None,
        };
        assert_eq!(err.category(), ErrorCategory::ServerError);
        assert_eq!(err.as_label(), "transport_status");
    }
}
