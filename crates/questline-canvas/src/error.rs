//! Error types for the Canvas API seam.

use thiserror::Error;

/// Errors produced by Canvas API calls and the resource map layer.
///
/// The retryable/terminal split drives the deployment retry loop:
/// [`RateLimited`](CanvasError::RateLimited) and
/// [`Transient`](CanvasError::Transient) are retried with backoff, everything
/// else is terminal for the entity that triggered it.
#[derive(Error, Debug)]
pub enum CanvasError {
    /// Canvas throttled the request (HTTP 403/429 with throttle headers).
    #[error("rate limited by Canvas (retry-after: {retry_after:?}s)")]
    RateLimited {
        /// Seconds to wait, from the `Retry-After` header when present.
        retry_after: Option<f64>,
    },

    /// Transport failure, timeout, or 5xx response. Retryable.
    #[error("transient Canvas error: {0}")]
    Transient(String),

    /// Authentication or authorization failure (401/403 without throttle headers).
    #[error("Canvas permission denied: {message}")]
    Permission { message: String },

    /// Canvas rejected the request payload (400/404/422). Terminal per entity.
    #[error("Canvas rejected payload (HTTP {status}): {message}")]
    SchemaRejected { status: u16, message: String },

    /// All retry attempts for a call were exhausted.
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Unexpected or unparseable response body.
    #[error("unexpected Canvas response: {0}")]
    UnexpectedResponse(String),

    /// A digest string failed validation (not 64 lowercase hex chars).
    #[error("invalid content digest: {digest}")]
    InvalidDigest { digest: String },

    /// Serialization failure
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource map file I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CanvasError {
    /// Whether the deployment retry loop should retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CanvasError::RateLimited { .. } | CanvasError::Transient(_)
        )
    }
}

/// Result type for Canvas seam operations.
pub type CanvasResult<T> = std::result::Result<T, CanvasError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_is_retryable() {
        let err = CanvasError::RateLimited {
            retry_after: Some(2.0),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_transient_is_retryable() {
        assert!(CanvasError::Transient("connection reset".into()).is_retryable());
    }

    #[test]
    fn test_terminal_errors_are_not_retryable() {
        let permission = CanvasError::Permission {
            message: "invalid token".into(),
        };
        let schema = CanvasError::SchemaRejected {
            status: 422,
            message: "name is required".into(),
        };
        assert!(!permission.is_retryable());
        assert!(!schema.is_retryable());
    }

    #[test]
    fn test_schema_rejected_display_includes_status() {
        let err = CanvasError::SchemaRejected {
            status: 422,
            message: "points_possible must be positive".into(),
        };
        assert!(err.to_string().contains("422"));
        assert!(err.to_string().contains("points_possible"));
    }
}
