//! Error types for the waitlist mailer pipeline.
//!
//! The pipeline uses a single closed error taxonomy so every boundary
//! (dispatcher, replayer, webhook, admin API) classifies failures the same
//! way: validation and authorization fail fast and are never retried,
//! external-service failures carry a `retryable` flag and drive the
//! dead-letter path, and internal errors surface as a generic 500 without
//! leaking details.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// The main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input (email, name, locale, payload shape). Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body exceeded the fixed size cap.
    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge {
        /// Actual body size in bytes
        size: usize,
        /// Configured cap in bytes
        limit: usize,
    },

    /// Missing or malformed credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials present but not permitted (non-admin caller, bot filter).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Referenced record or entry does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation conflicts with current state (e.g. resend throttle).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Webhook signature verification failure. Logged for audit, never retried.
    #[error("signature verification failed: {0}")]
    Signature(String),

    /// Upstream dependency (email provider, document store) failure.
    #[error("external service error [{code}]: {message}")]
    ExternalService {
        /// Stable machine-readable code (e.g. `provider_http_500`)
        code: String,
        /// Human-readable description
        message: String,
        /// Whether the operation is worth retrying
        retryable: bool,
    },

    /// A circuit breaker rejected the call without invoking the dependency.
    #[error("circuit breaker open for {resource}")]
    BreakerOpen {
        /// Name of the protected resource
        resource: String,
    },

    /// Per-IP rate limit exceeded.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the current window resets
        retry_after_secs: u64,
    },

    /// Unexpected failure. Rendered as a generic message, details stay in logs.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a validation error from a string.
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Error::Validation(msg.into())
    }

    /// Create an internal error from a string.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Create a retryable external-service error.
    pub fn external<C: Into<String>, S: Into<String>>(code: C, msg: S) -> Self {
        Error::ExternalService {
            code: code.into(),
            message: msg.into(),
            retryable: true,
        }
    }

    /// Whether the failed operation is worth retrying (DLQ path).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ExternalService {
                retryable: true,
                ..
            } | Error::BreakerOpen { .. }
        )
    }

    /// Stable machine-readable code, used in responses and DLQ entries.
    pub fn code(&self) -> &str {
        match self {
            Error::Validation(_) => "validation",
            Error::PayloadTooLarge { .. } => "payload_too_large",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::Signature(_) => "invalid_signature",
            Error::ExternalService { code, .. } => code,
            Error::BreakerOpen { .. } => "breaker_open",
            Error::RateLimited { .. } => "rate_limited",
            Error::Internal(_) => "internal",
        }
    }

    /// HTTP status for rendering at the API boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Unauthorized(_) | Error::Signature(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            Error::BreakerOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Collapse dependency failures into an opaque internal error.
    ///
    /// The webhook contract promises a generic 500 for anything unexpected
    /// after the security checks; store or provider failures there must not
    /// leak upstream detail to the caller.
    pub fn into_internal(self) -> Self {
        match self {
            Error::ExternalService { code, message, .. } => {
                tracing::error!(code = %code, error = %message, "dependency failure hidden from response");
                Error::Internal(message)
            }
            Error::BreakerOpen { resource } => Error::Internal(format!("breaker open: {resource}")),
            other => other,
        }
    }
}

/// JSON body rendered for error responses: `{error, message?}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            // Internal details stay in the logs only.
            Error::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                ErrorBody {
                    error: "internal".to_string(),
                    message: Some("Internal server error".to_string()),
                }
            }
            other => ErrorBody {
                error: other.code().to_string(),
                message: Some(other.to_string()),
            },
        };
        (status, Json(body)).into_response()
    }
}
