//! Error types for the resilience layer
//!
//! Provides unified error handling using thiserror.
//!
//! Two levels exist: [`ServiceError`] is what a provider operation
//! (fact-check, LLM, embedding, vector search) fails with, and
//! [`ResilienceError`] is what this layer reports to its callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Service Error Enum ==
/// Tagged failure of an outbound provider call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Connection could not be established or was reset
    #[error("Network error: {0}")]
    Network(String),

    /// The provider itself reported a timeout
    #[error("Provider timeout: {0}")]
    Timeout(String),

    /// Non-success HTTP status returned by the provider
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// Credentials missing, invalid or lacking permission
    #[error("Authorization failed: {0}")]
    Auth(String),

    /// Provider answered with something that could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    // == Is Retryable ==
    /// Default retry eligibility.
    ///
    /// Server-side (5xx), throttling (429), network and timeout failures are
    /// transient. Authorization failures and other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Network(_) | ServiceError::Timeout(_) => true,
            ServiceError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            ServiceError::Auth(_) | ServiceError::InvalidResponse(_) => false,
        }
    }

    /// Short machine-readable tag for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Network(_) => "network",
            ServiceError::Timeout(_) => "timeout",
            ServiceError::HttpStatus { .. } => "http_status",
            ServiceError::Auth(_) => "auth",
            ServiceError::InvalidResponse(_) => "invalid_response",
        }
    }
}

// == Resilience Error Enum ==
/// Unified error type for the resilience layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResilienceError {
    /// Request context is malformed; never retried
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Admission denied for a service
    #[error("Rate limit exceeded for '{service}', retry after {retry_after_ms}ms")]
    RateLimitExceeded { service: String, retry_after_ms: u64 },

    /// Operation did not settle within its budget
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Every attempt failed with a retryable error
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: ServiceError,
    },

    /// Provider failure surfaced as-is
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Cache failure; callers treat it as a miss
    #[error("Cache error: {0}")]
    Cache(String),

    /// Named resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Pending request was dropped before it produced a result
    #[error("Request cancelled: {0}")]
    Cancelled(String),

    /// Configuration value could not be used
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Persistence collaborator failed
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ResilienceError {
    // == Root Cause ==
    /// Unwraps retry exhaustion into the underlying provider error so callers
    /// can branch on the error class.
    pub fn into_root_cause(self) -> Self {
        match self {
            ResilienceError::RetryExhausted { last, .. } => ResilienceError::Service(last),
            other => other,
        }
    }

    /// Short machine-readable tag for logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ResilienceError::Validation(_) => "validation",
            ResilienceError::RateLimitExceeded { .. } => "rate_limited",
            ResilienceError::Timeout { .. } => "timeout",
            ResilienceError::RetryExhausted { .. } => "retry_exhausted",
            ResilienceError::Service(e) => e.kind(),
            ResilienceError::Cache(_) => "cache",
            ResilienceError::NotFound(_) => "not_found",
            ResilienceError::Cancelled(_) => "cancelled",
            ResilienceError::Config(_) => "config",
            ResilienceError::Persistence(_) => "persistence",
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ResilienceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ResilienceError::Validation(_) | ResilienceError::Config(_) => StatusCode::BAD_REQUEST,
            ResilienceError::NotFound(_) => StatusCode::NOT_FOUND,
            ResilienceError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ResilienceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ResilienceError::RetryExhausted { .. } | ResilienceError::Service(_) => {
                StatusCode::BAD_GATEWAY
            }
            ResilienceError::Cache(_)
            | ResilienceError::Cancelled(_)
            | ResilienceError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string(), self.kind()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the resilience layer.
pub type Result<T> = std::result::Result<T, ResilienceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_retryable() {
        let err = ServiceError::HttpStatus {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(err.is_retryable());
        assert!(ServiceError::Network("reset".to_string()).is_retryable());
        assert!(ServiceError::Timeout("slow".to_string()).is_retryable());
    }

    #[test]
    fn test_auth_errors_are_not_retryable() {
        assert!(!ServiceError::Auth("bad key".to_string()).is_retryable());
        for status in [400, 401, 403, 404] {
            let err = ServiceError::HttpStatus {
                status,
                message: String::new(),
            };
            assert!(!err.is_retryable(), "status {} must not retry", status);
        }
    }

    #[test]
    fn test_into_root_cause_unwraps_exhaustion() {
        let err = ResilienceError::RetryExhausted {
            attempts: 3,
            last: ServiceError::Network("down".to_string()),
        };
        assert_eq!(
            err.into_root_cause(),
            ResilienceError::Service(ServiceError::Network("down".to_string()))
        );
    }

    #[test]
    fn test_rate_limit_response_status() {
        let err = ResilienceError::RateLimitExceeded {
            service: "llm".to_string(),
            retry_after_ms: 250,
        };
        assert_eq!(err.into_response().status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
