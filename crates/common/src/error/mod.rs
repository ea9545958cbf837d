//! Client-side error taxonomy.
//!
//! Every layer of the client core (cache, resilience, domain operations)
//! reports failures through [`ClientError`]. The [`ErrorClassification`]
//! trait drives the retry policies and the health scoring: retryability and
//! severity are properties of the error itself, not of the call site.

use std::time::Duration;

use thiserror::Error;

use crate::validation::{FieldError, ValidationError};

/// Type alias for results using [`ClientError`]
pub type ClientResult<T> = Result<T, ClientError>;

/// Severity levels for error classification and health penalties
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational, no action needed
    Info,
    /// Degraded but functional
    Warning,
    /// Operation failed, recovery possible
    Error,
    /// Operation failed, manual intervention likely
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "info"),
            ErrorSeverity::Warning => write!(f, "warning"),
            ErrorSeverity::Error => write!(f, "error"),
            ErrorSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Classification hooks consumed by retry policies and health scoring
pub trait ErrorClassification {
    /// Whether retrying the failed operation could succeed
    fn is_retryable(&self) -> bool;

    /// Severity of the failure
    fn severity(&self) -> ErrorSeverity;

    /// Whether the failure needs immediate attention
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Suggested minimum wait before a retry, when the source knows one
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Errors surfaced by the client core
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Rejected by an open circuit breaker before the operation ran.
    /// A policy decision, not an operation failure.
    #[error("circuit breaker open for operation '{operation}'")]
    CircuitOpen {
        operation: String,
        retry_after: Option<Duration>,
    },

    /// Transport or backend failure surfaced by the injected operation
    #[error("api request failed{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Api {
        status: Option<u16>,
        message: String,
        retryable: bool,
    },

    /// A cache write failed; carries the operation and key for context
    #[error("cache {operation} failed for key '{key}': {message}")]
    CacheUpdate {
        operation: String,
        key: String,
        message: String,
    },

    /// Target entity does not exist
    #[error("{resource} with id '{id}' not found")]
    NotFound { resource: String, id: String },

    /// Input rejected before any cache or network activity
    #[error("validation failed: {}", .errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Validation { errors: Vec<FieldError> },

    /// JSON (de)serialization failure
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// Operation exceeded its deadline
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    /// Invariant violation inside the client core
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ClientError {
    /// Create a circuit-open rejection
    pub fn circuit_open(operation: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::CircuitOpen {
            operation: operation.into(),
            retry_after,
        }
    }

    /// Create an API error without a status code
    pub fn api(message: impl Into<String>, retryable: bool) -> Self {
        Self::Api {
            status: None,
            message: message.into(),
            retryable,
        }
    }

    /// Create an API error carrying an HTTP status code
    pub fn api_status(status: u16, message: impl Into<String>) -> Self {
        // 5xx and 429 are worth retrying, the rest are caller mistakes
        let retryable = status >= 500 || status == 429 || status == 408;
        Self::Api {
            status: Some(status),
            message: message.into(),
            retryable,
        }
    }

    /// Create a cache-update error with operation and key context
    pub fn cache_update(
        operation: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::CacheUpdate {
            operation: operation.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(resource: impl Into<String>, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Per-field messages when this is a validation failure
    pub fn field_messages(&self) -> Option<Vec<String>> {
        match self {
            Self::Validation { errors } => Some(errors.iter().map(|e| e.to_string()).collect()),
            _ => None,
        }
    }
}

impl From<ValidationError> for ClientError {
    fn from(err: ValidationError) -> Self {
        Self::Validation { errors: err.errors }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl ErrorClassification for ClientError {
    fn is_retryable(&self) -> bool {
        match self {
            // Open circuits clear on their own; retryable in principle even
            // though the mutation profile excludes them.
            Self::CircuitOpen { .. } => true,
            Self::Api { retryable, .. } => *retryable,
            Self::CacheUpdate { .. } => true,
            Self::Timeout { .. } => true,
            Self::NotFound { .. } => false,
            Self::Validation { .. } => false,
            Self::Serialization { .. } => false,
            Self::Internal { .. } => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CircuitOpen { .. } => ErrorSeverity::Warning,
            Self::Api { status, .. } => match status {
                Some(s) if *s >= 500 => ErrorSeverity::Error,
                _ => ErrorSeverity::Warning,
            },
            Self::CacheUpdate { .. } => ErrorSeverity::Error,
            Self::NotFound { .. } => ErrorSeverity::Warning,
            Self::Validation { .. } => ErrorSeverity::Info,
            Self::Serialization { .. } => ErrorSeverity::Error,
            Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_status_retryability() {
        assert!(!ClientError::api_status(400, "bad request").is_retryable());
        assert!(!ClientError::api_status(404, "missing").is_retryable());
        assert!(ClientError::api_status(429, "slow down").is_retryable());
        assert!(ClientError::api_status(500, "boom").is_retryable());
        assert!(ClientError::api_status(503, "unavailable").is_retryable());
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(
            ClientError::internal("bad state").severity(),
            ErrorSeverity::Critical
        );
        assert!(ClientError::internal("bad state").is_critical());
        assert_eq!(
            ClientError::api_status(503, "unavailable").severity(),
            ErrorSeverity::Error
        );
        assert_eq!(
            ClientError::not_found("expense", 9).severity(),
            ErrorSeverity::Warning
        );
    }

    #[test]
    fn test_validation_from_field_errors() {
        let verr = ValidationError::field("amount", "must be greater than zero");
        let err: ClientError = verr.into();
        assert!(!err.is_retryable());
        let messages = err.field_messages().unwrap();
        assert_eq!(messages, vec!["amount: must be greater than zero"]);
        assert!(err.to_string().contains("amount"));
    }

    #[test]
    fn test_circuit_open_retry_after() {
        let err = ClientError::circuit_open("updateExpenses", Some(Duration::from_secs(30)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
        assert!(err.to_string().contains("updateExpenses"));
    }

    #[test]
    fn test_not_found_display() {
        let err = ClientError::not_found("fixedExpense", 42);
        assert_eq!(err.to_string(), "fixedExpense with id '42' not found");
    }
}
