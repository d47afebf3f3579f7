//! Error handling for Carehub Core.
//!
//! Every failure on the request path ends up as a [`CarehubError`] carrying one
//! of a small, stable set of [`ErrorKind`]s. The kind decides the HTTP status
//! and the machine-readable `error_code` clients see; the user message is safe
//! to expose, the internal message and source chain are only logged.
//!
//! # Usage
//!
//! ```rust,ignore
//! use carehub_core::error::{CarehubError, Result};
//!
//! fn load(id: &str) -> Result<()> {
//!     Err(CarehubError::not_found("patient", id))
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::envelope::ResponseEnvelope;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Carehub operations.
pub type Result<T> = std::result::Result<T, CarehubError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Kinds
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error kinds.
///
/// These are part of the wire contract: each kind has a fixed status code and
/// a fixed `error_code` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// No resolvable identity.
    Unauthenticated,
    /// Identity resolved but a role or ownership check failed.
    Forbidden,
    /// Payload shape invalid.
    ValidationFailed,
    /// Referenced resource absent.
    NotFound,
    /// Policy or ownership backing store unreachable or erroring.
    StorageError,
    /// Request exceeded the server's time budget.
    RequestTimeout,
    /// Handler fault or misconfiguration.
    Internal,
}

impl ErrorKind {
    /// HTTP status for this kind.
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::StorageError | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable string code used in the response envelope.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::StorageError => "STORAGE_ERROR",
            Self::RequestTimeout => "REQUEST_TIMEOUT",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Severity used to pick the log level.
    pub const fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ValidationFailed | Self::NotFound | Self::Unauthenticated => ErrorSeverity::Low,
            Self::Forbidden | Self::RequestTimeout => ErrorSeverity::Medium,
            Self::StorageError => ErrorSeverity::High,
            Self::Internal => ErrorSeverity::Critical,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad input, missing credentials)
    Low,
    /// Access denials worth noticing
    Medium,
    /// Backing store failures
    High,
    /// Bugs and handler faults
    Critical,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Carehub Core.
#[derive(Error, Debug)]
pub struct CarehubError {
    kind: ErrorKind,

    /// Safe to expose to clients
    user_message: Cow<'static, str>,

    /// Logged only
    internal_message: Option<String>,

    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for CarehubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl CarehubError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with kind and user message.
    pub fn new(kind: ErrorKind, user_message: impl Into<Cow<'static, str>>) -> Self {
        counter!("carehub_errors_total", "code" => kind.as_str()).increment(1);
        Self {
            kind,
            user_message: user_message.into(),
            internal_message: None,
            source: None,
        }
    }

    pub fn unauthenticated(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::ValidationFailed, message)
    }

    /// Create a not found error for a resource kind and id.
    pub fn not_found(resource_kind: impl fmt::Display, resource_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::NotFound,
            format!("{} not found: {}", resource_kind, resource_id),
        )
    }

    /// Create a storage error. The detail is kept out of the client message.
    pub fn storage(internal: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageError, "Authorization backend unavailable")
            .with_internal_message(internal)
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(ErrorKind::RequestTimeout, "Request timed out")
            .with_internal_message(format!("request exceeded {:?}", after))
    }

    /// Create an internal error (500).
    pub fn internal(internal: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, "An internal error occurred").with_internal_message(internal)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn http_status(&self) -> StatusCode {
        self.kind.http_status()
    }

    /// Log this error with a level matching its severity.
    pub fn log(&self) {
        let code = self.kind.as_str();
        let status = self.http_status().as_u16();

        match self.kind.severity() {
            ErrorSeverity::Critical | ErrorSeverity::High => {
                error!(
                    error_code = code,
                    http_status = status,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    source = ?self.source,
                    "Request failed"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = code,
                    http_status = status,
                    user_message = %self.user_message,
                    "Request denied"
                );
            }
            ErrorSeverity::Low => {
                debug!(
                    error_code = code,
                    http_status = status,
                    user_message = %self.user_message,
                    "Request rejected"
                );
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for CarehubError {
    fn into_response(self) -> Response {
        self.log();
        ResponseEnvelope::<()>::from_error(&self).into_response_with(self.http_status())
    }
}

impl From<serde_json::Error> for CarehubError {
    fn from(error: serde_json::Error) -> Self {
        Self::internal(format!("serialization failed: {}", error)).with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_http_status() {
        assert_eq!(ErrorKind::Unauthenticated.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::Forbidden.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorKind::ValidationFailed.http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ErrorKind::StorageError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ErrorKind::Internal.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ErrorKind::RequestTimeout.http_status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn test_storage_error_hides_detail() {
        let err = CarehubError::storage("connection refused on 10.0.0.4:5432");
        assert_eq!(err.kind(), ErrorKind::StorageError);
        assert!(!err.user_message().contains("10.0.0.4"));
        assert_eq!(err.internal_message(), Some("connection refused on 10.0.0.4:5432"));
    }

    #[test]
    fn test_error_display() {
        let err = CarehubError::not_found("patient", "r1");
        assert_eq!(err.to_string(), "[NOT_FOUND] patient not found: r1");
    }

    #[test]
    fn test_error_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::ValidationFailed).unwrap();
        assert_eq!(json, "\"VALIDATION_FAILED\"");
    }

    #[test]
    fn test_severity_ordering_by_kind() {
        assert_eq!(ErrorKind::Forbidden.severity(), ErrorSeverity::Medium);
        assert_eq!(ErrorKind::StorageError.severity(), ErrorSeverity::High);
        assert_eq!(ErrorKind::Internal.severity(), ErrorSeverity::Critical);
    }
}
