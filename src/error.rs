//! # Error Handling
//!
//! This module provides unified error handling for the CreatorSync service:
//! a problem+json `ApiError` for the HTTP surface with trace ID propagation,
//! and the `SyncError` taxonomy carried from the sync coordinator up to the
//! queue worker for retry accounting.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Shorthand for a 404 with the standard code
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND".to_string(),
            message.into(),
        )
    }

    /// Shorthand for a 500 with the standard code
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR".to_string(),
            message.into(),
        )
    }

    /// Extract current trace ID from the active task scope (falls back to a
    /// generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);
        Self::internal("An internal error occurred")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED".to_string(),
            message,
        )
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => {
                Self::not_found(format!("Record not found: {}", record))
            }
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            other => {
                tracing::error!("Database error: {:?}", other);
                Self::internal("Database error occurred")
            }
        }
    }
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

/// Whether a database error is a unique-constraint violation.
pub fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error.code().is_some_and(|code| {
        code.as_ref() == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code.as_ref())
    })
}

/// How severely a provider call failed, and whether a retry can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFailure {
    /// Credentials rejected by the platform
    Unauthorized,
    /// Platform asked us to back off
    RateLimited,
    /// Network/5xx class failure worth retrying
    Transient,
    /// Malformed account, deleted profile, bad request
    Permanent,
}

/// Errors raised inside one account sync, caught at the coordinator boundary.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Missing account or project; the job fails fast without retry.
    #[error("not found: {0}")]
    NotFound(String),

    /// Another sync holds the account lock; the job is skipped, not failed.
    #[error("account lock held by another sync (age {age_seconds}s)")]
    LockContention { age_seconds: i64 },

    /// Upstream provider failure during discovery or refresh.
    #[error("provider error ({failure:?}): {message}")]
    Provider {
        failure: ProviderFailure,
        message: String,
        retry_after_secs: Option<u64>,
    },

    /// Partial or complete batch commit failure. Already-committed
    /// sub-batches survive; retry relies on idempotent record keys.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Summary email delivery failure; logged, never fails the owning job.
    #[error("notification error: {0}")]
    Notification(String),
}

impl SyncError {
    pub fn provider(failure: ProviderFailure, message: impl Into<String>) -> Self {
        SyncError::Provider {
            failure,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// Whether the queue worker should return the job to the queue
    /// (subject to the attempt ceiling) instead of failing it terminally.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::NotFound(_) => false,
            SyncError::LockContention { .. } => false,
            SyncError::Provider { failure, .. } => matches!(
                failure,
                ProviderFailure::RateLimited | ProviderFailure::Transient
            ),
            SyncError::Persistence(_) => true,
            SyncError::Notification(_) => false,
        }
    }

    /// Whether this outcome counts as a skip rather than an error.
    pub fn is_skip(&self) -> bool {
        matches!(self, SyncError::LockContention { .. })
    }
}

impl From<sea_orm::DbErr> for SyncError {
    fn from(error: sea_orm::DbErr) -> Self {
        SyncError::Persistence(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert_eq!(error.details, None);
        assert_eq!(error.retry_after, None);
    }

    #[test]
    fn api_error_with_details_and_retry_after() {
        let error = ApiError::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", "Slow down")
            .with_details(json!({"provider": "tiktok"}))
            .with_retry_after(60);

        assert_eq!(
            error.details,
            Some(Box::new(json!({"provider": "tiktok"})))
        );
        assert_eq!(error.retry_after, Some(60));
    }

    #[test]
    fn not_found_is_terminal() {
        let err = SyncError::NotFound("account 123".into());
        assert!(!err.is_retryable());
        assert!(!err.is_skip());
    }

    #[test]
    fn lock_contention_is_skip_not_retry() {
        let err = SyncError::LockContention { age_seconds: 42 };
        assert!(err.is_skip());
        assert!(!err.is_retryable());
    }

    #[test]
    fn provider_retryability_follows_failure_kind() {
        assert!(SyncError::provider(ProviderFailure::Transient, "timeout").is_retryable());
        assert!(SyncError::provider(ProviderFailure::RateLimited, "429").is_retryable());
        assert!(!SyncError::provider(ProviderFailure::Permanent, "gone").is_retryable());
        assert!(!SyncError::provider(ProviderFailure::Unauthorized, "401").is_retryable());
    }

    #[test]
    fn persistence_is_retryable() {
        assert!(SyncError::Persistence("batch commit failed".into()).is_retryable());
    }
}
