//! The error vocabulary shared across every `dispatch-*` crate.
//!
//! `DispatchError` is the single error type that crosses crate boundaries.
//! Store, scheduler, worker, and API code all produce and propagate it;
//! `dispatch-api` is the only place that translates it into an HTTP response
//! (see its `IntoResponse` impl), so the variants here are named after
//! *domain* outcomes (`QuotaExceeded`, `Conflict`) rather than transport
//! concerns.

use crate::cron::InvalidExpression;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("quota exceeded for organization {organization_id}: {limit} {resource} per month")]
    QuotaExceeded {
        organization_id: String,
        resource: &'static str,
        limit: i64,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transport error dispatching to {url}: {source}")]
    TransportError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        DispatchError::NotFound {
            resource,
            id: id.into(),
        }
    }

    pub fn quota_exceeded(
        organization_id: impl Into<String>,
        resource: &'static str,
        limit: i64,
    ) -> Self {
        DispatchError::QuotaExceeded {
            organization_id: organization_id.into(),
            resource,
            limit,
        }
    }

    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        DispatchError::TransportError {
            url: url.into(),
            source,
        }
    }

    /// Whether retrying the same operation later has a chance of succeeding.
    /// Used by the worker's retry-scheduling logic (C6) to decide whether a
    /// failed execution gets another attempt or is finalized as `failed`.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DispatchError::TransportError { .. } | DispatchError::Timeout { .. }
        )
    }

    /// The spec's stable machine-readable error code, used in the `{"error":
    /// {"code": ...}}` envelope (spec.md §6).
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::InvalidInput(_) => "invalid_input",
            DispatchError::NotFound { .. } => "not_found",
            DispatchError::Unauthorized(_) => "unauthorized",
            DispatchError::QuotaExceeded { .. } => "quota_exceeded",
            DispatchError::Conflict(_) => "conflict",
            DispatchError::TransportError { .. } => "transport_error",
            DispatchError::Timeout { .. } => "timeout",
            DispatchError::AssertionFailed(_) => "assertion_failed",
            DispatchError::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for DispatchError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DispatchError::NotFound {
                resource: "row",
                id: "unknown".to_string(),
            },
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                DispatchError::Conflict(db_err.message().to_string())
            }
            other => DispatchError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::InvalidInput(err.to_string())
    }
}

impl From<InvalidExpression> for DispatchError {
    fn from(err: InvalidExpression) -> Self {
        DispatchError::InvalidInput(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_displays_resource_and_id() {
        let err = DispatchError::not_found("task", "01998c3e-...");
        assert_eq!(err.to_string(), "task not found: 01998c3e-...");
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn quota_exceeded_carries_limit() {
        let err = DispatchError::quota_exceeded("org_1", "executions", 10_000);
        assert!(err.to_string().contains("10000 executions per month"));
        assert_eq!(err.code(), "quota_exceeded");
    }

    #[test]
    fn timeout_and_transport_are_recoverable() {
        assert!(DispatchError::Timeout { elapsed_ms: 5000 }.is_recoverable());
        assert!(!DispatchError::Conflict("dup".into()).is_recoverable());
        assert!(!DispatchError::Internal("boom".into()).is_recoverable());
    }

    #[test]
    fn invalid_cron_expression_maps_to_invalid_input() {
        let err: DispatchError = InvalidExpression("* * *".to_string()).into();
        assert_eq!(err.code(), "invalid_input");
    }

    #[test]
    fn sqlx_row_not_found_maps_to_not_found() {
        let err: DispatchError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code(), "not_found");
    }
}
