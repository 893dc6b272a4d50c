use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::queue::QueueError;
use crate::resilience::BreakerError;
use crate::store::{EngineErrorKind, QueryError, StoreError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Queue '{queue}' is at capacity ({capacity}), retry later")]
    QueueFull { queue: String, capacity: usize },

    #[error("Operation '{key}' timed out after {timeout_ms}ms in queue '{queue}'")]
    Timeout {
        queue: String,
        key: String,
        timeout_ms: u64,
    },

    #[error("Circuit breaker '{breaker}' is open, dependency unavailable")]
    BreakerOpen { breaker: String },

    #[error("Queue '{queue}' is shutting down")]
    ShuttingDown { queue: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<QueueError<BreakerError<StoreError>>> for Error {
    fn from(error: QueueError<BreakerError<StoreError>>) -> Self {
        match error {
            QueueError::CapacityExceeded { queue, capacity } => Error::QueueFull { queue, capacity },
            QueueError::Timeout {
                queue,
                key,
                timeout_ms,
            } => Error::Timeout {
                queue,
                key,
                timeout_ms,
            },
            QueueError::Closed { queue } => Error::ShuttingDown { queue },
            QueueError::Operation(BreakerError::Open { name }) => Error::BreakerOpen { breaker: name },
            QueueError::Operation(BreakerError::Inner(store)) => Error::Store(store),
        }
    }
}

impl Error {
    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::QueueFull { .. } | Error::Timeout { .. } | Error::BreakerOpen { .. } => true,
            Error::Store(store) => store.kind().is_some_and(|kind| kind.is_transient()),
            _ => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::Query(_) | Error::Serialization(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::QueueFull { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::BreakerOpen { .. } | Error::ShuttingDown { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Store(store) => match store {
                StoreError::DimensionMismatch { .. }
                | StoreError::QueryDimensionMismatch { .. }
                | StoreError::Query(_) => StatusCode::BAD_REQUEST,
                _ => match store.kind() {
                    Some(EngineErrorKind::NotFound) => StatusCode::NOT_FOUND,
                    Some(EngineErrorKind::Mapping | EngineErrorKind::BadRequest) => StatusCode::BAD_REQUEST,
                    Some(EngineErrorKind::VersionConflict) => StatusCode::CONFLICT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                },
            },
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match &self {
            Error::Serialization(_) => "Invalid JSON".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EngineError;

    fn engine_failure(kind: EngineErrorKind) -> Error {
        let source = EngineError::new(kind, "boom");
        let queued: QueueError<BreakerError<StoreError>> =
            QueueError::Operation(BreakerError::Inner(StoreError::Engine {
                operation: "upsert",
                index: "docs".into(),
                id: Some("a".into()),
                source,
            }));
        queued.into()
    }

    #[test]
    fn test_backpressure_errors_are_retryable() {
        let full: Error = QueueError::<BreakerError<StoreError>>::CapacityExceeded {
            queue: "write".into(),
            capacity: 10,
        }
        .into();
        assert!(full.is_retryable());
        assert_eq!(full.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let open: Error = QueueError::Operation(BreakerError::<StoreError>::Open {
            name: "write".into(),
        })
        .into();
        assert!(open.is_retryable());
        assert_eq!(open.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let timeout: Error = QueueError::<BreakerError<StoreError>>::Timeout {
            queue: "write".into(),
            key: "upsert:a".into(),
            timeout_ms: 50,
        }
        .into();
        assert!(timeout.is_retryable());
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_store_errors_map_by_kind() {
        let connection = engine_failure(EngineErrorKind::Connection);
        assert!(connection.is_retryable());
        assert_eq!(connection.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let mapping = engine_failure(EngineErrorKind::Mapping);
        assert!(!mapping.is_retryable());
        assert_eq!(mapping.status_code(), StatusCode::BAD_REQUEST);

        let missing = engine_failure(EngineErrorKind::NotFound);
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let mismatch = Error::Store(StoreError::DimensionMismatch {
            index: "docs".into(),
            id: "a".into(),
            expected: 3,
            actual: 2,
        });
        assert!(!mismatch.is_retryable());
        assert_eq!(mismatch.status_code(), StatusCode::BAD_REQUEST);
    }
}
