//! Ponder API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ponder_core::error::DomainError;
use ponder_rotation::application::coordinator::ReadFailure;
use ponder_rotation::application::query_handlers::CurrentView;
use serde::Serialize;
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Tracing or exporter setup failed.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
    /// Text to show instead when the store could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<CurrentView>,
}

/// HTTP-layer error that implements `IntoResponse`.
#[derive(Debug)]
pub enum ApiError {
    /// A domain operation failed.
    Domain(DomainError),
    /// A read of the current item failed; a fallback is available.
    Read(ReadFailure),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::Domain(err)
    }
}

impl From<ReadFailure> for ApiError {
    fn from(err: ReadFailure) -> Self {
        Self::Read(err)
    }
}

fn classify(err: &DomainError) -> (StatusCode, &'static str) {
    match err {
        DomainError::ItemNotFound(_) => (StatusCode::NOT_FOUND, "item_not_found"),
        DomainError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        DomainError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        DomainError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Domain(err) => {
                let (status, error) = classify(&err);
                (
                    status,
                    ErrorBody {
                        error,
                        message: err.to_string(),
                        fallback: None,
                    },
                )
            }
            Self::Read(failure) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    error: "store_unavailable",
                    message: failure.to_string(),
                    fallback: Some(failure.fallback),
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use chrono::{TimeDelta, TimeZone, Utc};
    use uuid::Uuid;

    fn status_of(err: DomainError) -> StatusCode {
        let response = ApiError::from(err).into_response();
        response.status()
    }

    #[test]
    fn test_item_not_found_maps_to_404() {
        assert_eq!(
            status_of(DomainError::ItemNotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_conflict_maps_to_409() {
        assert_eq!(
            status_of(DomainError::Conflict("two current items".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_validation_maps_to_400() {
        assert_eq!(
            status_of(DomainError::Validation("bad input".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_store_unavailable_maps_to_503() {
        assert_eq!(
            status_of(DomainError::StoreUnavailable("db down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_read_failure_carries_fallback_in_body() {
        // Arrange
        let window_start = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        let failure = ReadFailure {
            fallback: CurrentView {
                text: "What would you teach a child first?".to_string(),
                window_start,
                next_window_start: window_start + TimeDelta::days(1),
            },
            source: DomainError::StoreUnavailable("db down".into()),
        };

        // Act
        let response = ApiError::from(failure).into_response();

        // Assert
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(json["error"], "store_unavailable");
        assert_eq!(json["fallback"]["text"], "What would you teach a child first?");
    }
}
