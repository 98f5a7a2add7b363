//! Routes for the rotating question.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use ponder_rotation::application::query_handlers::{
    CurrentAndNextView, CurrentView, HistoryEntry, PreGenerateView, RotateView,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for GET /history.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Maximum number of entries, clamped to the allowed range.
    pub limit: Option<usize>,
}

/// Response body for GET /history.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Past questions, newest first.
    pub entries: Vec<HistoryEntry>,
}

/// GET /
#[instrument(skip(state))]
async fn get_current(State(state): State<AppState>) -> Result<Json<CurrentView>, ApiError> {
    Ok(Json(state.coordinator.get_current().await?))
}

/// GET /current-and-next
#[instrument(skip(state))]
async fn get_current_and_next(
    State(state): State<AppState>,
) -> Result<Json<CurrentAndNextView>, ApiError> {
    Ok(Json(state.coordinator.get_current_and_next().await?))
}

/// POST /initialize
#[instrument(skip(state))]
async fn initialize(State(state): State<AppState>) -> Result<Json<CurrentAndNextView>, ApiError> {
    info!("handling initialize");
    Ok(Json(state.coordinator.initialize().await?))
}

/// POST /rotate
#[instrument(skip(state))]
async fn rotate(State(state): State<AppState>) -> Result<Json<RotateView>, ApiError> {
    let view = state.coordinator.force_rotate().await?;
    info!(outcome = %view.outcome, warmed = view.warmed, "handled rotate");
    Ok(Json(view))
}

/// POST /pre-generate
#[instrument(skip(state))]
async fn pre_generate(State(state): State<AppState>) -> Result<Json<PreGenerateView>, ApiError> {
    Ok(Json(state.coordinator.pre_generate().await?))
}

/// GET /history
#[instrument(skip(state))]
async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let entries = state.coordinator.list_history(params.limit).await?;
    Ok(Json(HistoryResponse { entries }))
}

/// Returns the router for the question endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_current))
        .route("/current-and-next", get(get_current_and_next))
        .route("/initialize", post(initialize))
        .route("/rotate", post(rotate))
        .route("/pre-generate", post(pre_generate))
        .route("/history", get(history))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{DateTime, TimeZone, Utc};
    use ponder_core::generation::CandidateGenerator;
    use ponder_core::repository::ItemRepository;
    use ponder_core::window::{Granularity, WindowClock};
    use ponder_rotation::application::coordinator::{CoordinatorConfig, RotationCoordinator};
    use ponder_test_support::{
        FailingGenerator, FailingItemRepository, FixedClock, InMemoryItemRepository, MockRng,
        ScriptedGenerator,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn app_state_with(
        repo: Arc<dyn ItemRepository>,
        generator: Arc<dyn CandidateGenerator>,
    ) -> AppState {
        let window_clock = WindowClock::from_zone_name("UTC", Granularity::Day).unwrap();
        let coordinator = RotationCoordinator::new(
            CoordinatorConfig::new(window_clock),
            repo,
            generator,
            Arc::new(FixedClock(now())),
            Box::new(MockRng),
        );
        AppState::new(Arc::new(coordinator))
    }

    fn test_app_state() -> AppState {
        app_state_with(
            Arc::new(InMemoryItemRepository::new()),
            Arc::new(ScriptedGenerator::numbered("What would you ask")),
        )
    }

    fn failing_app_state() -> AppState {
        app_state_with(
            Arc::new(FailingItemRepository),
            Arc::new(FailingGenerator::unavailable()),
        )
    }

    async fn send(state: AppState, method: &str, uri: &str) -> (StatusCode, Value) {
        let app = router().with_state(state);
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body_bytes).unwrap())
    }

    #[tokio::test]
    async fn test_get_current_returns_200_with_window() {
        // Act
        let (status, json) = send(test_app_state(), "GET", "/").await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert!(json["text"].as_str().unwrap().starts_with("What would you ask"));
        assert_eq!(json["window_start"], "2026-01-15T00:00:00Z");
        assert_eq!(json["next_window_start"], "2026-01-16T00:00:00Z");
    }

    #[tokio::test]
    async fn test_get_current_returns_503_with_fallback_when_store_fails() {
        let (status, json) = send(failing_app_state(), "GET", "/").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "store_unavailable");
        assert!(!json["fallback"]["text"].as_str().unwrap().is_empty());
        assert_eq!(json["fallback"]["window_start"], "2026-01-15T00:00:00Z");
    }

    #[tokio::test]
    async fn test_rotate_reports_outcome() {
        let (status, json) = send(test_app_state(), "POST", "/rotate").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["outcome"], "synthesized");
        assert_eq!(json["warmed"], false);
    }

    #[tokio::test]
    async fn test_pre_generate_far_from_boundary_is_not_needed() {
        let (status, json) = send(test_app_state(), "POST", "/pre-generate").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "not_needed");
        assert_eq!(json["minutes_until_boundary"], 840);
    }

    #[tokio::test]
    async fn test_history_returns_503_when_store_fails() {
        let (status, json) = send(failing_app_state(), "GET", "/history").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "store_unavailable");
        assert!(json.get("fallback").is_none());
    }

    #[tokio::test]
    async fn test_history_rejects_non_numeric_limit() {
        // Arrange
        let app = router().with_state(test_app_state());
        let request = Request::builder()
            .method("GET")
            .uri("/history?limit=lots")
            .body(Body::empty())
            .unwrap();

        // Act
        let response = app.oneshot(request).await.unwrap();

        // Assert
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
