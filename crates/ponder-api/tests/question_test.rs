//! Integration tests for the question endpoints.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use chrono::TimeDelta;
use ponder_test_support::{InMemoryItemRepository, ManualClock, ScriptedGenerator};

#[tokio::test]
async fn test_initialize_then_read_current_and_next() {
    let repo = Arc::new(InMemoryItemRepository::new());
    let coordinator = common::build_coordinator(
        repo,
        Arc::new(ScriptedGenerator::numbered("What would you ask")),
        Arc::new(ponder_test_support::FixedClock(common::fixed_now())),
    );

    // POST /api/v1/question/initialize
    let app = common::build_app(Arc::clone(&coordinator));
    let (status, initialized) = common::post_empty(app, "/api/v1/question/initialize").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(initialized["current"]["window_start"], "2026-01-15T00:00:00Z");
    assert!(initialized["next"]["id"].is_string());

    // GET /api/v1/question/current-and-next
    let app = common::build_app(coordinator);
    let (status, json) = common::get_json(app, "/api/v1/question/current-and-next").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, initialized);
}

#[tokio::test]
async fn test_second_instance_serves_staged_next_after_boundary() {
    // Arrange
    let repo = Arc::new(InMemoryItemRepository::new());
    let clock = Arc::new(ManualClock::new(common::fixed_now()));
    let first = common::build_coordinator(
        repo.clone(),
        Arc::new(ScriptedGenerator::numbered("What would you ask")),
        clock.clone(),
    );
    let second = common::build_coordinator(
        repo,
        Arc::new(ScriptedGenerator::numbered("Which memory would you keep")),
        clock.clone(),
    );
    let (_, initialized) =
        common::post_empty(common::build_app(first), "/api/v1/question/initialize").await;

    // Act
    clock.advance(TimeDelta::days(1));
    let (status, current) =
        common::get_json(common::build_app(Arc::clone(&second)), "/api/v1/question").await;

    // Assert
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current["text"], initialized["next"]["text"]);
    assert_eq!(current["window_start"], "2026-01-16T00:00:00Z");
    assert_eq!(current["next_window_start"], "2026-01-17T00:00:00Z");

    let (status, history) =
        common::get_json(common::build_app(second), "/api/v1/question/history").await;
    assert_eq!(status, StatusCode::OK);
    let entries = history["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["text"], initialized["current"]["text"]);
}

#[tokio::test]
async fn test_outage_serves_last_known_text_with_503() {
    // Arrange
    let repo = Arc::new(InMemoryItemRepository::new());
    let coordinator = common::build_coordinator(
        repo.clone(),
        Arc::new(ScriptedGenerator::numbered("What would you ask")),
        Arc::new(ponder_test_support::FixedClock(common::fixed_now())),
    );
    let (_, initialized) = common::post_empty(
        common::build_app(Arc::clone(&coordinator)),
        "/api/v1/question/initialize",
    )
    .await;

    // Act
    repo.set_unavailable(true);
    let (status, json) = common::get_json(common::build_app(coordinator), "/api/v1/question").await;

    // Assert
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "store_unavailable");
    assert_eq!(json["fallback"], initialized["current"]);
}

#[tokio::test]
async fn test_repeated_rotate_keeps_one_current() {
    let repo = Arc::new(InMemoryItemRepository::new());
    let coordinator = common::build_coordinator(
        repo.clone(),
        Arc::new(ScriptedGenerator::numbered("What would you ask")),
        Arc::new(ponder_test_support::FixedClock(common::fixed_now())),
    );

    let (_, first) = common::post_empty(
        common::build_app(Arc::clone(&coordinator)),
        "/api/v1/question/rotate",
    )
    .await;
    let (status, second) =
        common::post_empty(common::build_app(coordinator), "/api/v1/question/rotate").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["text"], second["text"]);
    assert_eq!(
        repo.holders(ponder_core::item::ItemFlag::Current).len(),
        1
    );
}

#[tokio::test]
async fn test_history_on_empty_store_is_empty() {
    let app = common::build_test_app(Arc::new(InMemoryItemRepository::new()));

    let (status, json) = common::get_json(app, "/api/v1/question/history?limit=5").await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["entries"].as_array().unwrap().is_empty());
}
