//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use ponder_core::clock::Clock;
use ponder_core::generation::CandidateGenerator;
use ponder_core::repository::ItemRepository;
use ponder_core::window::{Granularity, WindowClock};
use ponder_rotation::application::coordinator::{CoordinatorConfig, RotationCoordinator};
use ponder_test_support::{FixedClock, MockRng, ScriptedGenerator};
use tower::ServiceExt;

use ponder_api::routes;
use ponder_api::state::AppState;

/// Fixed timestamp used across all integration tests.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// Daily windows in UTC.
pub fn day_clock() -> WindowClock {
    WindowClock::from_zone_name("UTC", Granularity::Day).unwrap()
}

/// Builds a coordinator over `repo` with deterministic time and RNG.
pub fn build_coordinator(
    repo: Arc<dyn ItemRepository>,
    generator: Arc<dyn CandidateGenerator>,
    clock: Arc<dyn Clock>,
) -> Arc<RotationCoordinator> {
    Arc::new(RotationCoordinator::new(
        CoordinatorConfig::new(day_clock()),
        repo,
        generator,
        clock,
        Box::new(MockRng),
    ))
}

/// Build the full app router around `coordinator`. Uses the same route
/// structure as `main.rs`.
pub fn build_app(coordinator: Arc<RotationCoordinator>) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/question", routes::question::router())
        .with_state(AppState::new(coordinator))
}

/// Build the app over `repo` with a numbered generator and a fixed clock.
pub fn build_test_app(repo: Arc<dyn ItemRepository>) -> Router {
    build_app(build_coordinator(
        repo,
        Arc::new(ScriptedGenerator::numbered("What would you ask")),
        Arc::new(FixedClock(fixed_now())),
    ))
}

/// Send a request without a body and return the response.
pub async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri).await
}

/// Send a POST request and return the response.
pub async fn post_empty(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri).await
}
