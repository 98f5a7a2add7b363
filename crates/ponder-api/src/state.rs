//! Shared application state.

use std::sync::Arc;

use ponder_rotation::application::coordinator::RotationCoordinator;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The single coordinator for this process.
    pub coordinator: Arc<RotationCoordinator>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(coordinator: Arc<RotationCoordinator>) -> Self {
        Self { coordinator }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("window_clock", self.coordinator.window_clock())
            .finish_non_exhaustive()
    }
}
