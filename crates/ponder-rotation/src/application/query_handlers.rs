//! Read-only views returned by the coordinator.

use chrono::{DateTime, Utc};
use ponder_core::item::ItemRecord;
use ponder_core::window::WindowClock;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::state::RotationOutcome;

/// Default number of history entries returned.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Upper bound on requested history entries.
pub const MAX_HISTORY_LIMIT: usize = 500;

/// The item shown for the present window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentView {
    /// The displayable text.
    pub text: String,
    /// Start of the window this text is shown for.
    pub window_start: DateTime<Utc>,
    /// When the next rotation is due.
    pub next_window_start: DateTime<Utc>,
}

impl CurrentView {
    /// Builds the view of `record` as served at `now`. A record without a
    /// window is shown for the window containing `now`.
    #[must_use]
    pub fn of(record: &ItemRecord, clock: &WindowClock, now: DateTime<Utc>) -> Self {
        let window_start = record
            .activated_at
            .unwrap_or_else(|| clock.current_window_start(now));
        Self::from_text(record.text.clone(), window_start, clock)
    }

    /// Builds a view of `text` for the window starting at `window_start`.
    #[must_use]
    pub fn from_text(text: String, window_start: DateTime<Utc>, clock: &WindowClock) -> Self {
        Self {
            text,
            window_start,
            next_window_start: clock.next_window_start(window_start),
        }
    }
}

/// The staged item for the upcoming window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextView {
    /// Record identifier.
    pub id: Uuid,
    /// The displayable text.
    pub text: String,
    /// When the record was staged.
    pub created_at: DateTime<Utc>,
}

impl From<&ItemRecord> for NextView {
    fn from(record: &ItemRecord) -> Self {
        Self {
            id: record.id,
            text: record.text.clone(),
            created_at: record.created_at,
        }
    }
}

/// Current and staged items together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentAndNextView {
    /// The item for the present window.
    pub current: CurrentView,
    /// The staged item, if any.
    pub next: Option<NextView>,
}

/// Result of a forced rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotateView {
    /// The current text after the call.
    pub text: String,
    /// Window the text is shown for.
    pub window_start: DateTime<Utc>,
    /// What the convergence step did.
    pub outcome: RotationOutcome,
    /// Whether the call only staged the next item ahead of the boundary.
    pub warmed: bool,
}

/// One past item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Record identifier.
    pub id: Uuid,
    /// The displayable text.
    pub text: String,
    /// Window the text was shown for.
    pub window_start: DateTime<Utc>,
}

/// Outcome of a pre-generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PreGenerateView {
    /// The boundary is further away than the lead time.
    NotNeeded {
        /// Whole minutes left until the boundary.
        minutes_until_boundary: i64,
    },
    /// Staging of a next item is switched off.
    Disabled,
    /// A next item was staged by this call.
    Staged {
        /// Text of the staged item.
        text: String,
    },
    /// A next item was already staged.
    AlreadyStaged {
        /// Text of the staged item.
        text: String,
    },
}

/// Clamps a requested history limit to `1..=MAX_HISTORY_LIMIT`.
#[must_use]
pub fn history_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

/// Builds history entries from window owners, keeping their order.
#[must_use]
pub fn history_entries(records: Vec<ItemRecord>) -> Vec<HistoryEntry> {
    records
        .into_iter()
        .filter_map(|record| {
            Some(HistoryEntry {
                window_start: record.activated_at?,
                id: record.id,
                text: record.text,
            })
        })
        .collect()
}
