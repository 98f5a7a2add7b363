//! Conceptual rotation states and the outcome of a convergence step.

use std::fmt;

use chrono::{DateTime, Utc};
use ponder_core::item::ItemRecord;
use ponder_core::window::WindowClock;
use serde::Serialize;

/// Where the rotation stands for a given instant. Never persisted; derived
/// from the current/next records and the window clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    /// No record is current.
    Uninitialized,
    /// The current record belongs to the present window and a next record
    /// is staged.
    Steady,
    /// As `Steady`, but nothing is staged yet.
    AwaitingNext,
    /// The current record belongs to a past window.
    Stale {
        /// Boundaries crossed since the current record's window. Zero when
        /// the current record was never bound to a window.
        missed_windows: u32,
    },
}

impl RotationState {
    /// Derives the state at `now`.
    #[must_use]
    pub fn derive(
        current: Option<&ItemRecord>,
        next: Option<&ItemRecord>,
        clock: &WindowClock,
        now: DateTime<Utc>,
    ) -> Self {
        let Some(current) = current else {
            return Self::Uninitialized;
        };
        match current.activated_at {
            Some(activated_at) if clock.is_stale(activated_at, now) => Self::Stale {
                missed_windows: clock.windows_between(activated_at, now),
            },
            Some(_) if next.is_some() => Self::Steady,
            Some(_) => Self::AwaitingNext,
            None => Self::Stale { missed_windows: 0 },
        }
    }

    /// Whether the current record can be served as is.
    #[must_use]
    pub fn is_serving(self) -> bool {
        matches!(self, Self::Steady | Self::AwaitingNext)
    }
}

/// Whether `record` may be served as current at `now`. A record bound to a
/// future window (clock skew between instances) counts as fresh.
#[must_use]
pub fn is_fresh(record: &ItemRecord, clock: &WindowClock, now: DateTime<Utc>) -> bool {
    record
        .activated_at
        .is_some_and(|activated_at| !clock.is_stale(activated_at, now))
}

/// What one convergence step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationOutcome {
    /// The current record was already fresh; nothing was written.
    AlreadyCurrent,
    /// A record already bound to this window was made current.
    Adopted,
    /// The staged next record was promoted.
    Promoted,
    /// Nothing was staged, so a replacement was synthesized and promoted.
    Synthesized,
    /// A write failed; the returned record exists only in memory.
    Unpersisted,
}

impl fmt::Display for RotationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AlreadyCurrent => "already_current",
            Self::Adopted => "adopted",
            Self::Promoted => "promoted",
            Self::Synthesized => "synthesized",
            Self::Unpersisted => "unpersisted",
        };
        f.write_str(label)
    }
}
