//! The persisted item record and its flags.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Minimum item length, in characters, after trimming.
pub const MIN_TEXT_CHARS: usize = 10;

/// Maximum item length, in characters, after trimming.
pub const MAX_TEXT_CHARS: usize = 200;

/// One displayable item and its rotation flags.
///
/// `id`, `text` and `created_at` are write-once. `activated_at` is filled
/// once and only cleared again when the record loses the race for its
/// window; otherwise only the two boolean flags change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Record identifier.
    pub id: Uuid,
    /// The displayable text.
    pub text: String,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Start of the window this item was (or will be) shown for.
    pub activated_at: Option<DateTime<Utc>>,
    /// Whether this is the active item.
    pub is_current: bool,
    /// Whether this is the staged item for the upcoming window.
    pub is_next: bool,
}

impl ItemRecord {
    /// Creates an unflagged record already bound to `window_start`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the text is outside the allowed
    /// length after trimming.
    pub fn for_window(
        text: &str,
        created_at: DateTime<Utc>,
        window_start: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id: Uuid::now_v7(),
            text: validate_text(text)?,
            created_at,
            activated_at: Some(window_start),
            is_current: false,
            is_next: false,
        })
    }

    /// Creates a staged "next" record with no window yet.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the text is outside the allowed
    /// length after trimming.
    pub fn staged(text: &str, created_at: DateTime<Utc>) -> Result<Self, DomainError> {
        Ok(Self {
            id: Uuid::now_v7(),
            text: validate_text(text)?,
            created_at,
            activated_at: None,
            is_current: false,
            is_next: true,
        })
    }

    /// Returns whether this record currently holds `flag`.
    #[must_use]
    pub fn holds(&self, flag: ItemFlag) -> bool {
        match flag {
            ItemFlag::Current => self.is_current,
            ItemFlag::Next => self.is_next,
        }
    }

    /// Returns the record as it looks after promotion to current for
    /// `window_start`. An already-set `activated_at` is kept.
    #[must_use]
    pub fn promoted(&self, window_start: DateTime<Utc>) -> Self {
        Self {
            activated_at: self.activated_at.or(Some(window_start)),
            is_current: true,
            is_next: false,
            ..self.clone()
        }
    }

    /// Ranks records bound to the same window: the current holder first,
    /// then the earliest created, then the lowest id. The lowest key owns
    /// the window.
    #[must_use]
    pub fn window_claim(&self) -> (bool, DateTime<Utc>, Uuid) {
        (!self.is_current, self.created_at, self.id)
    }

    /// Applies a flag update in place, honoring write-once `activated_at`.
    pub fn apply(&mut self, update: &FlagUpdate) {
        if let Some(is_current) = update.is_current {
            self.is_current = is_current;
        }
        if let Some(is_next) = update.is_next {
            self.is_next = is_next;
        }
        if self.activated_at.is_none() {
            self.activated_at = update.activated_at;
        }
    }
}

/// Maps each window to the record that owns it. Unbound records are skipped.
#[must_use]
pub fn window_owners<'a>(
    records: impl IntoIterator<Item = &'a ItemRecord>,
) -> BTreeMap<DateTime<Utc>, &'a ItemRecord> {
    let mut owners: BTreeMap<DateTime<Utc>, &ItemRecord> = BTreeMap::new();
    for record in records {
        let Some(window) = record.activated_at else {
            continue;
        };
        owners
            .entry(window)
            .and_modify(|owner| {
                if record.window_claim() < owner.window_claim() {
                    *owner = record;
                }
            })
            .or_insert(record);
    }
    owners
}

/// The two single-holder flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFlag {
    /// The active item.
    Current,
    /// The staged item.
    Next,
}

impl fmt::Display for ItemFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => write!(f, "current"),
            Self::Next => write!(f, "next"),
        }
    }
}

/// A partial flag update for one record. `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagUpdate {
    /// New value for `is_current`.
    pub is_current: Option<bool>,
    /// New value for `is_next`.
    pub is_next: Option<bool>,
    /// Window to stamp if the record has none yet.
    pub activated_at: Option<DateTime<Utc>>,
}

impl FlagUpdate {
    /// The update that turns a record into the current item for a window.
    #[must_use]
    pub fn promote(window_start: DateTime<Utc>) -> Self {
        Self {
            is_current: Some(true),
            is_next: Some(false),
            activated_at: Some(window_start),
        }
    }
}

/// Trims `text` and checks its length in characters.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the trimmed text has fewer than
/// `MIN_TEXT_CHARS` or more than `MAX_TEXT_CHARS` characters.
pub fn validate_text(text: &str) -> Result<String, DomainError> {
    let trimmed = text.trim();
    let chars = trimmed.chars().count();
    if !(MIN_TEXT_CHARS..=MAX_TEXT_CHARS).contains(&chars) {
        return Err(DomainError::Validation(format!(
            "item text must be {MIN_TEXT_CHARS}-{MAX_TEXT_CHARS} characters, got {chars}"
        )));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_staged_record_has_no_window_and_next_flag() {
        let record = ItemRecord::staged("  Is mathematics discovered or invented?  ", fixed_now())
            .unwrap();

        assert_eq!(record.text, "Is mathematics discovered or invented?");
        assert!(record.is_next);
        assert!(!record.is_current);
        assert_eq!(record.activated_at, None);
    }

    #[test]
    fn test_for_window_rejects_short_text() {
        let result = ItemRecord::for_window("Why?", fixed_now(), fixed_now());

        match result {
            Err(DomainError::Validation(msg)) => assert!(msg.contains("got 4")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_text_counts_characters_not_bytes() {
        let text = "é".repeat(MAX_TEXT_CHARS);
        assert!(validate_text(&text).is_ok());
        assert!(validate_text(&format!("{text}é")).is_err());
    }

    #[test]
    fn test_promoted_keeps_existing_window() {
        let earlier = fixed_now();
        let later = earlier + chrono::TimeDelta::days(1);
        let record = ItemRecord::for_window("What do you owe a stranger?", earlier, earlier).unwrap();

        let promoted = record.promoted(later);

        assert!(promoted.is_current);
        assert!(!promoted.is_next);
        assert_eq!(promoted.activated_at, Some(earlier));
    }

    #[test]
    fn test_apply_promote_stamps_window_once() {
        let mut record = ItemRecord::staged("What do you owe a stranger?", fixed_now()).unwrap();
        let window = fixed_now() + chrono::TimeDelta::hours(14);

        record.apply(&FlagUpdate::promote(window));
        record.apply(&FlagUpdate::promote(window + chrono::TimeDelta::days(1)));

        assert!(record.holds(ItemFlag::Current));
        assert!(!record.holds(ItemFlag::Next));
        assert_eq!(record.activated_at, Some(window));
    }

    #[test]
    fn test_window_owner_is_earliest_record_unless_another_is_current() {
        // Arrange
        let window = fixed_now();
        let earliest = ItemRecord::for_window("What do you owe a stranger?", window, window).unwrap();
        let later = ItemRecord::for_window(
            "Could a memory be more true than the event?",
            window + chrono::TimeDelta::seconds(2),
            window,
        )
        .unwrap();
        let promoted_later = later.promoted(window);
        let staged = ItemRecord::staged("Where does a habit end?", window).unwrap();

        // Act
        let unflagged = window_owners([&later, &staged, &earliest]);
        let flagged = window_owners([&earliest, &promoted_later]);

        // Assert
        assert_eq!(unflagged.len(), 1);
        assert_eq!(unflagged[&window].id, earliest.id);
        assert_eq!(flagged[&window].id, later.id);
    }
}
