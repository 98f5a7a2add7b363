//! History store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;
use crate::item::{FlagUpdate, ItemFlag, ItemRecord};

/// Repository trait over the item record table.
///
/// Implementations must enforce the single-holder invariant for both flags:
/// a write that would leave two records holding the same flag fails with
/// `DomainError::Conflict` and changes nothing. Every write is safe to
/// repeat with the same arguments.
///
/// When racing instances bind several records to one window, the record
/// ranked first by `ItemRecord::window_claim` owns it. Window-level reads
/// (`list_used_texts`, `list_history`) only ever see owners.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Returns the record holding `flag`, if any.
    async fn find_by_flag(&self, flag: ItemFlag) -> Result<Option<ItemRecord>, DomainError>;

    /// Returns every record whose `activated_at` equals `window_start`,
    /// oldest first.
    async fn find_records_for_window(
        &self,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<ItemRecord>, DomainError>;

    /// Inserts a new record and returns it as stored.
    async fn insert(&self, record: ItemRecord) -> Result<ItemRecord, DomainError>;

    /// Sets `flag` to false on whichever record holds it. Returns the number
    /// of records changed.
    async fn clear_flag(&self, flag: ItemFlag) -> Result<u64, DomainError>;

    /// Applies `update` to the record `id`. `activated_at` is only written
    /// when the record has none.
    async fn set_flags(&self, id: Uuid, update: FlagUpdate) -> Result<(), DomainError>;

    /// Clears `activated_at` on the record `id` unless it is current, so a
    /// record that lost the race for its window stops counting as shown.
    /// Returns whether the record changed; unknown ids change nothing.
    async fn release_window(&self, id: Uuid) -> Result<bool, DomainError>;

    /// Texts of each window's owner, oldest window first.
    async fn list_used_texts(&self) -> Result<Vec<String>, DomainError>;

    /// Owners of the windows before the current record's window, newest
    /// first, at most `limit` of them.
    async fn list_history(&self, limit: usize) -> Result<Vec<ItemRecord>, DomainError>;
}
