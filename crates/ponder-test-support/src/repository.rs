//! In-memory and failing `ItemRepository` implementations for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ponder_core::error::DomainError;
use ponder_core::item::{FlagUpdate, ItemFlag, ItemRecord, window_owners};
use ponder_core::repository::ItemRepository;
use uuid::Uuid;

/// An in-memory item table that enforces the single-holder invariant the
/// way the PostgreSQL unique indexes do.
///
/// Every operation yields to the scheduler before touching state, so
/// concurrently polled callers interleave between store calls the way
/// independent instances would. `set_yield_pattern` stretches those pauses
/// to vary the interleaving.
#[derive(Debug, Default)]
pub struct InMemoryItemRepository {
    records: Mutex<Vec<ItemRecord>>,
    inserts: AtomicUsize,
    clears: AtomicUsize,
    flag_updates: AtomicUsize,
    outage: AtomicBool,
    yield_pattern: Mutex<Vec<usize>>,
    calls: AtomicUsize,
}

impl InMemoryItemRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository seeded with `records`.
    #[must_use]
    pub fn with_records(records: Vec<ItemRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            ..Self::default()
        }
    }

    /// Returns a snapshot of every stored record, in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn records(&self) -> Vec<ItemRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Returns every record holding `flag`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn holders(&self, flag: ItemFlag) -> Vec<ItemRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.holds(flag))
            .cloned()
            .collect()
    }

    /// Number of `insert` calls that reached the table.
    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Number of `clear_flag` calls that reached the table.
    pub fn clear_calls(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Number of `set_flags` calls that reached the table.
    pub fn set_flags_calls(&self) -> usize {
        self.flag_updates.load(Ordering::SeqCst)
    }

    /// Simulates losing (`true`) or regaining (`false`) the connection.
    /// While unavailable, every call fails with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.outage.store(unavailable, Ordering::SeqCst);
    }

    /// Makes the n-th store call yield `pattern[n % len]` extra times before
    /// touching state. An empty pattern restores a single yield per call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set_yield_pattern(&self, pattern: Vec<usize>) {
        *self.yield_pattern.lock().unwrap() = pattern;
    }

    async fn pause(&self) {
        let extra = {
            let pattern = self.yield_pattern.lock().unwrap();
            if pattern.is_empty() {
                0
            } else {
                pattern[self.calls.fetch_add(1, Ordering::SeqCst) % pattern.len()]
            }
        };
        for _ in 0..=extra {
            tokio::task::yield_now().await;
        }
    }

    fn available(&self) -> Result<(), DomainError> {
        if self.outage.load(Ordering::SeqCst) {
            return Err(connection_refused());
        }
        Ok(())
    }

    fn conflicting_holder(records: &[ItemRecord], flag: ItemFlag, except: Uuid) -> bool {
        records.iter().any(|r| r.id != except && r.holds(flag))
    }
}

#[async_trait]
impl ItemRepository for InMemoryItemRepository {
    async fn find_by_flag(&self, flag: ItemFlag) -> Result<Option<ItemRecord>, DomainError> {
        self.pause().await;
        self.available()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.holds(flag))
            .cloned())
    }

    async fn find_records_for_window(
        &self,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<ItemRecord>, DomainError> {
        self.pause().await;
        self.available()?;
        let mut matching: Vec<ItemRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.activated_at == Some(window_start))
            .cloned()
            .collect();
        matching.sort_by_key(|r| (r.created_at, r.id));
        Ok(matching)
    }

    async fn insert(&self, record: ItemRecord) -> Result<ItemRecord, DomainError> {
        self.pause().await;
        self.available()?;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.id == record.id) {
            return Err(DomainError::Conflict(format!("duplicate id {}", record.id)));
        }
        for flag in [ItemFlag::Current, ItemFlag::Next] {
            if record.holds(flag) && Self::conflicting_holder(&records, flag, record.id) {
                return Err(DomainError::Conflict(format!("another record is {flag}")));
            }
        }
        records.push(record.clone());
        Ok(record)
    }

    async fn clear_flag(&self, flag: ItemFlag) -> Result<u64, DomainError> {
        self.pause().await;
        self.available()?;
        self.clears.fetch_add(1, Ordering::SeqCst);
        let mut changed = 0;
        for record in self.records.lock().unwrap().iter_mut() {
            if record.holds(flag) {
                match flag {
                    ItemFlag::Current => record.is_current = false,
                    ItemFlag::Next => record.is_next = false,
                }
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn set_flags(&self, id: Uuid, update: FlagUpdate) -> Result<(), DomainError> {
        self.pause().await;
        self.available()?;
        self.flag_updates.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().unwrap();
        if update.is_current == Some(true)
            && Self::conflicting_holder(&records, ItemFlag::Current, id)
        {
            return Err(DomainError::Conflict("another record is current".into()));
        }
        if update.is_next == Some(true) && Self::conflicting_holder(&records, ItemFlag::Next, id) {
            return Err(DomainError::Conflict("another record is next".into()));
        }
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(DomainError::ItemNotFound(id))?;
        record.apply(&update);
        Ok(())
    }

    async fn release_window(&self, id: Uuid) -> Result<bool, DomainError> {
        self.pause().await;
        self.available()?;
        let mut records = self.records.lock().unwrap();
        match records
            .iter_mut()
            .find(|r| r.id == id && !r.is_current && r.activated_at.is_some())
        {
            Some(record) => {
                record.activated_at = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_used_texts(&self) -> Result<Vec<String>, DomainError> {
        self.pause().await;
        self.available()?;
        let records = self.records.lock().unwrap();
        Ok(window_owners(records.iter())
            .into_values()
            .map(|owner| owner.text.clone())
            .collect())
    }

    async fn list_history(&self, limit: usize) -> Result<Vec<ItemRecord>, DomainError> {
        self.pause().await;
        self.available()?;
        let records = self.records.lock().unwrap();
        let current_window = records
            .iter()
            .find(|r| r.is_current)
            .and_then(|r| r.activated_at);
        Ok(window_owners(records.iter())
            .into_iter()
            .rev()
            .filter(|(window, owner)| {
                !owner.is_current && current_window.is_none_or(|current| *window < current)
            })
            .take(limit)
            .map(|(_, owner)| owner.clone())
            .collect())
    }
}

/// A repository that always returns an infrastructure error. Useful for
/// testing read-failure paths.
#[derive(Debug)]
pub struct FailingItemRepository;

fn connection_refused() -> DomainError {
    DomainError::StoreUnavailable("connection refused".into())
}

#[async_trait]
impl ItemRepository for FailingItemRepository {
    async fn find_by_flag(&self, _flag: ItemFlag) -> Result<Option<ItemRecord>, DomainError> {
        Err(connection_refused())
    }

    async fn find_records_for_window(
        &self,
        _window_start: DateTime<Utc>,
    ) -> Result<Vec<ItemRecord>, DomainError> {
        Err(connection_refused())
    }

    async fn insert(&self, _record: ItemRecord) -> Result<ItemRecord, DomainError> {
        Err(connection_refused())
    }

    async fn clear_flag(&self, _flag: ItemFlag) -> Result<u64, DomainError> {
        Err(connection_refused())
    }

    async fn set_flags(&self, _id: Uuid, _update: FlagUpdate) -> Result<(), DomainError> {
        Err(connection_refused())
    }

    async fn release_window(&self, _id: Uuid) -> Result<bool, DomainError> {
        Err(connection_refused())
    }

    async fn list_used_texts(&self) -> Result<Vec<String>, DomainError> {
        Err(connection_refused())
    }

    async fn list_history(&self, _limit: usize) -> Result<Vec<ItemRecord>, DomainError> {
        Err(connection_refused())
    }
}

/// A repository whose reads succeed against an in-memory table but whose
/// writes always fail. Useful for testing write-failure paths.
#[derive(Debug, Default)]
pub struct WriteFailingItemRepository {
    inner: InMemoryItemRepository,
}

impl WriteFailingItemRepository {
    /// Serves reads from `records`; rejects every write.
    #[must_use]
    pub fn with_records(records: Vec<ItemRecord>) -> Self {
        Self {
            inner: InMemoryItemRepository::with_records(records),
        }
    }

    /// The underlying table, which no write ever changes.
    #[must_use]
    pub fn inner(&self) -> &InMemoryItemRepository {
        &self.inner
    }
}

#[async_trait]
impl ItemRepository for WriteFailingItemRepository {
    async fn find_by_flag(&self, flag: ItemFlag) -> Result<Option<ItemRecord>, DomainError> {
        self.inner.find_by_flag(flag).await
    }

    async fn find_records_for_window(
        &self,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<ItemRecord>, DomainError> {
        self.inner.find_records_for_window(window_start).await
    }

    async fn insert(&self, _record: ItemRecord) -> Result<ItemRecord, DomainError> {
        Err(connection_refused())
    }

    async fn clear_flag(&self, _flag: ItemFlag) -> Result<u64, DomainError> {
        Err(connection_refused())
    }

    async fn set_flags(&self, _id: Uuid, _update: FlagUpdate) -> Result<(), DomainError> {
        Err(connection_refused())
    }

    async fn release_window(&self, _id: Uuid) -> Result<bool, DomainError> {
        Err(connection_refused())
    }

    async fn list_used_texts(&self) -> Result<Vec<String>, DomainError> {
        self.inner.list_used_texts().await
    }

    async fn list_history(&self, limit: usize) -> Result<Vec<ItemRecord>, DomainError> {
        self.inner.list_history(limit).await
    }
}
