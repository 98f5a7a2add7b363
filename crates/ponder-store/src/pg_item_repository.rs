//! `PostgreSQL` implementation of the `ItemRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use ponder_core::error::DomainError;
use ponder_core::item::{FlagUpdate, ItemFlag, ItemRecord};
use ponder_core::repository::ItemRepository;

const SELECT_COLUMNS: &str = "id, text, created_at, activated_at, is_current, is_next";

/// One row per window: its owner, ranked the same way as
/// `ItemRecord::window_claim`.
const OWNERS_SQL: &str = "SELECT DISTINCT ON (activated_at) \
         id, text, created_at, activated_at, is_current, is_next \
     FROM items \
     WHERE activated_at IS NOT NULL \
     ORDER BY activated_at, is_current DESC, created_at, id";

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    text: String,
    created_at: DateTime<Utc>,
    activated_at: Option<DateTime<Utc>>,
    is_current: bool,
    is_next: bool,
}

impl From<ItemRow> for ItemRecord {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            text: row.text,
            created_at: row.created_at,
            activated_at: row.activated_at,
            is_current: row.is_current,
            is_next: row.is_next,
        }
    }
}

/// Maps driver errors onto the domain taxonomy: index violations mean
/// another writer holds the flag, everything else is an unavailable store.
fn map_error(operation: &str, error: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() {
            return DomainError::Conflict(format!("{operation}: {}", db.message()));
        }
        if db.is_check_violation() {
            return DomainError::Validation(format!("{operation}: {}", db.message()));
        }
    }
    DomainError::StoreUnavailable(format!("{operation}: {error}"))
}

/// PostgreSQL-backed item repository.
#[derive(Debug, Clone)]
pub struct PgItemRepository {
    pool: PgPool,
}

impl PgItemRepository {
    /// Creates a new `PgItemRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemRepository for PgItemRepository {
    async fn find_by_flag(&self, flag: ItemFlag) -> Result<Option<ItemRecord>, DomainError> {
        let sql = match flag {
            ItemFlag::Current => format!("SELECT {SELECT_COLUMNS} FROM items WHERE is_current"),
            ItemFlag::Next => format!("SELECT {SELECT_COLUMNS} FROM items WHERE is_next"),
        };
        let row: Option<ItemRow> = sqlx::query_as(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_error("find_by_flag", e))?;
        Ok(row.map(ItemRecord::from))
    }

    async fn find_records_for_window(
        &self,
        window_start: DateTime<Utc>,
    ) -> Result<Vec<ItemRecord>, DomainError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM items WHERE activated_at = $1 ORDER BY created_at, id"
        );
        let rows: Vec<ItemRow> = sqlx::query_as(&sql)
            .bind(window_start)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_error("find_records_for_window", e))?;
        Ok(rows.into_iter().map(ItemRecord::from).collect())
    }

    async fn insert(&self, record: ItemRecord) -> Result<ItemRecord, DomainError> {
        let sql = format!(
            "INSERT INTO items (id, text, created_at, activated_at, is_current, is_next) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {SELECT_COLUMNS}"
        );
        let row: ItemRow = sqlx::query_as(&sql)
            .bind(record.id)
            .bind(&record.text)
            .bind(record.created_at)
            .bind(record.activated_at)
            .bind(record.is_current)
            .bind(record.is_next)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_error("insert", e))?;
        debug!(id = %row.id, "inserted item");
        Ok(row.into())
    }

    async fn clear_flag(&self, flag: ItemFlag) -> Result<u64, DomainError> {
        let sql = match flag {
            ItemFlag::Current => "UPDATE items SET is_current = FALSE WHERE is_current",
            ItemFlag::Next => "UPDATE items SET is_next = FALSE WHERE is_next",
        };
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| map_error("clear_flag", e))?;
        Ok(result.rows_affected())
    }

    async fn set_flags(&self, id: Uuid, update: FlagUpdate) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE items SET \
                 is_current = COALESCE($2, is_current), \
                 is_next = COALESCE($3, is_next), \
                 activated_at = COALESCE(activated_at, $4) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(update.is_current)
        .bind(update.is_next)
        .bind(update.activated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_error("set_flags", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ItemNotFound(id));
        }
        Ok(())
    }

    async fn release_window(&self, id: Uuid) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "UPDATE items SET activated_at = NULL \
             WHERE id = $1 AND NOT is_current AND activated_at IS NOT NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_error("release_window", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_used_texts(&self) -> Result<Vec<String>, DomainError> {
        let sql = format!("SELECT text FROM ({OWNERS_SQL}) AS owners ORDER BY activated_at");
        sqlx::query_scalar(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_error("list_used_texts", e))
    }

    async fn list_history(&self, limit: usize) -> Result<Vec<ItemRecord>, DomainError> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM ({OWNERS_SQL}) AS owners \
             WHERE NOT owners.is_current \
               AND NOT EXISTS ( \
                   SELECT 1 FROM items AS held \
                   WHERE held.is_current AND held.activated_at <= owners.activated_at \
               ) \
             ORDER BY activated_at DESC \
             LIMIT $1"
        );
        let rows: Vec<ItemRow> = sqlx::query_as(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_error("list_history", e))?;
        Ok(rows.into_iter().map(ItemRecord::from).collect())
    }
}
