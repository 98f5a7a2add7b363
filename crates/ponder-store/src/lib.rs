//! PostgreSQL-backed item store for the Ponder rotation engine.

pub mod pg_item_repository;

use sqlx::PgPool;
use sqlx::migrate::MigrateError;

/// Applies the embedded schema migrations.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails or the recorded history does
/// not match the embedded files.
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}
