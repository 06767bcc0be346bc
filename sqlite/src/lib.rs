//! # Grange SQLite
//!
//! Embedded file-based SQL backends for Grange, over `sqlx`/SQLite.
//!
//! Schema mirrors the `PostgreSQL` backend with the envelope stored as
//! TEXT:
//!
//! ```sql
//! CREATE TABLE events (
//!     id            INTEGER PRIMARY KEY AUTOINCREMENT,
//!     aggregate_uid TEXT NOT NULL,
//!     version       INTEGER NOT NULL,
//!     created_date  TEXT NOT NULL,
//!     event         TEXT NOT NULL
//! );
//! ```
//!
//! As in every backend, there is no unique constraint on
//! `(aggregate_uid, version)` and no optimistic-concurrency check on
//! append (see `grange_core::event_store`).
//!
//! Call [`migrate`] once after connecting. [`connect`] keeps the pool at a
//! single connection, which both serializes writers and makes
//! `sqlite::memory:` URLs behave (each connection would otherwise get its
//! own private in-memory database).

mod event_store;
mod read_store;

pub use event_store::SqliteEventStore;
pub use read_store::SqliteReadStore;

use grange_core::event_store::EventStoreError;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Connect an embedded database (e.g. `sqlite://grange.db?mode=rwc`).
///
/// # Errors
///
/// Returns [`EventStoreError::Backend`] if the connection fails.
pub async fn connect(database_url: &str) -> Result<SqlitePool, EventStoreError> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(database_url)
        .await
        .map_err(|e| EventStoreError::Backend(format!("failed to connect: {e}")))
}

/// Create the `events` and `read_models` tables if they do not exist.
///
/// # Errors
///
/// Returns [`EventStoreError::Backend`] if the DDL fails.
pub async fn migrate(pool: &SqlitePool) -> Result<(), EventStoreError> {
    let statements = [
        r"CREATE TABLE IF NOT EXISTS events (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            aggregate_uid TEXT NOT NULL,
            version       INTEGER NOT NULL,
            created_date  TEXT NOT NULL,
            event         TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_events_aggregate ON events(aggregate_uid, version)",
        r"CREATE TABLE IF NOT EXISTS read_models (
            kind          TEXT NOT NULL,
            aggregate_uid TEXT NOT NULL,
            data          TEXT NOT NULL,
            updated_at    TEXT NOT NULL,
            PRIMARY KEY (kind, aggregate_uid)
        )",
    ];
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| EventStoreError::Backend(format!("migration failed: {e}")))?;
    }
    tracing::debug!("sqlite schema ready");
    Ok(())
}
