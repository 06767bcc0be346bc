//! # Grange Postgres
//!
//! Networked SQL backends for Grange: a `PostgreSQL` event log and read
//! store over `sqlx`.
//!
//! # At-rest format
//!
//! Events live in one `events` table, one row per event:
//!
//! ```sql
//! CREATE TABLE events (
//!     id            BIGSERIAL PRIMARY KEY,
//!     aggregate_uid TEXT NOT NULL,
//!     version       BIGINT NOT NULL,
//!     created_date  TIMESTAMPTZ NOT NULL,
//!     event         JSONB NOT NULL
//! );
//! ```
//!
//! The `event` column holds the `{ "EventName", "EventData" }` envelope.
//! There is deliberately **no** unique constraint on
//! `(aggregate_uid, version)`: the store performs no
//! optimistic-concurrency check, and racing writers may produce duplicate
//! version numbers (see `grange_core::event_store`).
//!
//! Read rows live in `read_models (kind, aggregate_uid, data, updated_at)`
//! keyed by aggregate kind and id, with the whole denormalized row as
//! JSONB.
//!
//! Call [`migrate`] once at startup to create both tables.

mod event_store;
mod read_store;

pub use event_store::PostgresEventStore;
pub use read_store::PostgresReadStore;

use grange_core::event_store::EventStoreError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connect a pool with sensible defaults.
///
/// # Errors
///
/// Returns [`EventStoreError::Backend`] if the connection fails.
pub async fn connect(database_url: &str) -> Result<PgPool, EventStoreError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| EventStoreError::Backend(format!("failed to connect: {e}")))
}

/// Create the `events` and `read_models` tables if they do not exist.
///
/// # Errors
///
/// Returns [`EventStoreError::Backend`] if the DDL fails.
pub async fn migrate(pool: &PgPool) -> Result<(), EventStoreError> {
    let statements = [
        r"CREATE TABLE IF NOT EXISTS events (
            id            BIGSERIAL PRIMARY KEY,
            aggregate_uid TEXT NOT NULL,
            version       BIGINT NOT NULL,
            created_date  TIMESTAMPTZ NOT NULL,
            event         JSONB NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_events_aggregate ON events(aggregate_uid, version)",
        r"CREATE TABLE IF NOT EXISTS read_models (
            kind          TEXT NOT NULL,
            aggregate_uid TEXT NOT NULL,
            data          JSONB NOT NULL,
            updated_at    TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (kind, aggregate_uid)
        )",
    ];
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| EventStoreError::Backend(format!("migration failed: {e}")))?;
    }
    tracing::debug!("postgres schema ready");
    Ok(())
}
