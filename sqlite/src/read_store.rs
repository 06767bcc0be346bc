//! SQLite read store.

use chrono::Utc;
use grange_core::event_store::StoreFuture;
use grange_core::read_store::{ReadStore, ReadStoreError};
use grange_core::stream::StreamId;
use sqlx::SqlitePool;

/// Denormalized read rows on SQLite, one JSON text row per
/// `(kind, aggregate_uid)`.
#[derive(Clone)]
pub struct SqliteReadStore {
    pool: SqlitePool,
}

impl SqliteReadStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for custom queries.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn backend(e: sqlx::Error) -> ReadStoreError {
    ReadStoreError::Backend(e.to_string())
}

impl ReadStore for SqliteReadStore {
    fn upsert(
        &self,
        kind: &'static str,
        id: StreamId,
        row: serde_json::Value,
    ) -> StoreFuture<'_, Result<(), ReadStoreError>> {
        Box::pin(async move {
            let data = serde_json::to_string(&row)
                .map_err(|e| ReadStoreError::Serialization(e.to_string()))?;
            sqlx::query(
                "INSERT INTO read_models (kind, aggregate_uid, data, updated_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT (kind, aggregate_uid) DO UPDATE
                 SET data = excluded.data, updated_at = excluded.updated_at",
            )
            .bind(kind)
            .bind(id.as_str())
            .bind(&data)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
            Ok(())
        })
    }

    fn find_by_id(
        &self,
        kind: &'static str,
        id: StreamId,
    ) -> StoreFuture<'_, Result<Option<serde_json::Value>, ReadStoreError>> {
        Box::pin(async move {
            let row: Option<(String,)> = sqlx::query_as(
                "SELECT data FROM read_models WHERE kind = ? AND aggregate_uid = ?",
            )
            .bind(kind)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
            row.map(|(data,)| {
                serde_json::from_str(&data)
                    .map_err(|e| ReadStoreError::Serialization(e.to_string()))
            })
            .transpose()
        })
    }

    fn find_all(
        &self,
        kind: &'static str,
    ) -> StoreFuture<'_, Result<Vec<serde_json::Value>, ReadStoreError>> {
        Box::pin(async move {
            let rows: Vec<(String,)> =
                sqlx::query_as("SELECT data FROM read_models WHERE kind = ?")
                    .bind(kind)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(backend)?;
            rows.into_iter()
                .map(|(data,)| {
                    serde_json::from_str(&data)
                        .map_err(|e| ReadStoreError::Serialization(e.to_string()))
                })
                .collect()
        })
    }
}
