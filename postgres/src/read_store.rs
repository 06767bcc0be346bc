//! `PostgreSQL` read store.

use grange_core::event_store::StoreFuture;
use grange_core::read_store::{ReadStore, ReadStoreError};
use grange_core::stream::StreamId;
use sqlx::PgPool;

/// Denormalized read rows on `PostgreSQL`, one JSONB row per
/// `(kind, aggregate_uid)`.
#[derive(Clone)]
pub struct PostgresReadStore {
    pool: PgPool,
}

impl PostgresReadStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for custom queries.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(e: sqlx::Error) -> ReadStoreError {
    ReadStoreError::Backend(e.to_string())
}

impl ReadStore for PostgresReadStore {
    fn upsert(
        &self,
        kind: &'static str,
        id: StreamId,
        row: serde_json::Value,
    ) -> StoreFuture<'_, Result<(), ReadStoreError>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO read_models (kind, aggregate_uid, data, updated_at)
                 VALUES ($1, $2, $3, now())
                 ON CONFLICT (kind, aggregate_uid) DO UPDATE
                 SET data = EXCLUDED.data, updated_at = now()",
            )
            .bind(kind)
            .bind(id.as_str())
            .bind(&row)
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
            let row: Option<(serde_json::Value,)> = sqlx::query_as(
                "SELECT data FROM read_models WHERE kind = $1 AND aggregate_uid = $2",
            )
            .bind(kind)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
            Ok(row.map(|(data,)| data))
        })
    }

    fn find_all(
        &self,
        kind: &'static str,
    ) -> StoreFuture<'_, Result<Vec<serde_json::Value>, ReadStoreError>> {
        Box::pin(async move {
            let rows: Vec<(serde_json::Value,)> =
                sqlx::query_as("SELECT data FROM read_models WHERE kind = $1")
                    .bind(kind)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(backend)?;
            Ok(rows.into_iter().map(|(data,)| data).collect())
        })
    }
}
