//! `PostgreSQL` event log.

use chrono::{DateTime, Utc};
use grange_core::environment::{Clock, SystemClock};
use grange_core::event::{EventRecord, SerializedEvent, envelope, split_envelope};
use grange_core::event_store::{EventStore, EventStoreError, StoreFuture};
use grange_core::stream::{StreamId, Version};
use sqlx::PgPool;
use std::sync::Arc;

/// Append-only event log on `PostgreSQL`.
///
/// One `append` call runs in a single transaction, so the events of one
/// call are persisted in order or not at all. Independent calls to the
/// same stream are **not** serialized against each other — the store does
/// no version conflict detection (see `grange_core::event_store`).
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresEventStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    /// Wrap a pool with an injected clock for `created_date` stamps.
    #[must_use]
    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// The underlying pool, for custom queries.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(e: sqlx::Error) -> EventStoreError {
    EventStoreError::Backend(e.to_string())
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        stream_id: StreamId,
        base_version: Version,
        events: Vec<SerializedEvent>,
    ) -> StoreFuture<'_, Result<Vec<EventRecord>, EventStoreError>> {
        Box::pin(async move {
            let created_date = self.clock.now();
            let mut tx = self.pool.begin().await.map_err(backend)?;
            let mut version = base_version;
            let mut appended = Vec::with_capacity(events.len());
            for wire in events {
                version = version.next();
                let envelope = envelope(&wire.event_type, wire.data.clone());
                // Version wraps at 2^63 events, which no stream reaches.
                #[allow(clippy::cast_possible_wrap)]
                let version_i64 = version.value() as i64;
                sqlx::query(
                    "INSERT INTO events (aggregate_uid, version, created_date, event)
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(stream_id.as_str())
                .bind(version_i64)
                .bind(created_date)
                .bind(&envelope)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
                appended.push(EventRecord {
                    stream_id: stream_id.clone(),
                    version,
                    created_at: created_date,
                    event_type: wire.event_type,
                    data: wire.data,
                });
            }
            tx.commit().await.map_err(backend)?;
            Ok(appended)
        })
    }

    fn load(
        &self,
        stream_id: StreamId,
    ) -> StoreFuture<'_, Result<Vec<EventRecord>, EventStoreError>> {
        Box::pin(async move {
            let rows: Vec<(i64, DateTime<Utc>, serde_json::Value)> = sqlx::query_as(
                "SELECT version, created_date, event
                 FROM events
                 WHERE aggregate_uid = $1
                 ORDER BY version ASC, id ASC",
            )
            .bind(stream_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

            rows.into_iter()
                .map(|(version, created_date, stored)| {
                    let (event_type, data) = split_envelope(stored)
                        .map_err(|e| EventStoreError::Serialization(e.to_string()))?;
                    #[allow(clippy::cast_sign_loss)] // Versions are always positive
                    Ok(EventRecord {
                        stream_id: stream_id.clone(),
                        version: Version::new(version as u64),
                        created_at: created_date,
                        event_type,
                        data,
                    })
                })
                .collect()
        })
    }
}
