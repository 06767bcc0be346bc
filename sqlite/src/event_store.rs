//! SQLite event log.

use chrono::{DateTime, Utc};
use grange_core::environment::{Clock, SystemClock};
use grange_core::event::{EventRecord, SerializedEvent, envelope, split_envelope};
use grange_core::event_store::{EventStore, EventStoreError, StoreFuture};
use grange_core::stream::{StreamId, Version};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Append-only event log on an embedded SQLite database.
///
/// Timestamps are stored as RFC 3339 text and parsed back on load; the
/// envelope is serialized JSON text.
#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteEventStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    /// Wrap a pool with an injected clock for `created_date` stamps.
    #[must_use]
    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// The underlying pool, for custom queries.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn backend(e: sqlx::Error) -> EventStoreError {
    EventStoreError::Backend(e.to_string())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, EventStoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| EventStoreError::Serialization(format!("bad created_date '{raw}': {e}")))
}

impl EventStore for SqliteEventStore {
    fn append(
        &self,
        stream_id: StreamId,
        base_version: Version,
        events: Vec<SerializedEvent>,
    ) -> StoreFuture<'_, Result<Vec<EventRecord>, EventStoreError>> {
        Box::pin(async move {
            let created_at = self.clock.now();
            let created_date = created_at.to_rfc3339();
            let mut tx = self.pool.begin().await.map_err(backend)?;
            let mut version = base_version;
            let mut appended = Vec::with_capacity(events.len());
            for wire in events {
                version = version.next();
                let stored = serde_json::to_string(&envelope(&wire.event_type, wire.data.clone()))
                    .map_err(|e| EventStoreError::Serialization(e.to_string()))?;
                // Version wraps at 2^63 events, which no stream reaches.
                #[allow(clippy::cast_possible_wrap)]
                let version_i64 = version.value() as i64;
                sqlx::query(
                    "INSERT INTO events (aggregate_uid, version, created_date, event)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(stream_id.as_str())
                .bind(version_i64)
                .bind(&created_date)
                .bind(&stored)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
                appended.push(EventRecord {
                    stream_id: stream_id.clone(),
                    version,
                    created_at,
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
            let rows: Vec<(i64, String, String)> = sqlx::query_as(
                "SELECT version, created_date, event
                 FROM events
                 WHERE aggregate_uid = ?
                 ORDER BY version ASC, id ASC",
            )
            .bind(stream_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

            rows.into_iter()
                .map(|(version, created_date, stored)| {
                    let value: serde_json::Value = serde_json::from_str(&stored)
                        .map_err(|e| EventStoreError::Serialization(e.to_string()))?;
                    let (event_type, data) = split_envelope(value)
                        .map_err(|e| EventStoreError::Serialization(e.to_string()))?;
                    #[allow(clippy::cast_sign_loss)] // Versions are always positive
                    Ok(EventRecord {
                        stream_id: stream_id.clone(),
                        version: Version::new(version as u64),
                        created_at: parse_timestamp(&created_date)?,
                        event_type,
                        data,
                    })
                })
                .collect()
        })
    }
}
