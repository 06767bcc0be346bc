//! Event store abstraction: the append-only, versioned event log.
//!
//! The store keeps one ordered log per aggregate id. `append` assigns
//! monotonically increasing version numbers to the supplied events and
//! persists them together with a timestamp and the event-type name; `load`
//! returns the full ordered history (empty for unknown streams — new
//! streams start empty, that is not an error).
//!
//! # Implementations
//!
//! - `InMemoryEventStore` (in `grange-testing`): mutex-guarded map, for
//!   tests and single-process deployments
//! - `SqliteEventStore` (in `grange-sqlite`): embedded file-based SQL
//! - `PostgresEventStore` (in `grange-postgres`): networked SQL
//!
//! # No optimistic-concurrency check
//!
//! `append` takes the caller's last-known version purely as the numbering
//! base: the store does **not** verify it against the stream's actual head
//! before writing. Two concurrent load→mutate→save cycles on the same id
//! can therefore interleave or duplicate version numbers. This mirrors the
//! single-writer assumption of the reference system and is deliberately
//! preserved rather than silently replaced with compare-and-swap; see
//! `DESIGN.md` and the race-documentation test in `grange-domain`.
//!
//! # Dyn compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of `async fn` so the
//! trait can be held as `Arc<dyn EventStore>` and shared across every
//! aggregate-family wiring point.

use crate::event::{EventRecord, SerializedEvent};
use crate::stream::{StreamId, Version};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`EventStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors raised by event store backends.
///
/// Both failure modes are terminal per call: nothing is retried and the
/// error surfaces synchronously to the caller.
#[derive(Error, Debug)]
pub enum EventStoreError {
    /// The backend could not be reached or the query failed.
    #[error("event store backend error: {0}")]
    Backend(String),

    /// A payload could not be serialized for persistence, or a persisted
    /// row could not be read back into an [`EventRecord`].
    #[error("event serialization error: {0}")]
    Serialization(String),
}

/// The append-only, per-aggregate-id ordered event log.
pub trait EventStore: Send + Sync {
    /// Append events to a stream, assigning versions
    /// `base_version + 1, +2, …` in the supplied order.
    ///
    /// Returns the persisted records in append order, carrying the
    /// versions and the timestamp the store assigned. Downstream
    /// publication must use these records, not rebuilt ones, so the
    /// read side sees exactly what the log holds.
    ///
    /// `base_version` is the caller's last-known version for the stream;
    /// it is **not** validated against the stream head (see module docs).
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::Serialization`] if a payload cannot be written
    /// - [`EventStoreError::Backend`] on connectivity/query failure
    fn append(
        &self,
        stream_id: StreamId,
        base_version: Version,
        events: Vec<SerializedEvent>,
    ) -> StoreFuture<'_, Result<Vec<EventRecord>, EventStoreError>>;

    /// Load the full ordered history for a stream.
    ///
    /// Returns records ordered by version, oldest first; an unknown stream
    /// yields an empty vector.
    ///
    /// # Errors
    ///
    /// - [`EventStoreError::Backend`] on connectivity/query failure
    /// - [`EventStoreError::Serialization`] if a stored row is unreadable
    fn load(&self, stream_id: StreamId) -> StoreFuture<'_, Result<Vec<EventRecord>, EventStoreError>>;
}
