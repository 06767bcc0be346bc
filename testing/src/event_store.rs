//! Map-backed event store.

use chrono::{DateTime, Utc};
use grange_core::environment::{Clock, SystemClock};
use grange_core::event::{EventRecord, SerializedEvent};
use grange_core::event_store::{EventStore, EventStoreError, StoreFuture};
use grange_core::stream::{StreamId, Version};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// In-memory, append-only event log.
///
/// One `RwLock` guards the whole map: `append` takes the exclusive lock,
/// `load` the shared lock. Like every [`EventStore`] backend, `append`
/// treats the caller's base version purely as a numbering seed — it does
/// not check it against the stream head, so racing writers can interleave
/// or duplicate version numbers (see `grange_core::event_store`).
///
/// ```
/// use grange_testing::InMemoryEventStore;
/// use grange_core::event_store::EventStore;
/// use grange_core::event::SerializedEvent;
/// use grange_core::stream::{StreamId, Version};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryEventStore::new();
/// let event = SerializedEvent {
///     event_type: "FarmCreated".to_string(),
///     data: serde_json::json!({ "Name": "Acme Farm" }),
/// };
/// let appended = store
///     .append(StreamId::new("farm-1"), Version::INITIAL, vec![event])
///     .await
///     .unwrap();
/// assert_eq!(appended.len(), 1);
/// assert_eq!(appended[0].version, Version::new(1));
/// # });
/// ```
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<StreamId, Vec<EventRecord>>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventStore {
    /// An empty store stamping records with the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// An empty store with an injected clock (use `FixedClock` for
    /// deterministic `created_date` stamps).
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Snapshot of one stream's log, for assertions.
    #[must_use]
    pub fn records(&self, stream_id: &StreamId) -> Vec<EventRecord> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stream_id)
            .cloned()
            .unwrap_or_default()
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        stream_id: StreamId,
        base_version: Version,
        events: Vec<SerializedEvent>,
    ) -> StoreFuture<'_, Result<Vec<EventRecord>, EventStoreError>> {
        Box::pin(async move {
            let created_at = self.now();
            let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
            let log = streams.entry(stream_id.clone()).or_default();
            let mut version = base_version;
            let mut appended = Vec::with_capacity(events.len());
            for wire in events {
                version = version.next();
                appended.push(EventRecord {
                    stream_id: stream_id.clone(),
                    version,
                    created_at,
                    event_type: wire.event_type,
                    data: wire.data,
                });
            }
            log.extend(appended.iter().cloned());
            Ok(appended)
        })
    }

    fn load(
        &self,
        stream_id: StreamId,
    ) -> StoreFuture<'_, Result<Vec<EventRecord>, EventStoreError>> {
        Box::pin(async move {
            Ok(self
                .streams
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&stream_id)
                .cloned()
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Panics: tests fail on store errors
mod tests {
    use super::*;
    use crate::test_clock;

    fn wire(event_type: &str) -> SerializedEvent {
        SerializedEvent {
            event_type: event_type.to_string(),
            data: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn append_assigns_sequential_versions() {
        let store = InMemoryEventStore::with_clock(Arc::new(test_clock()));
        let id = StreamId::new("farm-1");

        let first = store
            .append(id.clone(), Version::INITIAL, vec![wire("FarmCreated")])
            .await
            .unwrap();
        assert_eq!(first.last().unwrap().version, Version::new(1));

        let rest = store
            .append(
                id.clone(),
                Version::new(1),
                vec![wire("FarmNameChanged"), wire("FarmNameChanged")],
            )
            .await
            .unwrap();
        assert_eq!(rest.last().unwrap().version, Version::new(3));

        let log = store.load(id).await.unwrap();
        let versions: Vec<u64> = log.iter().map(|r| r.version.value()).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(log[0].created_at, test_clock().now());
        // What append handed back is exactly what the log holds.
        assert_eq!(log, [first, rest].concat());
    }

    #[tokio::test]
    async fn unknown_stream_loads_empty() {
        let store = InMemoryEventStore::new();
        let log = store.load(StreamId::new("farm-missing")).await.unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn streams_are_isolated() {
        let store = InMemoryEventStore::new();
        store
            .append(StreamId::new("farm-1"), Version::INITIAL, vec![wire("FarmCreated")])
            .await
            .unwrap();
        store
            .append(StreamId::new("farm-2"), Version::INITIAL, vec![wire("FarmCreated")])
            .await
            .unwrap();

        assert_eq!(store.records(&StreamId::new("farm-1")).len(), 1);
        assert_eq!(store.records(&StreamId::new("farm-2")).len(), 1);
    }

    #[tokio::test]
    async fn append_does_not_detect_version_conflicts() {
        // Two writers that both observed version 0: the store happily
        // appends both, producing duplicate version numbers.
        let store = InMemoryEventStore::new();
        let id = StreamId::new("farm-1");

        store
            .append(id.clone(), Version::INITIAL, vec![wire("FarmCreated")])
            .await
            .unwrap();
        store
            .append(id.clone(), Version::INITIAL, vec![wire("FarmCreated")])
            .await
            .unwrap();

        let versions: Vec<u64> = store
            .records(&id)
            .iter()
            .map(|r| r.version.value())
            .collect();
        assert_eq!(versions, vec![1, 1]);
    }
}
