//! # Grange Testing
//!
//! In-memory storage backends and fixtures for Grange.
//!
//! This crate provides:
//! - [`InMemoryEventStore`]: map-backed append-only event log
//! - [`InMemoryReadStore`]: map-backed denormalized read store
//! - [`FixedClock`] / [`test_clock`]: deterministic time
//! - [`RecordingProjection`]: captures dispatched records for assertions
//!
//! The in-memory backends implement the same `grange-core` traits as the
//! SQL backends and are also suitable for single-process deployments, not
//! only tests. Each backend guards its map with one reader-writer lock:
//! writers take the exclusive lock, readers the shared lock, and no lock
//! is held across an await point.

pub mod event_store;
pub mod read_store;

pub use event_store::InMemoryEventStore;
pub use read_store::InMemoryReadStore;

use chrono::{DateTime, Utc};
use grange_core::environment::Clock;
use grange_core::event::EventRecord;
use grange_core::projection::{Projection, ProjectionError};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

/// Fixed clock for deterministic tests.
///
/// Always returns the same instant, so `created_date` stamps are
/// reproducible.
///
/// ```
/// use grange_testing::test_clock;
/// use grange_core::environment::Clock;
///
/// let clock = test_clock();
/// assert_eq!(clock.now(), clock.now());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a fixed clock pinned to the given instant.
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// A default fixed clock for tests (2026-01-01 00:00:00 UTC).
///
/// # Panics
///
/// Panics if the hardcoded timestamp fails to parse, which cannot happen.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}

/// Projection stub that records every event it is asked to apply.
///
/// Subscribe it next to a real projection to assert what the bus
/// dispatched and in which order.
pub struct RecordingProjection {
    name: &'static str,
    event_types: &'static [&'static str],
    seen: Mutex<Vec<EventRecord>>,
}

impl RecordingProjection {
    /// A recorder subscribing to the given event-type names.
    #[must_use]
    pub const fn new(name: &'static str, event_types: &'static [&'static str]) -> Self {
        Self {
            name,
            event_types,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every record applied so far, in dispatch order.
    #[must_use]
    pub fn seen(&self) -> Vec<EventRecord> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Projection for RecordingProjection {
    fn name(&self) -> &'static str {
        self.name
    }

    fn event_types(&self) -> &'static [&'static str] {
        self.event_types
    }

    fn apply(
        &self,
        record: &EventRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grange_core::stream::{StreamId, Version};

    #[test]
    fn fixed_clock_is_constant() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[tokio::test]
    async fn recording_projection_captures_in_order() {
        let recorder = RecordingProjection::new("recorder", &["FarmCreated"]);
        for version in 1..=3_u64 {
            let record = EventRecord {
                stream_id: StreamId::new("farm-1"),
                version: Version::new(version),
                created_at: test_clock().now(),
                event_type: "FarmCreated".to_string(),
                data: serde_json::Value::Null,
            };
            recorder.apply(&record).await.ok();
        }
        let versions: Vec<u64> = recorder.seen().iter().map(|r| r.version.value()).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }
}
