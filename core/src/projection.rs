//! Projections: event-driven read-model updaters.
//!
//! Projections are the query side of CQRS. Each one subscribes to the event
//! bus under the event-type names it handles and keeps a denormalized read
//! model in sync with the write-side event history:
//!
//! - a `*Created` event builds a brand-new row from the payload (plus any
//!   cross-aggregate lookups, e.g. embedding the parent farm's name) and
//!   upserts it;
//! - every other event loads the existing row by id, applies the field
//!   delta, and upserts the whole row back. A missing row on update is
//!   [`ProjectionError::MissingRow`] — it means a Created event was missed
//!   or projected out of order.
//!
//! Nested collections (notes) are replace-on-write: the handler rewrites
//! the full collection inside the row, never patching at storage-row
//! granularity.
//!
//! # Failure policy
//!
//! Projection errors are logged and **not** propagated to the write path:
//! a failed projection leaves the read store stale for that event, with no
//! retry or dead-letter path. The log line carries the projection name,
//! event type, stream id and version so the drift is operationally
//! detectable. See `DESIGN.md` for the decision record.

use crate::bus::EventBus;
use crate::event::{CodecError, EventRecord};
use crate::read_store::ReadStoreError;
use crate::stream::StreamId;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while applying an event to a read model.
#[derive(Error, Debug)]
pub enum ProjectionError {
    /// The event payload could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The read store failed.
    #[error(transparent)]
    ReadStore(#[from] ReadStoreError),

    /// An update event arrived for a row that does not exist — a missed or
    /// out-of-order Created event.
    #[error("no {kind} read row for '{stream_id}'")]
    MissingRow {
        /// The read-model kind.
        kind: &'static str,
        /// The aggregate id with no row.
        stream_id: StreamId,
    },
}

/// A read-model updater for one aggregate family.
pub trait Projection: Send + Sync {
    /// Unique projection name, used in failure logs.
    fn name(&self) -> &'static str;

    /// The event-type names this projection subscribes to.
    fn event_types(&self) -> &'static [&'static str];

    /// Apply one event's effect to the read model.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError`] on decode, storage, or missing-row
    /// failures. The bus wrapper installed by [`register`] logs and
    /// swallows the error; it never reaches the publisher.
    fn apply(
        &self,
        record: &EventRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>>;
}

/// Subscribe a projection to the bus under each of its event-type names.
///
/// The installed handler logs failures at `error` level and reports success
/// to the bus, keeping the write path isolated from read-model breakage.
pub async fn register(bus: &EventBus, projection: Arc<dyn Projection>) {
    for event_type in projection.event_types() {
        let projection = Arc::clone(&projection);
        bus.subscribe_fn(*event_type, move |record: EventRecord| {
            let projection = Arc::clone(&projection);
            async move {
                if let Err(error) = projection.apply(&record).await {
                    tracing::error!(
                        projection = projection.name(),
                        event_type = %record.event_type,
                        stream_id = %record.stream_id,
                        version = %record.version,
                        %error,
                        "projection failed; read model is now stale for this event"
                    );
                }
                Ok(())
            }
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Version;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyProjection {
        applied: AtomicUsize,
    }

    impl Projection for FlakyProjection {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn event_types(&self) -> &'static [&'static str] {
            &["ThingCreated", "ThingRenamed"]
        }

        fn apply(
            &self,
            record: &EventRecord,
        ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
            let fail = record.event_type == "ThingRenamed";
            self.applied.fetch_add(1, Ordering::SeqCst);
            let stream_id = record.stream_id.clone();
            Box::pin(async move {
                if fail {
                    Err(ProjectionError::MissingRow {
                        kind: "Thing",
                        stream_id,
                    })
                } else {
                    Ok(())
                }
            })
        }
    }

    fn record(event_type: &str) -> EventRecord {
        EventRecord {
            stream_id: StreamId::new("thing-1"),
            version: Version::new(1),
            created_at: Utc::now(),
            event_type: event_type.to_string(),
            data: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn register_subscribes_each_event_type() {
        let bus = EventBus::new();
        let projection = Arc::new(FlakyProjection {
            applied: AtomicUsize::new(0),
        });
        register(&bus, Arc::clone(&projection) as Arc<dyn Projection>).await;

        bus.publish(&record("ThingCreated")).await;
        bus.publish(&record("ThingRenamed")).await;
        bus.publish(&record("ThingIgnored")).await;

        assert_eq!(projection.applied.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn projection_failure_is_swallowed() {
        let bus = EventBus::new();
        let projection = Arc::new(FlakyProjection {
            applied: AtomicUsize::new(0),
        });
        register(&bus, Arc::clone(&projection) as Arc<dyn Projection>).await;

        // ThingRenamed fails inside the projection; publish must not
        // surface it.
        bus.publish(&record("ThingRenamed")).await;
        assert_eq!(projection.applied.load(Ordering::SeqCst), 1);
    }
}
