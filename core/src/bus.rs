//! In-process event bus: publish/subscribe keyed by event-type name.
//!
//! The bus connects the write side (append) to the read side (projections).
//! It is an explicitly constructed value — build one [`EventBus`] at
//! startup, share it via `Arc` with every aggregate-family wiring point,
//! and let it drop at process exit. There is no ambient global instance.
//!
//! # Delivery semantics
//!
//! - `publish` invokes every handler subscribed to the record's event-type
//!   name, **in registration order**, awaiting each in turn; it returns
//!   only after all matching handlers have completed.
//! - Handlers must not block indefinitely — there is no timeout.
//! - Handler errors are logged and swallowed; `publish` is infallible.
//! - There is no unsubscribe, no persistence of undelivered events, and no
//!   replay to late subscribers.
//!
//! ```
//! use grange_core::bus::EventBus;
//! # use grange_core::event::EventRecord;
//! # use grange_core::stream::{StreamId, Version};
//! # use chrono::Utc;
//!
//! # tokio_test::block_on(async {
//! let bus = EventBus::new();
//! bus.subscribe_fn("FarmCreated", |record: EventRecord| async move {
//!     println!("saw {}", record.event_type);
//!     Ok(())
//! })
//! .await;
//!
//! let record = EventRecord {
//!     stream_id: StreamId::new("farm-1"),
//!     version: Version::new(1),
//!     created_at: Utc::now(),
//!     event_type: "FarmCreated".to_string(),
//!     data: serde_json::json!({ "Name": "Acme Farm" }),
//! };
//! bus.publish(&record).await; // returns after the handler has run
//! # });
//! ```

use crate::event::EventRecord;
use crate::projection::ProjectionError;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Boxed future returned by bus handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send>>;

/// A subscribed handler: takes the published record, returns a future.
pub type EventHandler = Arc<dyn Fn(EventRecord) -> HandlerFuture + Send + Sync>;

/// In-process publish/subscribe dispatcher keyed by event-type name.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event-type name.
    ///
    /// Multiple handlers may subscribe to the same name; they run in
    /// registration order. There is no unsubscribe.
    pub async fn subscribe(&self, event_type: impl Into<String>, handler: EventHandler) {
        let mut handlers = self.handlers.write().await;
        handlers.entry(event_type.into()).or_default().push(handler);
    }

    /// Register a plain async closure as a handler.
    pub async fn subscribe_fn<F, Fut>(&self, event_type: impl Into<String>, handler: F)
    where
        F: Fn(EventRecord) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ProjectionError>> + Send + 'static,
    {
        self.subscribe(
            event_type,
            Arc::new(move |record| Box::pin(handler(record)) as HandlerFuture),
        )
        .await;
    }

    /// Publish a record to every handler subscribed to its event type.
    ///
    /// Returns only after all matching handlers have returned. Handler
    /// errors are logged at `error` level and swallowed — read-model
    /// failures must never abort the write path that published the event.
    pub async fn publish(&self, record: &EventRecord) {
        let matching: Vec<EventHandler> = {
            let handlers = self.handlers.read().await;
            handlers
                .get(&record.event_type)
                .map(|registered| registered.iter().map(Arc::clone).collect())
                .unwrap_or_default()
        };

        if matching.is_empty() {
            tracing::debug!(
                event_type = %record.event_type,
                stream_id = %record.stream_id,
                "no handlers subscribed"
            );
            return;
        }

        for handler in matching {
            if let Err(error) = handler(record.clone()).await {
                tracing::error!(
                    event_type = %record.event_type,
                    stream_id = %record.stream_id,
                    version = %record.version,
                    %error,
                    "event handler failed"
                );
            }
        }
    }

    /// Number of handlers currently subscribed to an event-type name.
    pub async fn handler_count(&self, event_type: &str) -> usize {
        let handlers = self.handlers.read().await;
        handlers.get(event_type).map_or(0, Vec::len)
    }
}
