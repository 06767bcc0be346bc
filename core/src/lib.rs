//! # Grange Core
//!
//! Event-sourcing and CQRS core for the Grange farm-management backend.
//!
//! Domain entities (farms, areas, reservoirs, materials, crops, users)
//! never mutate fields directly. Instead:
//!
//! 1. a command method validates input and records an event via
//!    [`aggregate::Aggregate::track_change`];
//! 2. the queued events are appended to the per-aggregate, versioned
//!    [`event_store::EventStore`] log;
//! 3. each appended record is published on the in-process
//!    [`bus::EventBus`];
//! 4. subscribed [`projection::Projection`]s fold the events into
//!    denormalized [`read_store::ReadStore`] rows;
//! 5. queries read exclusively from the read store — the log is only
//!    replayed to rehydrate an aggregate for its next command.
//!
//! ```text
//! command ──► Aggregate::track_change ──► EventStore::append
//!                                              │
//!                                              ▼
//!                       ReadStore ◄── Projection ◄── EventBus::publish
//! ```
//!
//! The write and read sides share no transaction: the read model is
//! eventually consistent, and a projection failure is logged rather than
//! propagated to the writer (see [`projection`] for the policy).
//!
//! Events at rest are JSON envelopes, `{ "EventName", "EventData" }`; see
//! [`event`] for the codec and [`event_store`] for the deliberately absent
//! optimistic-concurrency check.

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod aggregate;
pub mod bus;
pub mod environment;
pub mod event;
pub mod event_store;
pub mod projection;
pub mod read_store;
pub mod repository;
pub mod stream;

pub use aggregate::{Aggregate, AggregateState, RehydrateError};
pub use bus::{EventBus, EventHandler, HandlerFuture};
pub use environment::{Clock, SystemClock};
pub use event::{CodecError, DomainEvent, EventRecord, SerializedEvent, decode, encode};
pub use event_store::{EventStore, EventStoreError, StoreFuture};
pub use projection::{Projection, ProjectionError, register};
pub use read_store::{ReadModelRow, ReadRepository, ReadStore, ReadStoreError};
pub use repository::{AggregateRepository, RepositoryError};
pub use stream::{StreamId, Version};
