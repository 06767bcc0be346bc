//! Aggregate core: event-driven state and rehydration.
//!
//! An aggregate never mutates fields directly. Commands validate input and
//! call [`Aggregate::track_change`], which applies the event to in-memory
//! state *and* queues it as uncommitted; the caller then persists the queue
//! through an event store and publishes the appended records.
//!
//! Rehydration is the inverse: replaying an ordered event history from the
//! zero-value state reproduces the aggregate exactly, because
//! [`AggregateState::transition`] is a pure function of `(state, event)`.
//!
//! ```
//! use grange_core::aggregate::{Aggregate, AggregateState};
//! use grange_core::event::DomainEvent;
//! use grange_core::stream::StreamId;
//! # use serde::{Deserialize, Serialize};
//! # #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
//! # #[serde(tag = "EventName", content = "EventData")]
//! # enum FarmEvent { FarmCreated { name: String } }
//! # impl DomainEvent for FarmEvent {
//! #     fn event_type(&self) -> &'static str { "FarmCreated" }
//! # }
//!
//! #[derive(Debug, Default, Clone)]
//! struct FarmState {
//!     name: String,
//! }
//!
//! impl AggregateState for FarmState {
//!     type Event = FarmEvent;
//!     const KIND: &'static str = "Farm";
//!
//!     fn transition(&mut self, event: &FarmEvent) {
//!         match event {
//!             FarmEvent::FarmCreated { name } => self.name = name.clone(),
//!         }
//!     }
//! }
//!
//! let mut farm = Aggregate::<FarmState>::new(StreamId::random());
//! farm.track_change(FarmEvent::FarmCreated { name: "Acme Farm".into() });
//! assert_eq!(farm.state().name, "Acme Farm");
//! assert_eq!(farm.uncommitted().len(), 1);
//! ```

use crate::event::{CodecError, DomainEvent, EventRecord, decode};
use crate::stream::{StreamId, Version};
use thiserror::Error;

/// Errors raised while rebuilding an aggregate from its history.
#[derive(Error, Debug)]
pub enum RehydrateError {
    /// A stored record could not be decoded into the family's event enum.
    #[error("cannot rehydrate {kind} '{stream_id}': {source}")]
    Codec {
        /// The aggregate kind being rebuilt.
        kind: &'static str,
        /// The stream that failed.
        stream_id: StreamId,
        /// The decode failure.
        source: CodecError,
    },
}

/// The event-sourced state of one aggregate family.
///
/// `transition` must be pure and deterministic: no IO, no clock reads, no
/// randomness. The event enum is closed, so the match is exhaustive — a new
/// event variant fails compilation until every transition handles it.
pub trait AggregateState: Default + Clone + Send + Sync {
    /// The family's closed event enum.
    type Event: DomainEvent;

    /// Short aggregate-kind name, used as the read-store partition key
    /// (e.g. `"Farm"`, `"Area"`).
    const KIND: &'static str;

    /// Evolve state from a single event.
    fn transition(&mut self, event: &Self::Event);
}

/// An aggregate instance: identity, committed version, state, and the
/// queue of not-yet-persisted events.
///
/// `version` counts events successfully appended to the store for this id;
/// it does not advance for queued events until [`mark_committed`] is called
/// after a successful append.
///
/// [`mark_committed`]: Aggregate::mark_committed
#[derive(Debug, Clone)]
pub struct Aggregate<S: AggregateState> {
    id: StreamId,
    version: Version,
    state: S,
    uncommitted: Vec<S::Event>,
}

impl<S: AggregateState> Aggregate<S> {
    /// A zero-value aggregate at version 0.
    ///
    /// Used both by factories (which immediately `track_change` a creation
    /// event) and as the not-found sentinel when rehydrating an empty
    /// history.
    #[must_use]
    pub fn new(id: StreamId) -> Self {
        Self {
            id,
            version: Version::INITIAL,
            state: S::default(),
            uncommitted: Vec::new(),
        }
    }

    /// Rebuild an aggregate by replaying its ordered event history.
    ///
    /// Each record is decoded and applied via `transition` while the
    /// version is incremented; the uncommitted queue stays empty (replay
    /// must not re-queue history). An empty history yields the zero-value
    /// sentinel, observable through [`is_new`].
    ///
    /// [`is_new`]: Aggregate::is_new
    ///
    /// # Errors
    ///
    /// Returns [`RehydrateError::Codec`] if any record fails to decode.
    pub fn rehydrate(id: StreamId, history: &[EventRecord]) -> Result<Self, RehydrateError> {
        let mut aggregate = Self::new(id);
        for record in history {
            let event: S::Event = decode(record).map_err(|source| RehydrateError::Codec {
                kind: S::KIND,
                stream_id: aggregate.id.clone(),
                source,
            })?;
            aggregate.state.transition(&event);
            aggregate.version = aggregate.version.next();
        }
        Ok(aggregate)
    }

    /// Apply an event to in-memory state and queue it as uncommitted.
    ///
    /// In-memory state is therefore always consistent with the queue:
    /// a command can read back the effect of its own queued events before
    /// anything is persisted.
    pub fn track_change(&mut self, event: S::Event) {
        self.state.transition(&event);
        self.uncommitted.push(event);
    }

    /// The aggregate identifier.
    #[must_use]
    pub const fn id(&self) -> &StreamId {
        &self.id
    }

    /// The last version known to be persisted for this aggregate.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Read access to the current (committed + queued) state.
    #[must_use]
    pub const fn state(&self) -> &S {
        &self.state
    }

    /// Events queued by `track_change` but not yet appended.
    #[must_use]
    pub fn uncommitted(&self) -> &[S::Event] {
        &self.uncommitted
    }

    /// Drain the uncommitted queue for appending.
    pub fn take_uncommitted(&mut self) -> Vec<S::Event> {
        std::mem::take(&mut self.uncommitted)
    }

    /// Record that the store accepted events up to `version`.
    pub const fn mark_committed(&mut self, version: Version) {
        self.version = version;
    }

    /// Whether this aggregate has no persisted history and no queued
    /// events — the not-found sentinel.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.version.is_initial() && self.uncommitted.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Panics: tests fail on rehydration errors
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "EventName", content = "EventData")]
    enum CounterEvent {
        CounterCreated { name: String },
        Incremented { by: u32 },
        Renamed { name: String },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::CounterCreated { .. } => "CounterCreated",
                CounterEvent::Incremented { .. } => "Incremented",
                CounterEvent::Renamed { .. } => "Renamed",
            }
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct CounterState {
        name: String,
        total: u64,
    }

    impl AggregateState for CounterState {
        type Event = CounterEvent;
        const KIND: &'static str = "Counter";

        fn transition(&mut self, event: &CounterEvent) {
            match event {
                CounterEvent::CounterCreated { name } | CounterEvent::Renamed { name } => {
                    self.name = name.clone();
                }
                CounterEvent::Incremented { by } => self.total += u64::from(*by),
            }
        }
    }

    fn to_records(id: &StreamId, events: &[CounterEvent]) -> Vec<EventRecord> {
        events
            .iter()
            .enumerate()
            .map(|(i, event)| {
                let wire = crate::event::encode(event).unwrap();
                EventRecord {
                    stream_id: id.clone(),
                    version: Version::new(i as u64 + 1),
                    created_at: Utc::now(),
                    event_type: wire.event_type,
                    data: wire.data,
                }
            })
            .collect()
    }

    #[test]
    fn track_change_applies_and_queues() {
        let mut counter = Aggregate::<CounterState>::new(StreamId::new("counter-1"));
        counter.track_change(CounterEvent::CounterCreated {
            name: "meter".to_string(),
        });
        counter.track_change(CounterEvent::Incremented { by: 3 });

        assert_eq!(counter.state().name, "meter");
        assert_eq!(counter.state().total, 3);
        assert_eq!(counter.uncommitted().len(), 2);
        // Queued events do not advance the committed version.
        assert_eq!(counter.version(), Version::INITIAL);
        assert!(!counter.is_new());
    }

    #[test]
    fn rehydration_replays_without_requeueing() {
        let id = StreamId::new("counter-1");
        let history = to_records(
            &id,
            &[
                CounterEvent::CounterCreated {
                    name: "meter".to_string(),
                },
                CounterEvent::Incremented { by: 2 },
                CounterEvent::Renamed {
                    name: "gauge".to_string(),
                },
            ],
        );

        let counter = Aggregate::<CounterState>::rehydrate(id, &history).unwrap();
        assert_eq!(counter.version(), Version::new(3));
        assert_eq!(counter.state().name, "gauge");
        assert_eq!(counter.state().total, 2);
        assert!(counter.uncommitted().is_empty());
    }

    #[test]
    fn empty_history_yields_zero_value_sentinel() {
        let counter =
            Aggregate::<CounterState>::rehydrate(StreamId::new("counter-missing"), &[]).unwrap();
        assert!(counter.is_new());
        assert_eq!(counter.state(), &CounterState::default());
    }

    #[test]
    fn rehydration_fails_on_undecodable_record() {
        let id = StreamId::new("counter-1");
        let record = EventRecord {
            stream_id: id.clone(),
            version: Version::new(1),
            created_at: Utc::now(),
            event_type: "CounterMelted".to_string(),
            data: serde_json::Value::Null,
        };
        let result = Aggregate::<CounterState>::rehydrate(id, &[record]);
        assert!(matches!(result, Err(RehydrateError::Codec { kind: "Counter", .. })));
    }

    #[test]
    fn take_uncommitted_drains_queue() {
        let mut counter = Aggregate::<CounterState>::new(StreamId::new("counter-1"));
        counter.track_change(CounterEvent::Incremented { by: 1 });
        let drained = counter.take_uncommitted();
        assert_eq!(drained.len(), 1);
        assert!(counter.uncommitted().is_empty());

        counter.mark_committed(Version::new(1));
        assert_eq!(counter.version(), Version::new(1));
    }

    fn arb_event() -> impl Strategy<Value = CounterEvent> {
        prop_oneof![
            "[a-z]{1,12}".prop_map(|name| CounterEvent::CounterCreated { name }),
            (0u32..1000).prop_map(|by| CounterEvent::Incremented { by }),
            "[a-z]{1,12}".prop_map(|name| CounterEvent::Renamed { name }),
        ]
    }

    proptest! {
        // Replaying the full history (in one call or incrementally) always
        // reproduces the tracked state, and version == len(history).
        #[test]
        fn replay_is_deterministic(events in proptest::collection::vec(arb_event(), 0..32)) {
            let id = StreamId::new("counter-prop");
            let mut live = Aggregate::<CounterState>::new(id.clone());
            for event in &events {
                live.track_change(event.clone());
            }

            let history = to_records(&id, &events);
            let replayed = Aggregate::<CounterState>::rehydrate(id.clone(), &history).unwrap();
            prop_assert_eq!(replayed.state(), live.state());
            prop_assert_eq!(replayed.version().value(), events.len() as u64);

            // Incremental load: split the history at every point.
            for split in 0..=history.len() {
                let head = Aggregate::<CounterState>::rehydrate(id.clone(), &history[..split]).unwrap();
                let mut resumed = head;
                for record in &history[split..] {
                    let event: CounterEvent = crate::event::decode(record).unwrap();
                    resumed.state.transition(&event);
                    resumed.version = resumed.version.next();
                }
                prop_assert_eq!(resumed.state(), live.state());
            }
        }
    }
}
