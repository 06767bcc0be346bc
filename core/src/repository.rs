//! The uniform command-side flow: load, mutate, append, publish.
//!
//! Every consumer (HTTP handlers, out of scope here) drives the same cycle:
//!
//! 1. [`AggregateRepository::load`] — read the stream's history and
//!    rehydrate the aggregate;
//! 2. call a command method, which validates and `track_change`s events;
//! 3. [`AggregateRepository::save`] — encode the queued events, append them
//!    from the aggregate's committed version, publish the records the store
//!    persisted on the bus **in order**, and mark the aggregate committed.
//!
//! The append and the downstream read-model upserts are independent steps
//! with no shared transaction: the read side is eventually consistent with
//! the write side by design. The records put on the bus are the ones the
//! store returned from `append` — same versions, same timestamp — so a
//! projection can never observe a stamp that differs from the log's.

use crate::aggregate::{Aggregate, AggregateState, RehydrateError};
use crate::bus::EventBus;
use crate::event::{CodecError, encode};
use crate::event_store::{EventStore, EventStoreError};
use crate::stream::{StreamId, Version};
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the load/save cycle.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The event store failed.
    #[error(transparent)]
    Store(#[from] EventStoreError),

    /// A stored record could not be replayed.
    #[error(transparent)]
    Rehydrate(#[from] RehydrateError),

    /// A queued event could not be encoded for appending.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Write-side access to one aggregate family.
pub struct AggregateRepository<S: AggregateState> {
    store: Arc<dyn EventStore>,
    bus: Arc<EventBus>,
    _marker: PhantomData<fn() -> S>,
}

impl<S: AggregateState> Clone for AggregateRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            bus: Arc::clone(&self.bus),
            _marker: PhantomData,
        }
    }
}

impl<S: AggregateState> AggregateRepository<S> {
    /// Wire a repository to its store and bus.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            _marker: PhantomData,
        }
    }

    /// Load and rehydrate an aggregate from its event history.
    ///
    /// An id with no history yields the zero-value sentinel
    /// (`aggregate.is_new()` is true); callers decide whether that means
    /// "not found".
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] on store or replay failure.
    pub async fn load(&self, id: StreamId) -> Result<Aggregate<S>, RepositoryError> {
        let history = self.store.load(id.clone()).await?;
        Ok(Aggregate::rehydrate(id, &history)?)
    }

    /// Persist the aggregate's queued events and publish them.
    ///
    /// Events are appended from the aggregate's committed version; the
    /// records the store persisted are then published on the bus in append
    /// order, unchanged, so the timestamps projections see are the ones in
    /// the log. The uncommitted queue is drained and the committed version
    /// advanced only after the append succeeds. A save with no queued
    /// events is a no-op.
    ///
    /// Publication happens after the append returns: a projection failure
    /// cannot undo the append, and an append failure publishes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError`] on encode or store failure. The queued
    /// events remain on the aggregate in that case.
    pub async fn save(&self, aggregate: &mut Aggregate<S>) -> Result<Version, RepositoryError> {
        if aggregate.uncommitted().is_empty() {
            return Ok(aggregate.version());
        }

        let serialized = aggregate
            .uncommitted()
            .iter()
            .map(encode)
            .collect::<Result<Vec<_>, _>>()?;

        let base = aggregate.version();
        let appended = self
            .store
            .append(aggregate.id().clone(), base, serialized)
            .await?;
        let new_version = appended.last().map_or(base, |record| record.version);

        aggregate.take_uncommitted();
        aggregate.mark_committed(new_version);

        for record in &appended {
            self.bus.publish(record).await;
        }

        Ok(new_version)
    }
}
