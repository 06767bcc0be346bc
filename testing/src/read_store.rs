//! Map-backed read store.

use grange_core::event_store::StoreFuture;
use grange_core::read_store::{ReadStore, ReadStoreError};
use grange_core::stream::StreamId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// In-memory denormalized read store, keyed by `(kind, id)`.
///
/// A separate instance from the event store: an event append and its
/// read-model upsert are independent critical sections with no atomicity
/// between them, matching the production backends.
#[derive(Default)]
pub struct InMemoryReadStore {
    rows: RwLock<HashMap<(&'static str, StreamId), Value>>,
}

impl InMemoryReadStore {
    /// An empty read store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows of one kind, for assertions.
    #[must_use]
    pub fn len(&self, kind: &'static str) -> usize {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Whether no rows of this kind exist.
    #[must_use]
    pub fn is_empty(&self, kind: &'static str) -> bool {
        self.len(kind) == 0
    }
}

impl ReadStore for InMemoryReadStore {
    fn upsert(
        &self,
        kind: &'static str,
        id: StreamId,
        row: Value,
    ) -> StoreFuture<'_, Result<(), ReadStoreError>> {
        Box::pin(async move {
            self.rows
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert((kind, id), row);
            Ok(())
        })
    }

    fn find_by_id(
        &self,
        kind: &'static str,
        id: StreamId,
    ) -> StoreFuture<'_, Result<Option<Value>, ReadStoreError>> {
        Box::pin(async move {
            Ok(self
                .rows
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&(kind, id))
                .cloned())
        })
    }

    fn find_all(&self, kind: &'static str) -> StoreFuture<'_, Result<Vec<Value>, ReadStoreError>> {
        Box::pin(async move {
            Ok(self
                .rows
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter(|((k, _), _)| *k == kind)
                .map(|(_, value)| value.clone())
                .collect())
        })
    }
}
