//! Read store abstraction and the typed read-model repository.
//!
//! The read store is the queryable, denormalized side of CQRS: one row per
//! aggregate id, flattened for query convenience (embedded parent names,
//! whole note collections). Queries never replay the event log — they go
//! straight here. Absence of a row is `None`, the not-found sentinel, never
//! an error: a row only exists once the corresponding `*Created` event has
//! been projected.
//!
//! Rows cross the trait boundary as `serde_json::Value`, partitioned by an
//! aggregate-kind string; [`ReadRepository`] binds a concrete row type to
//! its kind and handles the (de)serialization.

use crate::event_store::StoreFuture;
use crate::stream::StreamId;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by read store backends.
#[derive(Error, Debug)]
pub enum ReadStoreError {
    /// The backend could not be reached or the query failed.
    #[error("read store backend error: {0}")]
    Backend(String),

    /// A row could not be (de)serialized.
    #[error("read row serialization error: {0}")]
    Serialization(String),
}

/// A queryable, denormalized, per-aggregate-kind view.
///
/// # Implementations
///
/// - `InMemoryReadStore` (in `grange-testing`)
/// - `SqliteReadStore` (in `grange-sqlite`)
/// - `PostgresReadStore` (in `grange-postgres`)
///
/// # Dyn compatibility
///
/// Methods return `Pin<Box<dyn Future>>` so the trait can be held as
/// `Arc<dyn ReadStore>` and shared across projections.
pub trait ReadStore: Send + Sync {
    /// Insert or replace the row for `(kind, id)`.
    ///
    /// # Errors
    ///
    /// Returns [`ReadStoreError::Backend`] on storage failure.
    fn upsert(
        &self,
        kind: &'static str,
        id: StreamId,
        row: Value,
    ) -> StoreFuture<'_, Result<(), ReadStoreError>>;

    /// Point lookup by id. `None` means the row has not been projected.
    ///
    /// # Errors
    ///
    /// Returns [`ReadStoreError::Backend`] on storage failure.
    fn find_by_id(
        &self,
        kind: &'static str,
        id: StreamId,
    ) -> StoreFuture<'_, Result<Option<Value>, ReadStoreError>>;

    /// All rows of one kind, unordered.
    ///
    /// # Errors
    ///
    /// Returns [`ReadStoreError::Backend`] on storage failure.
    fn find_all(&self, kind: &'static str) -> StoreFuture<'_, Result<Vec<Value>, ReadStoreError>>;
}

/// One denormalized record per aggregate id.
pub trait ReadModelRow: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The aggregate-kind partition this row lives in.
    const KIND: &'static str;

    /// The aggregate id this row mirrors.
    fn id(&self) -> &StreamId;
}

/// Typed facade over a [`ReadStore`] for one row type.
pub struct ReadRepository<R: ReadModelRow> {
    store: Arc<dyn ReadStore>,
    _marker: PhantomData<fn() -> R>,
}

impl<R: ReadModelRow> Clone for ReadRepository<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _marker: PhantomData,
        }
    }
}

impl<R: ReadModelRow> ReadRepository<R> {
    /// Bind a row type to a backing store.
    #[must_use]
    pub fn new(store: Arc<dyn ReadStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Insert or replace a row.
    ///
    /// # Errors
    ///
    /// Returns [`ReadStoreError`] on serialization or storage failure.
    pub async fn upsert(&self, row: &R) -> Result<(), ReadStoreError> {
        let value =
            serde_json::to_value(row).map_err(|e| ReadStoreError::Serialization(e.to_string()))?;
        self.store.upsert(R::KIND, row.id().clone(), value).await
    }

    /// Point lookup by aggregate id; `None` is the not-found sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`ReadStoreError`] on storage failure or if a stored row no
    /// longer matches the row type.
    pub async fn find_by_id(&self, id: &StreamId) -> Result<Option<R>, ReadStoreError> {
        let value = self.store.find_by_id(R::KIND, id.clone()).await?;
        value
            .map(|value| {
                serde_json::from_value(value)
                    .map_err(|e| ReadStoreError::Serialization(e.to_string()))
            })
            .transpose()
    }

    /// All rows of this kind.
    ///
    /// # Errors
    ///
    /// Returns [`ReadStoreError`] on storage or deserialization failure.
    pub async fn find_all(&self) -> Result<Vec<R>, ReadStoreError> {
        let values = self.store.find_all(R::KIND).await?;
        values
            .into_iter()
            .map(|value| {
                serde_json::from_value(value)
                    .map_err(|e| ReadStoreError::Serialization(e.to_string()))
            })
            .collect()
    }

    /// Simple filtered scan: all rows matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`ReadStoreError`] on storage or deserialization failure.
    pub async fn find_where(
        &self,
        predicate: impl Fn(&R) -> bool + Send,
    ) -> Result<Vec<R>, ReadStoreError> {
        let mut rows = self.find_all().await?;
        rows.retain(|row| predicate(row));
        Ok(rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Panics: tests fail on storage errors
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// Minimal map-backed store, just enough to exercise the repository.
    #[derive(Default)]
    struct MapReadStore {
        rows: RwLock<HashMap<(&'static str, StreamId), Value>>,
    }

    impl ReadStore for MapReadStore {
        fn upsert(
            &self,
            kind: &'static str,
            id: StreamId,
            row: Value,
        ) -> StoreFuture<'_, Result<(), ReadStoreError>> {
            Box::pin(async move {
                self.rows.write().unwrap().insert((kind, id), row);
                Ok(())
            })
        }

        fn find_by_id(
            &self,
            kind: &'static str,
            id: StreamId,
        ) -> StoreFuture<'_, Result<Option<Value>, ReadStoreError>> {
            Box::pin(async move { Ok(self.rows.read().unwrap().get(&(kind, id)).cloned()) })
        }

        fn find_all(
            &self,
            kind: &'static str,
        ) -> StoreFuture<'_, Result<Vec<Value>, ReadStoreError>> {
            Box::pin(async move {
                Ok(self
                    .rows
                    .read()
                    .unwrap()
                    .iter()
                    .filter(|((k, _), _)| *k == kind)
                    .map(|(_, value)| value.clone())
                    .collect())
            })
        }
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct FarmRow {
        uid: StreamId,
        name: String,
    }

    impl ReadModelRow for FarmRow {
        const KIND: &'static str = "Farm";

        fn id(&self) -> &StreamId {
            &self.uid
        }
    }

    #[tokio::test]
    async fn upsert_then_find_by_id() {
        let repo = ReadRepository::<FarmRow>::new(Arc::new(MapReadStore::default()));
        let row = FarmRow {
            uid: StreamId::new("farm-1"),
            name: "Acme Farm".to_string(),
        };
        repo.upsert(&row).await.unwrap();

        let found = repo.find_by_id(&StreamId::new("farm-1")).await.unwrap();
        assert_eq!(found, Some(row));
    }

    #[tokio::test]
    async fn missing_row_is_none_not_error() {
        let repo = ReadRepository::<FarmRow>::new(Arc::new(MapReadStore::default()));
        let found = repo.find_by_id(&StreamId::new("farm-missing")).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn upsert_replaces_whole_row() {
        let repo = ReadRepository::<FarmRow>::new(Arc::new(MapReadStore::default()));
        let id = StreamId::new("farm-1");
        repo.upsert(&FarmRow {
            uid: id.clone(),
            name: "Old".to_string(),
        })
        .await
        .unwrap();
        repo.upsert(&FarmRow {
            uid: id.clone(),
            name: "New".to_string(),
        })
        .await
        .unwrap();

        let found = repo.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(found.name, "New");
        assert_eq!(repo.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_where_filters() {
        let repo = ReadRepository::<FarmRow>::new(Arc::new(MapReadStore::default()));
        for (id, name) in [("farm-1", "Acme"), ("farm-2", "Bolt"), ("farm-3", "Acre")] {
            repo.upsert(&FarmRow {
                uid: StreamId::new(id),
                name: name.to_string(),
            })
            .await
            .unwrap();
        }

        let matching = repo.find_where(|row| row.name.starts_with("Ac")).await.unwrap();
        assert_eq!(matching.len(), 2);
    }
}
