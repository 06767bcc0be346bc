//! Shared projection plumbing and bus wiring.

use crate::{area, crop, farm, material, reservoir, user};
use grange_core::bus::EventBus;
use grange_core::event::EventRecord;
use grange_core::projection::{Projection, ProjectionError, register};
use grange_core::read_store::{ReadModelRow, ReadRepository, ReadStore};
use grange_core::stream::StreamId;
use std::sync::Arc;

/// Load the row an update event targets, failing with
/// [`ProjectionError::MissingRow`] if its Created event was never projected.
pub(crate) async fn require_row<R: ReadModelRow>(
    repo: &ReadRepository<R>,
    record: &EventRecord,
) -> Result<R, ProjectionError> {
    require_parent(repo, &record.stream_id).await
}

/// Cross-aggregate lookup of a parent row (e.g. the farm an area belongs
/// to), failing with [`ProjectionError::MissingRow`] if it has not been
/// projected yet.
pub(crate) async fn require_parent<R: ReadModelRow>(
    repo: &ReadRepository<R>,
    uid: &StreamId,
) -> Result<R, ProjectionError> {
    repo.find_by_id(uid)
        .await?
        .ok_or_else(|| ProjectionError::MissingRow {
            kind: R::KIND,
            stream_id: uid.clone(),
        })
}

/// Subscribe every domain projection to the bus against one read store.
///
/// This is the standard read-side wiring: one projection per aggregate
/// family, all writing to the same store so cross-aggregate lookups
/// (embedded parent names) resolve against it.
pub async fn register_all(bus: &EventBus, store: Arc<dyn ReadStore>) {
    let projections: Vec<Arc<dyn Projection>> = vec![
        Arc::new(farm::FarmProjection::new(Arc::clone(&store))),
        Arc::new(reservoir::ReservoirProjection::new(Arc::clone(&store))),
        Arc::new(area::AreaProjection::new(Arc::clone(&store))),
        Arc::new(material::MaterialProjection::new(Arc::clone(&store))),
        Arc::new(crop::CropProjection::new(Arc::clone(&store))),
        Arc::new(user::UserProjection::new(store)),
    ];
    for projection in projections {
        register(bus, projection).await;
    }
}
