//! End-to-end flows through the repository, bus, and projections.

#![allow(clippy::unwrap_used)] // Test code fails loudly on errors

use chrono::TimeZone;
use grange_core::Clock;
use grange_core::bus::EventBus;
use grange_core::event_store::EventStore;
use grange_core::read_store::{ReadRepository, ReadStore};
use grange_core::repository::AggregateRepository;
use grange_core::stream::{StreamId, Version};
use grange_domain::area::{Area, AreaCommands, AreaLocation, AreaRow, AreaSize, AreaType, SizeUnit};
use grange_domain::crop::{ContainerKind, Crop, CropCommands, CropContainer, CropRow};
use grange_domain::farm::{Farm, FarmCommands, FarmRow, FarmState, FarmType, Geolocation};
use grange_domain::register_all;
use grange_domain::reservoir::{Reservoir, ReservoirCommands, ReservoirRow, WaterSource};
use grange_testing::{InMemoryEventStore, InMemoryReadStore, test_clock};
use std::sync::Arc;

struct Harness {
    event_store: Arc<InMemoryEventStore>,
    read_store: Arc<InMemoryReadStore>,
    bus: Arc<EventBus>,
}

impl Harness {
    async fn new() -> Self {
        let event_store = Arc::new(InMemoryEventStore::with_clock(Arc::new(test_clock())));
        let read_store = Arc::new(InMemoryReadStore::new());
        let bus = Arc::new(EventBus::new());
        register_all(&bus, Arc::clone(&read_store) as Arc<dyn ReadStore>).await;
        Self {
            event_store,
            read_store,
            bus,
        }
    }

    fn repository<S: grange_core::aggregate::AggregateState>(&self) -> AggregateRepository<S> {
        AggregateRepository::new(
            Arc::clone(&self.event_store) as Arc<dyn EventStore>,
            Arc::clone(&self.bus),
        )
    }

    fn rows<R: grange_core::read_store::ReadModelRow>(&self) -> ReadRepository<R> {
        ReadRepository::new(Arc::clone(&self.read_store) as Arc<dyn ReadStore>)
    }

    async fn saved_farm(&self) -> Farm {
        let mut farm = Farm::create(
            "Acme Farm",
            FarmType::Organic,
            Geolocation::new(45.76, 4.83).unwrap(),
            "France",
            "Lyon",
        )
        .unwrap();
        self.repository::<FarmState>().save(&mut farm).await.unwrap();
        farm
    }

    async fn saved_reservoir(&self, farm: &Farm) -> Reservoir {
        let mut reservoir = Reservoir::create(
            farm.id().clone(),
            "Main Tank",
            WaterSource::bucket(60.0).unwrap(),
        )
        .unwrap();
        self.repository().save(&mut reservoir).await.unwrap();
        reservoir
    }

    async fn saved_area(&self, farm: &Farm, reservoir: &Reservoir) -> Area {
        let mut area = Area::create(
            farm.id().clone(),
            reservoir.id().clone(),
            "Bed A",
            AreaSize::new(12.0, SizeUnit::SquareMetre).unwrap(),
            AreaType::Growing,
            AreaLocation::Outdoor,
        )
        .unwrap();
        self.repository().save(&mut area).await.unwrap();
        area
    }
}

#[tokio::test]
async fn creation_appends_exactly_one_event() {
    let harness = Harness::new().await;

    let farm = Farm::create(
        "Acme Farm",
        FarmType::Organic,
        Geolocation::new(45.76, 4.83).unwrap(),
        "France",
        "Lyon",
    )
    .unwrap();
    assert_eq!(farm.uncommitted().len(), 1);

    let mut farm = farm;
    let version = harness
        .repository::<FarmState>()
        .save(&mut farm)
        .await
        .unwrap();
    assert_eq!(version, Version::new(1));

    let log = harness.event_store.records(farm.id());
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].event_type, "FarmCreated");
    assert_eq!(log[0].version, Version::new(1));
}

#[tokio::test]
async fn created_row_is_queryable_after_save_returns() {
    let harness = Harness::new().await;
    let farm = harness.saved_farm().await;

    // Publish awaits every handler, so the projection has run by now.
    let row = harness
        .rows::<FarmRow>()
        .find_by_id(farm.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.name, "Acme Farm");
    assert_eq!(row.country, "France");
    // The row's timestamp is the one the store wrote to the log, not a
    // second clock reading taken at publish time.
    let log = harness.event_store.records(farm.id());
    assert_eq!(row.created_date, log[0].created_at);
    assert_eq!(row.created_date, test_clock().now());

    let missing = harness
        .rows::<FarmRow>()
        .find_by_id(&StreamId::new("farm-missing"))
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn rename_flows_through_to_the_row() {
    let harness = Harness::new().await;
    let farm = harness.saved_farm().await;

    let repo = harness.repository::<FarmState>();
    let mut loaded = repo.load(farm.id().clone()).await.unwrap();
    assert!(!loaded.is_new());
    loaded.change_name("Acme Fields").unwrap();
    repo.save(&mut loaded).await.unwrap();

    let row = harness
        .rows::<FarmRow>()
        .find_by_id(farm.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.name, "Acme Fields");
}

#[tokio::test]
async fn child_rows_embed_parent_names() {
    let harness = Harness::new().await;
    let farm = harness.saved_farm().await;
    let reservoir = harness.saved_reservoir(&farm).await;
    let area = harness.saved_area(&farm, &reservoir).await;

    let mut crop = Crop::sow(
        area.id().clone(),
        "Roma Tomato",
        chrono::Utc.with_ymd_and_hms(2026, 3, 24, 8, 0, 0).unwrap(),
        CropContainer::new(4, ContainerKind::tray(128).unwrap()).unwrap(),
    )
    .unwrap();
    harness.repository().save(&mut crop).await.unwrap();

    let reservoir_row = harness
        .rows::<ReservoirRow>()
        .find_by_id(reservoir.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reservoir_row.farm_name, "Acme Farm");

    let area_row = harness
        .rows::<AreaRow>()
        .find_by_id(area.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(area_row.farm_name, "Acme Farm");
    assert_eq!(area_row.reservoir_name, "Main Tank");

    let crop_row = harness
        .rows::<CropRow>()
        .find_by_id(crop.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(crop_row.area_name, "Bed A");
    assert_eq!(crop_row.batch_id, "rom-tom-24mar26");
}

#[tokio::test]
async fn added_then_removed_note_leaves_no_trace_in_the_row() {
    let harness = Harness::new().await;
    let farm = harness.saved_farm().await;
    let reservoir = harness.saved_reservoir(&farm).await;
    let area = harness.saved_area(&farm, &reservoir).await;

    let repo = harness.repository();
    let mut loaded: Area = repo.load(area.id().clone()).await.unwrap();
    let note = loaded.add_note("water early").unwrap();
    repo.save(&mut loaded).await.unwrap();

    let row = harness
        .rows::<AreaRow>()
        .find_by_id(area.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.notes.len(), 1);

    let mut loaded: Area = repo.load(area.id().clone()).await.unwrap();
    loaded.remove_note(&note).unwrap();
    repo.save(&mut loaded).await.unwrap();

    let row = harness
        .rows::<AreaRow>()
        .find_by_id(area.id())
        .await
        .unwrap()
        .unwrap();
    assert!(row.notes.is_empty());
    // The removal is an event in the log, not a deletion from it.
    assert_eq!(harness.event_store.records(area.id()).len(), 3);
}

#[tokio::test]
async fn concurrent_writers_interleave_without_a_conflict_error() {
    // Two writers load the same farm at version 1 and both save. Neither
    // append is rejected: the log ends up with duplicate version numbers
    // and the read model reflects whichever event was projected last.
    let harness = Harness::new().await;
    let farm = harness.saved_farm().await;
    let repo = harness.repository::<FarmState>();

    let mut first = repo.load(farm.id().clone()).await.unwrap();
    let mut second = repo.load(farm.id().clone()).await.unwrap();
    assert_eq!(first.version(), Version::new(1));
    assert_eq!(second.version(), Version::new(1));

    first.change_name("First Writer").unwrap();
    second.change_name("Second Writer").unwrap();

    repo.save(&mut first).await.unwrap();
    repo.save(&mut second).await.unwrap();

    let versions: Vec<u64> = harness
        .event_store
        .records(farm.id())
        .iter()
        .map(|r| r.version.value())
        .collect();
    assert_eq!(versions, vec![1, 2, 2]);

    let row = harness
        .rows::<FarmRow>()
        .find_by_id(farm.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.name, "Second Writer");
}

#[tokio::test]
async fn loading_an_unknown_stream_yields_the_not_found_sentinel() {
    let harness = Harness::new().await;
    let repo = harness.repository::<FarmState>();

    let farm = repo.load(StreamId::new("farm-missing")).await.unwrap();
    assert!(farm.is_new());
}
