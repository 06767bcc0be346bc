//! # Grange Domain
//!
//! The farm-management aggregate families built on `grange-core`:
//!
//! | Family | Aggregate | Read model |
//! |---|---|---|
//! | [`farm`] | [`farm::Farm`] | [`farm::FarmRow`] |
//! | [`reservoir`] | [`reservoir::Reservoir`] | [`reservoir::ReservoirRow`] |
//! | [`area`] | [`area::Area`] | [`area::AreaRow`] |
//! | [`material`] | [`material::Material`] | [`material::MaterialRow`] |
//! | [`crop`] | [`crop::Crop`] | [`crop::CropRow`] |
//! | [`user`] | [`user::User`] | [`user::UserRow`] |
//!
//! Each family follows the same shape: a closed event enum with an
//! adjacently tagged `{"EventName", "EventData"}` envelope, a pure
//! [`AggregateState`](grange_core::aggregate::AggregateState) transition,
//! validating command methods that `track_change` events, and a projection
//! that keeps one denormalized row per aggregate. Child rows (areas,
//! reservoirs, crops) embed their parents' names at projection time, so
//! reads never fan out.
//!
//! Wire all six projections against one read store with
//! [`projections::register_all`].

pub mod area;
pub mod crop;
pub mod farm;
pub mod material;
pub mod note;
pub mod projections;
pub mod reservoir;
pub mod user;

pub use projections::register_all;
