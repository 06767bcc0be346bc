//! The farm aggregate: the root of the hierarchy.
//!
//! A farm is created with a name, a type, and a geolocation; areas and
//! reservoirs reference it by id. Its event history is small — creation,
//! renames, and geolocation moves.

use crate::projections::require_row;
use chrono::{DateTime, Utc};
use grange_core::aggregate::{Aggregate, AggregateState};
use grange_core::event::{DomainEvent, EventRecord, decode};
use grange_core::projection::{Projection, ProjectionError};
use grange_core::read_store::{ReadModelRow, ReadRepository, ReadStore};
use grange_core::stream::StreamId;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Maximum accepted farm name length.
pub const MAX_NAME_LEN: usize = 100;

/// Errors raised by farm commands.
///
/// `PartialEq` only: the rejected coordinates in
/// [`FarmError::InvalidGeolocation`] are `f64`s.
#[derive(Error, Debug, PartialEq)]
pub enum FarmError {
    /// The farm name is empty.
    #[error("farm name must not be empty")]
    EmptyName,

    /// The farm name exceeds [`MAX_NAME_LEN`] characters.
    #[error("farm name must not exceed {MAX_NAME_LEN} characters")]
    NameTooLong,

    /// The latitude is outside `[-90, 90]` or the longitude outside
    /// `[-180, 180]`.
    #[error("geolocation out of range: latitude {latitude}, longitude {longitude}")]
    InvalidGeolocation {
        /// The rejected latitude.
        latitude: f64,
        /// The rejected longitude.
        longitude: f64,
    },

    /// The country or city is empty.
    #[error("country and city must not be empty")]
    EmptyLocation,

    /// The command targets a farm with no history.
    #[error("farm does not exist")]
    NotFound,
}

/// What a farm grows and how.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FarmType {
    /// Soil-based production.
    Organic,
    /// Soil-less production in nutrient solution.
    Hydroponic,
}

/// A validated latitude/longitude pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Geolocation {
    /// Degrees north, `[-90, 90]`.
    pub latitude: f64,
    /// Degrees east, `[-180, 180]`.
    pub longitude: f64,
}

impl Geolocation {
    /// Build a geolocation, rejecting out-of-range coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`FarmError::InvalidGeolocation`] if either coordinate is
    /// out of range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, FarmError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(FarmError::InvalidGeolocation {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// The farm event family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "EventName", content = "EventData", rename_all_fields = "PascalCase")]
pub enum FarmEvent {
    /// A new farm came into existence.
    FarmCreated {
        /// The farm's id, also the stream id.
        uid: StreamId,
        /// Display name.
        name: String,
        /// Production type.
        farm_type: FarmType,
        /// Where the farm sits.
        geolocation: Geolocation,
        /// Country of the farm.
        country: String,
        /// City or locality.
        city: String,
    },
    /// The farm was renamed.
    FarmNameChanged {
        /// The new name.
        name: String,
    },
    /// The farm moved.
    FarmGeolocationChanged {
        /// The new coordinates.
        geolocation: Geolocation,
    },
}

impl FarmEvent {
    /// Every event-type name in this family, for projection subscriptions.
    pub const TYPES: &'static [&'static str] =
        &["FarmCreated", "FarmNameChanged", "FarmGeolocationChanged"];
}

impl DomainEvent for FarmEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FarmEvent::FarmCreated { .. } => "FarmCreated",
            FarmEvent::FarmNameChanged { .. } => "FarmNameChanged",
            FarmEvent::FarmGeolocationChanged { .. } => "FarmGeolocationChanged",
        }
    }
}

/// Event-sourced farm state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FarmState {
    /// Display name.
    pub name: String,
    /// Production type; `None` until created.
    pub farm_type: Option<FarmType>,
    /// Coordinates; `None` until created.
    pub geolocation: Option<Geolocation>,
    /// Country of the farm.
    pub country: String,
    /// City or locality.
    pub city: String,
}

impl AggregateState for FarmState {
    type Event = FarmEvent;
    const KIND: &'static str = "Farm";

    fn transition(&mut self, event: &FarmEvent) {
        match event {
            FarmEvent::FarmCreated {
                name,
                farm_type,
                geolocation,
                country,
                city,
                ..
            } => {
                self.name = name.clone();
                self.farm_type = Some(*farm_type);
                self.geolocation = Some(*geolocation);
                self.country = country.clone();
                self.city = city.clone();
            }
            FarmEvent::FarmNameChanged { name } => self.name = name.clone(),
            FarmEvent::FarmGeolocationChanged { geolocation } => {
                self.geolocation = Some(*geolocation);
            }
        }
    }
}

/// A farm aggregate instance.
pub type Farm = Aggregate<FarmState>;

fn validate_name(name: &str) -> Result<(), FarmError> {
    if name.trim().is_empty() {
        return Err(FarmError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(FarmError::NameTooLong);
    }
    Ok(())
}

/// Commands on the farm aggregate.
pub trait FarmCommands: Sized {
    /// Create a farm with a fresh random id.
    ///
    /// # Errors
    ///
    /// Returns [`FarmError`] if the name, geolocation, country, or city is
    /// invalid.
    fn create(
        name: &str,
        farm_type: FarmType,
        geolocation: Geolocation,
        country: &str,
        city: &str,
    ) -> Result<Self, FarmError>;

    /// Rename the farm.
    ///
    /// # Errors
    ///
    /// Returns [`FarmError`] if the farm does not exist or the name is
    /// invalid.
    fn change_name(&mut self, name: &str) -> Result<(), FarmError>;

    /// Move the farm to new coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`FarmError::NotFound`] if the farm does not exist.
    fn change_geolocation(&mut self, geolocation: Geolocation) -> Result<(), FarmError>;
}

impl FarmCommands for Farm {
    fn create(
        name: &str,
        farm_type: FarmType,
        geolocation: Geolocation,
        country: &str,
        city: &str,
    ) -> Result<Self, FarmError> {
        validate_name(name)?;
        if country.trim().is_empty() || city.trim().is_empty() {
            return Err(FarmError::EmptyLocation);
        }

        let id = StreamId::random();
        let mut farm = Self::new(id.clone());
        farm.track_change(FarmEvent::FarmCreated {
            uid: id,
            name: name.to_string(),
            farm_type,
            geolocation,
            country: country.to_string(),
            city: city.to_string(),
        });
        Ok(farm)
    }

    fn change_name(&mut self, name: &str) -> Result<(), FarmError> {
        if self.is_new() {
            return Err(FarmError::NotFound);
        }
        validate_name(name)?;
        self.track_change(FarmEvent::FarmNameChanged {
            name: name.to_string(),
        });
        Ok(())
    }

    fn change_geolocation(&mut self, geolocation: Geolocation) -> Result<(), FarmError> {
        if self.is_new() {
            return Err(FarmError::NotFound);
        }
        self.track_change(FarmEvent::FarmGeolocationChanged { geolocation });
        Ok(())
    }
}

/// The denormalized farm read model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FarmRow {
    /// The aggregate id.
    pub uid: StreamId,
    /// Display name.
    pub name: String,
    /// Production type.
    pub farm_type: FarmType,
    /// Where the farm sits.
    pub geolocation: Geolocation,
    /// Country of the farm.
    pub country: String,
    /// City or locality.
    pub city: String,
    /// When the farm was created.
    pub created_date: DateTime<Utc>,
}

impl ReadModelRow for FarmRow {
    const KIND: &'static str = FarmState::KIND;

    fn id(&self) -> &StreamId {
        &self.uid
    }
}

/// Keeps one [`FarmRow`] per farm in sync with the event history.
pub struct FarmProjection {
    farms: ReadRepository<FarmRow>,
}

impl FarmProjection {
    /// Bind the projection to a read store.
    #[must_use]
    pub fn new(store: Arc<dyn ReadStore>) -> Self {
        Self {
            farms: ReadRepository::new(store),
        }
    }

    async fn apply_inner(&self, record: &EventRecord) -> Result<(), ProjectionError> {
        match decode::<FarmEvent>(record)? {
            FarmEvent::FarmCreated {
                uid,
                name,
                farm_type,
                geolocation,
                country,
                city,
            } => {
                self.farms
                    .upsert(&FarmRow {
                        uid,
                        name,
                        farm_type,
                        geolocation,
                        country,
                        city,
                        created_date: record.created_at,
                    })
                    .await?;
            }
            FarmEvent::FarmNameChanged { name } => {
                let mut row = require_row(&self.farms, record).await?;
                row.name = name;
                self.farms.upsert(&row).await?;
            }
            FarmEvent::FarmGeolocationChanged { geolocation } => {
                let mut row = require_row(&self.farms, record).await?;
                row.geolocation = geolocation;
                self.farms.upsert(&row).await?;
            }
        }
        Ok(())
    }
}

impl Projection for FarmProjection {
    fn name(&self) -> &'static str {
        "farm-rows"
    }

    fn event_types(&self) -> &'static [&'static str] {
        FarmEvent::TYPES
    }

    fn apply(
        &self,
        record: &EventRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        let record = record.clone();
        Box::pin(async move { self.apply_inner(&record).await })
    }
}
