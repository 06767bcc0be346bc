//! The area aggregate: a growing space on a farm.
//!
//! An area belongs to a farm, is watered from a reservoir, and has a
//! measured size, a purpose (seeding or growing), and an indoor/outdoor
//! location. Its read model embeds the farm and reservoir names so area
//! queries never fan out.

use crate::farm::FarmRow;
use crate::note::{Note, NoteError, NoteRow, remove_note, validate_content};
use crate::projections::{require_parent, require_row};
use crate::reservoir::ReservoirRow;
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

/// Errors raised by area commands.
#[derive(Error, Debug, PartialEq)]
pub enum AreaError {
    /// The area name is empty.
    #[error("area name must not be empty")]
    EmptyName,

    /// The size value must be strictly positive.
    #[error("area size must be positive, got {0}")]
    InvalidSize(f64),

    /// The command targets an area with no history.
    #[error("area does not exist")]
    NotFound,

    /// A note operation failed.
    #[error(transparent)]
    Note(#[from] NoteError),
}

/// Unit of an area's size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeUnit {
    /// Square metres.
    SquareMetre,
    /// Hectares.
    Hectare,
}

/// A measured surface.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AreaSize {
    /// Magnitude, strictly positive.
    pub value: f64,
    /// Unit of the magnitude.
    pub unit: SizeUnit,
}

impl AreaSize {
    /// Build a size, rejecting non-positive values.
    ///
    /// # Errors
    ///
    /// Returns [`AreaError::InvalidSize`] if `value <= 0`.
    pub fn new(value: f64, unit: SizeUnit) -> Result<Self, AreaError> {
        if value <= 0.0 {
            return Err(AreaError::InvalidSize(value));
        }
        Ok(Self { value, unit })
    }
}

/// What an area is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AreaType {
    /// Germination and early growth.
    Seeding,
    /// Main production.
    Growing,
}

/// Where the area physically sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AreaLocation {
    /// Inside a structure (greenhouse, tunnel).
    Indoor,
    /// Open field.
    Outdoor,
}

/// The area event family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "EventName", content = "EventData", rename_all_fields = "PascalCase")]
pub enum AreaEvent {
    /// A new area came into existence.
    AreaCreated {
        /// The area's id, also the stream id.
        uid: StreamId,
        /// Owning farm.
        farm_uid: StreamId,
        /// Reservoir watering this area.
        reservoir_uid: StreamId,
        /// Display name.
        name: String,
        /// Measured surface.
        size: AreaSize,
        /// Purpose of the area.
        area_type: AreaType,
        /// Indoor or outdoor.
        location: AreaLocation,
    },
    /// The area was renamed.
    AreaNameChanged {
        /// The new name.
        name: String,
    },
    /// The area was re-measured.
    AreaSizeChanged {
        /// The new surface.
        size: AreaSize,
    },
    /// The area moved indoors or outdoors.
    AreaLocationChanged {
        /// The new location.
        location: AreaLocation,
    },
    /// A note was attached.
    AreaNoteAdded {
        /// The note's own id.
        note_uid: StreamId,
        /// Free-text content.
        content: String,
    },
    /// A note was removed.
    AreaNoteRemoved {
        /// The removed note's id.
        note_uid: StreamId,
    },
}

impl AreaEvent {
    /// Every event-type name in this family, for projection subscriptions.
    pub const TYPES: &'static [&'static str] = &[
        "AreaCreated",
        "AreaNameChanged",
        "AreaSizeChanged",
        "AreaLocationChanged",
        "AreaNoteAdded",
        "AreaNoteRemoved",
    ];
}

impl DomainEvent for AreaEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AreaEvent::AreaCreated { .. } => "AreaCreated",
            AreaEvent::AreaNameChanged { .. } => "AreaNameChanged",
            AreaEvent::AreaSizeChanged { .. } => "AreaSizeChanged",
            AreaEvent::AreaLocationChanged { .. } => "AreaLocationChanged",
            AreaEvent::AreaNoteAdded { .. } => "AreaNoteAdded",
            AreaEvent::AreaNoteRemoved { .. } => "AreaNoteRemoved",
        }
    }
}

/// Event-sourced area state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AreaState {
    /// Owning farm; `None` until created.
    pub farm_uid: Option<StreamId>,
    /// Watering reservoir; `None` until created.
    pub reservoir_uid: Option<StreamId>,
    /// Display name.
    pub name: String,
    /// Measured surface; `None` until created.
    pub size: Option<AreaSize>,
    /// Purpose of the area; `None` until created.
    pub area_type: Option<AreaType>,
    /// Indoor or outdoor; `None` until created.
    pub location: Option<AreaLocation>,
    /// Attached notes, in insertion order.
    pub notes: Vec<Note>,
}

impl AggregateState for AreaState {
    type Event = AreaEvent;
    const KIND: &'static str = "Area";

    fn transition(&mut self, event: &AreaEvent) {
        match event {
            AreaEvent::AreaCreated {
                farm_uid,
                reservoir_uid,
                name,
                size,
                area_type,
                location,
                ..
            } => {
                self.farm_uid = Some(farm_uid.clone());
                self.reservoir_uid = Some(reservoir_uid.clone());
                self.name = name.clone();
                self.size = Some(*size);
                self.area_type = Some(*area_type);
                self.location = Some(*location);
            }
            AreaEvent::AreaNameChanged { name } => self.name = name.clone(),
            AreaEvent::AreaSizeChanged { size } => self.size = Some(*size),
            AreaEvent::AreaLocationChanged { location } => self.location = Some(*location),
            AreaEvent::AreaNoteAdded { note_uid, content } => {
                self.notes.push(Note {
                    uid: note_uid.clone(),
                    content: content.clone(),
                });
            }
            AreaEvent::AreaNoteRemoved { note_uid } => {
                self.notes.retain(|note| &note.uid != note_uid);
            }
        }
    }
}

/// An area aggregate instance.
pub type Area = Aggregate<AreaState>;

/// Commands on the area aggregate.
pub trait AreaCommands: Sized {
    /// Create an area on a farm with a fresh random id.
    ///
    /// # Errors
    ///
    /// Returns [`AreaError`] if the name is empty.
    fn create(
        farm_uid: StreamId,
        reservoir_uid: StreamId,
        name: &str,
        size: AreaSize,
        area_type: AreaType,
        location: AreaLocation,
    ) -> Result<Self, AreaError>;

    /// Rename the area.
    ///
    /// # Errors
    ///
    /// Returns [`AreaError`] if the area does not exist or the name is
    /// empty.
    fn change_name(&mut self, name: &str) -> Result<(), AreaError>;

    /// Re-measure the area.
    ///
    /// # Errors
    ///
    /// Returns [`AreaError::NotFound`] if the area does not exist.
    fn change_size(&mut self, size: AreaSize) -> Result<(), AreaError>;

    /// Move the area indoors or outdoors.
    ///
    /// # Errors
    ///
    /// Returns [`AreaError::NotFound`] if the area does not exist.
    fn change_location(&mut self, location: AreaLocation) -> Result<(), AreaError>;

    /// Attach a note, returning its fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`AreaError`] if the area does not exist or the content is
    /// invalid.
    fn add_note(&mut self, content: &str) -> Result<StreamId, AreaError>;

    /// Remove a note by id.
    ///
    /// # Errors
    ///
    /// Returns [`AreaError`] if the area or the note does not exist.
    fn remove_note(&mut self, note_uid: &StreamId) -> Result<(), AreaError>;
}

impl AreaCommands for Area {
    fn create(
        farm_uid: StreamId,
        reservoir_uid: StreamId,
        name: &str,
        size: AreaSize,
        area_type: AreaType,
        location: AreaLocation,
    ) -> Result<Self, AreaError> {
        if name.trim().is_empty() {
            return Err(AreaError::EmptyName);
        }

        let id = StreamId::random();
        let mut area = Self::new(id.clone());
        area.track_change(AreaEvent::AreaCreated {
            uid: id,
            farm_uid,
            reservoir_uid,
            name: name.to_string(),
            size,
            area_type,
            location,
        });
        Ok(area)
    }

    fn change_name(&mut self, name: &str) -> Result<(), AreaError> {
        if self.is_new() {
            return Err(AreaError::NotFound);
        }
        if name.trim().is_empty() {
            return Err(AreaError::EmptyName);
        }
        self.track_change(AreaEvent::AreaNameChanged {
            name: name.to_string(),
        });
        Ok(())
    }

    fn change_size(&mut self, size: AreaSize) -> Result<(), AreaError> {
        if self.is_new() {
            return Err(AreaError::NotFound);
        }
        self.track_change(AreaEvent::AreaSizeChanged { size });
        Ok(())
    }

    fn change_location(&mut self, location: AreaLocation) -> Result<(), AreaError> {
        if self.is_new() {
            return Err(AreaError::NotFound);
        }
        self.track_change(AreaEvent::AreaLocationChanged { location });
        Ok(())
    }

    fn add_note(&mut self, content: &str) -> Result<StreamId, AreaError> {
        if self.is_new() {
            return Err(AreaError::NotFound);
        }
        validate_content(content)?;
        let note_uid = StreamId::random();
        self.track_change(AreaEvent::AreaNoteAdded {
            note_uid: note_uid.clone(),
            content: content.to_string(),
        });
        Ok(note_uid)
    }

    fn remove_note(&mut self, note_uid: &StreamId) -> Result<(), AreaError> {
        if self.is_new() {
            return Err(AreaError::NotFound);
        }
        let mut notes = self.state().notes.clone();
        remove_note(&mut notes, note_uid)?;
        self.track_change(AreaEvent::AreaNoteRemoved {
            note_uid: note_uid.clone(),
        });
        Ok(())
    }
}

/// The denormalized area read model, with parent names embedded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AreaRow {
    /// The aggregate id.
    pub uid: StreamId,
    /// Owning farm.
    pub farm_uid: StreamId,
    /// Owning farm's name at projection time.
    pub farm_name: String,
    /// Watering reservoir.
    pub reservoir_uid: StreamId,
    /// Watering reservoir's name at projection time.
    pub reservoir_name: String,
    /// Display name.
    pub name: String,
    /// Measured surface.
    pub size: AreaSize,
    /// Purpose of the area.
    pub area_type: AreaType,
    /// Indoor or outdoor.
    pub location: AreaLocation,
    /// Attached notes, replace-on-write.
    pub notes: Vec<NoteRow>,
    /// When the area was created.
    pub created_date: DateTime<Utc>,
}

impl ReadModelRow for AreaRow {
    const KIND: &'static str = AreaState::KIND;

    fn id(&self) -> &StreamId {
        &self.uid
    }
}

/// Keeps one [`AreaRow`] per area in sync with the event history.
pub struct AreaProjection {
    areas: ReadRepository<AreaRow>,
    farms: ReadRepository<FarmRow>,
    reservoirs: ReadRepository<ReservoirRow>,
}

impl AreaProjection {
    /// Bind the projection to a read store.
    #[must_use]
    pub fn new(store: Arc<dyn ReadStore>) -> Self {
        Self {
            areas: ReadRepository::new(Arc::clone(&store)),
            farms: ReadRepository::new(Arc::clone(&store)),
            reservoirs: ReadRepository::new(store),
        }
    }

    async fn apply_inner(&self, record: &EventRecord) -> Result<(), ProjectionError> {
        match decode::<AreaEvent>(record)? {
            AreaEvent::AreaCreated {
                uid,
                farm_uid,
                reservoir_uid,
                name,
                size,
                area_type,
                location,
            } => {
                let farm = require_parent(&self.farms, &farm_uid).await?;
                let reservoir = require_parent(&self.reservoirs, &reservoir_uid).await?;
                self.areas
                    .upsert(&AreaRow {
                        uid,
                        farm_uid,
                        farm_name: farm.name,
                        reservoir_uid,
                        reservoir_name: reservoir.name,
                        name,
                        size,
                        area_type,
                        location,
                        notes: Vec::new(),
                        created_date: record.created_at,
                    })
                    .await?;
            }
            AreaEvent::AreaNameChanged { name } => {
                let mut row = require_row(&self.areas, record).await?;
                row.name = name;
                self.areas.upsert(&row).await?;
            }
            AreaEvent::AreaSizeChanged { size } => {
                let mut row = require_row(&self.areas, record).await?;
                row.size = size;
                self.areas.upsert(&row).await?;
            }
            AreaEvent::AreaLocationChanged { location } => {
                let mut row = require_row(&self.areas, record).await?;
                row.location = location;
                self.areas.upsert(&row).await?;
            }
            AreaEvent::AreaNoteAdded { note_uid, content } => {
                let mut row = require_row(&self.areas, record).await?;
                row.notes.push(NoteRow {
                    uid: note_uid,
                    content,
                    created_date: record.created_at,
                });
                self.areas.upsert(&row).await?;
            }
            AreaEvent::AreaNoteRemoved { note_uid } => {
                let mut row = require_row(&self.areas, record).await?;
                row.notes.retain(|note| note.uid != note_uid);
                self.areas.upsert(&row).await?;
            }
        }
        Ok(())
    }
}

impl Projection for AreaProjection {
    fn name(&self) -> &'static str {
        "area-rows"
    }

    fn event_types(&self) -> &'static [&'static str] {
        AreaEvent::TYPES
    }

    fn apply(
        &self,
        record: &EventRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        let record = record.clone();
        Box::pin(async move { self.apply_inner(&record).await })
    }
}
