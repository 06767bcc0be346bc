//! The reservoir aggregate: a farm's water source.
//!
//! A reservoir belongs to a farm and draws from exactly one water source.
//! The source is a closed sum: a bucket with a fixed capacity, or a tap
//! with unlimited flow. At rest it carries a `"Type"` discriminant so the
//! two shapes share one field.

use crate::farm::FarmRow;
use crate::note::{Note, NoteError, NoteRow, remove_note, validate_content};
use crate::projections::{require_parent, require_row};
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

/// Errors raised by reservoir commands.
#[derive(Error, Debug, PartialEq)]
pub enum ReservoirError {
    /// The reservoir name is empty.
    #[error("reservoir name must not be empty")]
    EmptyName,

    /// A bucket source needs a strictly positive capacity.
    #[error("bucket capacity must be positive, got {0}")]
    InvalidCapacity(f64),

    /// The command targets a reservoir with no history.
    #[error("reservoir does not exist")]
    NotFound,

    /// A note operation failed.
    #[error(transparent)]
    Note(#[from] NoteError),
}

/// Where a reservoir's water comes from.
///
/// Serialized with an internal `"Type"` tag:
/// `{"Type": "Bucket", "Capacity": 60.0}` or `{"Type": "Tap"}`. An unknown
/// `Type` value fails decoding.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all_fields = "PascalCase")]
pub enum WaterSource {
    /// A fixed-capacity container, refilled by hand.
    Bucket {
        /// Capacity in litres.
        capacity: f64,
    },
    /// Mains water, no capacity bound.
    Tap,
}

impl WaterSource {
    /// Build a bucket source, rejecting non-positive capacities.
    ///
    /// # Errors
    ///
    /// Returns [`ReservoirError::InvalidCapacity`] if `capacity <= 0`.
    pub fn bucket(capacity: f64) -> Result<Self, ReservoirError> {
        if capacity <= 0.0 {
            return Err(ReservoirError::InvalidCapacity(capacity));
        }
        Ok(Self::Bucket { capacity })
    }
}

/// The reservoir event family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "EventName", content = "EventData", rename_all_fields = "PascalCase")]
pub enum ReservoirEvent {
    /// A new reservoir came into existence.
    ReservoirCreated {
        /// The reservoir's id, also the stream id.
        uid: StreamId,
        /// Owning farm.
        farm_uid: StreamId,
        /// Display name.
        name: String,
        /// Where the water comes from.
        water_source: WaterSource,
    },
    /// The reservoir was renamed.
    ReservoirNameChanged {
        /// The new name.
        name: String,
    },
    /// A note was attached.
    ReservoirNoteAdded {
        /// The note's own id.
        note_uid: StreamId,
        /// Free-text content.
        content: String,
    },
    /// A note was removed.
    ReservoirNoteRemoved {
        /// The removed note's id.
        note_uid: StreamId,
    },
}

impl ReservoirEvent {
    /// Every event-type name in this family, for projection subscriptions.
    pub const TYPES: &'static [&'static str] = &[
        "ReservoirCreated",
        "ReservoirNameChanged",
        "ReservoirNoteAdded",
        "ReservoirNoteRemoved",
    ];
}

impl DomainEvent for ReservoirEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReservoirEvent::ReservoirCreated { .. } => "ReservoirCreated",
            ReservoirEvent::ReservoirNameChanged { .. } => "ReservoirNameChanged",
            ReservoirEvent::ReservoirNoteAdded { .. } => "ReservoirNoteAdded",
            ReservoirEvent::ReservoirNoteRemoved { .. } => "ReservoirNoteRemoved",
        }
    }
}

/// Event-sourced reservoir state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReservoirState {
    /// Owning farm; `None` until created.
    pub farm_uid: Option<StreamId>,
    /// Display name.
    pub name: String,
    /// Where the water comes from; `None` until created.
    pub water_source: Option<WaterSource>,
    /// Attached notes, in insertion order.
    pub notes: Vec<Note>,
}

impl AggregateState for ReservoirState {
    type Event = ReservoirEvent;
    const KIND: &'static str = "Reservoir";

    fn transition(&mut self, event: &ReservoirEvent) {
        match event {
            ReservoirEvent::ReservoirCreated {
                farm_uid,
                name,
                water_source,
                ..
            } => {
                self.farm_uid = Some(farm_uid.clone());
                self.name = name.clone();
                self.water_source = Some(*water_source);
            }
            ReservoirEvent::ReservoirNameChanged { name } => self.name = name.clone(),
            ReservoirEvent::ReservoirNoteAdded { note_uid, content } => {
                self.notes.push(Note {
                    uid: note_uid.clone(),
                    content: content.clone(),
                });
            }
            ReservoirEvent::ReservoirNoteRemoved { note_uid } => {
                self.notes.retain(|note| &note.uid != note_uid);
            }
        }
    }
}

/// A reservoir aggregate instance.
pub type Reservoir = Aggregate<ReservoirState>;

/// Commands on the reservoir aggregate.
pub trait ReservoirCommands: Sized {
    /// Create a reservoir on a farm with a fresh random id.
    ///
    /// # Errors
    ///
    /// Returns [`ReservoirError`] if the name is empty.
    fn create(
        farm_uid: StreamId,
        name: &str,
        water_source: WaterSource,
    ) -> Result<Self, ReservoirError>;

    /// Rename the reservoir.
    ///
    /// # Errors
    ///
    /// Returns [`ReservoirError`] if the reservoir does not exist or the
    /// name is empty.
    fn change_name(&mut self, name: &str) -> Result<(), ReservoirError>;

    /// Attach a note, returning its fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`ReservoirError`] if the reservoir does not exist or the
    /// content is invalid.
    fn add_note(&mut self, content: &str) -> Result<StreamId, ReservoirError>;

    /// Remove a note by id.
    ///
    /// # Errors
    ///
    /// Returns [`ReservoirError`] if the reservoir or the note does not
    /// exist.
    fn remove_note(&mut self, note_uid: &StreamId) -> Result<(), ReservoirError>;
}

impl ReservoirCommands for Reservoir {
    fn create(
        farm_uid: StreamId,
        name: &str,
        water_source: WaterSource,
    ) -> Result<Self, ReservoirError> {
        if name.trim().is_empty() {
            return Err(ReservoirError::EmptyName);
        }

        let id = StreamId::random();
        let mut reservoir = Self::new(id.clone());
        reservoir.track_change(ReservoirEvent::ReservoirCreated {
            uid: id,
            farm_uid,
            name: name.to_string(),
            water_source,
        });
        Ok(reservoir)
    }

    fn change_name(&mut self, name: &str) -> Result<(), ReservoirError> {
        if self.is_new() {
            return Err(ReservoirError::NotFound);
        }
        if name.trim().is_empty() {
            return Err(ReservoirError::EmptyName);
        }
        self.track_change(ReservoirEvent::ReservoirNameChanged {
            name: name.to_string(),
        });
        Ok(())
    }

    fn add_note(&mut self, content: &str) -> Result<StreamId, ReservoirError> {
        if self.is_new() {
            return Err(ReservoirError::NotFound);
        }
        validate_content(content)?;
        let note_uid = StreamId::random();
        self.track_change(ReservoirEvent::ReservoirNoteAdded {
            note_uid: note_uid.clone(),
            content: content.to_string(),
        });
        Ok(note_uid)
    }

    fn remove_note(&mut self, note_uid: &StreamId) -> Result<(), ReservoirError> {
        if self.is_new() {
            return Err(ReservoirError::NotFound);
        }
        // Validate against a copy; the real mutation happens in transition.
        let mut notes = self.state().notes.clone();
        remove_note(&mut notes, note_uid)?;
        self.track_change(ReservoirEvent::ReservoirNoteRemoved {
            note_uid: note_uid.clone(),
        });
        Ok(())
    }
}

/// The denormalized reservoir read model, with the owning farm's name
/// embedded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReservoirRow {
    /// The aggregate id.
    pub uid: StreamId,
    /// Owning farm.
    pub farm_uid: StreamId,
    /// Owning farm's name at projection time.
    pub farm_name: String,
    /// Display name.
    pub name: String,
    /// Where the water comes from.
    pub water_source: WaterSource,
    /// Attached notes, replace-on-write.
    pub notes: Vec<NoteRow>,
    /// When the reservoir was created.
    pub created_date: DateTime<Utc>,
}

impl ReadModelRow for ReservoirRow {
    const KIND: &'static str = ReservoirState::KIND;

    fn id(&self) -> &StreamId {
        &self.uid
    }
}

/// Keeps one [`ReservoirRow`] per reservoir in sync with the event
/// history.
pub struct ReservoirProjection {
    reservoirs: ReadRepository<ReservoirRow>,
    farms: ReadRepository<FarmRow>,
}

impl ReservoirProjection {
    /// Bind the projection to a read store.
    #[must_use]
    pub fn new(store: Arc<dyn ReadStore>) -> Self {
        Self {
            reservoirs: ReadRepository::new(Arc::clone(&store)),
            farms: ReadRepository::new(store),
        }
    }

    async fn apply_inner(&self, record: &EventRecord) -> Result<(), ProjectionError> {
        match decode::<ReservoirEvent>(record)? {
            ReservoirEvent::ReservoirCreated {
                uid,
                farm_uid,
                name,
                water_source,
            } => {
                let farm = require_parent(&self.farms, &farm_uid).await?;
                self.reservoirs
                    .upsert(&ReservoirRow {
                        uid,
                        farm_uid,
                        farm_name: farm.name,
                        name,
                        water_source,
                        notes: Vec::new(),
                        created_date: record.created_at,
                    })
                    .await?;
            }
            ReservoirEvent::ReservoirNameChanged { name } => {
                let mut row = require_row(&self.reservoirs, record).await?;
                row.name = name;
                self.reservoirs.upsert(&row).await?;
            }
            ReservoirEvent::ReservoirNoteAdded { note_uid, content } => {
                let mut row = require_row(&self.reservoirs, record).await?;
                row.notes.push(NoteRow {
                    uid: note_uid,
                    content,
                    created_date: record.created_at,
                });
                self.reservoirs.upsert(&row).await?;
            }
            ReservoirEvent::ReservoirNoteRemoved { note_uid } => {
                let mut row = require_row(&self.reservoirs, record).await?;
                row.notes.retain(|note| note.uid != note_uid);
                self.reservoirs.upsert(&row).await?;
            }
        }
        Ok(())
    }
}

impl Projection for ReservoirProjection {
    fn name(&self) -> &'static str {
        "reservoir-rows"
    }

    fn event_types(&self) -> &'static [&'static str] {
        ReservoirEvent::TYPES
    }

    fn apply(
        &self,
        record: &EventRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        let record = record.clone();
        Box::pin(async move { self.apply_inner(&record).await })
    }
}
