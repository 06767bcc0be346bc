//! The crop batch aggregate: plants sown on an area.
//!
//! A batch gets a human-readable id derived from the crop type and the
//! sowing date (e.g. `rom-tom-24mar26`), lives in a container — a tray
//! with a cell count or individual pots — and carries notes like every
//! other field entity.

use crate::area::AreaRow;
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

/// Errors raised by crop commands.
#[derive(Error, Debug, PartialEq)]
pub enum CropError {
    /// The crop type is empty.
    #[error("crop type must not be empty")]
    EmptyCropType,

    /// Container quantities must be strictly positive.
    #[error("container quantity must be positive, got {0}")]
    InvalidQuantity(i32),

    /// A tray needs a strictly positive cell count.
    #[error("tray cell count must be positive, got {0}")]
    InvalidCellCount(i32),

    /// The command targets a crop batch with no history.
    #[error("crop batch does not exist")]
    NotFound,

    /// A note operation failed.
    #[error(transparent)]
    Note(#[from] NoteError),
}

/// What a batch is growing in.
///
/// Serialized with an internal `"Type"` tag:
/// `{"Type": "Tray", "Cell": 128}` or `{"Type": "Pot"}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all_fields = "PascalCase")]
pub enum ContainerKind {
    /// A seeding tray divided into cells.
    Tray {
        /// Number of cells per tray.
        cell: i32,
    },
    /// Individual pots.
    Pot,
}

impl ContainerKind {
    /// Build a tray kind, rejecting non-positive cell counts.
    ///
    /// # Errors
    ///
    /// Returns [`CropError::InvalidCellCount`] if `cell <= 0`.
    pub const fn tray(cell: i32) -> Result<Self, CropError> {
        if cell <= 0 {
            return Err(CropError::InvalidCellCount(cell));
        }
        Ok(Self::Tray { cell })
    }
}

/// How many containers a batch occupies, and of what kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CropContainer {
    /// Number of containers, strictly positive.
    pub quantity: i32,
    /// Tray or pot.
    pub kind: ContainerKind,
}

impl CropContainer {
    /// Build a container spec, rejecting non-positive quantities.
    ///
    /// # Errors
    ///
    /// Returns [`CropError::InvalidQuantity`] if `quantity <= 0`.
    pub const fn new(quantity: i32, kind: ContainerKind) -> Result<Self, CropError> {
        if quantity <= 0 {
            return Err(CropError::InvalidQuantity(quantity));
        }
        Ok(Self { quantity, kind })
    }
}

/// Derive the human-readable batch id from the crop type and sowing date.
///
/// Each word of the crop type contributes its first three letters,
/// lowercased; the sowing date is appended as `DDmonYY`. `"Roma Tomato"`
/// sown on 2026-03-24 becomes `rom-tom-24mar26`.
#[must_use]
pub fn batch_id(crop_type: &str, sown_on: DateTime<Utc>) -> String {
    let mut parts: Vec<String> = crop_type
        .split_whitespace()
        .map(|word| word.chars().take(3).collect::<String>().to_lowercase())
        .collect();
    parts.push(sown_on.format("%d%b%y").to_string().to_lowercase());
    parts.join("-")
}

/// The crop event family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "EventName", content = "EventData", rename_all_fields = "PascalCase")]
pub enum CropEvent {
    /// A new batch was sown.
    CropBatchCreated {
        /// The batch's id, also the stream id.
        uid: StreamId,
        /// Area the batch is sown on.
        area_uid: StreamId,
        /// Human-readable batch id.
        batch_id: String,
        /// What is being grown.
        crop_type: String,
        /// When the batch was sown.
        sown_on: DateTime<Utc>,
        /// What the batch grows in.
        container: CropContainer,
    },
    /// The batch moved to different containers.
    CropContainerChanged {
        /// The new container spec.
        container: CropContainer,
    },
    /// A note was attached.
    CropNoteAdded {
        /// The note's own id.
        note_uid: StreamId,
        /// Free-text content.
        content: String,
    },
    /// A note was removed.
    CropNoteRemoved {
        /// The removed note's id.
        note_uid: StreamId,
    },
}

impl CropEvent {
    /// Every event-type name in this family, for projection subscriptions.
    pub const TYPES: &'static [&'static str] = &[
        "CropBatchCreated",
        "CropContainerChanged",
        "CropNoteAdded",
        "CropNoteRemoved",
    ];
}

impl DomainEvent for CropEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CropEvent::CropBatchCreated { .. } => "CropBatchCreated",
            CropEvent::CropContainerChanged { .. } => "CropContainerChanged",
            CropEvent::CropNoteAdded { .. } => "CropNoteAdded",
            CropEvent::CropNoteRemoved { .. } => "CropNoteRemoved",
        }
    }
}

/// Event-sourced crop batch state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CropState {
    /// Area the batch is sown on; `None` until created.
    pub area_uid: Option<StreamId>,
    /// Human-readable batch id.
    pub batch_id: String,
    /// What is being grown.
    pub crop_type: String,
    /// When the batch was sown; `None` until created.
    pub sown_on: Option<DateTime<Utc>>,
    /// What the batch grows in; `None` until created.
    pub container: Option<CropContainer>,
    /// Attached notes, in insertion order.
    pub notes: Vec<Note>,
}

impl AggregateState for CropState {
    type Event = CropEvent;
    const KIND: &'static str = "Crop";

    fn transition(&mut self, event: &CropEvent) {
        match event {
            CropEvent::CropBatchCreated {
                area_uid,
                batch_id,
                crop_type,
                sown_on,
                container,
                ..
            } => {
                self.area_uid = Some(area_uid.clone());
                self.batch_id = batch_id.clone();
                self.crop_type = crop_type.clone();
                self.sown_on = Some(*sown_on);
                self.container = Some(*container);
            }
            CropEvent::CropContainerChanged { container } => {
                self.container = Some(*container);
            }
            CropEvent::CropNoteAdded { note_uid, content } => {
                self.notes.push(Note {
                    uid: note_uid.clone(),
                    content: content.clone(),
                });
            }
            CropEvent::CropNoteRemoved { note_uid } => {
                self.notes.retain(|note| &note.uid != note_uid);
            }
        }
    }
}

/// A crop batch aggregate instance.
pub type Crop = Aggregate<CropState>;

/// Commands on the crop batch aggregate.
pub trait CropCommands: Sized {
    /// Sow a new batch on an area with a fresh random id.
    ///
    /// The sowing date is supplied by the caller so the command stays
    /// deterministic; the batch id is derived from it and the crop type.
    ///
    /// # Errors
    ///
    /// Returns [`CropError::EmptyCropType`] if the crop type is empty.
    fn sow(
        area_uid: StreamId,
        crop_type: &str,
        sown_on: DateTime<Utc>,
        container: CropContainer,
    ) -> Result<Self, CropError>;

    /// Move the batch to different containers.
    ///
    /// # Errors
    ///
    /// Returns [`CropError::NotFound`] if the batch does not exist.
    fn change_container(&mut self, container: CropContainer) -> Result<(), CropError>;

    /// Attach a note, returning its fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`CropError`] if the batch does not exist or the content is
    /// invalid.
    fn add_note(&mut self, content: &str) -> Result<StreamId, CropError>;

    /// Remove a note by id.
    ///
    /// # Errors
    ///
    /// Returns [`CropError`] if the batch or the note does not exist.
    fn remove_note(&mut self, note_uid: &StreamId) -> Result<(), CropError>;
}

impl CropCommands for Crop {
    fn sow(
        area_uid: StreamId,
        crop_type: &str,
        sown_on: DateTime<Utc>,
        container: CropContainer,
    ) -> Result<Self, CropError> {
        if crop_type.trim().is_empty() {
            return Err(CropError::EmptyCropType);
        }

        let id = StreamId::random();
        let mut crop = Self::new(id.clone());
        crop.track_change(CropEvent::CropBatchCreated {
            uid: id,
            area_uid,
            batch_id: batch_id(crop_type, sown_on),
            crop_type: crop_type.to_string(),
            sown_on,
            container,
        });
        Ok(crop)
    }

    fn change_container(&mut self, container: CropContainer) -> Result<(), CropError> {
        if self.is_new() {
            return Err(CropError::NotFound);
        }
        self.track_change(CropEvent::CropContainerChanged { container });
        Ok(())
    }

    fn add_note(&mut self, content: &str) -> Result<StreamId, CropError> {
        if self.is_new() {
            return Err(CropError::NotFound);
        }
        validate_content(content)?;
        let note_uid = StreamId::random();
        self.track_change(CropEvent::CropNoteAdded {
            note_uid: note_uid.clone(),
            content: content.to_string(),
        });
        Ok(note_uid)
    }

    fn remove_note(&mut self, note_uid: &StreamId) -> Result<(), CropError> {
        if self.is_new() {
            return Err(CropError::NotFound);
        }
        let mut notes = self.state().notes.clone();
        remove_note(&mut notes, note_uid)?;
        self.track_change(CropEvent::CropNoteRemoved {
            note_uid: note_uid.clone(),
        });
        Ok(())
    }
}

/// The denormalized crop read model, with the area's name embedded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CropRow {
    /// The aggregate id.
    pub uid: StreamId,
    /// Area the batch is sown on.
    pub area_uid: StreamId,
    /// Area's name at projection time.
    pub area_name: String,
    /// Human-readable batch id.
    pub batch_id: String,
    /// What is being grown.
    pub crop_type: String,
    /// When the batch was sown.
    pub sown_on: DateTime<Utc>,
    /// What the batch grows in.
    pub container: CropContainer,
    /// Attached notes, replace-on-write.
    pub notes: Vec<NoteRow>,
    /// When the batch was created.
    pub created_date: DateTime<Utc>,
}

impl ReadModelRow for CropRow {
    const KIND: &'static str = CropState::KIND;

    fn id(&self) -> &StreamId {
        &self.uid
    }
}

/// Keeps one [`CropRow`] per batch in sync with the event history.
pub struct CropProjection {
    crops: ReadRepository<CropRow>,
    areas: ReadRepository<AreaRow>,
}

impl CropProjection {
    /// Bind the projection to a read store.
    #[must_use]
    pub fn new(store: Arc<dyn ReadStore>) -> Self {
        Self {
            crops: ReadRepository::new(Arc::clone(&store)),
            areas: ReadRepository::new(store),
        }
    }

    async fn apply_inner(&self, record: &EventRecord) -> Result<(), ProjectionError> {
        match decode::<CropEvent>(record)? {
            CropEvent::CropBatchCreated {
                uid,
                area_uid,
                batch_id,
                crop_type,
                sown_on,
                container,
            } => {
                let area = require_parent(&self.areas, &area_uid).await?;
                self.crops
                    .upsert(&CropRow {
                        uid,
                        area_uid,
                        area_name: area.name,
                        batch_id,
                        crop_type,
                        sown_on,
                        container,
                        notes: Vec::new(),
                        created_date: record.created_at,
                    })
                    .await?;
            }
            CropEvent::CropContainerChanged { container } => {
                let mut row = require_row(&self.crops, record).await?;
                row.container = container;
                self.crops.upsert(&row).await?;
            }
            CropEvent::CropNoteAdded { note_uid, content } => {
                let mut row = require_row(&self.crops, record).await?;
                row.notes.push(NoteRow {
                    uid: note_uid,
                    content,
                    created_date: record.created_at,
                });
                self.crops.upsert(&row).await?;
            }
            CropEvent::CropNoteRemoved { note_uid } => {
                let mut row = require_row(&self.crops, record).await?;
                row.notes.retain(|note| note.uid != note_uid);
                self.crops.upsert(&row).await?;
            }
        }
        Ok(())
    }
}

impl Projection for CropProjection {
    fn name(&self) -> &'static str {
        "crop-rows"
    }

    fn event_types(&self) -> &'static [&'static str] {
        CropEvent::TYPES
    }

    fn apply(
        &self,
        record: &EventRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), ProjectionError>> + Send + '_>> {
        let record = record.clone();
        Box::pin(async move { self.apply_inner(&record).await })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Panics: tests fail on command or codec errors
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn march_24() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 24, 8, 0, 0).unwrap()
    }

    #[test]
    fn batch_id_abbreviates_words_and_appends_the_date() {
        assert_eq!(batch_id("Roma Tomato", march_24()), "rom-tom-24mar26");
        assert_eq!(batch_id("Basil", march_24()), "bas-24mar26");
        // Words shorter than the abbreviation are kept whole.
        assert_eq!(batch_id("Ox Heart", march_24()), "ox-hea-24mar26");
    }

    #[test]
    fn container_validation() {
        assert_eq!(
            ContainerKind::tray(0).unwrap_err(),
            CropError::InvalidCellCount(0)
        );
        assert_eq!(
            CropContainer::new(0, ContainerKind::Pot).unwrap_err(),
            CropError::InvalidQuantity(0)
        );
    }

    #[test]
    fn container_kind_carries_a_type_discriminant() {
        let tray = serde_json::to_value(ContainerKind::Tray { cell: 128 }).unwrap();
        assert_eq!(tray, serde_json::json!({ "Type": "Tray", "Cell": 128 }));

        let pot = serde_json::to_value(ContainerKind::Pot).unwrap();
        assert_eq!(pot, serde_json::json!({ "Type": "Pot" }));
    }

    #[test]
    fn sowing_queues_the_derived_batch_id() {
        let crop = Crop::sow(
            StreamId::new("area-1"),
            "Roma Tomato",
            march_24(),
            CropContainer::new(4, ContainerKind::tray(128).unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(crop.state().batch_id, "rom-tom-24mar26");
        assert_eq!(crop.uncommitted().len(), 1);
    }

    #[test]
    fn empty_crop_type_is_rejected() {
        let result = Crop::sow(
            StreamId::new("area-1"),
            "  ",
            march_24(),
            CropContainer::new(1, ContainerKind::Pot).unwrap(),
        );
        assert_eq!(result.unwrap_err(), CropError::EmptyCropType);
    }

    proptest! {
        // The batch id is always lowercase, whitespace-free, and ends
        // with the sowing date stamp.
        #[test]
        fn batch_id_is_a_lowercase_slug(
            words in proptest::collection::vec("[A-Za-z]{1,10}", 1..4),
            day in 1u32..=28,
            month in 1u32..=12,
        ) {
            let crop_type = words.join(" ");
            let sown_on = Utc.with_ymd_and_hms(2026, month, day, 12, 0, 0).unwrap();
            let id = batch_id(&crop_type, sown_on);

            prop_assert!(!id.contains(char::is_whitespace));
            prop_assert!(!id.chars().any(char::is_uppercase));
            prop_assert!(id.ends_with(&sown_on.format("%d%b%y").to_string().to_lowercase()));
            prop_assert_eq!(id.split('-').count(), words.len() + 1);
        }
    }

    #[test]
    fn container_change_applies_to_state() {
        let mut crop = Crop::sow(
            StreamId::new("area-1"),
            "Basil",
            march_24(),
            CropContainer::new(1, ContainerKind::Pot).unwrap(),
        )
        .unwrap();
        crop.change_container(
            CropContainer::new(2, ContainerKind::tray(64).unwrap()).unwrap(),
        )
        .unwrap();
        assert_eq!(
            crop.state().container,
            Some(CropContainer {
                quantity: 2,
                kind: ContainerKind::Tray { cell: 64 },
            })
        );
    }
}
