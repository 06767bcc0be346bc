//! The material aggregate: purchasable inventory (seeds, agrochemicals,
//! growing media, seeding containers).
//!
//! The material's type is a closed sum with a `"Type"` discriminant at
//! rest; seeds and agrochemicals carry an extra classification field.
//! Quantity units are validated against the material type, so a seed
//! cannot be counted in bags.

use crate::note::{Note, NoteError, NoteRow, remove_note, validate_content};
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

/// Errors raised by material commands.
#[derive(Error, Debug, PartialEq)]
pub enum MaterialError {
    /// The material name is empty.
    #[error("material name must not be empty")]
    EmptyName,

    /// Prices cannot be negative.
    #[error("price must not be negative, got {0}")]
    NegativePrice(f64),

    /// Quantities must be strictly positive.
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(f64),

    /// The unit does not fit the material type.
    #[error("unit {unit:?} is not valid for this material type")]
    UnitMismatch {
        /// The rejected unit.
        unit: MaterialUnit,
    },

    /// The command targets a material with no history.
    #[error("material does not exist")]
    NotFound,

    /// A note operation failed.
    #[error(transparent)]
    Note(#[from] NoteError),
}

/// Broad classification of a seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlantType {
    /// Vegetables.
    Vegetable,
    /// Fruit.
    Fruit,
    /// Herbs.
    Herb,
    /// Flowers.
    Flower,
}

/// Broad classification of an agrochemical.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChemicalType {
    /// Cleaning agents.
    Disinfectant,
    /// Nutrient products.
    Fertilizer,
    /// Growth regulators.
    Hormone,
    /// Pest control.
    Pesticide,
}

/// What kind of thing a material is.
///
/// Serialized with an internal `"Type"` tag, e.g.
/// `{"Type": "Seed", "PlantType": "Vegetable"}` or
/// `{"Type": "GrowingMedium"}`. An unknown `Type` value fails decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type", rename_all_fields = "PascalCase")]
pub enum MaterialType {
    /// Seeds, classified by what they grow into.
    Seed {
        /// What the seed grows into.
        plant_type: PlantType,
    },
    /// Chemical products, classified by purpose.
    Agrochemical {
        /// What the chemical is for.
        chemical_type: ChemicalType,
    },
    /// Soil, compost, coco coir.
    GrowingMedium,
    /// Trays and pots used for seeding.
    SeedingContainer,
}

/// Unit a material quantity is counted in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialUnit {
    /// Sealed packets.
    Packets,
    /// Grams.
    Grams,
    /// Kilograms.
    Kilograms,
    /// Bottles.
    Bottles,
    /// Bags.
    Bags,
    /// Cubic metres.
    CubicMetre,
    /// Individual pieces.
    Pieces,
}

impl MaterialUnit {
    /// Whether this unit fits the given material type.
    #[must_use]
    pub const fn fits(self, material_type: &MaterialType) -> bool {
        match material_type {
            MaterialType::Seed { .. } => {
                matches!(self, Self::Packets | Self::Grams | Self::Kilograms)
            }
            MaterialType::Agrochemical { .. } => matches!(self, Self::Packets | Self::Bottles),
            MaterialType::GrowingMedium => matches!(self, Self::Bags | Self::CubicMetre),
            MaterialType::SeedingContainer => matches!(self, Self::Pieces),
        }
    }
}

/// A counted amount of material.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MaterialQuantity {
    /// Magnitude, strictly positive.
    pub value: f64,
    /// Unit of the magnitude.
    pub unit: MaterialUnit,
}

impl MaterialQuantity {
    /// Build a quantity valid for the given material type.
    ///
    /// # Errors
    ///
    /// Returns [`MaterialError`] if the value is non-positive or the unit
    /// does not fit the type.
    pub fn new(
        value: f64,
        unit: MaterialUnit,
        material_type: &MaterialType,
    ) -> Result<Self, MaterialError> {
        if value <= 0.0 {
            return Err(MaterialError::InvalidQuantity(value));
        }
        if !unit.fits(material_type) {
            return Err(MaterialError::UnitMismatch { unit });
        }
        Ok(Self { value, unit })
    }
}

/// A unit price with its currency code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PricePerUnit {
    /// Non-negative amount.
    pub amount: f64,
    /// ISO 4217 currency code, e.g. `"EUR"`.
    pub code: String,
}

impl PricePerUnit {
    /// Build a price, rejecting negative amounts.
    ///
    /// # Errors
    ///
    /// Returns [`MaterialError::NegativePrice`] if `amount < 0`.
    pub fn new(amount: f64, code: &str) -> Result<Self, MaterialError> {
        if amount < 0.0 {
            return Err(MaterialError::NegativePrice(amount));
        }
        Ok(Self {
            amount,
            code: code.to_string(),
        })
    }
}

/// The material event family.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "EventName", content = "EventData", rename_all_fields = "PascalCase")]
pub enum MaterialEvent {
    /// A new material entered the inventory.
    MaterialCreated {
        /// The material's id, also the stream id.
        uid: StreamId,
        /// Display name.
        name: String,
        /// What kind of thing it is.
        material_type: MaterialType,
        /// Unit price.
        price_per_unit: PricePerUnit,
        /// Amount on hand.
        quantity: MaterialQuantity,
        /// Use-by date, if any.
        expiration_date: Option<DateTime<Utc>>,
    },
    /// The material was renamed.
    MaterialNameChanged {
        /// The new name.
        name: String,
    },
    /// The unit price changed.
    MaterialPriceChanged {
        /// The new price.
        price_per_unit: PricePerUnit,
    },
    /// The amount on hand changed.
    MaterialQuantityChanged {
        /// The new quantity.
        quantity: MaterialQuantity,
    },
    /// The use-by date changed.
    MaterialExpirationChanged {
        /// The new use-by date, or `None` to clear it.
        expiration_date: Option<DateTime<Utc>>,
    },
    /// A note was attached.
    MaterialNoteAdded {
        /// The note's own id.
        note_uid: StreamId,
        /// Free-text content.
        content: String,
    },
    /// A note was removed.
    MaterialNoteRemoved {
        /// The removed note's id.
        note_uid: StreamId,
    },
}

impl MaterialEvent {
    /// Every event-type name in this family, for projection subscriptions.
    pub const TYPES: &'static [&'static str] = &[
        "MaterialCreated",
        "MaterialNameChanged",
        "MaterialPriceChanged",
        "MaterialQuantityChanged",
        "MaterialExpirationChanged",
        "MaterialNoteAdded",
        "MaterialNoteRemoved",
    ];
}

impl DomainEvent for MaterialEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MaterialEvent::MaterialCreated { .. } => "MaterialCreated",
            MaterialEvent::MaterialNameChanged { .. } => "MaterialNameChanged",
            MaterialEvent::MaterialPriceChanged { .. } => "MaterialPriceChanged",
            MaterialEvent::MaterialQuantityChanged { .. } => "MaterialQuantityChanged",
            MaterialEvent::MaterialExpirationChanged { .. } => "MaterialExpirationChanged",
            MaterialEvent::MaterialNoteAdded { .. } => "MaterialNoteAdded",
            MaterialEvent::MaterialNoteRemoved { .. } => "MaterialNoteRemoved",
        }
    }
}

/// Event-sourced material state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialState {
    /// Display name.
    pub name: String,
    /// What kind of thing it is; `None` until created.
    pub material_type: Option<MaterialType>,
    /// Unit price; `None` until created.
    pub price_per_unit: Option<PricePerUnit>,
    /// Amount on hand; `None` until created.
    pub quantity: Option<MaterialQuantity>,
    /// Use-by date, if any.
    pub expiration_date: Option<DateTime<Utc>>,
    /// Attached notes, in insertion order.
    pub notes: Vec<Note>,
}

impl AggregateState for MaterialState {
    type Event = MaterialEvent;
    const KIND: &'static str = "Material";

    fn transition(&mut self, event: &MaterialEvent) {
        match event {
            MaterialEvent::MaterialCreated {
                name,
                material_type,
                price_per_unit,
                quantity,
                expiration_date,
                ..
            } => {
                self.name = name.clone();
                self.material_type = Some(*material_type);
                self.price_per_unit = Some(price_per_unit.clone());
                self.quantity = Some(*quantity);
                self.expiration_date = *expiration_date;
            }
            MaterialEvent::MaterialNameChanged { name } => self.name = name.clone(),
            MaterialEvent::MaterialPriceChanged { price_per_unit } => {
                self.price_per_unit = Some(price_per_unit.clone());
            }
            MaterialEvent::MaterialQuantityChanged { quantity } => {
                self.quantity = Some(*quantity);
            }
            MaterialEvent::MaterialExpirationChanged { expiration_date } => {
                self.expiration_date = *expiration_date;
            }
            MaterialEvent::MaterialNoteAdded { note_uid, content } => {
                self.notes.push(Note {
                    uid: note_uid.clone(),
                    content: content.clone(),
                });
            }
            MaterialEvent::MaterialNoteRemoved { note_uid } => {
                self.notes.retain(|note| &note.uid != note_uid);
            }
        }
    }
}

/// A material aggregate instance.
pub type Material = Aggregate<MaterialState>;

/// Commands on the material aggregate.
pub trait MaterialCommands: Sized {
    /// Add a material to the inventory with a fresh random id.
    ///
    /// # Errors
    ///
    /// Returns [`MaterialError`] if the name is empty or the quantity does
    /// not fit the type.
    fn create(
        name: &str,
        material_type: MaterialType,
        price_per_unit: PricePerUnit,
        quantity: MaterialQuantity,
        expiration_date: Option<DateTime<Utc>>,
    ) -> Result<Self, MaterialError>;

    /// Rename the material.
    ///
    /// # Errors
    ///
    /// Returns [`MaterialError`] if the material does not exist or the
    /// name is empty.
    fn change_name(&mut self, name: &str) -> Result<(), MaterialError>;

    /// Change the unit price.
    ///
    /// # Errors
    ///
    /// Returns [`MaterialError::NotFound`] if the material does not exist.
    fn change_price(&mut self, price_per_unit: PricePerUnit) -> Result<(), MaterialError>;

    /// Change the amount on hand.
    ///
    /// # Errors
    ///
    /// Returns [`MaterialError`] if the material does not exist or the
    /// unit does not fit its type.
    fn change_quantity(&mut self, quantity: MaterialQuantity) -> Result<(), MaterialError>;

    /// Change or clear the use-by date.
    ///
    /// # Errors
    ///
    /// Returns [`MaterialError::NotFound`] if the material does not exist.
    fn change_expiration(
        &mut self,
        expiration_date: Option<DateTime<Utc>>,
    ) -> Result<(), MaterialError>;

    /// Attach a note, returning its fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`MaterialError`] if the material does not exist or the
    /// content is invalid.
    fn add_note(&mut self, content: &str) -> Result<StreamId, MaterialError>;

    /// Remove a note by id.
    ///
    /// # Errors
    ///
    /// Returns [`MaterialError`] if the material or the note does not
    /// exist.
    fn remove_note(&mut self, note_uid: &StreamId) -> Result<(), MaterialError>;
}

impl MaterialCommands for Material {
    fn create(
        name: &str,
        material_type: MaterialType,
        price_per_unit: PricePerUnit,
        quantity: MaterialQuantity,
        expiration_date: Option<DateTime<Utc>>,
    ) -> Result<Self, MaterialError> {
        if name.trim().is_empty() {
            return Err(MaterialError::EmptyName);
        }
        if !quantity.unit.fits(&material_type) {
            return Err(MaterialError::UnitMismatch {
                unit: quantity.unit,
            });
        }

        let id = StreamId::random();
        let mut material = Self::new(id.clone());
        material.track_change(MaterialEvent::MaterialCreated {
            uid: id,
            name: name.to_string(),
            material_type,
            price_per_unit,
            quantity,
            expiration_date,
        });
        Ok(material)
    }

    fn change_name(&mut self, name: &str) -> Result<(), MaterialError> {
        if self.is_new() {
            return Err(MaterialError::NotFound);
        }
        if name.trim().is_empty() {
            return Err(MaterialError::EmptyName);
        }
        self.track_change(MaterialEvent::MaterialNameChanged {
            name: name.to_string(),
        });
        Ok(())
    }

    fn change_price(&mut self, price_per_unit: PricePerUnit) -> Result<(), MaterialError> {
        if self.is_new() {
            return Err(MaterialError::NotFound);
        }
        self.track_change(MaterialEvent::MaterialPriceChanged { price_per_unit });
        Ok(())
    }

    fn change_quantity(&mut self, quantity: MaterialQuantity) -> Result<(), MaterialError> {
        if self.is_new() {
            return Err(MaterialError::NotFound);
        }
        if let Some(material_type) = &self.state().material_type {
            if !quantity.unit.fits(material_type) {
                return Err(MaterialError::UnitMismatch {
                    unit: quantity.unit,
                });
            }
        }
        self.track_change(MaterialEvent::MaterialQuantityChanged { quantity });
        Ok(())
    }

    fn change_expiration(
        &mut self,
        expiration_date: Option<DateTime<Utc>>,
    ) -> Result<(), MaterialError> {
        if self.is_new() {
            return Err(MaterialError::NotFound);
        }
        self.track_change(MaterialEvent::MaterialExpirationChanged { expiration_date });
        Ok(())
    }

    fn add_note(&mut self, content: &str) -> Result<StreamId, MaterialError> {
        if self.is_new() {
            return Err(MaterialError::NotFound);
        }
        validate_content(content)?;
        let note_uid = StreamId::random();
        self.track_change(MaterialEvent::MaterialNoteAdded {
            note_uid: note_uid.clone(),
            content: content.to_string(),
        });
        Ok(note_uid)
    }

    fn remove_note(&mut self, note_uid: &StreamId) -> Result<(), MaterialError> {
        if self.is_new() {
            return Err(MaterialError::NotFound);
        }
        let mut notes = self.state().notes.clone();
        remove_note(&mut notes, note_uid)?;
        self.track_change(MaterialEvent::MaterialNoteRemoved {
            note_uid: note_uid.clone(),
        });
        Ok(())
    }
}

/// The denormalized material read model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MaterialRow {
    /// The aggregate id.
    pub uid: StreamId,
    /// Display name.
    pub name: String,
    /// What kind of thing it is.
    pub material_type: MaterialType,
    /// Unit price.
    pub price_per_unit: PricePerUnit,
    /// Amount on hand.
    pub quantity: MaterialQuantity,
    /// Use-by date, if any.
    pub expiration_date: Option<DateTime<Utc>>,
    /// Attached notes, replace-on-write.
    pub notes: Vec<NoteRow>,
    /// When the material was created.
    pub created_date: DateTime<Utc>,
}

impl ReadModelRow for MaterialRow {
    const KIND: &'static str = MaterialState::KIND;

    fn id(&self) -> &StreamId {
        &self.uid
    }
}

/// Keeps one [`MaterialRow`] per material in sync with the event history.
pub struct MaterialProjection {
    materials: ReadRepository<MaterialRow>,
}

impl MaterialProjection {
    /// Bind the projection to a read store.
    #[must_use]
    pub fn new(store: Arc<dyn ReadStore>) -> Self {
        Self {
            materials: ReadRepository::new(store),
        }
    }

    async fn apply_inner(&self, record: &EventRecord) -> Result<(), ProjectionError> {
        match decode::<MaterialEvent>(record)? {
            MaterialEvent::MaterialCreated {
                uid,
                name,
                material_type,
                price_per_unit,
                quantity,
                expiration_date,
            } => {
                self.materials
                    .upsert(&MaterialRow {
                        uid,
                        name,
                        material_type,
                        price_per_unit,
                        quantity,
                        expiration_date,
                        notes: Vec::new(),
                        created_date: record.created_at,
                    })
                    .await?;
            }
            MaterialEvent::MaterialNameChanged { name } => {
                let mut row = require_row(&self.materials, record).await?;
                row.name = name;
                self.materials.upsert(&row).await?;
            }
            MaterialEvent::MaterialPriceChanged { price_per_unit } => {
                let mut row = require_row(&self.materials, record).await?;
                row.price_per_unit = price_per_unit;
                self.materials.upsert(&row).await?;
            }
            MaterialEvent::MaterialQuantityChanged { quantity } => {
                let mut row = require_row(&self.materials, record).await?;
                row.quantity = quantity;
                self.materials.upsert(&row).await?;
            }
            MaterialEvent::MaterialExpirationChanged { expiration_date } => {
                let mut row = require_row(&self.materials, record).await?;
                row.expiration_date = expiration_date;
                self.materials.upsert(&row).await?;
            }
            MaterialEvent::MaterialNoteAdded { note_uid, content } => {
                let mut row = require_row(&self.materials, record).await?;
                row.notes.push(NoteRow {
                    uid: note_uid,
                    content,
                    created_date: record.created_at,
                });
                self.materials.upsert(&row).await?;
            }
            MaterialEvent::MaterialNoteRemoved { note_uid } => {
                let mut row = require_row(&self.materials, record).await?;
                row.notes.retain(|note| note.uid != note_uid);
                self.materials.upsert(&row).await?;
            }
        }
        Ok(())
    }
}

impl Projection for MaterialProjection {
    fn name(&self) -> &'static str {
        "material-rows"
    }

    fn event_types(&self) -> &'static [&'static str] {
        MaterialEvent::TYPES
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
    use grange_core::environment::Clock;
    use grange_core::event::encode;
    use grange_core::stream::Version;
    use grange_testing::{InMemoryReadStore, test_clock};

    fn seed_type() -> MaterialType {
        MaterialType::Seed {
            plant_type: PlantType::Vegetable,
        }
    }

    fn tomato_seeds() -> Material {
        let material_type = seed_type();
        Material::create(
            "Roma Tomato",
            material_type,
            PricePerUnit::new(3.50, "EUR").unwrap(),
            MaterialQuantity::new(10.0, MaterialUnit::Packets, &material_type).unwrap(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn unit_must_fit_the_material_type() {
        let result = MaterialQuantity::new(5.0, MaterialUnit::Bags, &seed_type());
        assert_eq!(
            result.unwrap_err(),
            MaterialError::UnitMismatch {
                unit: MaterialUnit::Bags
            }
        );
        assert!(MaterialQuantity::new(5.0, MaterialUnit::Grams, &seed_type()).is_ok());
        assert!(
            MaterialQuantity::new(2.0, MaterialUnit::Bottles, &MaterialType::Agrochemical {
                chemical_type: ChemicalType::Fertilizer,
            })
            .is_ok()
        );
    }

    #[test]
    fn price_must_not_be_negative() {
        assert_eq!(
            PricePerUnit::new(-1.0, "EUR").unwrap_err(),
            MaterialError::NegativePrice(-1.0)
        );
    }

    #[test]
    fn quantity_must_be_positive() {
        assert_eq!(
            MaterialQuantity::new(0.0, MaterialUnit::Packets, &seed_type()).unwrap_err(),
            MaterialError::InvalidQuantity(0.0)
        );
    }

    #[test]
    fn material_type_carries_a_type_discriminant() {
        let seed = serde_json::to_value(seed_type()).unwrap();
        assert_eq!(
            seed,
            serde_json::json!({ "Type": "Seed", "PlantType": "Vegetable" })
        );

        let chemical = serde_json::to_value(MaterialType::Agrochemical {
            chemical_type: ChemicalType::Pesticide,
        })
        .unwrap();
        assert_eq!(
            chemical,
            serde_json::json!({ "Type": "Agrochemical", "ChemicalType": "Pesticide" })
        );

        let medium = serde_json::to_value(MaterialType::GrowingMedium).unwrap();
        assert_eq!(medium, serde_json::json!({ "Type": "GrowingMedium" }));

        let container = serde_json::to_value(MaterialType::SeedingContainer).unwrap();
        assert_eq!(container, serde_json::json!({ "Type": "SeedingContainer" }));

        let unknown: Result<MaterialType, _> =
            serde_json::from_value(serde_json::json!({ "Type": "Mulch" }));
        assert!(unknown.is_err());
    }

    #[test]
    fn quantity_change_revalidates_against_the_type() {
        let mut material = tomato_seeds();
        let result = material.change_quantity(MaterialQuantity {
            value: 5.0,
            unit: MaterialUnit::Bags,
        });
        assert_eq!(
            result.unwrap_err(),
            MaterialError::UnitMismatch {
                unit: MaterialUnit::Bags
            }
        );
    }

    fn records_for(material: &Material) -> Vec<EventRecord> {
        material
            .uncommitted()
            .iter()
            .enumerate()
            .map(|(i, event)| {
                let wire = encode(event).unwrap();
                EventRecord {
                    stream_id: material.id().clone(),
                    version: Version::new(i as u64 + 1),
                    created_at: test_clock().now(),
                    event_type: wire.event_type,
                    data: wire.data,
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn projection_tracks_price_and_quantity_changes() {
        let store = Arc::new(InMemoryReadStore::new());
        let projection = MaterialProjection::new(Arc::clone(&store) as Arc<dyn ReadStore>);

        let mut material = tomato_seeds();
        material
            .change_price(PricePerUnit::new(4.25, "EUR").unwrap())
            .unwrap();
        material
            .change_quantity(
                MaterialQuantity::new(25.0, MaterialUnit::Grams, &seed_type()).unwrap(),
            )
            .unwrap();

        for record in records_for(&material) {
            projection.apply_inner(&record).await.unwrap();
        }

        let repo = ReadRepository::<MaterialRow>::new(store);
        let row = repo.find_by_id(material.id()).await.unwrap().unwrap();
        assert_eq!(row.price_per_unit.amount, 4.25);
        assert_eq!(row.quantity.unit, MaterialUnit::Grams);
        assert_eq!(row.material_type, seed_type());
    }
}
