//! Free-text notes attached to areas, reservoirs, materials, and crops.
//!
//! Notes live *inside* their owning aggregate: adding or removing one is an
//! event on the owner's stream, and the read model stores the whole
//! collection inside the owner's row (replace-on-write, never patched per
//! note).

use chrono::{DateTime, Utc};
use grange_core::stream::StreamId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum note length accepted by owning aggregates.
pub const MAX_NOTE_LEN: usize = 1000;

/// Errors shared by every note-carrying aggregate.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum NoteError {
    /// The note content is empty.
    #[error("note content must not be empty")]
    EmptyContent,

    /// The note content exceeds [`MAX_NOTE_LEN`] characters.
    #[error("note content must not exceed {MAX_NOTE_LEN} characters")]
    ContentTooLong,

    /// No note with the given id exists on this aggregate.
    #[error("no note with uid '{0}'")]
    NotFound(StreamId),
}

/// A note as tracked in aggregate state.
///
/// Timestamps are deliberately absent here: transitions are pure, so the
/// stamp lives on the event record and is attached by the projection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    /// The note's own identifier.
    pub uid: StreamId,
    /// Free-text content.
    pub content: String,
}

/// A note as stored in a read-model row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NoteRow {
    /// The note's own identifier.
    pub uid: StreamId,
    /// Free-text content.
    pub content: String,
    /// When the note was recorded, taken from the event record.
    pub created_date: DateTime<Utc>,
}

/// Validate note content against the shared rules.
///
/// # Errors
///
/// Returns [`NoteError`] if the content is empty or too long.
pub fn validate_content(content: &str) -> Result<(), NoteError> {
    if content.trim().is_empty() {
        return Err(NoteError::EmptyContent);
    }
    if content.chars().count() > MAX_NOTE_LEN {
        return Err(NoteError::ContentTooLong);
    }
    Ok(())
}

/// Remove the note with `note_uid` from a state-side collection.
///
/// # Errors
///
/// Returns [`NoteError::NotFound`] if no such note exists.
pub fn remove_note(notes: &mut Vec<Note>, note_uid: &StreamId) -> Result<(), NoteError> {
    let before = notes.len();
    notes.retain(|note| &note.uid != note_uid);
    if notes.len() == before {
        return Err(NoteError::NotFound(note_uid.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_content_is_rejected() {
        assert_eq!(validate_content("   "), Err(NoteError::EmptyContent));
    }

    #[test]
    fn overlong_content_is_rejected() {
        let content = "x".repeat(MAX_NOTE_LEN + 1);
        assert_eq!(validate_content(&content), Err(NoteError::ContentTooLong));
    }

    #[test]
    fn content_at_limit_is_accepted() {
        let content = "x".repeat(MAX_NOTE_LEN);
        assert_eq!(validate_content(&content), Ok(()));
    }

    #[test]
    fn removing_unknown_note_is_an_error() {
        let mut notes = vec![Note {
            uid: StreamId::new("note-1"),
            content: "check irrigation".to_string(),
        }];
        let missing = StreamId::new("note-2");
        assert_eq!(
            remove_note(&mut notes, &missing),
            Err(NoteError::NotFound(missing))
        );
        assert_eq!(notes.len(), 1);
    }
}
