use crate::error::{Result, StickyError};
use crate::model::{Document, NoteId};
use chrono::{DateTime, Utc};

/// Flip `is_pinned` on a note and return the new state.
///
/// This is a toggle, not a set: applying it twice restores the original value.
pub fn toggle(doc: &mut Document, now: DateTime<Utc>, id: &NoteId) -> Result<bool> {
    let note = doc
        .find_mut(id)
        .ok_or_else(|| StickyError::NoteNotFound(id.clone()))?;
    note.is_pinned = !note.is_pinned;
    note.touch(now);
    Ok(note.is_pinned)
}
