use crate::error::{Result, StickyError};
use crate::model::{Document, Note, NoteId};

/// Permanently remove a note. There is no tombstone; the removed note is
/// handed back to the caller.
pub fn run(doc: &mut Document, id: &NoteId) -> Result<Note> {
    let index = doc
        .notes
        .iter()
        .position(|n| &n.id == id)
        .ok_or_else(|| StickyError::NoteNotFound(id.clone()))?;
    Ok(doc.notes.remove(index))
}
