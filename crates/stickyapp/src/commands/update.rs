use crate::error::{Result, StickyError};
use crate::model::{Document, Note, NoteId, NotePatch, SizePolicy};
use chrono::{DateTime, Utc};

/// Merge `patch` into the note with `id`. Fields absent from the patch are
/// left untouched; `updated_at` is refreshed either way.
pub fn run(
    doc: &mut Document,
    policy: &SizePolicy,
    now: DateTime<Utc>,
    id: &NoteId,
    patch: NotePatch,
) -> Result<Note> {
    if let Some(size) = patch.size {
        policy.validate(size)?;
    }
    let note = doc
        .find_mut(id)
        .ok_or_else(|| StickyError::NoteNotFound(id.clone()))?;

    if let Some(title) = patch.title {
        note.title = Some(title);
    }
    if let Some(content) = patch.content {
        note.content = content;
    }
    if let Some(position) = patch.position {
        note.position = position;
    }
    if let Some(size) = patch.size {
        note.size = size;
    }
    if let Some(style) = patch.style {
        note.style = style;
    }
    if let Some(is_pinned) = patch.is_pinned {
        note.is_pinned = is_pinned;
    }
    note.touch(now);

    Ok(note.clone())
}
