use crate::clock::IdGenerator;
use crate::error::{Result, StickyError};
use crate::model::{Document, Note, NoteId, NotePatch, SizePolicy};
use chrono::{DateTime, Utc};

/// Attempts before giving up on finding an unused id.
const MAX_ID_ATTEMPTS: usize = 16;

pub fn run(
    doc: &mut Document,
    ids: &dyn IdGenerator,
    policy: &SizePolicy,
    now: DateTime<Utc>,
    patch: NotePatch,
) -> Result<Note> {
    // Validate before generating anything so a rejected create leaves no trace.
    let size = match patch.size {
        Some(size) => policy.validate(size)?,
        None => policy.clamp(doc.settings.default_note_size),
    };
    let id = fresh_id(doc, ids)?;

    let note = Note {
        id,
        title: patch.title,
        content: patch.content.unwrap_or_default(),
        position: patch
            .position
            .unwrap_or(doc.settings.default_note_position),
        size,
        style: patch.style.unwrap_or_default(),
        created_at: now,
        updated_at: now,
        is_pinned: patch.is_pinned.unwrap_or(false),
    };
    doc.notes.push(note.clone());
    Ok(note)
}

fn fresh_id(doc: &Document, ids: &dyn IdGenerator) -> Result<NoteId> {
    for _ in 0..MAX_ID_ATTEMPTS {
        let candidate = ids.generate();
        if candidate.is_empty() {
            continue;
        }
        let candidate = NoteId::new(candidate);
        if !doc.contains(&candidate) {
            return Ok(candidate);
        }
    }
    Err(StickyError::Validation(format!(
        "could not generate an unused note id after {} attempts",
        MAX_ID_ATTEMPTS
    )))
}
