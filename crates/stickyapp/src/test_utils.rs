//! Fixtures shared by the unit tests.

use crate::model::{Document, Note, NoteId, NoteStyle, Position, Size};
use chrono::{DateTime, TimeZone, Utc};

pub fn at(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .expect("valid test timestamp")
}

pub fn empty_document() -> Document {
    Document::empty(at(1_000))
}

/// A document with notes `note-1..=note-n`, created one second apart.
pub fn document_with_notes(count: usize) -> Document {
    let mut doc = empty_document();
    for i in 1..=count {
        let created = at(10_000 + (i as i64) * 1_000);
        doc.notes.push(Note {
            id: NoteId::new(format!("note-{}", i)),
            title: Some(format!("Note {}", i)),
            content: format!("Content for note {}", i),
            position: Position::new(i as i32 * 20, i as i32 * 20),
            size: Size::new(300, 300),
            style: NoteStyle::default(),
            created_at: created,
            updated_at: created,
            is_pinned: false,
        });
    }
    doc
}
