use crate::model::{Note, NoteId};

pub fn get<'a>(notes: &'a [Note], id: &NoteId) -> Option<&'a Note> {
    notes.iter().find(|n| &n.id == id)
}

/// Pinned notes first, then the rest. Relative order inside each group is
/// the collection order (a stable partition, not a time sort).
pub fn sorted(notes: &[Note]) -> Vec<&Note> {
    let (pinned, unpinned): (Vec<&Note>, Vec<&Note>) = notes.iter().partition(|n| n.is_pinned);
    pinned.into_iter().chain(unpinned).collect()
}

pub fn total(notes: &[Note]) -> usize {
    notes.len()
}

pub fn pinned_count(notes: &[Note]) -> usize {
    notes.iter().filter(|n| n.is_pinned).count()
}
