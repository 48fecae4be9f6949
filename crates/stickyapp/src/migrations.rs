//! # Migration Engine
//!
//! Upgrades a decoded-but-untyped document record to the schema this build
//! writes. Migrations are registered per target version; a [`Migrator`] keeps
//! them strictly ordered and rejects duplicates.
//!
//! ## Algorithm
//!
//! 1. Reject anything that is not a record (no version to report).
//! 2. Read `version` from the record; absent or non-integer means `1`
//!    (documents written before versioning existed).
//! 3. `from >= target` is a no-op. Documents from a newer build are left
//!    untouched rather than downgraded.
//! 4. Otherwise deep-copy the record as `backup` before any transform runs.
//! 5. Apply every migration with `from < version <= target` in ascending
//!    order, stamping `version` after each step.
//! 6. Stamp `version = target` so gaps in the chain still land on target.
//! 7. The first failing transform stops the chain. The caller receives the
//!    backup; the half-migrated working copy is dropped.
//!
//! ## Built-in Chain
//!
//! | Version | Change |
//! |---------|--------|
//! | 2 | Notes gain `isPinned` (legacy `pinned` renamed) and `updatedAt` |
//! | 3 | `color`/`fontSize`/`fontFamily` move under `style`; layout and settings defaults filled |

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::error::{MigrationError, Result, StickyError};
use crate::model::{
    AppSettings, DEFAULT_BACKGROUND, DEFAULT_FONT_FAMILY, DEFAULT_FONT_SIZE,
};

type Transform = Box<dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync>;

pub struct Migration {
    pub version: u32,
    pub description: String,
    transform: Transform,
}

impl Migration {
    pub fn new<F>(version: u32, description: impl Into<String>, transform: F) -> Self
    where
        F: Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            version,
            description: description.into(),
            transform: Box::new(transform),
        }
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("description", &self.description)
            .finish()
    }
}

/// A successful run. `backup` is `None` on the no-op path.
#[derive(Debug, Clone, PartialEq)]
pub struct Migrated {
    pub document: Value,
    pub from_version: u32,
    /// The version asked for. A document newer than that keeps its own
    /// `version` field and is returned as is.
    pub to_version: u32,
    pub backup: Option<Value>,
    pub applied: Vec<u32>,
}

impl Migrated {
    pub fn upgraded(&self) -> bool {
        self.backup.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationFailure {
    /// `None` when the input was rejected before its version could be read.
    pub from_version: Option<u32>,
    pub to_version: u32,
    pub backup: Option<Value>,
    pub error: MigrationError,
}

impl From<MigrationFailure> for StickyError {
    fn from(value: MigrationFailure) -> Self {
        StickyError::Migration(value.error)
    }
}

#[derive(Debug, Default)]
pub struct Migrator {
    migrations: Vec<Migration>,
}

impl Migrator {
    pub fn new(mut migrations: Vec<Migration>) -> Result<Self> {
        migrations.sort_by_key(|m| m.version);
        if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(StickyError::Validation(format!(
                "migration version {} registered twice",
                pair[0].version
            )));
        }
        Ok(Self { migrations })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// The chain shipped with this build, ending at [`crate::model::CURRENT_VERSION`].
    pub fn builtin() -> Self {
        Self {
            migrations: vec![
                Migration::new(2, "Track pin state and edit time", track_pin_and_edit_time),
                Migration::new(3, "Group display fields under style", group_style_fields),
            ],
        }
    }

    pub fn versions(&self) -> Vec<u32> {
        self.migrations.iter().map(|m| m.version).collect()
    }

    pub fn run(&self, raw: Value, target: u32) -> std::result::Result<Migrated, MigrationFailure> {
        if !raw.is_object() {
            return Err(MigrationFailure {
                from_version: None,
                to_version: target,
                backup: None,
                error: MigrationError::fatal("document is not a record"),
            });
        }

        let from = detect_version(&raw);
        if from >= target {
            debug!(version = from, target, "document already current");
            return Ok(Migrated {
                document: raw,
                from_version: from,
                to_version: target,
                backup: None,
                applied: Vec::new(),
            });
        }

        let backup = raw.clone();
        let mut working = raw;
        let mut applied = Vec::new();

        for migration in self
            .migrations
            .iter()
            .filter(|m| m.version > from && m.version <= target)
        {
            debug!(version = migration.version, description = %migration.description, "applying migration");
            let next = (migration.transform)(working).and_then(|doc| {
                if doc.is_object() {
                    Ok(doc)
                } else {
                    Err("transform produced a non-record document".to_string())
                }
            });
            working = match next {
                Ok(doc) => doc,
                Err(message) => {
                    return Err(MigrationFailure {
                        from_version: Some(from),
                        to_version: target,
                        backup: Some(backup),
                        error: MigrationError::at(migration.version, message),
                    });
                }
            };
            stamp_version(&mut working, migration.version);
            applied.push(migration.version);
        }

        stamp_version(&mut working, target);
        info!(from, to = target, ?applied, "document migrated");

        Ok(Migrated {
            document: working,
            from_version: from,
            to_version: target,
            backup: Some(backup),
            applied,
        })
    }
}

fn detect_version(raw: &Value) -> u32 {
    raw.get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(1)
}

fn stamp_version(doc: &mut Value, version: u32) {
    if let Some(obj) = doc.as_object_mut() {
        obj.insert("version".to_string(), json!(version));
    }
}

fn notes_mut(doc: &mut Value) -> std::result::Result<&mut Vec<Value>, String> {
    let obj = doc
        .as_object_mut()
        .ok_or_else(|| "document is not a record".to_string())?;
    obj.entry("notes")
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| "notes is not a list".to_string())
}

fn note_record(note: &mut Value, index: usize) -> std::result::Result<&mut Map<String, Value>, String> {
    note.as_object_mut()
        .ok_or_else(|| format!("note #{} is not a record", index))
}

fn track_pin_and_edit_time(mut doc: Value) -> std::result::Result<Value, String> {
    for (i, note) in notes_mut(&mut doc)?.iter_mut().enumerate() {
        let note = note_record(note, i)?;
        if let Some(pinned) = note.remove("pinned") {
            note.entry("isPinned").or_insert(pinned);
        }
        note.entry("isPinned").or_insert(Value::Bool(false));

        let created = note.get("createdAt").cloned().unwrap_or(json!(0));
        note.entry("createdAt").or_insert_with(|| created.clone());
        note.entry("updatedAt").or_insert(created);
    }
    Ok(doc)
}

fn group_style_fields(mut doc: Value) -> std::result::Result<Value, String> {
    let defaults = AppSettings::default();

    {
        let obj = doc
            .as_object_mut()
            .ok_or_else(|| "document is not a record".to_string())?;
        obj.entry("timestamp").or_insert(json!(0));

        let settings = obj
            .entry("settings")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| "settings is not a record".to_string())?;
        settings.entry("theme").or_insert(json!(defaults.theme));
        settings
            .entry("defaultNoteSize")
            .or_insert(json!(defaults.default_note_size));
        settings
            .entry("defaultNotePosition")
            .or_insert(json!(defaults.default_note_position));
        settings.entry("autoSave").or_insert(json!(defaults.auto_save));
        settings
            .entry("saveInterval")
            .or_insert(json!(defaults.save_interval));
    }

    for (i, note) in notes_mut(&mut doc)?.iter_mut().enumerate() {
        let note = note_record(note, i)?;

        let color = note.remove("color");
        let font_size = note.remove("fontSize");
        let font_family = note.remove("fontFamily");
        let style = note
            .entry("style")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| format!("note #{} style is not a record", i))?;
        style
            .entry("backgroundColor")
            .or_insert(color.unwrap_or_else(|| json!(DEFAULT_BACKGROUND)));
        style
            .entry("fontSize")
            .or_insert(font_size.unwrap_or_else(|| json!(DEFAULT_FONT_SIZE)));
        style
            .entry("fontFamily")
            .or_insert(font_family.unwrap_or_else(|| json!(DEFAULT_FONT_FAMILY)));

        note.entry("content").or_insert(json!(""));
        note.entry("position")
            .or_insert(json!(defaults.default_note_position));
        note.entry("size").or_insert(json!(defaults.default_note_size));
    }
    Ok(doc)
}
