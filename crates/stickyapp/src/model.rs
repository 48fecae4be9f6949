//! # Domain Model
//!
//! This module defines the persisted aggregate: a [`Document`] holding the
//! [`Note`] collection, one [`AppSettings`] record, the schema `version` tag and
//! the `timestamp` of the last save.
//!
//! ## Wire Shape
//!
//! Every type serializes to camelCase JSON so a document written by any build
//! reads the same way:
//!
//! ```text
//! {
//!   "version": 3,
//!   "timestamp": 1718000000000,
//!   "notes": [ { "id", "title"?, "content", "position": {x,y}, "size": {width,height},
//!                "style": {backgroundColor,fontSize,fontFamily},
//!                "createdAt", "updatedAt", "isPinned" } ],
//!   "settings": { "theme", "defaultNoteSize", "defaultNotePosition", "autoSave", "saveInterval" }
//! }
//! ```
//!
//! Timestamps are UTC instants stored as integer epoch milliseconds. Clocks
//! handed to the store produce millisecond-precision instants so a document
//! survives an encode/decode cycle unchanged.
//!
//! ## Invariants
//!
//! - `id` is unique within a document and never changes.
//! - `created_at` never changes; `updated_at >= created_at`.
//! - Partial updates ([`NotePatch`], [`SettingsPatch`]) have no way to name
//!   `id` or `created_at`, so they cannot touch them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Result, StickyError};

/// Schema version written by this build.
pub const CURRENT_VERSION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Bounds applied to note sizes, per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizePolicy {
    pub min: i32,
    pub max: i32,
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self { min: 200, max: 800 }
    }
}

impl SizePolicy {
    pub fn new(min: i32, max: i32) -> Result<Self> {
        if min <= 0 || min > max {
            return Err(StickyError::Validation(format!(
                "invalid size bounds [{}, {}]",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub fn validate(&self, size: Size) -> Result<Size> {
        let in_bounds = |v: i32| v >= self.min && v <= self.max;
        if in_bounds(size.width) && in_bounds(size.height) {
            Ok(size)
        } else {
            Err(StickyError::Validation(format!(
                "size {}x{} outside [{}, {}]",
                size.width, size.height, self.min, self.max
            )))
        }
    }

    pub fn clamp(&self, size: Size) -> Size {
        Size {
            width: size.width.clamp(self.min, self.max),
            height: size.height.clamp(self.min, self.max),
        }
    }
}

pub const DEFAULT_BACKGROUND: &str = "#fff59d";
pub const DEFAULT_FONT_SIZE: u32 = 14;
pub const DEFAULT_FONT_FAMILY: &str = "system-ui, sans-serif";

/// Display-only styling. The store never interprets these values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteStyle {
    pub background_color: String,
    pub font_size: u32,
    pub font_family: String,
}

impl Default for NoteStyle {
    fn default() -> Self {
        Self {
            background_color: DEFAULT_BACKGROUND.to_string(),
            font_size: DEFAULT_FONT_SIZE,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    pub position: Position,
    pub size: Size,
    pub style: NoteStyle,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
    pub is_pinned: bool,
}

impl Note {
    /// Refresh `updated_at` without ever moving it backwards.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    Auto,
}

impl std::str::FromStr for Theme {
    type Err = StickyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "auto" | "system" => Ok(Theme::Auto),
            other => Err(StickyError::Validation(format!("unknown theme '{}'", other))),
        }
    }
}

pub const DEFAULT_SAVE_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub theme: Theme,
    pub default_note_size: Size,
    pub default_note_position: Position,
    pub auto_save: bool,
    /// Debounce delay for auto-save, in milliseconds.
    pub save_interval: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: Theme::Auto,
            default_note_size: Size::new(300, 300),
            default_note_position: Position::new(100, 100),
            auto_save: true,
            save_interval: DEFAULT_SAVE_INTERVAL_MS,
        }
    }
}

impl AppSettings {
    pub fn save_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.save_interval)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub version: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub notes: Vec<Note>,
    pub settings: AppSettings,
}

impl Document {
    /// An empty document at the current schema version.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            version: CURRENT_VERSION,
            timestamp: now,
            notes: Vec::new(),
            settings: AppSettings::default(),
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| StickyError::Serialization(e.to_string()))
    }

    /// Decode a fully-shaped record. Either every field decodes or nothing does.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| StickyError::Deserialization(e.to_string()))
    }

    pub fn find(&self, id: &NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| &n.id == id)
    }

    pub fn find_mut(&mut self, id: &NoteId) -> Option<&mut Note> {
        self.notes.iter_mut().find(|n| &n.id == id)
    }

    pub fn contains(&self, id: &NoteId) -> bool {
        self.find(id).is_some()
    }
}

/// Partial note used by create and update. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub style: Option<NoteStyle>,
    pub is_pinned: Option<bool>,
}

impl NotePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    pub fn pinned(mut self, is_pinned: bool) -> Self {
        self.is_pinned = Some(is_pinned);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub theme: Option<Theme>,
    pub default_note_size: Option<Size>,
    pub default_note_position: Option<Position>,
    pub auto_save: Option<bool>,
    pub save_interval: Option<u64>,
}

impl SettingsPatch {
    pub fn apply_to(&self, settings: &mut AppSettings) {
        if let Some(theme) = self.theme {
            settings.theme = theme;
        }
        if let Some(size) = self.default_note_size {
            settings.default_note_size = size;
        }
        if let Some(position) = self.default_note_position {
            settings.default_note_position = position;
        }
        if let Some(auto_save) = self.auto_save {
            settings.auto_save = auto_save;
        }
        if let Some(interval) = self.save_interval {
            settings.save_interval = interval;
        }
    }
}
