use std::fmt;
use thiserror::Error;

use crate::model::NoteId;

/// How the storage medium rejected a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailure {
    /// The medium is full (disk full, quota exhausted).
    QuotaExceeded,
    /// The medium is not there or refuses access.
    Unavailable,
    Other,
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WriteFailure::QuotaExceeded => "quota exceeded",
            WriteFailure::Unavailable => "medium unavailable",
            WriteFailure::Other => "write rejected",
        };
        f.write_str(label)
    }
}

/// A migration transform failed, or the input could not be migrated at all.
///
/// `version` is the migration that failed; it is `None` when the input was
/// rejected before any migration was attempted (e.g. it is not a record).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", describe_migration(.version, .message))]
pub struct MigrationError {
    pub version: Option<u32>,
    pub message: String,
}

fn describe_migration(version: &Option<u32>, message: &str) -> String {
    match version {
        Some(v) => format!("migration to v{} failed: {}", v, message),
        None => message.to_string(),
    }
}

impl MigrationError {
    pub fn at(version: u32, message: impl Into<String>) -> Self {
        Self {
            version: Some(version),
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            version: None,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StickyError {
    #[error("Note not found: {0}")]
    NoteNotFound(NoteId),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Storage read error for '{key}': {message}")]
    Read { key: String, message: String },

    #[error("Storage write error for '{key}' ({failure}): {message}")]
    Write {
        key: String,
        failure: WriteFailure,
        message: String,
    },

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Document has not been loaded yet")]
    NotLoaded,

    #[error("Config error: {0}")]
    Config(String),
}

impl StickyError {
    /// Errors produced by a save attempt; a later successful save clears them.
    pub fn is_save_error(&self) -> bool {
        matches!(
            self,
            StickyError::Serialization(_) | StickyError::Write { .. } | StickyError::NotLoaded
        )
    }
}

impl From<confique::Error> for StickyError {
    fn from(value: confique::Error) -> Self {
        Self::Config(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StickyError>;
