//! # Storage Layer
//!
//! Everything between the in-memory document and the durable medium.
//!
//! ## Components
//!
//! - [`backend::StorageBackend`]: the storage gateway. Narrow key/value I/O
//!   (`read`/`write`/`remove`) with classified failures. It never looks inside
//!   the bytes.
//! - [`backup::BackupManager`]: one last-known-good generation under a key
//!   derived from the primary key, refreshed after every successful write and
//!   consulted when the primary cannot be read.
//! - [`document_store::DocumentStore`]: the coordinator. Owns the live
//!   document, applies commands, and bridges to the gateway through the codec,
//!   the migration engine and the backup manager.
//!
//! ## Key Layout
//!
//! Keys are derived from one primary name (default `sticky-notes-data`):
//!
//! ```text
//! sticky-notes-data                 # primary document
//! sticky-notes-data-backup          # last good generation (overwritten per save)
//! sticky-notes-data-pre-migration   # exact bytes of the last document that needed migrating
//! ```
//!
//! ## Implementations
//!
//! - [`fs_backend::FsBackend`]: one file per key, atomic temp-file + rename writes.
//! - [`mem_backend::MemBackend`]: in-memory, with failure injection for tests.

pub mod backend;
pub mod backup;
pub mod document_store;
pub mod fs_backend;
pub mod mem_backend;

pub const DEFAULT_DOCUMENT_KEY: &str = "sticky-notes-data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub primary: String,
    pub backup: String,
    pub recovery: String,
}

impl StorageKeys {
    pub fn derive(primary: &str) -> Self {
        Self {
            primary: primary.to_string(),
            backup: format!("{}-backup", primary),
            recovery: format!("{}-pre-migration", primary),
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::derive(DEFAULT_DOCUMENT_KEY)
    }
}
