//! # Sticky Architecture
//!
//! Stickyapp is the **persistence core of a sticky-notes desktop app**: the
//! live document of notes and settings, and everything that keeps it safe on
//! disk across crashes, corrupt files and schema upgrades. Windows, IPC and
//! rendering live elsewhere; this crate never writes to stdout/stderr and
//! never assumes a terminal.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Clients (the `sticky` CLI, a desktop shell, tests)         │
//! │  - Build a store through init.rs, call its operations       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Document Store (store/document_store.rs) + autosave.rs     │
//! │  - Owns the live Document, lifecycle state, last error      │
//! │  - Debounced, serialized saves; load with fallbacks         │
//! └─────────────────────────────────────────────────────────────┘
//!              │                                  │
//!              ▼                                  ▼
//! ┌──────────────────────────────┐  ┌──────────────────────────────┐
//! │  Commands (commands/*.rs)    │  │  Codec, Migrations, Backups  │
//! │  - Pure logic on a Document  │  │  - bytes <-> records         │
//! │  - No I/O whatsoever         │  │  - schema upgrades           │
//! └──────────────────────────────┘  └──────────────────────────────┘
//!                                                 │
//!                                                 ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage Gateway (store/backend.rs)                         │
//! │  - Key/value read/write/remove, classified failures         │
//! │  - FsBackend (production), MemBackend (testing)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Durability Rules
//!
//! - A failed save never drops data; the notes stay in memory and the next
//!   mutation schedules another attempt.
//! - Every successful primary write refreshes a single backup generation.
//! - Loading never fails. An absent document starts fresh; an unreadable one
//!   falls back to the backup, then to an empty document with a visible error.
//! - A document that needs migrating has its original bytes stashed before
//!   anything is written back, and a failed migration never writes a
//!   half-migrated document.
//!
//! ## Testing Strategy
//!
//! 1. **Commands**: unit tests on plain `Document`s, where most logic lives.
//! 2. **Store**: load/save/recovery paths against `MemBackend` with failure
//!    injection.
//! 3. **Auto-save**: debounce timing on tokio's paused clock.
//! 4. **Filesystem**: integration tests in `tests/` against a temp directory.

pub mod autosave;
pub mod clock;
pub mod codec;
pub mod commands;
pub mod config;
pub mod error;
pub mod init;
pub mod migrations;
pub mod model;
pub mod store;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

pub use autosave::AutoSaveHandle;
pub use error::{Result, StickyError};
pub use store::document_store::{DocumentStore, LoadReport, LoadSource, StoreOptions, StoreStatus};
