//! # Command Layer
//!
//! The business logic behind every document mutation and query. Each command
//! is a plain function over a [`Document`](crate::model::Document); none of
//! them touch storage, schedule saves or read the clock on their own. The
//! [`DocumentStore`](crate::store::document_store::DocumentStore) supplies
//! `now`, the id generator and the size policy, then decides what to persist.
//!
//! ## Guarantees
//!
//! - A command that returns `Err` has not modified the document.
//! - `id` and `created_at` of an existing note are never written.
//! - Every note mutation refreshes `updated_at` (never backwards).
//!
//! ## Command Modules
//!
//! - [`create`]: Create a note from a partial record plus settings defaults
//! - [`update`]: Merge a partial record into an existing note
//! - [`delete`]: Permanently remove a note
//! - [`pinning`]: Toggle the pin flag
//! - [`settings`]: Merge or replace application settings
//! - [`query`]: Read-only views (lookup, pinned-first ordering, counts)

pub mod create;
pub mod delete;
pub mod pinning;
pub mod query;
pub mod settings;
pub mod update;
