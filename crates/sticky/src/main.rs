//! # Sticky CLI
//!
//! A terminal client for the sticky-notes document store. The binary is thin:
//! everything lives in `src/cli/`, and this file only calls `cli::run()` and
//! turns an error into an exit code.
//!
//! ## Workspace Structure
//!
//! - `crates/stickyapp/`: the persistence core (document store, codec,
//!   migrations, backups, auto-save). UI agnostic.
//! - `crates/sticky/`: this CLI, one possible client of that core.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI Layer (crates/sticky/src/cli/)                         │
//! │  - clap argument parsing (setup.rs)                         │
//! │  - Context wiring + dispatch (handlers.rs)                  │
//! │  - Terminal and JSON output (render.rs)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Document Store (crates/stickyapp/src/store/)               │
//! │  - Live document, load with fallbacks, debounced saves      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each invocation loads the document, runs one command, and for mutating
//! commands shuts the auto-saver down so the change is flushed to disk before
//! the process exits.

mod cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
