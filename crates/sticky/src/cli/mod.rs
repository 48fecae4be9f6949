//! # CLI Behavior
//!
//! This is **one possible UI client** for stickyapp, not the application
//! itself. It is the only place that knows about terminal I/O, exit codes
//! and log output.
//!
//! ## Selecting Notes
//!
//! Commands that take a note accept either:
//! - a **list position** as printed by `sticky list` (`1`, `2`, ...), or
//! - a **note id** or any unique prefix of one.
//!
//! ## Persistence
//!
//! Every run loads the document first. Read-only commands never write.
//! Mutating commands start the auto-saver, apply the change, then shut the
//! saver down, which flushes the pending save. If that save fails the command
//! fails and the error from the store is reported.
//!
//! ## Logging
//!
//! Library diagnostics go to stderr through `tracing-subscriber`. The filter
//! comes from `RUST_LOG` (default `warn`); `--verbose` forces `debug`.
//!
//! ## Module Structure
//!
//! - `setup`: argument parsing via clap
//! - `handlers`: context construction and per-command handlers
//! - `render`: terminal formatting (colors, relative times, column layout)

mod handlers;
mod render;
pub mod setup;

use clap::Parser;
use setup::Cli;
use tracing_subscriber::EnvFilter;

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(handlers::dispatch(cli))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
