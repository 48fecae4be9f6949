//! # Context Construction
//!
//! One [`StickyContext`] is built at process start and handed to whatever
//! drives the store. There is no global instance.
//!
//! ## Data Directory Resolution
//!
//! 1. An explicit override (the CLI's `--data-dir`).
//! 2. `STICKY_DATA_DIR`.
//! 3. The OS data directory for the app (via the `directories` crate), e.g.
//!    `~/.local/share/sticky` on Linux.
//!
//! The config file is then read from that directory. Building a context does
//! not touch the document; call `load_from_storage()` on the store next.

use directories::ProjectDirs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::clock::{SystemClock, UuidGenerator};
use crate::config::StoreConfig;
use crate::error::{Result, StickyError};
use crate::migrations::Migrator;
use crate::model::CURRENT_VERSION;
use crate::store::document_store::{DocumentStore, StoreOptions};
use crate::store::fs_backend::FsBackend;

pub struct StickyContext {
    pub store: DocumentStore<FsBackend>,
    pub config: StoreConfig,
    pub data_dir: PathBuf,
}

pub fn resolve_data_dir(data_override: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = data_override {
        return Ok(path);
    }
    if let Some(path) = StoreConfig::from_env()?.data_dir {
        return Ok(path);
    }
    ProjectDirs::from("com", "sticky", "sticky")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| StickyError::Config("could not determine a data directory".into()))
}

pub fn initialize(data_override: Option<PathBuf>) -> Result<StickyContext> {
    let data_dir = resolve_data_dir(data_override)?;
    let config = StoreConfig::load_from(&data_dir)?;
    open(data_dir, config)
}

/// Build a filesystem-backed store in `data_dir` with an already loaded config.
pub fn open(data_dir: PathBuf, config: StoreConfig) -> Result<StickyContext> {
    config.validate()?;
    let codec_kind = config.codec_kind()?;
    let backend = FsBackend::new(&data_dir).with_file_ext(codec_kind.file_ext());
    let options = StoreOptions {
        keys: config.storage_keys(),
        codec: config.build_codec()?,
        migrator: Arc::new(Migrator::builtin()),
        target_version: CURRENT_VERSION,
        clock: Arc::new(SystemClock),
        ids: Arc::new(UuidGenerator),
        size_policy: config.size_policy()?,
    };
    debug!(
        data_dir = %data_dir.display(),
        key = %config.document_key,
        codec = ?codec_kind,
        "store context ready"
    );
    let store = DocumentStore::with_options(Arc::new(backend), options);
    Ok(StickyContext {
        store,
        config,
        data_dir,
    })
}
