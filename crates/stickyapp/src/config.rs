//! # Configuration
//!
//! Store configuration is managed by [`confique`], layered in priority order:
//!
//! 1. **Environment variables**: `STICKY_DATA_DIR`, `STICKY_DOCUMENT_KEY`,
//!    `STICKY_CODEC`, `STICKY_PRETTY`.
//! 2. **Config file**: `sticky.toml` in the data directory.
//! 3. **Compiled defaults**: via `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `data_dir` | OS data dir | Where documents live (env only; it locates the file) |
//! | `document_key` | `sticky-notes-data` | Primary key; backup and stash keys derive from it |
//! | `codec` | `json` | `json` or `json-gzip` |
//! | `pretty` | `true` | Indent plain JSON documents |
//! | `min_note_size` | `200` | Smallest explicit note width/height |
//! | `max_note_size` | `800` | Largest explicit note width/height |
//!
//! These are deployment settings. User preferences (theme, auto-save,
//! save interval) live in the document itself.

use confique::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::codec::{Codec, GzipCodec, JsonCodec};
use crate::error::{Result, StickyError};
use crate::model::SizePolicy;
use crate::store::StorageKeys;

pub const CONFIG_FILE_NAME: &str = "sticky.toml";

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    #[config(env = "STICKY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[config(env = "STICKY_DOCUMENT_KEY", default = "sticky-notes-data")]
    pub document_key: String,

    /// `json` or `json-gzip`.
    #[config(env = "STICKY_CODEC", default = "json")]
    pub codec: String,

    #[config(env = "STICKY_PRETTY", default = true)]
    pub pretty: bool,

    #[config(default = 200)]
    pub min_note_size: i32,

    #[config(default = 800)]
    pub max_note_size: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            document_key: crate::store::DEFAULT_DOCUMENT_KEY.to_string(),
            codec: "json".to_string(),
            pretty: true,
            min_note_size: 200,
            max_note_size: 800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Json,
    JsonGzip,
}

impl FromStr for CodecKind {
    type Err = StickyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(CodecKind::Json),
            "json-gzip" | "gzip" => Ok(CodecKind::JsonGzip),
            other => Err(StickyError::Config(format!(
                "unknown codec '{}' (expected json or json-gzip)",
                other
            ))),
        }
    }
}

impl CodecKind {
    /// File extension used by the filesystem backend for this encoding.
    pub fn file_ext(self) -> &'static str {
        match self {
            CodecKind::Json => ".json",
            CodecKind::JsonGzip => ".json.gz",
        }
    }
}

impl StoreConfig {
    /// Environment variables only. Used to locate the data directory before
    /// the config file inside it can be read.
    pub fn from_env() -> Result<Self> {
        let config = Self::builder().env().load()?;
        Ok(config)
    }

    /// Environment > `<dir>/sticky.toml` > defaults. A missing file is fine.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let config = Self::builder()
            .env()
            .file(dir.join(CONFIG_FILE_NAME))
            .load()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.document_key.trim().is_empty() {
            return Err(StickyError::Config("document_key must not be empty".into()));
        }
        self.codec_kind()?;
        self.size_policy()?;
        Ok(())
    }

    pub fn codec_kind(&self) -> Result<CodecKind> {
        self.codec.parse()
    }

    pub fn size_policy(&self) -> Result<SizePolicy> {
        SizePolicy::new(self.min_note_size, self.max_note_size)
            .map_err(|e| StickyError::Config(e.to_string()))
    }

    pub fn storage_keys(&self) -> StorageKeys {
        StorageKeys::derive(&self.document_key)
    }

    pub fn build_codec(&self) -> Result<Arc<dyn Codec>> {
        let codec: Arc<dyn Codec> = match self.codec_kind()? {
            CodecKind::Json if self.pretty => Arc::new(JsonCodec::pretty()),
            CodecKind::Json => Arc::new(JsonCodec::new()),
            CodecKind::JsonGzip => Arc::new(GzipCodec::new(JsonCodec::new())),
        };
        Ok(codec)
    }
}
