use super::backend::StorageBackend;
use super::StorageKeys;
use crate::codec::Codec;
use crate::error::Result;
use crate::model::Document;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Stored bytes together with the record they decode to.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSnapshot {
    pub bytes: Vec<u8>,
    pub record: Value,
}

/// Keeps one last-known-good generation of the document under the backup key.
///
/// Snapshots are best effort: a failed snapshot is logged and reported as
/// `false`, never as an error, because the primary write already succeeded.
/// The manager never fabricates data; an absent or undecodable backup is
/// reported as such and the caller falls back further.
pub struct BackupManager<B: StorageBackend> {
    backend: Arc<B>,
    codec: Arc<dyn Codec>,
    keys: StorageKeys,
}

impl<B: StorageBackend> BackupManager<B> {
    pub fn new(backend: Arc<B>, codec: Arc<dyn Codec>, keys: StorageKeys) -> Self {
        Self {
            backend,
            codec,
            keys,
        }
    }

    pub fn key(&self) -> &str {
        &self.keys.backup
    }

    /// Overwrite the backup generation with already-encoded document bytes.
    pub fn snapshot(&self, encoded: &[u8]) -> bool {
        match self.backend.write(&self.keys.backup, encoded) {
            Ok(()) => {
                debug!(key = %self.keys.backup, bytes = encoded.len(), "backup refreshed");
                true
            }
            Err(e) => {
                warn!(key = %self.keys.backup, error = %e, "backup snapshot failed");
                false
            }
        }
    }

    pub fn snapshot_document(&self, document: &Document) -> bool {
        match self.codec.encode(document) {
            Ok(bytes) => self.snapshot(&bytes),
            Err(e) => {
                warn!(error = %e, "backup snapshot could not be encoded");
                false
            }
        }
    }

    /// The backup as an untyped record, ready for the migration engine.
    ///
    /// `Ok(None)` means no backup was ever written.
    pub fn restore_record(&self) -> Result<Option<RawSnapshot>> {
        match self.backend.read(&self.keys.backup)? {
            Some(bytes) => {
                let record = self.codec.decode_value(&bytes)?;
                Ok(Some(RawSnapshot { bytes, record }))
            }
            None => Ok(None),
        }
    }

    /// The backup as a typed document at whatever version it was written.
    pub fn restore(&self) -> Result<Option<Document>> {
        match self.backend.read(&self.keys.backup)? {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Keep the exact bytes of a document that is about to be migrated.
    pub fn stash_pre_migration(&self, original: &[u8]) -> Result<()> {
        self.backend
            .write(&self.keys.recovery, original)
            .inspect_err(|e| {
                warn!(key = %self.keys.recovery, error = %e, "could not stash pre-migration document");
            })
    }

    pub fn pre_migration_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.backend.read(&self.keys.recovery)
    }
}
