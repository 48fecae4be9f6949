use super::backend::StorageBackend;
use crate::error::{Result, StickyError, WriteFailure};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One file per key under a data directory.
///
/// ```text
/// <root>/
/// ├── sticky-notes-data.json                 # primary document
/// ├── sticky-notes-data-backup.json          # last good generation
/// └── sticky-notes-data-pre-migration.json   # stash taken before a migration
/// ```
pub struct FsBackend {
    root: PathBuf,
    file_ext: String,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            file_ext: ".json".to_string(),
        }
    }

    pub fn with_file_ext(mut self, ext: &str) -> Self {
        if ext.starts_with('.') || ext.is_empty() {
            self.file_ext = ext.to_string();
        } else {
            self.file_ext = format!(".{}", ext);
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path backing `key`. Path separators in keys are flattened so a key can
    /// never escape the data directory.
    pub fn key_path(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '_',
                c => c,
            })
            .collect();
        let safe = safe.trim_start_matches('.');
        self.root.join(format!("{}{}", safe, self.file_ext))
    }

    fn ensure_dir(&self, key: &str) -> Result<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).map_err(|e| write_error(key, e))?;
        }
        Ok(())
    }
}

fn write_error(key: &str, err: io::Error) -> StickyError {
    StickyError::Write {
        key: key.to_string(),
        failure: classify_write_failure(&err),
        message: err.to_string(),
    }
}

// ENOSPC / EDQUOT
#[cfg(unix)]
fn is_quota_error(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(28) | Some(122))
}

#[cfg(not(unix))]
fn is_quota_error(_err: &io::Error) -> bool {
    false
}

fn classify_write_failure(err: &io::Error) -> WriteFailure {
    if is_quota_error(err) {
        return WriteFailure::QuotaExceeded;
    }
    match err.kind() {
        ErrorKind::PermissionDenied | ErrorKind::NotFound => WriteFailure::Unavailable,
        _ => WriteFailure::Other,
    }
}

impl StorageBackend for FsBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.key_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StickyError::Read {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.ensure_dir(key)?;
        let target = self.key_path(key);

        // Atomic write: temp file in the same directory, then rename over.
        let tmp = self.root.join(format!(".{}.tmp", Uuid::new_v4()));
        if let Err(e) = fs::write(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(write_error(key, e));
        }
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            return Err(write_error(key, e));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(write_error(key, e)),
        }
    }
}
