use crate::error::Result;

/// The storage gateway: the only component that touches the durable medium.
///
/// Keys are logical names; how they map onto the medium is up to the
/// implementation. Backends never interpret the bytes they hold.
///
/// Failure classes:
/// - `Ok(None)` from [`read`](StorageBackend::read): the key was never
///   written. Not an error, just "no data yet".
/// - [`StickyError::Read`](crate::error::StickyError::Read): the medium is
///   there but the value cannot be read.
/// - [`StickyError::Write`](crate::error::StickyError::Write): the medium
///   rejected a write, classified by
///   [`WriteFailure`](crate::error::WriteFailure).
pub trait StorageBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the value under `key`.
    /// MUST be atomic: a reader sees either the old bytes or the new bytes.
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Remove `key`. Removing an absent key succeeds.
    fn remove(&self, key: &str) -> Result<()>;
}

impl<B: StorageBackend + ?Sized> StorageBackend for std::sync::Arc<B> {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).read(key)
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        (**self).write(key, bytes)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}
