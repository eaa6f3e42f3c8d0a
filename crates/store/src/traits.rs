//! Object store trait consumed by the CAS and metadata layers.

use async_trait::async_trait;

use crate::error::StoreError;

/// Overwrite behavior for put operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace an existing object silently.
    Overwrite,
    /// Fail with [`StoreError::AlreadyExists`] if the key is present.
    NoOverwrite,
}

/// Low-level object operations keyed by opaque strings.
///
/// Implementations must be safe for concurrent use. Objects are immutable
/// once written; the content-addressed layers above never mutate in place.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Check whether an object exists.
    async fn has(&self, key: &str) -> Result<bool, StoreError>;

    /// Fetch an entire object.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Fetch up to `len` bytes of an object starting at `offset`.
    ///
    /// Returns fewer than `len` bytes only when the object ends before
    /// `offset + len`. An offset at or past the end returns an empty vector.
    async fn read_at(&self, key: &str, offset: u64, len: usize) -> Result<Vec<u8>, StoreError>;

    /// Store an object.
    async fn put(&self, key: &str, data: &[u8], mode: WriteMode) -> Result<(), StoreError>;

    /// Whether [`put_with_crc`](Self::put_with_crc) actually verifies the
    /// checksum. Callers probe this before computing a CRC.
    fn supports_crc(&self) -> bool {
        false
    }

    /// Store an object, verifying the payload against a CRC32C (Castagnoli)
    /// checksum when the backend supports it. The default implementation
    /// ignores the checksum and delegates to [`put`](Self::put).
    async fn put_with_crc(
        &self,
        key: &str,
        data: &[u8],
        mode: WriteMode,
        crc: u32,
    ) -> Result<(), StoreError> {
        let _ = crc;
        self.put(key, data, mode).await
    }

    /// Delete an object. Deleting a missing key is an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Remove every object in the store.
    async fn clear(&self) -> Result<(), StoreError>;

    /// List every key in the store, in unspecified order.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}
