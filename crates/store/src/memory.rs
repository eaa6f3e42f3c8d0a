//! In-memory object store.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::traits::{ObjectStore, WriteMode};

/// Object store backed by a process-local map.
///
/// Used by tests across the workspace and as the smallest possible reference
/// implementation of the trait contract. Does not advertise CRC support, so
/// it also exercises callers' plain-put fallback path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().unwrap().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.read().unwrap().contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn read_at(&self, key: &str, offset: u64, len: usize) -> Result<Vec<u8>, StoreError> {
        let data: Vec<u8> = self.get(key).await?;
        let start: usize = (offset as usize).min(data.len());
        let end: usize = start.saturating_add(len).min(data.len());
        Ok(data[start..end].to_vec())
    }

    async fn put(&self, key: &str, data: &[u8], mode: WriteMode) -> Result<(), StoreError> {
        let mut objects = self.objects.write().unwrap();
        if mode == WriteMode::NoOverwrite && objects.contains_key(key) {
            return Err(StoreError::AlreadyExists {
                key: key.to_string(),
            });
        }
        objects.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.objects
            .write()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.objects.write().unwrap().clear();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.objects.read().unwrap().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip() {
        let store = MemoryStore::new();
        store.put("k", b"v", WriteMode::Overwrite).await.unwrap();
        assert!(store.has("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), b"v");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let store = MemoryStore::new();
        assert!(store.delete("nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_read_at_clamps_to_object_end() {
        let store = MemoryStore::new();
        store.put("k", b"abcdef", WriteMode::Overwrite).await.unwrap();
        assert_eq!(store.read_at("k", 4, 100).await.unwrap(), b"ef");
        assert!(store.read_at("k", 6, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_crc_support_falls_back_to_put() {
        let store = MemoryStore::new();
        assert!(!store.supports_crc());
        // Checksum is ignored by the default implementation.
        store
            .put_with_crc("k", b"v", WriteMode::Overwrite, 0xdead_beef)
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), b"v");
    }
}
