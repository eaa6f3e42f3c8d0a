//! Local filesystem object store.
//!
//! Objects live as files under a root directory. Keys may contain `/`
//! separators, which map to subdirectories, the same shape vendor object
//! stores give to prefixed keys. Writes go through a temp file followed by
//! a rename so a crashed process never leaves a half-written object
//! visible under its key.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::StoreError;
use crate::traits::{ObjectStore, WriteMode};

/// Object store backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`. The directory is created on first
    /// write; reads against a missing root report NotFound.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        let mut path: PathBuf = self.root.clone();
        for segment in key.split('/') {
            path.push(segment);
        }
        Ok(path)
    }
}

/// Key segments map to file and directory names, so anything that could
/// escape the root directory is rejected outright.
fn validate_key(key: &str) -> Result<(), StoreError> {
    let invalid = |message: &str| StoreError::InvalidKey {
        key: key.to_string(),
        message: message.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("empty key"));
    }
    if key.contains('\\') {
        return Err(invalid("backslash in key"));
    }
    for segment in key.split('/') {
        if segment.is_empty() {
            return Err(invalid("empty key segment"));
        }
        if segment == "." || segment == ".." {
            return Err(invalid("relative key segment"));
        }
    }
    Ok(())
}

fn map_io(key: &str, err: std::io::Error) -> StoreError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound {
            key: key.to_string(),
        }
    } else {
        StoreError::from_io(key, err)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn has(&self, key: &str) -> Result<bool, StoreError> {
        let path: PathBuf = self.object_path(key)?;
        Ok(tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::from_io(key, e))?)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path: PathBuf = self.object_path(key)?;
        tokio::fs::read(&path).await.map_err(|e| map_io(key, e))
    }

    async fn read_at(&self, key: &str, offset: u64, len: usize) -> Result<Vec<u8>, StoreError> {
        let path: PathBuf = self.object_path(key)?;
        let mut file: tokio::fs::File = tokio::fs::File::open(&path)
            .await
            .map_err(|e| map_io(key, e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| StoreError::from_io(key, e))?;

        let mut buf: Vec<u8> = vec![0u8; len];
        let mut filled: usize = 0;
        while filled < len {
            let n: usize = file
                .read(&mut buf[filled..])
                .await
                .map_err(|e| StoreError::from_io(key, e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    async fn put(&self, key: &str, data: &[u8], mode: WriteMode) -> Result<(), StoreError> {
        let path: PathBuf = self.object_path(key)?;

        if mode == WriteMode::NoOverwrite
            && tokio::fs::try_exists(&path)
                .await
                .map_err(|e| StoreError::from_io(key, e))?
        {
            return Err(StoreError::AlreadyExists {
                key: key.to_string(),
            });
        }

        let parent: &Path = path.parent().unwrap_or(&self.root);
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::from_io(key, e))?;

        // Temp file next to the target so the rename stays on one device.
        let file_name: String = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp: PathBuf = parent.join(format!(".{}.tmp", file_name));
        let mut file: tokio::fs::File = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| StoreError::from_io(key, e))?;
        file.write_all(data)
            .await
            .map_err(|e| StoreError::from_io(key, e))?;
        file.sync_all()
            .await
            .map_err(|e| StoreError::from_io(key, e))?;
        drop(file);

        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::from_io(key, e))
    }

    fn supports_crc(&self) -> bool {
        true
    }

    async fn put_with_crc(
        &self,
        key: &str,
        data: &[u8],
        mode: WriteMode,
        crc: u32,
    ) -> Result<(), StoreError> {
        let actual: u32 = crc32c::crc32c(data);
        if actual != crc {
            return Err(StoreError::ChecksumMismatch {
                key: key.to_string(),
                expected: crc,
                actual,
            });
        }
        self.put(key, data, mode).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path: PathBuf = self.object_path(key)?;
        tokio::fs::remove_file(&path).await.map_err(|e| map_io(key, e))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::from_io("<root>", e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut out: Vec<String> = Vec::new();
        let mut pending: Vec<(PathBuf, String)> = vec![(self.root.clone(), String::new())];

        while let Some((dir, rel)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::from_io("<root>", e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StoreError::from_io("<root>", e))?
            {
                let name: String = entry.file_name().to_string_lossy().to_string();
                // Skip in-flight temp files.
                if name.starts_with('.') {
                    continue;
                }
                let child_rel: String = if rel.is_empty() {
                    name
                } else {
                    format!("{}/{}", rel, name)
                };
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StoreError::from_io("<root>", e))?;
                if file_type.is_dir() {
                    pending.push((entry.path(), child_rel));
                } else if file_type.is_file() {
                    out.push(child_rel);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalStore) {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("objects"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (_dir, store) = store();
        store.put("k1", b"payload", WriteMode::Overwrite).await.unwrap();
        assert!(store.has("k1").await.unwrap());
        assert_eq!(store.get("k1").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_nested_keys() {
        let (_dir, store) = store();
        store
            .put("repos/demo/latest", b"bundle-1", WriteMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(store.get("repos/demo/latest").await.unwrap(), b"bundle-1");

        let keys: Vec<String> = store.keys().await.unwrap();
        assert_eq!(keys, vec!["repos/demo/latest".to_string()]);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, store) = store();
        let err: StoreError = store.get("absent").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_no_overwrite_rejects_existing() {
        let (_dir, store) = store();
        store.put("k", b"a", WriteMode::Overwrite).await.unwrap();
        let err: StoreError = store.put("k", b"b", WriteMode::NoOverwrite).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(store.get("k").await.unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_read_at_ranges() {
        let (_dir, store) = store();
        store
            .put("k", b"0123456789", WriteMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(store.read_at("k", 2, 4).await.unwrap(), b"2345");
        assert_eq!(store.read_at("k", 8, 10).await.unwrap(), b"89");
        assert!(store.read_at("k", 20, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_with_crc_verifies() {
        let (_dir, store) = store();
        assert!(store.supports_crc());

        let crc: u32 = crc32c::crc32c(b"data");
        store
            .put_with_crc("k", b"data", WriteMode::Overwrite, crc)
            .await
            .unwrap();

        let err: StoreError = store
            .put_with_crc("bad", b"data", WriteMode::Overwrite, crc ^ 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ChecksumMismatch { .. }));
        assert!(!store.has("bad").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_and_clear() {
        let (_dir, store) = store();
        store.put("a", b"1", WriteMode::Overwrite).await.unwrap();
        store.put("b", b"2", WriteMode::Overwrite).await.unwrap();

        let mut keys: Vec<String> = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

        store.clear().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let (_dir, store) = store();
        assert!(matches!(
            store.get("../escape").await.unwrap_err(),
            StoreError::InvalidKey { .. }
        ));
        assert!(matches!(
            store.get("a//b").await.unwrap_err(),
            StoreError::InvalidKey { .. }
        ));
        assert!(matches!(
            store.get("/rooted").await.unwrap_err(),
            StoreError::InvalidKey { .. }
        ));
    }
}
