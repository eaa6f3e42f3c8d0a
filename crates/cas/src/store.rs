//! CAS facade: put/get plus key-space operations over an object store.

use std::sync::Arc;

use tokio::io::AsyncRead;

use datashed_common::{DEFAULT_DOWNLOAD_CONCURRENCY, DEFAULT_LEAF_SIZE, DEFAULT_UPLOAD_CONCURRENCY};
use datashed_store::ObjectStore;

use crate::cancel::CancelToken;
use crate::error::CasError;
use crate::key::{Key, KEY_SIZE};
use crate::reader::ChunkReader;
use crate::writer::{put_stream, PutResult, WriterConfig};

/// Options for [`ChunkStore::has`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HasOptions {
    only_roots: bool,
    gather_incomplete: bool,
}

impl HasOptions {
    /// Plain existence check on the key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Additionally require that the object parses as a root object.
    pub fn only_roots(mut self) -> Self {
        self.only_roots = true;
        self
    }

    /// Require a root object and collect the keys of any missing leaves.
    /// Implies [`only_roots`](Self::only_roots).
    pub fn gather_incomplete(mut self) -> Self {
        self.only_roots = true;
        self.gather_incomplete = true;
        self
    }
}

/// Parse and validate a root object payload.
///
/// The payload is the concatenation of the leaf keys in content order,
/// followed by the root key itself, all [`KEY_SIZE`]-byte records with no
/// framing. Returns the leaf keys.
pub fn parse_root_object(payload: &[u8], root: Key) -> Result<Vec<Key>, CasError> {
    if payload.is_empty() || payload.len() % KEY_SIZE != 0 {
        return Err(CasError::CorruptRoot {
            root: root.to_string(),
            message: format!(
                "payload length {} is not a positive multiple of {}",
                payload.len(),
                KEY_SIZE
            ),
        });
    }

    let mut keys: Vec<Key> = payload
        .chunks_exact(KEY_SIZE)
        .map(Key::from_bytes)
        .collect::<Result<Vec<Key>, CasError>>()?;

    // The trailing record is the root's self-reference.
    let trailing: Key = keys.pop().ok_or_else(|| CasError::CorruptRoot {
        root: root.to_string(),
        message: "empty root object".to_string(),
    })?;
    if trailing != root {
        return Err(CasError::CorruptRoot {
            root: root.to_string(),
            message: format!("trailing digest {} does not match root key", trailing),
        });
    }

    Ok(keys)
}

/// Content-addressable chunked store over an [`ObjectStore`].
///
/// The leaf size is fixed at construction and must match the one used to
/// write any content read back through this instance.
#[derive(Clone)]
pub struct ChunkStore {
    store: Arc<dyn ObjectStore>,
    leaf_size: u32,
    prefix: String,
    upload_concurrency: usize,
    download_concurrency: usize,
    leaf_truncation: bool,
}

impl ChunkStore {
    /// Create a store with default settings (2MB leaves, no prefix).
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            leaf_size: DEFAULT_LEAF_SIZE,
            prefix: String::new(),
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            leaf_truncation: false,
        }
    }

    /// Set the leaf size in bytes. Must be at least 1.
    pub fn with_leaf_size(mut self, leaf_size: u32) -> Self {
        self.leaf_size = leaf_size.max(1);
        self
    }

    /// Set the key prefix used verbatim on the backing store.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Bound concurrent leaf uploads per put.
    pub fn with_upload_concurrency(mut self, concurrency: usize) -> Self {
        self.upload_concurrency = concurrency.max(1);
        self
    }

    /// Bound concurrent leaf downloads per parallel read.
    pub fn with_download_concurrency(mut self, concurrency: usize) -> Self {
        self.download_concurrency = concurrency.max(1);
        self
    }

    /// Enable the experimental leaf-truncation offset mode. Parallel reads
    /// refuse to run while this is set.
    pub fn with_leaf_truncation(mut self, enabled: bool) -> Self {
        self.leaf_truncation = enabled;
        self
    }

    /// Leaf size of this instance.
    pub fn leaf_size(&self) -> u32 {
        self.leaf_size
    }

    /// Key prefix of this instance.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Chunk, hash, and store the content of `reader`.
    ///
    /// See the writer contract: bounded-concurrency leaf uploads, root
    /// written only after all leaves are durable, `already_existed` set
    /// when the root was present before this call.
    pub async fn put<R>(
        &self,
        reader: &mut R,
        cancel: Option<&CancelToken>,
    ) -> Result<PutResult, CasError>
    where
        R: AsyncRead + Unpin + Send + ?Sized,
    {
        let config = WriterConfig {
            leaf_size: self.leaf_size,
            prefix: self.prefix.clone(),
            upload_concurrency: self.upload_concurrency,
        };
        put_stream(&self.store, &config, reader, cancel).await
    }

    /// Open a verified reader over the content stored under `root`.
    pub async fn get(&self, root: Key) -> Result<ChunkReader, CasError> {
        let keys: Vec<Key> = self.leaves_for_root(root).await?;
        Ok(ChunkReader::new(
            Arc::clone(&self.store),
            root,
            keys,
            self.prefix.clone(),
            self.leaf_size,
            self.download_concurrency,
            self.leaf_truncation,
        ))
    }

    /// Fetch the root object stored under `root` and return its leaf keys.
    pub async fn leaves_for_root(&self, root: Key) -> Result<Vec<Key>, CasError> {
        let payload: Vec<u8> = self.store.get(&root.string_with_prefix(&self.prefix)).await?;
        parse_root_object(&payload, root)
    }

    /// Existence check with optional completeness probing.
    ///
    /// Returns `(present, missing_leaves)`. With
    /// [`HasOptions::gather_incomplete`], `present` refers to the root
    /// object and `missing_leaves` lists every referenced leaf absent from
    /// the store; content is complete iff `present` and the list is empty.
    pub async fn has(&self, key: Key, options: HasOptions) -> Result<(bool, Vec<Key>), CasError> {
        let present: bool = self.store.has(&key.string_with_prefix(&self.prefix)).await?;
        if !present {
            return Ok((false, Vec::new()));
        }
        if !options.only_roots {
            return Ok((true, Vec::new()));
        }

        let leaves: Vec<Key> = match self.leaves_for_root(key).await {
            Ok(l) => l,
            // Present but not a root object.
            Err(CasError::CorruptRoot { .. }) => return Ok((false, Vec::new())),
            Err(e) => return Err(e),
        };

        let mut missing: Vec<Key> = Vec::new();
        if options.gather_incomplete {
            for leaf in &leaves {
                if !self
                    .store
                    .has(&leaf.string_with_prefix(&self.prefix))
                    .await?
                {
                    missing.push(*leaf);
                }
            }
        }
        Ok((true, missing))
    }

    /// Delete the content under `root`: every listed leaf, then the root
    /// object itself.
    pub async fn delete(&self, root: Key) -> Result<(), CasError> {
        let leaves: Vec<Key> = self.leaves_for_root(root).await?;
        for leaf in leaves {
            self.store
                .delete(&leaf.string_with_prefix(&self.prefix))
                .await?;
        }
        self.store
            .delete(&root.string_with_prefix(&self.prefix))
            .await?;
        Ok(())
    }

    /// Remove every object from the backing store.
    pub async fn clear(&self) -> Result<(), CasError> {
        Ok(self.store.clear().await?)
    }

    /// List every key in this instance's prefix namespace.
    ///
    /// Keys under a different prefix, or not parseable as digests, are
    /// skipped.
    pub async fn keys(&self) -> Result<Vec<Key>, CasError> {
        let raw: Vec<String> = self.store.keys().await?;
        let mut out: Vec<Key> = Vec::with_capacity(raw.len());
        for name in raw {
            let Some(stripped) = name.strip_prefix(&self.prefix) else {
                continue;
            };
            if let Ok(key) = Key::from_hex(stripped) {
                out.push(key);
            }
        }
        Ok(out)
    }

    /// List only the keys whose stored object parses as a root object.
    pub async fn root_keys(&self) -> Result<Vec<Key>, CasError> {
        let mut out: Vec<Key> = Vec::new();
        for key in self.keys().await? {
            if self.is_root_key(key).await? {
                out.push(key);
            }
        }
        Ok(out)
    }

    /// Whether the object stored under `key` is a root object.
    async fn is_root_key(&self, key: Key) -> Result<bool, CasError> {
        match self.leaves_for_root(key).await {
            Ok(_) => Ok(true),
            Err(CasError::CorruptRoot { .. }) => Ok(false),
            Err(CasError::Store(e)) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_of(data: &[u8]) -> Key {
        Key::hash(data)
    }

    #[test]
    fn test_parse_root_object_single_leaf() {
        let leaf: Key = key_of(b"leaf");
        let root: Key = key_of(b"root");

        let mut payload: Vec<u8> = Vec::new();
        payload.extend_from_slice(leaf.as_bytes());
        payload.extend_from_slice(root.as_bytes());

        let keys: Vec<Key> = parse_root_object(&payload, root).unwrap();
        assert_eq!(keys, vec![leaf]);
    }

    #[test]
    fn test_parse_root_object_no_leaves() {
        let root: Key = key_of(b"empty");
        let keys: Vec<Key> = parse_root_object(root.as_bytes(), root).unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn test_parse_root_object_rejects_bad_length() {
        let root: Key = key_of(b"root");
        assert!(matches!(
            parse_root_object(&[], root),
            Err(CasError::CorruptRoot { .. })
        ));
        assert!(matches!(
            parse_root_object(&[0u8; 65], root),
            Err(CasError::CorruptRoot { .. })
        ));
    }

    #[test]
    fn test_parse_root_object_rejects_trailing_mismatch() {
        let root: Key = key_of(b"root");
        let other: Key = key_of(b"other");
        assert!(matches!(
            parse_root_object(other.as_bytes(), root),
            Err(CasError::CorruptRoot { .. })
        ));
    }
}
