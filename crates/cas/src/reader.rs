//! Chunk reader: verified sequential, positioned, and parallel reads.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use datashed_store::ObjectStore;

use crate::cancel::CancelToken;
use crate::chunk::{leaf_for_offset, leaf_offset};
use crate::error::CasError;
use crate::key::Key;

/// A sink accepting positioned writes.
///
/// Implementations must be safe to call from concurrent leaf tasks;
/// offsets never overlap.
pub trait WriteAt: Send + Sync {
    /// Write all of `data` at byte `offset`.
    fn write_at(&self, data: &[u8], offset: u64) -> std::io::Result<()>;
}

#[cfg(unix)]
impl WriteAt for std::fs::File {
    fn write_at(&self, data: &[u8], offset: u64) -> std::io::Result<()> {
        std::os::unix::fs::FileExt::write_all_at(self, data, offset)
    }
}

/// Reader over one root key's content.
///
/// Created by [`ChunkStore::get`](crate::ChunkStore::get), which fetches and
/// validates the root object. Leaves are fetched lazily; every fetched leaf
/// is checked against the leaf geometry before any byte is returned.
pub struct ChunkReader {
    store: Arc<dyn ObjectStore>,
    root: Key,
    keys: Vec<Key>,
    prefix: String,
    leaf_size: u32,
    download_concurrency: usize,
    leaf_truncation: bool,

    // Sequential read state.
    index: usize,
    current: Option<Vec<u8>>,
    pos: usize,
}

impl std::fmt::Debug for ChunkReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkReader")
            .field("root", &self.root)
            .field("keys", &self.keys)
            .field("prefix", &self.prefix)
            .field("leaf_size", &self.leaf_size)
            .field("download_concurrency", &self.download_concurrency)
            .field("leaf_truncation", &self.leaf_truncation)
            .field("index", &self.index)
            .field("pos", &self.pos)
            .finish()
    }
}

impl ChunkReader {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        root: Key,
        keys: Vec<Key>,
        prefix: String,
        leaf_size: u32,
        download_concurrency: usize,
        leaf_truncation: bool,
    ) -> Self {
        Self {
            store,
            root,
            keys,
            prefix,
            leaf_size,
            download_concurrency,
            leaf_truncation,
            index: 0,
            current: None,
            pos: 0,
        }
    }

    /// Root key this reader serves.
    pub fn root_key(&self) -> Key {
        self.root
    }

    /// Leaf keys in content order.
    pub fn leaf_keys(&self) -> &[Key] {
        &self.keys
    }

    /// Sequential read into `buf`. Returns the number of bytes read;
    /// zero means end of content.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, CasError> {
        let mut copied: usize = 0;

        while copied < buf.len() {
            if self.current.is_none() {
                if self.index >= self.keys.len() {
                    break;
                }
                let fetched: Vec<u8> = self.fetch_leaf(self.index).await?;
                self.pos = 0;
                self.current = Some(fetched);
            }
            let Some(leaf) = self.current.as_ref() else {
                break;
            };
            let available: usize = leaf.len() - self.pos;
            let n: usize = available.min(buf.len() - copied);
            buf[copied..copied + n].copy_from_slice(&leaf[self.pos..self.pos + n]);
            self.pos += n;
            copied += n;

            if self.pos == leaf.len() {
                self.current = None;
                self.index += 1;
            }
        }

        Ok(copied)
    }

    /// Read the remaining content into a vector.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, CasError> {
        let mut out: Vec<u8> = Vec::new();
        let mut buf: Vec<u8> = vec![0u8; self.leaf_size as usize];
        loop {
            let n: usize = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    /// Positioned read: fill `buf` with content starting at byte `offset`.
    ///
    /// Fetches only the needed byte range of each overlapped leaf via the
    /// store's positioned reads, so short kernel-sized reads never pull a
    /// full leaf. Returns the number of bytes read; fewer than `buf.len()`
    /// only at end of content. Does not disturb sequential read state.
    pub async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, CasError> {
        let leaf_size: u64 = u64::from(self.leaf_size);
        let (mut index, mut skip) = leaf_for_offset(offset, self.leaf_size);
        let mut copied: usize = 0;

        while copied < buf.len() && index < self.keys.len() {
            let key: Key = self.keys[index];
            let object_key: String = key.string_with_prefix(&self.prefix);
            let requested: usize = (buf.len() - copied).min((leaf_size - skip) as usize);

            let chunk: Vec<u8> = match self.store.read_at(&object_key, skip, requested).await {
                Ok(c) => c,
                Err(e) if e.is_not_found() => {
                    return Err(CasError::LeafMissing {
                        root: self.root.to_string(),
                        leaf: key.to_string(),
                        index,
                    })
                }
                Err(e) => return Err(e.into()),
            };

            let is_final: bool = index + 1 == self.keys.len();
            if chunk.len() < requested && !is_final {
                // A non-final leaf must cover its full window.
                return Err(CasError::LeafTruncated {
                    leaf: key.to_string(),
                    index,
                    expected: leaf_size,
                    actual: skip + chunk.len() as u64,
                });
            }

            buf[copied..copied + chunk.len()].copy_from_slice(&chunk);
            copied += chunk.len();
            if chunk.len() < requested {
                // The final leaf ended before the requested range.
                break;
            }
            skip = 0;
            index += 1;
        }

        Ok(copied)
    }

    /// Fetch every leaf concurrently and write each at its content offset.
    ///
    /// At most the configured download concurrency is in flight. The call
    /// returns once every leaf task has settled; on failure the first
    /// error observed wins. Returns the total bytes written.
    pub async fn write_to(
        &self,
        sink: &(dyn WriteAt),
        cancel: Option<&CancelToken>,
    ) -> Result<u64, CasError> {
        if self.leaf_truncation {
            // Experimental offset mode from an earlier design; refuse
            // rather than guess at its semantics.
            return Err(CasError::TruncationUnsupported);
        }

        let results: Vec<Result<u64, CasError>> = stream::iter(0..self.keys.len())
            .map(|index: usize| async move {
                if cancel.is_some_and(CancelToken::is_cancelled) {
                    return Err(CasError::Cancelled);
                }
                let leaf: Vec<u8> = self.fetch_leaf(index).await?;
                let offset: u64 = leaf_offset(index, self.leaf_size);
                sink.write_at(&leaf, offset)
                    .map_err(|e| CasError::Input {
                        message: format!("writing leaf {} at {}: {}", index, offset, e),
                    })?;
                Ok(leaf.len() as u64)
            })
            .buffer_unordered(self.download_concurrency.max(1))
            .collect()
            .await;

        let mut written: u64 = 0;
        for result in results {
            written += result?;
        }
        Ok(written)
    }

    /// Fetch and validate a single leaf body.
    async fn fetch_leaf(&self, index: usize) -> Result<Vec<u8>, CasError> {
        let key: Key = self.keys[index];
        let object_key: String = key.string_with_prefix(&self.prefix);

        let data: Vec<u8> = match self.store.get(&object_key).await {
            Ok(d) => d,
            Err(e) if e.is_not_found() => {
                return Err(CasError::LeafMissing {
                    root: self.root.to_string(),
                    leaf: key.to_string(),
                    index,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let expected: u64 = u64::from(self.leaf_size);
        let actual: u64 = data.len() as u64;
        let is_final: bool = index + 1 == self.keys.len();
        if (!is_final && actual != expected) || actual > expected {
            return Err(CasError::LeafTruncated {
                leaf: key.to_string(),
                index,
                expected,
                actual,
            });
        }

        Ok(data)
    }
}
