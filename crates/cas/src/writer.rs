//! Chunked writer: split, hash, upload, publish root.
//!
//! The writer consumes an input stream in fixed windows. Each window is
//! hashed into its leaf key and handed to an upload task; at most
//! `upload_concurrency` uploads are in flight at once, gated by a
//! semaphore acquired before the task is spawned. A running accumulator
//! hashes the leaf keys in input order into the root key, so the root
//! never depends on upload completion order.
//!
//! The root object is written only after every upload has settled
//! successfully. On any failure or cancellation the content is left
//! incomplete: leaves may remain (idempotent by content hash), the root is
//! never published.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use datashed_store::{ObjectStore, WriteMode};

use crate::cancel::CancelToken;
use crate::error::CasError;
use crate::key::{Key, KeyAccumulator, KEY_SIZE};

/// Outcome of a successful put.
#[derive(Debug, Clone)]
pub struct PutResult {
    /// Total bytes consumed from the input stream.
    pub bytes_written: u64,
    /// Root key of the stored content.
    pub root_key: Key,
    /// Leaf keys in input order.
    pub leaf_keys: Vec<Key>,
    /// Whether the root object already existed and leaf re-upload was
    /// effectively a no-op.
    pub already_existed: bool,
}

impl PutResult {
    /// The leaf keys as the raw concatenation stored in the root object
    /// (excluding the trailing root key).
    pub fn leaf_key_bytes(&self) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::with_capacity(self.leaf_keys.len() * KEY_SIZE);
        for key in &self.leaf_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out
    }
}

pub(crate) struct WriterConfig {
    pub leaf_size: u32,
    pub prefix: String,
    pub upload_concurrency: usize,
}

/// Chunk `reader` into the store per the writer contract.
pub(crate) async fn put_stream<R>(
    store: &Arc<dyn ObjectStore>,
    config: &WriterConfig,
    reader: &mut R,
    cancel: Option<&CancelToken>,
) -> Result<PutResult, CasError>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    let leaf_size: usize = config.leaf_size as usize;
    let semaphore: Arc<Semaphore> = Arc::new(Semaphore::new(config.upload_concurrency.max(1)));
    let mut uploads: JoinSet<Result<(), CasError>> = JoinSet::new();

    let mut root_hasher = KeyAccumulator::new();
    let mut leaf_keys: Vec<Key> = Vec::new();
    let mut bytes_written: u64 = 0;
    let mut first_error: Option<CasError> = None;

    loop {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            first_error = Some(CasError::Cancelled);
            break;
        }

        let window: Vec<u8> = match read_window(reader, leaf_size).await {
            Ok(w) => w,
            Err(e) => {
                first_error = Some(CasError::Input {
                    message: e.to_string(),
                });
                break;
            }
        };
        if window.is_empty() {
            break;
        }
        let final_window: bool = window.len() < leaf_size;

        let key: Key = Key::hash(&window);
        root_hasher.push(&key);
        leaf_keys.push(key);
        bytes_written += window.len() as u64;

        // Acquire before spawning so at most `upload_concurrency` windows
        // are buffered and in flight.
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                first_error = Some(CasError::Internal {
                    message: "upload semaphore closed".to_string(),
                });
                break;
            }
        };
        let store: Arc<dyn ObjectStore> = Arc::clone(store);
        let object_key: String = key.string_with_prefix(&config.prefix);
        uploads.spawn(async move {
            let _permit = permit;
            store
                .put(&object_key, &window, WriteMode::Overwrite)
                .await
                .map_err(CasError::from)
        });

        if final_window {
            break;
        }
    }

    // Join barrier: every staged upload settles before we decide the
    // outcome. The first error seen wins; later ones are dropped.
    while let Some(joined) = uploads.join_next().await {
        let result: Result<(), CasError> = match joined {
            Ok(r) => r,
            Err(e) => Err(CasError::Internal {
                message: format!("leaf upload task panicked: {}", e),
            }),
        };
        if let Err(e) = result {
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    let root_key: Key = root_hasher.finalize();
    let root_object_key: String = root_key.string_with_prefix(&config.prefix);

    let already_existed: bool = store.has(&root_object_key).await?;
    if !already_existed {
        let mut payload: Vec<u8> = Vec::with_capacity((leaf_keys.len() + 1) * KEY_SIZE);
        for key in &leaf_keys {
            payload.extend_from_slice(key.as_bytes());
        }
        payload.extend_from_slice(root_key.as_bytes());

        if store.supports_crc() {
            let crc: u32 = crc32c::crc32c(&payload);
            store
                .put_with_crc(&root_object_key, &payload, WriteMode::Overwrite, crc)
                .await?;
        } else {
            store
                .put(&root_object_key, &payload, WriteMode::Overwrite)
                .await?;
        }
    }

    Ok(PutResult {
        bytes_written,
        root_key,
        leaf_keys,
        already_existed,
    })
}

/// Fill a window of up to `size` bytes, reading until full or EOF.
async fn read_window<R>(reader: &mut R, size: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + ?Sized,
{
    let mut buf: Vec<u8> = vec![0u8; size];
    let mut filled: usize = 0;
    while filled < size {
        let n: usize = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_window_fills_from_chunky_reader() {
        // tokio's `chain` yields data in separate polls; the window loop
        // must keep reading until full.
        let first: &[u8] = b"abc";
        let second: &[u8] = b"defgh";
        let mut reader = AsyncReadExt::chain(first, second);

        let window: Vec<u8> = read_window(&mut reader, 6).await.unwrap();
        assert_eq!(window, b"abcdef");

        let rest: Vec<u8> = read_window(&mut reader, 6).await.unwrap();
        assert_eq!(rest, b"gh");

        let empty: Vec<u8> = read_window(&mut reader, 6).await.unwrap();
        assert!(empty.is_empty());
    }
}
