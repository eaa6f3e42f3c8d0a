//! Content-addressable chunked storage.
//!
//! Byte streams are split into fixed-size leaves, each stored under the
//! Blake2b-512 hash of its bytes. A root object, stored under the hash of
//! the concatenated leaf keys, lists the leaves in input order followed by
//! the root key itself. The presence of the root object marks the content
//! as complete.
//!
//! # Example
//!
//! ```ignore
//! use datashed_cas::ChunkStore;
//! use datashed_store::MemoryStore;
//! use std::sync::Arc;
//!
//! let cas = ChunkStore::new(Arc::new(MemoryStore::new()));
//! let put = cas.put(&mut &b"hello world"[..], None).await?;
//! let mut reader = cas.get(put.root_key).await?;
//! let bytes = reader.read_to_end().await?;
//! ```

mod cancel;
mod chunk;
mod error;
mod key;
mod reader;
mod store;
mod writer;

pub use cancel::CancelToken;
pub use error::CasError;
pub use key::{Key, KeyAccumulator, KEY_SIZE};
pub use reader::{ChunkReader, WriteAt};
pub use store::{parse_root_object, ChunkStore, HasOptions};
pub use writer::PutResult;
