//! Object store abstraction for datashed blob and metadata storage.
//!
//! Everything datashed persists (content-addressed leaves, root objects,
//! bundle descriptors) goes through the [`ObjectStore`] trait, keyed by
//! opaque strings. Two backends ship with this crate:
//!
//! - [`LocalStore`] - objects as files under a root directory
//! - [`MemoryStore`] - in-memory map, primarily for tests
//!
//! Vendor backends (S3, GCS) implement the same trait out of tree.
//!
//! Stores are safe for concurrent use. A store may optionally support
//! CRC-verified writes; callers probe with [`ObjectStore::supports_crc`]
//! before using [`ObjectStore::put_with_crc`].

mod error;
mod localfs;
mod memory;
mod traits;

pub use error::StoreError;
pub use localfs::LocalStore;
pub use memory::MemoryStore;
pub use traits::{ObjectStore, WriteMode};
