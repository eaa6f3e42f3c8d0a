//! Read-only bundle filesystem.
//!
//! Materializes a bundle's file list into an immutable filesystem tree
//! backed by lazy CAS reads. The tree is described by three indexes built
//! once per mount:
//!
//! - `by_id` - inode id to entry, serving `getattr`
//! - `by_parent_name` - `(parent, child name)` to entry, serving `lookup`
//! - `dir_children` - ordered child lists, serving `readdir`
//!
//! Inode assignment is deterministic: ids are allocated sequentially in
//! bundle-entry order, so remounting the same bundle yields the same ids.
//!
//! The FUSE adapter (`fuse` feature, Linux only) translates kernel
//! operations onto the tables and streams file bytes from the CAS.

pub mod bundle;
pub mod builder;
mod error;
pub mod inode;
mod options;

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod fuse;

pub use bundle::Bundle;
pub use builder::build_inode_tables;
pub use error::VfsError;
pub use inode::{DirChild, EntryAttributes, EntryKind, FsEntry, InodeTables, FIRST_INODE, ROOT_INODE};
pub use options::{MountOptions, YEAR_LONG_CACHE};

#[cfg(all(feature = "fuse", target_os = "linux"))]
pub use fuse::{mount_read_only, BundleFs, MountHandle};
