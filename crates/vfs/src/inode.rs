//! Inode tables for a mounted bundle.
//!
//! Built once by [`build_inode_tables`](crate::build_inode_tables), then
//! read-only for the mount's lifetime. Lookups take no locks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::VfsError;

/// Inode id of the filesystem root.
pub const ROOT_INODE: u64 = 1;

/// First inode id handed to bundle entries.
pub const FIRST_INODE: u64 = ROOT_INODE + 1;

/// Kind of a filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Attributes served for an inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryAttributes {
    /// Content size; fixed placeholder for directories.
    pub size: u64,
    /// Link count: 1 for files, 2 for directories.
    pub nlink: u32,
    /// POSIX mode bits including the file-type bits.
    pub mode: u32,
    /// Owner uid.
    pub uid: u32,
    /// Owner gid.
    pub gid: u32,
    /// Single timestamp serving atime/mtime/ctime/crtime; bundles are
    /// snapshots, so every inode carries the bundle's commit time.
    pub timestamp: DateTime<Utc>,
}

/// A node in the mounted tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    /// Inode id, stable across remounts of the same bundle.
    pub inode: u64,
    /// Bundle-relative path; empty for the root.
    pub full_path: String,
    /// Root key (hex) of the file content; empty for directories.
    pub hash: String,
    /// Attributes served to the kernel.
    pub attributes: EntryAttributes,
}

impl FsEntry {
    /// Whether this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.hash.is_empty()
    }

    /// Kind of this entry.
    pub fn kind(&self) -> EntryKind {
        if self.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }
}

/// One slot in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirChild {
    /// Offset of the *next* entry, as handed back by the kernel to resume
    /// a paged listing. First child has offset 1.
    pub offset: u64,
    /// Child inode id.
    pub inode: u64,
    /// Child name within the directory.
    pub name: String,
    /// Child kind.
    pub kind: EntryKind,
}

/// The immutable indexes serving a mounted bundle.
#[derive(Debug, Default)]
pub struct InodeTables {
    by_id: BTreeMap<u64, FsEntry>,
    by_parent_name: BTreeMap<(u64, String), u64>,
    dir_children: BTreeMap<u64, Vec<DirChild>>,
}

impl InodeTables {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Entry for an inode id.
    pub fn get(&self, inode: u64) -> Option<&FsEntry> {
        self.by_id.get(&inode)
    }

    /// Resolve a child by parent inode and name.
    pub fn lookup(&self, parent: u64, name: &str) -> Option<&FsEntry> {
        let child: u64 = *self.by_parent_name.get(&(parent, name.to_string()))?;
        self.by_id.get(&child)
    }

    /// Ordered children of a directory inode. Present (possibly empty) for
    /// every directory, absent for files.
    pub fn children(&self, inode: u64) -> Option<&[DirChild]> {
        self.dir_children.get(&inode).map(Vec::as_slice)
    }

    /// The root entry.
    pub fn root(&self) -> &FsEntry {
        // The builder inserts the root before anything else.
        self.by_id
            .get(&ROOT_INODE)
            .expect("inode tables built without a root")
    }

    /// Number of inodes, root included.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the tables are empty (never true once built).
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Insert an entry under its parent. Build-time only; double inserts
    /// mean the builder walked a path twice and are rejected.
    pub(crate) fn insert(&mut self, parent: u64, entry: FsEntry) -> Result<(), VfsError> {
        let inode: u64 = entry.inode;
        let is_dir: bool = entry.is_dir();
        let name: String = datashed_common::base_name(&entry.full_path).to_string();
        let full_path: String = entry.full_path.clone();

        if self.by_id.insert(inode, entry).is_some() {
            return Err(VfsError::DuplicatePath { path: full_path });
        }
        if is_dir {
            self.dir_children.entry(inode).or_default();
        }

        if inode == ROOT_INODE {
            return Ok(());
        }

        // A file path reused as a directory shows up here as a non-dir
        // parent.
        match self.by_id.get(&parent) {
            Some(p) if p.is_dir() => {}
            Some(p) => {
                return Err(VfsError::DuplicatePath {
                    path: p.full_path.clone(),
                })
            }
            None => return Err(VfsError::InodeNotFound(parent)),
        }

        if self
            .by_parent_name
            .insert((parent, name.clone()), inode)
            .is_some()
        {
            return Err(VfsError::DuplicatePath { path: full_path });
        }

        let children: &mut Vec<DirChild> = self.dir_children.entry(parent).or_default();
        let kind: EntryKind = if is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        children.push(DirChild {
            offset: children.len() as u64 + 1,
            inode,
            name,
            kind,
        });
        Ok(())
    }
}
