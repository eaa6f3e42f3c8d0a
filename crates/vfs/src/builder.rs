//! Inode table construction from a bundle descriptor.

use std::collections::BTreeMap;

use datashed_common::{ancestors, normalize_bundle_path, parent_path, DIRECTORY_SIZE};
use datashed_model::{BundleDescriptor, BundleEntry};

use crate::error::VfsError;
use crate::inode::{EntryAttributes, FsEntry, InodeTables, FIRST_INODE, ROOT_INODE};
use crate::options::MountOptions;

const FILE_MODE: u32 = 0o444;
const DIR_MODE: u32 = 0o755;
const FILE_LINK_COUNT: u32 = 1;
const DIR_LINK_COUNT: u32 = 2;

/// Build the inode tables for a bundle.
///
/// Ids are allocated sequentially in bundle-entry order; ancestor
/// directories missing an explicit entry are synthesized as they are first
/// encountered. Because the entry list is stable for a given bundle, the
/// resulting inode assignment is identical on every rebuild.
///
/// All timestamps are the bundle's commit time; uid/gid come from the
/// mount options.
pub fn build_inode_tables(
    descriptor: &BundleDescriptor,
    options: &MountOptions,
) -> Result<InodeTables, VfsError> {
    let mut tables: InodeTables = InodeTables::new();

    // Maps every materialized path to its inode. Build-time only; this is
    // what keeps ancestor synthesis from inserting a directory twice.
    let mut by_path: BTreeMap<String, u64> = BTreeMap::new();

    let dir_attributes = |uid: u32, gid: u32| EntryAttributes {
        size: DIRECTORY_SIZE,
        nlink: DIR_LINK_COUNT,
        mode: DIR_MODE,
        uid,
        gid,
        timestamp: descriptor.timestamp,
    };

    tables.insert(
        ROOT_INODE,
        FsEntry {
            inode: ROOT_INODE,
            full_path: String::new(),
            hash: String::new(),
            attributes: dir_attributes(options.uid, options.gid),
        },
    )?;
    by_path.insert(String::new(), ROOT_INODE);

    let mut next_inode: u64 = FIRST_INODE;
    let mut allocate = || {
        let id: u64 = next_inode;
        next_inode += 1;
        id
    };

    for entry in &descriptor.entries {
        let path: String = normalize_bundle_path(&entry.name_with_path);
        validate_entry_path(&entry.name_with_path, &path)?;

        // The entry's id is allocated before any directories synthesized
        // for it, keeping ids a function of entry order alone.
        let inode: u64 = allocate();

        // Walk up until a known ancestor, then materialize the missing
        // directories from the top down.
        let missing: Vec<&str> = ancestors(&path)
            .take_while(|dir: &&str| !by_path.contains_key(*dir))
            .collect();
        for dir_path in missing.into_iter().rev() {
            let dir_inode: u64 = allocate();
            let parent: u64 = parent_inode(&by_path, dir_path);
            tables.insert(
                parent,
                FsEntry {
                    inode: dir_inode,
                    full_path: dir_path.to_string(),
                    hash: String::new(),
                    attributes: dir_attributes(options.uid, options.gid),
                },
            )?;
            by_path.insert(dir_path.to_string(), dir_inode);
        }

        if by_path.contains_key(&path) {
            return Err(VfsError::DuplicatePath { path });
        }

        let parent: u64 = parent_inode(&by_path, &path);
        let fs_entry: FsEntry = materialize_entry(entry, &path, inode, options, descriptor);
        tables.insert(parent, fs_entry)?;
        by_path.insert(path, inode);
    }

    Ok(tables)
}

fn parent_inode(by_path: &BTreeMap<String, u64>, path: &str) -> u64 {
    parent_path(path)
        .and_then(|p: &str| by_path.get(p).copied())
        .unwrap_or(ROOT_INODE)
}

fn materialize_entry(
    entry: &BundleEntry,
    path: &str,
    inode: u64,
    options: &MountOptions,
    descriptor: &BundleDescriptor,
) -> FsEntry {
    // Modes are fixed for the read-only tree regardless of what the entry
    // recorded at commit time.
    let attributes: EntryAttributes = if entry.is_dir() {
        EntryAttributes {
            size: DIRECTORY_SIZE,
            nlink: DIR_LINK_COUNT,
            mode: DIR_MODE,
            uid: options.uid,
            gid: options.gid,
            timestamp: descriptor.timestamp,
        }
    } else {
        EntryAttributes {
            size: entry.size,
            nlink: FILE_LINK_COUNT,
            mode: FILE_MODE,
            uid: options.uid,
            gid: options.gid,
            timestamp: descriptor.timestamp,
        }
    };

    FsEntry {
        inode,
        full_path: path.to_string(),
        hash: entry.hash.clone(),
        attributes,
    }
}

fn validate_entry_path(raw: &str, normalized: &str) -> Result<(), VfsError> {
    if normalized.is_empty() {
        return Err(VfsError::InvalidEntryPath {
            path: raw.to_string(),
            message: "path has no components".to_string(),
        });
    }
    if normalized.split('/').any(|seg: &str| seg == "..") {
        return Err(VfsError::InvalidEntryPath {
            path: raw.to_string(),
            message: "parent references are not allowed".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use datashed_model::BundleEntry;

    fn descriptor(entries: Vec<BundleEntry>) -> BundleDescriptor {
        let mut descriptor = BundleDescriptor::new(
            "b1",
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        );
        descriptor.entries = entries;
        descriptor
    }

    fn build(entries: Vec<BundleEntry>) -> InodeTables {
        build_inode_tables(&descriptor(entries), &MountOptions::default()).unwrap()
    }

    #[test]
    fn test_root_only() {
        let tables: InodeTables = build(vec![]);
        assert_eq!(tables.len(), 1);
        let root = tables.root();
        assert!(root.is_dir());
        assert_eq!(root.attributes.nlink, 2);
        assert!(tables.children(ROOT_INODE).unwrap().is_empty());
    }

    #[test]
    fn test_entry_under_root() {
        let tables: InodeTables = build(vec![BundleEntry::file("top.txt", "aa", 3)]);
        assert_eq!(tables.len(), 2);

        let entry = tables.lookup(ROOT_INODE, "top.txt").unwrap();
        assert_eq!(entry.inode, FIRST_INODE);
        assert_eq!(entry.attributes.size, 3);
        assert_eq!(entry.attributes.mode, 0o444);
        assert_eq!(entry.attributes.nlink, 1);
    }

    #[test]
    fn test_ancestor_synthesis() {
        let tables: InodeTables = build(vec![BundleEntry::file("a/b/c.txt", "aa", 1)]);
        // File, plus synthesized a and a/b, plus root.
        assert_eq!(tables.len(), 4);

        let a = tables.lookup(ROOT_INODE, "a").unwrap();
        assert!(a.is_dir());
        assert_eq!(a.attributes.size, DIRECTORY_SIZE);
        assert_eq!(a.attributes.mode, 0o755);

        let b = tables.lookup(a.inode, "b").unwrap();
        assert!(b.is_dir());

        let c = tables.lookup(b.inode, "c.txt").unwrap();
        assert!(!c.is_dir());
        assert_eq!(c.full_path, "a/b/c.txt");
    }

    #[test]
    fn test_siblings_share_synthesized_parent() {
        let tables: InodeTables = build(vec![
            BundleEntry::file("a/b.txt", "aa", 1),
            BundleEntry::file("a/c.txt", "bb", 1),
        ]);
        assert_eq!(tables.len(), 4);

        let a = tables.lookup(ROOT_INODE, "a").unwrap();
        let children = tables.children(a.inode).unwrap();
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b.txt", "c.txt"]);
        // Readdir resume offsets are 1-based and consecutive.
        assert_eq!(children[0].offset, 1);
        assert_eq!(children[1].offset, 2);
    }

    #[test]
    fn test_mixed_depths() {
        let tables: InodeTables = build(vec![
            BundleEntry::file("deep/x/y/z.bin", "aa", 10),
            BundleEntry::file("shallow.txt", "bb", 1),
            BundleEntry::file("deep/x/other.txt", "cc", 2),
        ]);
        // 3 files + deep, deep/x, deep/x/y + root
        assert_eq!(tables.len(), 7);

        let deep = tables.lookup(ROOT_INODE, "deep").unwrap();
        let x = tables.lookup(deep.inode, "x").unwrap();
        let x_children = tables.children(x.inode).unwrap();
        let names: Vec<&str> = x_children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["y", "other.txt"]);
    }

    #[test]
    fn test_inode_assignment_is_deterministic() {
        let entries = || {
            vec![
                BundleEntry::file("m/n/file1", "aa", 1),
                BundleEntry::file("m/file2", "bb", 2),
                BundleEntry::file("other/file3", "cc", 3),
            ]
        };
        let first: InodeTables = build(entries());
        let second: InodeTables = build(entries());

        assert_eq!(first.len(), second.len());
        for inode in ROOT_INODE..(ROOT_INODE + first.len() as u64) {
            let a = first.get(inode).unwrap();
            let b = second.get(inode).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let err: VfsError = build_inode_tables(
            &descriptor(vec![
                BundleEntry::file("dup.txt", "aa", 1),
                BundleEntry::file("dup.txt", "bb", 2),
            ]),
            &MountOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, VfsError::DuplicatePath { .. }));
    }

    #[test]
    fn test_file_conflicting_with_directory_rejected() {
        let err: VfsError = build_inode_tables(
            &descriptor(vec![
                BundleEntry::file("a/b.txt", "aa", 1),
                BundleEntry::file("a", "bb", 2),
            ]),
            &MountOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, VfsError::DuplicatePath { .. }));
    }

    #[test]
    fn test_directory_nested_under_file_rejected() {
        let err: VfsError = build_inode_tables(
            &descriptor(vec![
                BundleEntry::file("a", "aa", 1),
                BundleEntry::file("a/b.txt", "bb", 2),
            ]),
            &MountOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, VfsError::DuplicatePath { .. }));
    }

    #[test]
    fn test_parent_reference_rejected() {
        let err: VfsError = build_inode_tables(
            &descriptor(vec![BundleEntry::file("a/../../etc/passwd", "aa", 1)]),
            &MountOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, VfsError::InvalidEntryPath { .. }));
    }

    #[test]
    fn test_explicit_directory_entry() {
        let tables: InodeTables = build(vec![BundleEntry::file("logs", "", 0)]);

        let logs = tables.lookup(ROOT_INODE, "logs").unwrap();
        assert!(logs.is_dir());
        assert!(tables.children(logs.inode).unwrap().is_empty());
    }

    #[test]
    fn test_owner_from_mount_options() {
        let options: MountOptions = MountOptions::default().with_owner(1000, 2000);
        let tables: InodeTables = build_inode_tables(
            &descriptor(vec![BundleEntry::file("f", "aa", 1)]),
            &options,
        )
        .unwrap();
        let entry = tables.lookup(ROOT_INODE, "f").unwrap();
        assert_eq!(entry.attributes.uid, 1000);
        assert_eq!(entry.attributes.gid, 2000);
    }

    #[test]
    fn test_timestamps_are_bundle_commit_time() {
        let when = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let tables: InodeTables = build(vec![BundleEntry::file("a/f", "aa", 1)]);
        for inode in [ROOT_INODE, FIRST_INODE, FIRST_INODE + 1] {
            assert_eq!(tables.get(inode).unwrap().attributes.timestamp, when);
        }
    }
}
