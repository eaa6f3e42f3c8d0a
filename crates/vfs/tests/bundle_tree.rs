//! End-to-end tests for bundle resolution and the materialized tree.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use datashed_cas::{ChunkStore, PutResult};
use datashed_model::{write_bundle, BundleDescriptor, BundleEntry};
use datashed_store::{MemoryStore, ObjectStore};
use datashed_vfs::{build_inode_tables, Bundle, EntryKind, MountOptions, VfsError, ROOT_INODE};

/// Store content in the CAS and return a file entry for it.
async fn record_file(cas: &ChunkStore, path: &str, content: &[u8]) -> BundleEntry {
    let put: PutResult = cas.put(&mut &content[..], None).await.unwrap();
    BundleEntry::file(path, put.root_key.to_string(), content.len() as u64)
}

async fn two_file_bundle(cas: &ChunkStore) -> BundleDescriptor {
    let mut descriptor = BundleDescriptor::new(
        "bundle-1",
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    )
    .with_message("fixture")
    .with_contributor("tests@datashed");
    descriptor.entries = vec![
        record_file(cas, "a/b.txt", b"x").await,
        record_file(cas, "a/c.txt", b"y").await,
    ];
    descriptor
}

#[tokio::test]
async fn test_readdir_lists_bundle_files() {
    let blobs: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let cas: ChunkStore = ChunkStore::new(blobs as Arc<dyn ObjectStore>);
    let descriptor: BundleDescriptor = two_file_bundle(&cas).await;

    let tables = build_inode_tables(&descriptor, &MountOptions::default()).unwrap();

    let a = tables.lookup(ROOT_INODE, "a").unwrap();
    assert_eq!(a.kind(), EntryKind::Directory);

    let names: Vec<&str> = tables
        .children(a.inode)
        .unwrap()
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["b.txt", "c.txt"]);
}

#[tokio::test]
async fn test_lookup_miss_reports_absent() {
    let blobs: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let cas: ChunkStore = ChunkStore::new(blobs as Arc<dyn ObjectStore>);
    let descriptor: BundleDescriptor = two_file_bundle(&cas).await;

    let tables = build_inode_tables(&descriptor, &MountOptions::default()).unwrap();
    assert!(tables.lookup(ROOT_INODE, "does-not-exist").is_none());
    assert!(tables.get(9999).is_none());
}

#[tokio::test]
async fn test_file_content_streams_from_cas() {
    let blobs: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let cas: ChunkStore = ChunkStore::new(blobs as Arc<dyn ObjectStore>);
    let descriptor: BundleDescriptor = two_file_bundle(&cas).await;

    let bundle = Bundle::new("demo", descriptor, cas);
    let tables = build_inode_tables(bundle.descriptor(), &MountOptions::default()).unwrap();

    let a = tables.lookup(ROOT_INODE, "a").unwrap();
    let b = tables.lookup(a.inode, "b.txt").unwrap();

    let mut reader = bundle.open_content(&b.full_path, &b.hash).await.unwrap();
    assert_eq!(reader.read_to_end().await.unwrap(), b"x");

    // Positioned read, as served to the kernel.
    let reader = bundle.open_content(&b.full_path, &b.hash).await.unwrap();
    let mut buf: Vec<u8> = vec![0u8; 16];
    let n: usize = reader.read_at(0, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"x");
}

#[tokio::test]
async fn test_bundle_load_resolves_latest() {
    let blobs: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let meta: MemoryStore = MemoryStore::new();
    let cas: ChunkStore = ChunkStore::new(blobs as Arc<dyn ObjectStore>);

    let older: BundleDescriptor = two_file_bundle(&cas).await;
    write_bundle(&meta, "demo", &older).await.unwrap();

    let mut newer: BundleDescriptor = two_file_bundle(&cas).await;
    newer.id = "bundle-2".to_string();
    newer.entries.push(record_file(&cas, "extra.txt", b"z").await);
    write_bundle(&meta, "demo", &newer).await.unwrap();

    let latest = Bundle::load(&meta, cas.clone(), "demo", None).await.unwrap();
    assert_eq!(latest.descriptor().id, "bundle-2");
    assert_eq!(latest.descriptor().entries.len(), 3);

    let pinned = Bundle::load(&meta, cas, "demo", Some("bundle-1"))
        .await
        .unwrap();
    assert_eq!(pinned.descriptor().id, "bundle-1");
}

#[tokio::test]
async fn test_open_content_rejects_bad_root_key() {
    let blobs: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let cas: ChunkStore = ChunkStore::new(blobs as Arc<dyn ObjectStore>);
    let descriptor: BundleDescriptor = BundleDescriptor::new(
        "b",
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
    );
    let bundle = Bundle::new("demo", descriptor, cas);

    let err: VfsError = bundle
        .open_content("bad.bin", "not-a-key")
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::InvalidRootKey { .. }));
}

#[tokio::test]
async fn test_tables_survive_large_flat_directory() {
    let blobs: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let cas: ChunkStore = ChunkStore::new(blobs as Arc<dyn ObjectStore>);

    let mut descriptor = BundleDescriptor::new(
        "wide",
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
    );
    for i in 0..500 {
        descriptor
            .entries
            .push(record_file(&cas, &format!("data/part-{:04}", i), b"p").await);
    }

    let tables = build_inode_tables(&descriptor, &MountOptions::default()).unwrap();
    // root + data + 500 files
    assert_eq!(tables.len(), 502);

    let data = tables.lookup(ROOT_INODE, "data").unwrap();
    let children = tables.children(data.inode).unwrap();
    assert_eq!(children.len(), 500);
    assert_eq!(children[0].name, "part-0000");
    assert_eq!(children[499].offset, 500);
}
