//! FUSE adapter over the inode tables.
//!
//! Kernel callbacks are synchronous; CAS reads are async. The adapter
//! bridges with a stored runtime handle, blocking the FUSE dispatch thread
//! on each content fetch. All table lookups are lock-free.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, Request,
};
use tokio::runtime::Handle;

use datashed_cas::ChunkReader;

use crate::bundle::Bundle;
use crate::builder::build_inode_tables;
use crate::error::VfsError;
use crate::inode::{EntryKind, FsEntry, InodeTables};
use crate::options::MountOptions;

/// Read-only filesystem over a bundle.
pub struct BundleFs {
    bundle: Arc<Bundle>,
    tables: Arc<InodeTables>,
    options: MountOptions,
    runtime: Handle,
    open_files: Mutex<HashMap<u64, Arc<ChunkReader>>>,
    next_handle: AtomicU64,
}

impl BundleFs {
    /// Build the filesystem for a bundle.
    ///
    /// # Arguments
    /// * `bundle` - Bundle to serve
    /// * `options` - Mount options (owner, cache windows, fs name)
    /// * `runtime` - Handle used to drive CAS reads from kernel callbacks
    pub fn new(bundle: Bundle, options: MountOptions, runtime: Handle) -> Result<Self, VfsError> {
        let tables: InodeTables = build_inode_tables(bundle.descriptor(), &options)?;
        Ok(Self::from_parts(
            Arc::new(bundle),
            Arc::new(tables),
            options,
            runtime,
        ))
    }

    /// Build a filesystem view over already-shared parts. Used when one
    /// staged bundle backs several mounts: the tables are built once and
    /// every view serves them.
    pub fn from_parts(
        bundle: Arc<Bundle>,
        tables: Arc<InodeTables>,
        options: MountOptions,
        runtime: Handle,
    ) -> Self {
        Self {
            bundle,
            tables,
            options,
            runtime,
            open_files: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// The inode tables backing this filesystem.
    pub fn tables(&self) -> &InodeTables {
        &self.tables
    }

    fn to_file_attr(&self, entry: &FsEntry) -> FileAttr {
        let kind: FileType = match entry.kind() {
            EntryKind::File => FileType::RegularFile,
            EntryKind::Directory => FileType::Directory,
        };
        let when: SystemTime = SystemTime::from(entry.attributes.timestamp);
        let size: u64 = entry.attributes.size;

        FileAttr {
            ino: entry.inode,
            size,
            blocks: (size + 511) / 512,
            atime: when,
            mtime: when,
            ctime: when,
            crtime: when,
            kind,
            perm: (entry.attributes.mode & 0o7777) as u16,
            nlink: entry.attributes.nlink,
            uid: entry.attributes.uid,
            gid: entry.attributes.gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }
}

impl Filesystem for BundleFs {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.tables.lookup(parent, name) {
            Some(entry) => {
                let attr: FileAttr = self.to_file_attr(entry);
                reply.entry(&self.options.cache_ttl, &attr, 1);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        match self.tables.get(ino) {
            Some(entry) => {
                let attr: FileAttr = self.to_file_attr(entry);
                reply.attr(&self.options.cache_ttl, &attr);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn opendir(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.tables.get(ino) {
            Some(entry) if entry.is_dir() => reply.opened(0, 0),
            Some(_) => reply.error(libc::ENOTDIR),
            None => reply.error(libc::ENOENT),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(entry) = self.tables.get(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if !entry.is_dir() {
            reply.error(libc::ENOTDIR);
            return;
        }
        let children = self.tables.children(ino).unwrap_or(&[]);

        // Dot entries first, then the table's ordered children. The kernel
        // resolves ".." itself, so reporting the directory's own inode for
        // it is sufficient here.
        let mut listing: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ino, FileType::Directory, "..".to_string()),
        ];
        for child in children {
            let kind: FileType = match child.kind {
                EntryKind::File => FileType::RegularFile,
                EntryKind::Directory => FileType::Directory,
            };
            listing.push((child.inode, kind, child.name.clone()));
        }

        if offset < 0 || offset as usize > listing.len() {
            reply.error(libc::EIO);
            return;
        }

        for (i, (child_ino, kind, name)) in listing.iter().enumerate().skip(offset as usize) {
            if reply.add(*child_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(entry) = self.tables.get(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if entry.is_dir() {
            reply.error(libc::EISDIR);
            return;
        }

        let reader: Result<ChunkReader, VfsError> = self
            .runtime
            .block_on(self.bundle.open_content(&entry.full_path, &entry.hash));
        match reader {
            Ok(reader) => {
                let fh: u64 = self.next_handle.fetch_add(1, Ordering::SeqCst);
                self.open_files
                    .lock()
                    .unwrap()
                    .insert(fh, Arc::new(reader));
                reply.opened(fh, 0);
            }
            Err(e) => {
                tracing::error!(path = %entry.full_path, error = %e, "open failed");
                reply.error(if matches!(e, VfsError::Cas(ref c) if c.is_not_found()) {
                    libc::ENOENT
                } else {
                    libc::EIO
                });
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyData,
    ) {
        if self.tables.get(ino).is_none() {
            reply.error(libc::ENOENT);
            return;
        }
        let reader: Option<Arc<ChunkReader>> =
            self.open_files.lock().unwrap().get(&fh).cloned();
        let Some(reader) = reader else {
            tracing::error!(ino, fh, "read on unknown file handle");
            reply.error(libc::EIO);
            return;
        };

        let mut buf: Vec<u8> = vec![0u8; size as usize];
        let result = self
            .runtime
            .block_on(reader.read_at(offset.max(0) as u64, &mut buf));
        match result {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => {
                tracing::error!(ino, offset, error = %e, "read failed");
                reply.error(libc::EIO);
            }
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.open_files.lock().unwrap().remove(&fh);
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        // No backing capacity to report.
        reply.statfs(0, 0, 0, 0, 0, 512, 255, 0);
    }

    fn destroy(&mut self) {
        tracing::debug!(repo = %self.bundle.repo(), "filesystem destroyed");
    }

    // The tree is immutable: every mutating operation is refused.

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        tracing::debug!(ino, "setattr refused on read-only mount");
        reply.error(libc::ENOSYS);
    }

    fn mknod(
        &mut self,
        _req: &Request,
        parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        tracing::debug!(parent, "mknod refused on read-only mount");
        reply.error(libc::ENOSYS);
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        tracing::debug!(parent, "mkdir refused on read-only mount");
        reply.error(libc::ENOSYS);
    }

    fn unlink(&mut self, _req: &Request, parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        tracing::debug!(parent, "unlink refused on read-only mount");
        reply.error(libc::ENOSYS);
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        tracing::debug!(parent, "rmdir refused on read-only mount");
        reply.error(libc::ENOSYS);
    }

    fn symlink(
        &mut self,
        _req: &Request,
        parent: u64,
        _link_name: &OsStr,
        _target: &Path,
        reply: ReplyEntry,
    ) {
        tracing::debug!(parent, "symlink refused on read-only mount");
        reply.error(libc::ENOSYS);
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        tracing::debug!(parent, "rename refused on read-only mount");
        reply.error(libc::ENOSYS);
    }

    fn link(
        &mut self,
        _req: &Request,
        ino: u64,
        _newparent: u64,
        _newname: &OsStr,
        reply: ReplyEntry,
    ) {
        tracing::debug!(ino, "link refused on read-only mount");
        reply.error(libc::ENOSYS);
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        tracing::debug!(parent, "create refused on read-only mount");
        reply.error(libc::ENOSYS);
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: fuser::ReplyWrite,
    ) {
        tracing::debug!(ino, "write refused on read-only mount");
        reply.error(libc::ENOSYS);
    }

    fn flush(&mut self, _req: &Request, ino: u64, _fh: u64, _lock: u64, reply: ReplyEmpty) {
        tracing::debug!(ino, "flush refused on read-only mount");
        reply.error(libc::ENOSYS);
    }

    fn fsync(&mut self, _req: &Request, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        tracing::debug!(ino, "fsync refused on read-only mount");
        reply.error(libc::ENOSYS);
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        tracing::debug!(ino, "setxattr refused on read-only mount");
        reply.error(libc::ENOSYS);
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, _name: &OsStr, reply: ReplyEmpty) {
        tracing::debug!(ino, "removexattr refused on read-only mount");
        reply.error(libc::ENOSYS);
    }
}

/// A live read-only mount. Unmounts when dropped or via
/// [`unmount`](MountHandle::unmount).
pub struct MountHandle {
    session: Option<fuser::BackgroundSession>,
    mountpoint: PathBuf,
}

impl MountHandle {
    /// Where the bundle is mounted.
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Unmount explicitly.
    pub fn unmount(mut self) {
        if let Some(session) = self.session.take() {
            drop(session);
        }
        tracing::info!(mountpoint = %self.mountpoint.display(), "unmounted bundle");
    }
}

/// Mount a bundle filesystem read-only at `mountpoint`.
///
/// The session runs on background threads; the returned handle unmounts on
/// drop.
pub fn mount_read_only(fs: BundleFs, mountpoint: &Path) -> Result<MountHandle, VfsError> {
    let options: Vec<MountOption> = vec![
        MountOption::RO,
        MountOption::FSName(fs.options.fs_name.clone()),
    ];
    tracing::info!(mountpoint = %mountpoint.display(), "mounting bundle read-only");
    let session: fuser::BackgroundSession = fuser::spawn_mount2(fs, mountpoint, &options)
        .map_err(|e| VfsError::MountFailed(e.to_string()))?;
    Ok(MountHandle {
        session: Some(session),
        mountpoint: mountpoint.to_path_buf(),
    })
}
