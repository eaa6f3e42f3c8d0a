//! Error types for the bundle filesystem.

use thiserror::Error;

use datashed_cas::CasError;
use datashed_model::ModelError;

/// Errors that can occur building or serving a bundle filesystem.
#[derive(Error, Debug)]
pub enum VfsError {
    /// Two bundle entries (or a file and a synthesized directory) resolved
    /// to the same path.
    #[error("duplicate path in bundle: {path}")]
    DuplicatePath { path: String },

    /// A bundle entry path cannot be materialized.
    #[error("invalid entry path {path:?}: {message}")]
    InvalidEntryPath { path: String, message: String },

    /// A file entry's content hash is not a valid root key.
    #[error("invalid root key for {path}: {message}")]
    InvalidRootKey { path: String, message: String },

    /// Inode id not present in the tables.
    #[error("inode not found: {0}")]
    InodeNotFound(u64),

    /// Operation requires a directory inode.
    #[error("not a directory: inode {0}")]
    NotADirectory(u64),

    /// Operation requires a file inode.
    #[error("not a file: inode {0}")]
    NotAFile(u64),

    /// Mount or unmount failed.
    #[error("mount failed: {0}")]
    MountFailed(String),

    /// Failure in the bundle metadata layer.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Failure reading content from the CAS.
    #[error(transparent)]
    Cas(#[from] CasError),
}
