//! Shared constants used across datashed crates.

/// Default leaf size for chunked content (2MB).
/// Input streams are split into windows of this many bytes; each window is
/// stored as one content-addressed object.
pub const DEFAULT_LEAF_SIZE: u32 = 2 * 1024 * 1024;

/// Default bound on concurrent leaf uploads per put.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 10;

/// Default bound on concurrent leaf downloads per parallel read.
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 10;

/// Reported size of synthesized directories in a mounted bundle.
pub const DIRECTORY_SIZE: u64 = 2048;
