//! Error types for object store operations.

use thiserror::Error;

/// Errors that can occur during object store operations.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Object not found in the store.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// Object already exists and the write mode forbids overwriting.
    #[error("object already exists: {key}")]
    AlreadyExists { key: String },

    /// CRC32C checksum did not match the payload.
    #[error("checksum mismatch for {key}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        key: String,
        expected: u32,
        actual: u32,
    },

    /// Key is empty or contains characters the backend cannot accept.
    #[error("invalid key {key:?}: {message}")]
    InvalidKey { key: String, message: String },

    /// Underlying I/O failure.
    #[error("i/o error for {key}: {message}")]
    Io { key: String, message: String },
}

impl StoreError {
    /// Create an Io error from a std::io::Error.
    ///
    /// # Arguments
    /// * `key` - Key the operation was addressing
    /// * `err` - The underlying I/O error
    pub fn from_io(key: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            message: err.to_string(),
        }
    }

    /// Whether the error means the object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
