//! Error types for CAS operations.

use thiserror::Error;

use datashed_store::StoreError;

/// Errors that can occur during content-addressable storage operations.
#[derive(Error, Debug)]
pub enum CasError {
    /// Key bytes or string did not form a valid digest.
    #[error("invalid key: {message}")]
    InvalidKey { message: String },

    /// Root object failed structural validation.
    #[error("corrupt root object {root}: {message}")]
    CorruptRoot { root: String, message: String },

    /// A leaf listed by the root object is absent from the store.
    #[error("missing leaf {leaf} (index {index}) for root {root}")]
    LeafMissing {
        root: String,
        leaf: String,
        index: usize,
    },

    /// A leaf body does not match the size implied by the leaf geometry.
    #[error("leaf {leaf} (index {index}) has {actual} bytes, expected {expected}")]
    LeafTruncated {
        leaf: String,
        index: usize,
        expected: u64,
        actual: u64,
    },

    /// Leaf-truncation mode is experimental and intentionally refused.
    #[error("leaf truncation mode is not supported")]
    TruncationUnsupported,

    /// Reading the input stream failed.
    #[error("reading input: {message}")]
    Input { message: String },

    /// The operation was cancelled before completion.
    #[error("operation cancelled")]
    Cancelled,

    /// Invariant violation inside the CAS machinery.
    #[error("internal error: {message}")]
    Internal { message: String },

    /// Failure surfaced by the underlying object store.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CasError {
    /// Whether the error indicates absent content rather than a failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            CasError::Store(e) => e.is_not_found(),
            CasError::LeafMissing { .. } => true,
            _ => false,
        }
    }
}
