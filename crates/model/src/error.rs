//! Error types for the bundle model.

use thiserror::Error;

use datashed_store::StoreError;

/// Errors that can occur reading or writing bundle metadata.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The repo has no bundle under the requested id.
    #[error("bundle {bundle} not found in repo {repo}")]
    BundleNotFound { repo: String, bundle: String },

    /// The repo has no latest-bundle pointer yet.
    #[error("repo {repo} has no bundles")]
    NoLatestBundle { repo: String },

    /// A descriptor document failed to encode or decode.
    #[error("invalid bundle descriptor for {repo}/{bundle}: {message}")]
    InvalidDescriptor {
        repo: String,
        bundle: String,
        message: String,
    },

    /// A repo or bundle name is unusable as a metadata key component.
    #[error("invalid name {name:?}: {message}")]
    InvalidName { name: String, message: String },

    /// Failure surfaced by the metadata store.
    #[error(transparent)]
    Store(#[from] StoreError),
}
