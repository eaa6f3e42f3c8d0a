//! Bundle runtime object: a descriptor bound to its blob store.

use std::str::FromStr;

use datashed_cas::{ChunkReader, ChunkStore, Key};
use datashed_model::{resolve_bundle, BundleDescriptor};
use datashed_store::ObjectStore;

use crate::error::VfsError;

/// A bundle resolved from the metadata store and bound to the CAS holding
/// its content.
pub struct Bundle {
    repo: String,
    descriptor: BundleDescriptor,
    cas: ChunkStore,
}

impl Bundle {
    /// Bind an already-loaded descriptor to a CAS.
    pub fn new(repo: impl Into<String>, descriptor: BundleDescriptor, cas: ChunkStore) -> Self {
        Self {
            repo: repo.into(),
            descriptor,
            cas,
        }
    }

    /// Load a bundle from the metadata store.
    ///
    /// # Arguments
    /// * `meta` - Metadata store holding descriptors
    /// * `cas` - CAS over the blob store holding content
    /// * `repo` - Repository name
    /// * `bundle_id` - Bundle id, or `None` for the repo's latest bundle
    pub async fn load(
        meta: &dyn ObjectStore,
        cas: ChunkStore,
        repo: &str,
        bundle_id: Option<&str>,
    ) -> Result<Self, VfsError> {
        let descriptor: BundleDescriptor = resolve_bundle(meta, repo, bundle_id).await?;
        Ok(Self::new(repo, descriptor, cas))
    }

    /// Repository this bundle belongs to.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// The bundle descriptor.
    pub fn descriptor(&self) -> &BundleDescriptor {
        &self.descriptor
    }

    /// The CAS holding this bundle's content.
    pub fn cas(&self) -> &ChunkStore {
        &self.cas
    }

    /// Open a verified reader over a file entry's content.
    ///
    /// # Arguments
    /// * `path` - Entry path, used for error context
    /// * `hash` - The entry's root key in hex
    pub async fn open_content(&self, path: &str, hash: &str) -> Result<ChunkReader, VfsError> {
        let root: Key = Key::from_str(hash).map_err(|e| VfsError::InvalidRootKey {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Ok(self.cas.get(root).await?)
    }
}
