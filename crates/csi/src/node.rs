//! Node service implementation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Mutex;

use datashed_cas::ChunkStore;
use datashed_store::ObjectStore;
use datashed_vfs::{build_inode_tables, Bundle, InodeTables, MountOptions};

#[cfg(all(feature = "fuse", target_os = "linux"))]
use datashed_vfs::{mount_read_only, BundleFs, MountHandle};

use crate::error::NodeError;
use crate::types::*;

/// A bundle staged on this node.
///
/// Created on the first stage (or publish) of a volume, reference-counted
/// across publishes, destroyed when unstaging drops the count to zero.
struct StagedBundle {
    repo: String,
    bundle_id: String,
    bundle: Arc<Bundle>,
    tables: Arc<InodeTables>,
    /// One reference for the stage plus one per live publish. The volume
    /// is destroyed when unstaging drops this to zero.
    ref_count: usize,
    #[cfg(all(feature = "fuse", target_os = "linux"))]
    mounts: Vec<(String, MountHandle)>,
}

/// CSI node service.
///
/// A single async mutex guards the volume map across stage, publish, and
/// unstage, matching the one-lock discipline of the volume lifecycle.
pub struct NodeServer {
    node_id: String,
    meta: Arc<dyn ObjectStore>,
    cas: ChunkStore,
    mount_options: MountOptions,
    runtime: Handle,
    volumes: Mutex<HashMap<String, StagedBundle>>,
}

impl NodeServer {
    /// Create a node service.
    ///
    /// # Arguments
    /// * `node_id` - Identity reported to the orchestrator
    /// * `meta` - Metadata store holding bundle descriptors
    /// * `cas` - CAS over the blob store holding bundle content
    /// * `mount_options` - Options applied to every bundle mount
    /// * `runtime` - Handle driving CAS reads from FUSE callbacks
    pub fn new(
        node_id: impl Into<String>,
        meta: Arc<dyn ObjectStore>,
        cas: ChunkStore,
        mount_options: MountOptions,
        runtime: Handle,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            meta,
            cas,
            mount_options,
            runtime,
            volumes: Mutex::new(HashMap::new()),
        }
    }

    /// Stage a volume: resolve the bundle and build its filesystem tables.
    pub async fn node_stage_volume(
        &self,
        request: NodeStageVolumeRequest,
    ) -> Result<NodeStageVolumeResponse, NodeError> {
        let (repo, bundle_id) = extract_bundle_attributes(&request.volume_attributes)?;

        let mut volumes = self.volumes.lock().await;
        self.prep_bundle(&mut volumes, &repo, bundle_id.as_deref(), &request.volume_id)
            .await?;
        tracing::info!(
            volume = %request.volume_id,
            repo = %repo,
            bundle = %bundle_id.as_deref().unwrap_or("<latest>"),
            "stage volume done"
        );
        Ok(NodeStageVolumeResponse {})
    }

    /// Publish a volume: stage on first sight, then mount read-only at the
    /// target path.
    pub async fn node_publish_volume(
        &self,
        request: NodePublishVolumeRequest,
    ) -> Result<NodePublishVolumeResponse, NodeError> {
        let mut volumes = self.volumes.lock().await;

        if !volumes.contains_key(&request.volume_id) {
            let (repo, bundle_id) = extract_bundle_attributes(&request.volume_attributes)?;
            self.prep_bundle(&mut volumes, &repo, bundle_id.as_deref(), &request.volume_id)
                .await?;
        }

        let staged: &mut StagedBundle = volumes
            .get_mut(&request.volume_id)
            .ok_or_else(|| NodeError::Internal(format!("volume {} vanished", request.volume_id)))?;

        self.mount_staged(staged, &request.target_path)?;
        staged.ref_count += 1;

        tracing::info!(
            volume = %request.volume_id,
            repo = %staged.repo,
            bundle = %staged.bundle_id,
            target = %request.target_path,
            "publish volume done"
        );
        Ok(NodePublishVolumeResponse {})
    }

    /// Unpublish a target: unmount it and drop its reference.
    pub async fn node_unpublish_volume(
        &self,
        request: NodeUnpublishVolumeRequest,
    ) -> Result<NodeUnpublishVolumeResponse, NodeError> {
        let mut volumes = self.volumes.lock().await;
        if let Some(staged) = volumes.get_mut(&request.volume_id) {
            staged.ref_count = staged.ref_count.saturating_sub(1);
            #[cfg(all(feature = "fuse", target_os = "linux"))]
            if let Some(position) = staged
                .mounts
                .iter()
                .position(|(target, _)| *target == request.target_path)
            {
                let (_, handle) = staged.mounts.remove(position);
                handle.unmount();
            }
        }
        Ok(NodeUnpublishVolumeResponse {})
    }

    /// Unstage a volume: drop one reference; at zero, unmount everything
    /// and discard the inode tables.
    pub async fn node_unstage_volume(
        &self,
        request: NodeUnstageVolumeRequest,
    ) -> Result<NodeUnstageVolumeResponse, NodeError> {
        let mut volumes = self.volumes.lock().await;

        let Some(staged) = volumes.get_mut(&request.volume_id) else {
            // Already unstaged; unstage is idempotent.
            return Ok(NodeUnstageVolumeResponse {});
        };

        staged.ref_count = staged.ref_count.saturating_sub(1);
        if staged.ref_count == 0 {
            let staged: StagedBundle = volumes
                .remove(&request.volume_id)
                .ok_or_else(|| NodeError::Internal("volume map desynchronized".to_string()))?;
            #[cfg(all(feature = "fuse", target_os = "linux"))]
            for (_, mount) in staged.mounts {
                mount.unmount();
            }
            tracing::info!(
                volume = %request.volume_id,
                repo = %staged.repo,
                bundle = %staged.bundle_id,
                "unstaged volume"
            );
        }
        Ok(NodeUnstageVolumeResponse {})
    }

    /// Identity of this node.
    pub async fn node_get_id(&self) -> Result<NodeGetIdResponse, NodeError> {
        Ok(NodeGetIdResponse {
            node_id: self.node_id.clone(),
        })
    }

    /// Node information.
    pub async fn node_get_info(&self) -> Result<NodeGetInfoResponse, NodeError> {
        Ok(NodeGetInfoResponse {
            node_id: self.node_id.clone(),
        })
    }

    /// Capabilities of this node service.
    pub fn node_get_capabilities(&self) -> NodeGetCapabilitiesResponse {
        NodeGetCapabilitiesResponse {
            capabilities: vec![NodeCapability::StageUnstageVolume],
        }
    }

    /// Number of currently staged volumes.
    pub async fn staged_volume_count(&self) -> usize {
        self.volumes.lock().await.len()
    }

    /// Resolve and register a bundle for a volume if not already staged.
    async fn prep_bundle(
        &self,
        volumes: &mut HashMap<String, StagedBundle>,
        repo: &str,
        bundle_id: Option<&str>,
        volume_id: &str,
    ) -> Result<(), NodeError> {
        if volumes.contains_key(volume_id) {
            return Ok(());
        }

        let bundle: Bundle = Bundle::load(self.meta.as_ref(), self.cas.clone(), repo, bundle_id)
            .await
            .map_err(|e| {
                tracing::error!(repo, bundle = ?bundle_id, error = %e, "failed to initialize bundle");
                NodeError::Internal(format!(
                    "failed to initialize {}:{}: {}",
                    repo,
                    bundle_id.unwrap_or("<latest>"),
                    e
                ))
            })?;

        let tables: InodeTables = build_inode_tables(bundle.descriptor(), &self.mount_options)
            .map_err(|e| NodeError::Internal(format!("building inode tables: {}", e)))?;

        let resolved_id: String = bundle.descriptor().id.clone();
        volumes.insert(
            volume_id.to_string(),
            StagedBundle {
                repo: repo.to_string(),
                bundle_id: resolved_id,
                bundle: Arc::new(bundle),
                tables: Arc::new(tables),
                ref_count: 1,
                #[cfg(all(feature = "fuse", target_os = "linux"))]
                mounts: Vec::new(),
            },
        );
        tracing::info!(volume = volume_id, repo, "volume ready to be published");
        Ok(())
    }

    #[cfg(all(feature = "fuse", target_os = "linux"))]
    fn mount_staged(&self, staged: &mut StagedBundle, target_path: &str) -> Result<(), NodeError> {
        let fs: BundleFs = BundleFs::from_parts(
            Arc::clone(&staged.bundle),
            Arc::clone(&staged.tables),
            self.mount_options.clone(),
            self.runtime.clone(),
        );
        let handle: MountHandle = mount_read_only(fs, std::path::Path::new(target_path))
            .map_err(|e| NodeError::Internal(format!("mounting at {}: {}", target_path, e)))?;
        staged.mounts.push((target_path.to_string(), handle));
        Ok(())
    }

    #[cfg(not(all(feature = "fuse", target_os = "linux")))]
    fn mount_staged(&self, staged: &mut StagedBundle, target_path: &str) -> Result<(), NodeError> {
        let _ = (&staged.tables, &staged.bundle, &self.runtime, target_path);
        Err(NodeError::Unimplemented(
            "fuse support not compiled into this build".to_string(),
        ))
    }
}

/// Pull the repo (required) and bundle id (optional) out of the volume
/// attributes.
fn extract_bundle_attributes(
    attributes: &HashMap<String, String>,
) -> Result<(String, Option<String>), NodeError> {
    let repo: String = attributes
        .get(ATTRIBUTE_REPO)
        .filter(|v: &&String| !v.is_empty())
        .cloned()
        .ok_or_else(|| NodeError::InvalidArgument("volume attribute 'repo' not set".to_string()))?;

    let bundle: Option<String> = attributes
        .get(ATTRIBUTE_HASH)
        .or_else(|| attributes.get(ATTRIBUTE_BUNDLE))
        .filter(|v: &&String| !v.is_empty())
        .cloned();
    if bundle.is_none() {
        tracing::info!(repo = %repo, "no bundle pinned, using latest");
    }

    Ok((repo, bundle))
}
