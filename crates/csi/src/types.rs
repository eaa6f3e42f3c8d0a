//! Request and response types for the node service.
//!
//! Field-for-field mirrors of the CSI node messages this service
//! consumes, without the generated-proto machinery.

use std::collections::HashMap;

/// Volume attribute naming the repository. Required.
pub const ATTRIBUTE_REPO: &str = "repo";

/// Volume attribute naming the bundle on stage requests. Optional;
/// absence means the repo's latest bundle.
pub const ATTRIBUTE_HASH: &str = "hash";

/// Volume attribute naming the bundle on publish requests. Optional.
pub const ATTRIBUTE_BUNDLE: &str = "bundle";

#[derive(Debug, Clone, Default)]
pub struct NodeStageVolumeRequest {
    pub volume_id: String,
    pub staging_target_path: String,
    pub volume_attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct NodeStageVolumeResponse {}

#[derive(Debug, Clone, Default)]
pub struct NodePublishVolumeRequest {
    pub volume_id: String,
    pub target_path: String,
    pub volume_attributes: HashMap<String, String>,
    pub readonly: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NodePublishVolumeResponse {}

#[derive(Debug, Clone, Default)]
pub struct NodeUnpublishVolumeRequest {
    pub volume_id: String,
    pub target_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct NodeUnpublishVolumeResponse {}

#[derive(Debug, Clone, Default)]
pub struct NodeUnstageVolumeRequest {
    pub volume_id: String,
    pub staging_target_path: String,
}

#[derive(Debug, Clone, Default)]
pub struct NodeUnstageVolumeResponse {}

#[derive(Debug, Clone)]
pub struct NodeGetIdResponse {
    pub node_id: String,
}

#[derive(Debug, Clone)]
pub struct NodeGetInfoResponse {
    pub node_id: String,
}

/// Capabilities advertised by the node service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCapability {
    StageUnstageVolume,
}

#[derive(Debug, Clone)]
pub struct NodeGetCapabilitiesResponse {
    pub capabilities: Vec<NodeCapability>,
}
