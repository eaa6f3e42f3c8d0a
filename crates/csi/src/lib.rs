//! CSI node service for datashed bundles.
//!
//! Implements the node-side state machine of the Container Storage
//! Interface: staging a bundle builds its read-only filesystem once,
//! publishing mounts it at a target path, and unstaging tears everything
//! down when the last reference is released. The gRPC transport itself is
//! external; this crate exposes the service as typed request/response
//! structs plus a status-code error enum a transport shim can wrap.

mod error;
mod node;
mod types;

pub use error::NodeError;
pub use node::NodeServer;
pub use types::{
    NodeCapability, NodeGetCapabilitiesResponse, NodeGetIdResponse, NodeGetInfoResponse,
    NodePublishVolumeRequest, NodePublishVolumeResponse, NodeStageVolumeRequest,
    NodeStageVolumeResponse, NodeUnpublishVolumeRequest, NodeUnpublishVolumeResponse,
    NodeUnstageVolumeRequest, NodeUnstageVolumeResponse, ATTRIBUTE_BUNDLE, ATTRIBUTE_HASH,
    ATTRIBUTE_REPO,
};
