//! Error type mirroring the gRPC status codes the node service emits.

use thiserror::Error;

/// Errors returned by the node service, one variant per status code the
/// transport shim maps onto the wire.
#[derive(Error, Debug)]
pub enum NodeError {
    /// A required request field is missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The referenced volume or bundle does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Staging or mounting failed.
    #[error("internal: {0}")]
    Internal(String),

    /// The operation is not supported by this build.
    #[error("unimplemented: {0}")]
    Unimplemented(String),
}

impl NodeError {
    /// Numeric gRPC status code for this error.
    pub fn grpc_code(&self) -> u32 {
        match self {
            NodeError::InvalidArgument(_) => 3,
            NodeError::NotFound(_) => 5,
            NodeError::Unimplemented(_) => 12,
            NodeError::Internal(_) => 13,
        }
    }
}
