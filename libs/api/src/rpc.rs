//! Node plugin operations in terms of the shared data model.
//!
//! The gRPC messages in `fakedra-proto` convert to and from these.

use fakedra_id::ClaimUid;

use crate::StructuredResourceHandle;

/// A claim as seen by the node runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeClaim {
    pub namespace: String,
    pub uid: ClaimUid,
    pub name: String,
    pub structured_resource_handle: Vec<StructuredResourceHandle>,
}

/// Outcome of preparing one claim: either device handles or an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareResult {
    pub cdi_devices: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnprepareResult {
    pub error: Option<String>,
}
